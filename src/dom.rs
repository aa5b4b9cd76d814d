//! An owned, single-threaded DOM node tree.
//!
//! The engine reconciles against this model rather than against a browser
//! DOM, which keeps the ordering and lifecycle invariants natively testable.
//! Tags and attribute names are stored lowercase; text and comment data are
//! kept verbatim.

use crate::error::Error;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Elements without a closing tag in serialized form.
const VOID_TAGS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

#[derive(Debug)]
enum Kind {
	Element {
		tag: String,
		attributes: RefCell<Vec<(String, String)>>,
	},
	Text(RefCell<String>),
	Comment(RefCell<String>),
}

#[derive(Debug)]
struct NodeData {
	id: u64,
	kind: Kind,
	parent: RefCell<Weak<NodeData>>,
	children: RefCell<Vec<NodeRef>>,
	/// Lifecycle state: `true` between a mount walk and the matching
	/// unmount walk. See [`crate::walker`].
	mounted: Cell<bool>,
}

/// A shared handle to a single DOM node.
///
/// Cloning is cheap and refers to the same physical node; equality and
/// hashing are by node identity, never by content.
#[derive(Clone)]
pub struct NodeRef(Rc<NodeData>);

impl NodeRef {
	fn new(kind: Kind) -> Self {
		Self(Rc::new(NodeData {
			id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
			kind,
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(Vec::new()),
			mounted: Cell::new(false),
		}))
	}

	#[must_use]
	pub fn element(tag: &str) -> Self {
		Self::new(Kind::Element {
			tag: tag.to_ascii_lowercase(),
			attributes: RefCell::new(Vec::new()),
		})
	}

	#[must_use]
	pub fn text(data: &str) -> Self {
		Self::new(Kind::Text(RefCell::new(data.to_owned())))
	}

	#[must_use]
	pub fn comment(data: &str) -> Self {
		Self::new(Kind::Comment(RefCell::new(data.to_owned())))
	}

	/// Unique for the lifetime of the process; never reused.
	#[must_use]
	pub fn id(&self) -> u64 {
		self.0.id
	}

	#[must_use]
	pub fn is_element(&self) -> bool {
		matches!(self.0.kind, Kind::Element { .. })
	}

	/// Lowercase tag name, for element nodes.
	#[must_use]
	pub fn tag_name(&self) -> Option<&str> {
		match &self.0.kind {
			Kind::Element { tag, .. } => Some(tag),
			_ => None,
		}
	}

	/// Attribute value by case-insensitive name.
	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<String> {
		match &self.0.kind {
			Kind::Element { attributes, .. } => {
				let name = name.to_ascii_lowercase();
				attributes.borrow().iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone())
			}
			_ => None,
		}
	}

	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		self.attribute(name).is_some()
	}

	/// Sets (or replaces) an attribute. No-op on non-element nodes.
	pub fn set_attribute(&self, name: &str, value: &str) {
		if let Kind::Element { attributes, .. } = &self.0.kind {
			let name = name.to_ascii_lowercase();
			let mut attributes = attributes.borrow_mut();
			match attributes.iter_mut().find(|(n, _)| *n == name) {
				Some((_, v)) => *v = value.to_owned(),
				None => attributes.push((name, value.to_owned())),
			}
		}
	}

	/// Attribute names in document order.
	#[must_use]
	pub fn attribute_names(&self) -> Vec<String> {
		match &self.0.kind {
			Kind::Element { attributes, .. } => attributes.borrow().iter().map(|(n, _)| n.clone()).collect(),
			_ => Vec::new(),
		}
	}

	/// Text or comment data.
	#[must_use]
	pub fn data(&self) -> Option<String> {
		match &self.0.kind {
			Kind::Text(data) | Kind::Comment(data) => Some(data.borrow().clone()),
			Kind::Element { .. } => None,
		}
	}

	#[must_use]
	pub fn parent(&self) -> Option<NodeRef> {
		self.0.parent.borrow().upgrade().map(NodeRef)
	}

	/// Snapshot of the current child list.
	#[must_use]
	pub fn children(&self) -> Vec<NodeRef> {
		self.0.children.borrow().clone()
	}

	/// `true` iff `root` is this node or one of its ancestors.
	#[must_use]
	pub fn is_attached_under(&self, root: &NodeRef) -> bool {
		let mut cursor = self.clone();
		loop {
			if cursor == *root {
				return true;
			}
			match cursor.parent() {
				Some(parent) => cursor = parent,
				None => return false,
			}
		}
	}

	/// Appends `child` as the last child, detaching it from any previous
	/// parent first.
	pub fn append_child(&self, child: &NodeRef) -> Result<(), Error> {
		if !self.is_element() {
			return Err(Error::NotAnElement);
		}
		child.detach();
		self.0.children.borrow_mut().push(child.clone());
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		Ok(())
	}

	/// Inserts `new` as a child of this node, immediately before
	/// `reference` (or as the last child for `None`).
	pub fn insert_before(&self, new: &NodeRef, reference: Option<&NodeRef>) -> Result<(), Error> {
		if !self.is_element() {
			return Err(Error::NotAnElement);
		}
		let index = match reference {
			None => self.0.children.borrow().len(),
			Some(reference) => self.child_index(reference).ok_or(Error::NotAChild)?,
		};
		new.detach();
		self.0.children.borrow_mut().insert(index, new.clone());
		*new.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		Ok(())
	}

	/// Replaces the child `prev` with `next`, leaving `prev` detached.
	///
	/// `next` is detached from any previous parent first, so `prev`'s
	/// position is only resolved afterwards.
	pub fn replace_child(&self, next: &NodeRef, prev: &NodeRef) -> Result<(), Error> {
		next.detach();
		let index = self.child_index(prev).ok_or(Error::NotAChild)?;
		{
			let mut children = self.0.children.borrow_mut();
			children[index] = next.clone();
		}
		*next.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		*prev.0.parent.borrow_mut() = Weak::new();
		Ok(())
	}

	/// Removes this node from its parent, if it has one.
	pub fn detach(&self) {
		if let Some(parent) = self.parent() {
			parent.0.children.borrow_mut().retain(|child| child != self);
			*self.0.parent.borrow_mut() = Weak::new();
		}
	}

	fn child_index(&self, child: &NodeRef) -> Option<usize> {
		self.0.children.borrow().iter().position(|c| c == child)
	}

	/// First element in this subtree (document order, including self) with
	/// the given `id` attribute.
	#[must_use]
	pub fn find_by_id(&self, id: &str) -> Option<NodeRef> {
		if self.attribute("id").as_deref() == Some(id) {
			return Some(self.clone());
		}
		self.children().iter().find_map(|child| child.find_by_id(id))
	}

	/// First element in this subtree (document order, including self) with
	/// the given tag name.
	#[must_use]
	pub fn find_first_tag(&self, tag: &str) -> Option<NodeRef> {
		let tag = tag.to_ascii_lowercase();
		if self.tag_name() == Some(tag.as_str()) {
			return Some(self.clone());
		}
		self.children().iter().find_map(|child| child.find_first_tag(&tag))
	}

	/// Concatenated text data of this subtree.
	#[must_use]
	pub fn text_content(&self) -> String {
		match &self.0.kind {
			Kind::Text(data) => data.borrow().clone(),
			Kind::Comment(_) => String::new(),
			Kind::Element { .. } => self.children().iter().map(NodeRef::text_content).collect(),
		}
	}

	/// Serializes this subtree back to markup. Intended for debugging and
	/// test assertions, not for round-tripping arbitrary documents.
	#[must_use]
	pub fn to_html(&self) -> String {
		let mut out = String::new();
		self.write_html(&mut out);
		out
	}

	fn write_html(&self, out: &mut String) {
		match &self.0.kind {
			Kind::Text(data) => out.push_str(&escape_text(&data.borrow())),
			Kind::Comment(data) => {
				out.push_str("<!--");
				out.push_str(&data.borrow());
				out.push_str("-->");
			}
			Kind::Element { tag, attributes } => {
				out.push('<');
				out.push_str(tag);
				for (name, value) in attributes.borrow().iter() {
					out.push(' ');
					out.push_str(name);
					out.push_str("=\"");
					out.push_str(&value.replace('"', "&quot;"));
					out.push('"');
				}
				out.push('>');
				if VOID_TAGS.contains(&tag.as_str()) {
					return;
				}
				for child in self.children() {
					child.write_html(out);
				}
				out.push_str("</");
				out.push_str(tag);
				out.push('>');
			}
		}
	}

	pub(crate) fn mounted(&self) -> bool {
		self.0.mounted.get()
	}

	pub(crate) fn set_mounted(&self, mounted: bool) {
		self.0.mounted.set(mounted);
	}
}

impl PartialEq for NodeRef {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for NodeRef {}

impl Hash for NodeRef {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.id.hash(state);
	}
}

impl fmt::Debug for NodeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.0.kind {
			Kind::Element { tag, .. } => write!(f, "NodeRef(<{}> #{})", tag, self.0.id),
			Kind::Text(data) => write!(f, "NodeRef(text {:?} #{})", data.borrow(), self.0.id),
			Kind::Comment(data) => write!(f, "NodeRef(comment {:?} #{})", data.borrow(), self.0.id),
		}
	}
}

fn escape_text(data: &str) -> String {
	data.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// The live document: an `<html>` root with the usual `<head>`/`<title>`/
/// `<body>` skeleton.
///
/// The body is the document root container for reconciliation purposes. It
/// is never structurally replaced; the `<title>` element is the one
/// singleton slot matched by tag rather than by identifier.
#[derive(Debug)]
pub struct Document {
	root: NodeRef,
	body: NodeRef,
}

impl Document {
	#[must_use]
	pub fn new() -> Self {
		let root = NodeRef::element("html");
		let head = NodeRef::element("head");
		let title = NodeRef::element("title");
		let body = NodeRef::element("body");
		head.append_child(&title).expect("head is an element");
		root.append_child(&head).expect("html is an element");
		root.append_child(&body).expect("html is an element");
		Self { root, body }
	}

	#[must_use]
	pub fn root(&self) -> &NodeRef {
		&self.root
	}

	#[must_use]
	pub fn body(&self) -> &NodeRef {
		&self.body
	}

	/// First element with the given `id` attribute, in document order.
	#[must_use]
	pub fn element_by_id(&self, id: &str) -> Option<NodeRef> {
		self.root.find_by_id(id)
	}

	/// First element with the given tag name, in document order.
	#[must_use]
	pub fn first_by_tag(&self, tag: &str) -> Option<NodeRef> {
		self.root.find_first_tag(tag)
	}

	/// `true` iff `node` is currently part of this document.
	#[must_use]
	pub fn contains(&self, node: &NodeRef) -> bool {
		node.is_attached_under(&self.root)
	}
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}
