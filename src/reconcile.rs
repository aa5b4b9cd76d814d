//! The reconciliation engine.
//!
//! Given a freshly parsed `next` element and a live `prev` element, the
//! engine selects a strategy (default replace-in-place, or a registered
//! custom merge when both elements carry the same merge marker), executes
//! it, and drives the mount/unmount walker over the affected nodes.

use crate::dom::{Document, NodeRef};
use crate::error::{DeferredError, Error, LifecyclePhase};
use crate::registry::{ComponentFn, ComponentRegistry, MergeFn, MergeRegistry, Trigger};
use crate::walker;
use core::cell::RefCell;
use hashbrown::HashMap;
use tracing::{trace, trace_span, warn};

/// The merge-strategy marker attribute.
pub const MERGE_ATTR: &str = "canopy-merge";

/// Owns the component and merge registries, the active-merge set used for
/// cycle detection, and the deferred hook-error queue.
pub struct Engine {
	components: RefCell<ComponentRegistry>,
	merges: RefCell<MergeRegistry>,
	/// Node id → merge key, for every element currently inside a custom
	/// merge invocation.
	active_merges: RefCell<HashMap<u64, String>>,
	deferred: RefCell<Vec<DeferredError>>,
}

impl Engine {
	#[must_use]
	pub fn new() -> Self {
		Self {
			components: RefCell::new(ComponentRegistry::new()),
			merges: RefCell::new(MergeRegistry::new()),
			active_merges: RefCell::new(HashMap::new()),
			deferred: RefCell::new(Vec::new()),
		}
	}

	pub(crate) fn register_mount(&self, trigger: Trigger, name: &str, hook: ComponentFn) {
		self.components.borrow_mut().register_mount(trigger, name, hook);
	}

	pub(crate) fn register_unmount(&self, trigger: Trigger, name: &str, hook: ComponentFn) {
		self.components.borrow_mut().register_unmount(trigger, name, hook);
	}

	pub(crate) fn register_merge(&self, key: &str, merge: MergeFn) {
		self.merges.borrow_mut().register(key, merge);
	}

	/// Runs the mount walk over `node`.
	pub fn mount(&self, node: &NodeRef) {
		walker::mount(&self.components.borrow(), &self.deferred, node);
	}

	/// Runs the unmount walk over `node`.
	pub fn unmount(&self, node: &NodeRef) {
		walker::unmount(&self.components.borrow(), &self.deferred, node);
	}

	/// Reconciles `prev` (attached) with `next` (detached).
	///
	/// # Errors
	///
	/// [`Error::NotAnElement`], [`Error::AlreadyAttached`] and
	/// [`Error::Detached`] for misused arguments (no mutation is
	/// performed), and [`Error::RecursiveMerge`] when a custom merge
	/// re-enters reconciliation for an element it is already merging.
	pub fn reconcile(&self, document: &Document, next: &NodeRef, prev: &NodeRef) -> Result<(), Error> {
		let span = trace_span!("reconcile", next = ?next, prev = ?prev);
		let _enter = span.enter();

		if !next.is_element() || !prev.is_element() {
			return Err(Error::NotAnElement);
		}
		if prev == document.body() || next.tag_name() == Some("body") {
			// The document root container is informational only in a
			// response; it is never structurally replaced.
			warn!("Ignoring an update addressed at the document body.");
			return Ok(());
		}
		if next.parent().is_some() {
			return Err(Error::AlreadyAttached);
		}
		if !document.contains(prev) {
			return Err(Error::Detached);
		}

		match self.selected_merge(next, prev) {
			Some((key, merge)) => self.custom_merge(document, next, prev, &key, &merge),
			None => {
				trace!("Default replace.");
				let parent = prev.parent().ok_or(Error::Detached)?;
				self.unmount(prev);
				parent.replace_child(next, prev)?;
				self.mount(next);
				Ok(())
			}
		}
	}

	/// The registered merge function, iff both elements carry the same
	/// non-empty merge key (case-insensitive).
	fn selected_merge(&self, next: &NodeRef, prev: &NodeRef) -> Option<(String, MergeFn)> {
		let next_key = next.attribute(MERGE_ATTR)?;
		let prev_key = prev.attribute(MERGE_ATTR)?;
		if next_key.is_empty() || !next_key.eq_ignore_ascii_case(&prev_key) {
			return None;
		}
		let key = next_key.to_ascii_lowercase();
		let merge = self.merges.borrow().get(&key)?;
		Some((key, merge))
	}

	fn custom_merge(&self, document: &Document, next: &NodeRef, prev: &NodeRef, key: &str, merge: &MergeFn) -> Result<(), Error> {
		let span = trace_span!("custom_merge", key);
		let _enter = span.enter();
		{
			let mut active = self.active_merges.borrow_mut();
			if active.contains_key(&prev.id()) || active.contains_key(&next.id()) {
				return Err(Error::RecursiveMerge(key.to_owned()));
			}
			active.insert(prev.id(), key.to_owned());
			active.insert(next.id(), key.to_owned());
		}
		let scope = MergeScope {
			engine: self,
			document,
			next,
			prev,
		};
		let result = merge(&scope);
		{
			let mut active = self.active_merges.borrow_mut();
			active.remove(&prev.id());
			active.remove(&next.id());
		}
		if let Err(error) = result {
			// A detected merge cycle is programmer misuse and propagates
			// synchronously; anything else is isolated like a hook error.
			match error.downcast::<Error>() {
				Ok(error) if matches!(*error, Error::RecursiveMerge(_)) => return Err(*error),
				Ok(error) => self.defer_merge_error(key, error),
				Err(error) => self.defer_merge_error(key, error),
			}
		}
		Ok(())
	}

	fn defer_merge_error(&self, key: &str, error: crate::error::HookError) {
		trace!("Merge {:?} failed; deferring the error.", key);
		self.deferred.borrow_mut().push(DeferredError {
			phase: LifecyclePhase::Merge,
			trigger: key.to_owned(),
			error,
		});
	}

	/// Grafts `child` as the last child of `parent` and mounts it.
	pub fn append_child(&self, parent: &NodeRef, child: &NodeRef) -> Result<(), Error> {
		parent.append_child(child)?;
		self.mount(child);
		Ok(())
	}

	/// Grafts `new` immediately before `reference` and mounts it.
	pub fn insert_before(&self, new: &NodeRef, reference: &NodeRef) -> Result<(), Error> {
		let parent = reference.parent().ok_or(Error::Detached)?;
		parent.insert_before(new, Some(reference))?;
		self.mount(new);
		Ok(())
	}

	/// Grafts `new` immediately after `reference` and mounts it.
	pub fn insert_after(&self, new: &NodeRef, reference: &NodeRef) -> Result<(), Error> {
		let parent = reference.parent().ok_or(Error::Detached)?;
		let children = parent.children();
		let index = children.iter().position(|child| child == reference).ok_or(Error::NotAChild)?;
		parent.insert_before(new, children.get(index + 1))?;
		self.mount(new);
		Ok(())
	}

	/// Unmounts `node` and removes it from its parent.
	pub fn remove(&self, node: &NodeRef) {
		self.unmount(node);
		node.detach();
	}

	/// Drains the queued hook errors.
	pub fn drain_deferred(&self) -> Vec<DeferredError> {
		core::mem::take(&mut *self.deferred.borrow_mut())
	}
}

impl Default for Engine {
	fn default() -> Self {
		Self::new()
	}
}

/// Handed to a custom merge function.
///
/// A merge grafts content from [`next`](`Self::next`) onto
/// [`prev`](`Self::prev`) itself; the engine performs no mount or unmount
/// around it, so any grafted or removed nodes must go through the scope's
/// operations (which pair the structural change with the matching walk).
pub struct MergeScope<'a> {
	engine: &'a Engine,
	document: &'a Document,
	next: &'a NodeRef,
	prev: &'a NodeRef,
}

impl MergeScope<'_> {
	/// The freshly parsed element, not attached to the document.
	#[must_use]
	pub fn next(&self) -> &NodeRef {
		self.next
	}

	/// The element currently attached to the document.
	#[must_use]
	pub fn prev(&self) -> &NodeRef {
		self.prev
	}

	pub fn mount(&self, node: &NodeRef) {
		self.engine.mount(node);
	}

	pub fn unmount(&self, node: &NodeRef) {
		self.engine.unmount(node);
	}

	pub fn append_child(&self, parent: &NodeRef, child: &NodeRef) -> Result<(), Error> {
		self.engine.append_child(parent, child)
	}

	pub fn insert_before(&self, new: &NodeRef, reference: &NodeRef) -> Result<(), Error> {
		self.engine.insert_before(new, reference)
	}

	pub fn insert_after(&self, new: &NodeRef, reference: &NodeRef) -> Result<(), Error> {
		self.engine.insert_after(new, reference)
	}

	pub fn remove(&self, node: &NodeRef) {
		self.engine.remove(node);
	}

	/// Re-enters the generic reconciliation entry point.
	///
	/// # Errors
	///
	/// [`Error::RecursiveMerge`] when targeting an element this merge is
	/// already merging; otherwise as [`Engine::reconcile`].
	pub fn reconcile(&self, next: &NodeRef, prev: &NodeRef) -> Result<(), Error> {
		self.engine.reconcile(self.document, next, prev)
	}
}

#[cfg(test)]
mod tests {
	use super::Engine;
	use crate::dom::{Document, NodeRef};
	use crate::registry::Trigger;
	use core::cell::RefCell;
	use std::rc::Rc;

	#[test]
	fn default_replace_orders_lifecycle_around_the_splice() {
		let document = Document::new();
		let engine = Engine::new();
		let log = Rc::new(RefCell::new(Vec::new()));

		let mount_log = Rc::clone(&log);
		engine.register_mount(
			Trigger::Attribute,
			"x-widget",
			Rc::new(move |node| {
				mount_log.borrow_mut().push(format!("mount attached={}", node.parent().is_some()));
				Ok(())
			}),
		);
		let unmount_log = Rc::clone(&log);
		engine.register_unmount(
			Trigger::Attribute,
			"x-widget",
			Rc::new(move |node| {
				unmount_log.borrow_mut().push(format!("unmount attached={}", node.parent().is_some()));
				Ok(())
			}),
		);

		let prev = NodeRef::element("div");
		prev.set_attribute("id", "slot");
		prev.set_attribute("x-widget", "");
		document.body().append_child(&prev).unwrap();
		engine.mount(document.body());
		log.borrow_mut().clear();

		let next = NodeRef::element("div");
		next.set_attribute("id", "slot");
		next.set_attribute("x-widget", "");
		engine.reconcile(&document, &next, &prev).unwrap();

		// Unmount sees the node still attached, mount sees it attached in
		// its new position.
		assert_eq!(*log.borrow(), ["unmount attached=true", "mount attached=true"]);
		assert!(prev.parent().is_none());
		assert_eq!(next.parent(), Some(document.body().clone()));
	}

	#[test]
	fn body_updates_are_structural_no_ops() {
		let document = Document::new();
		let engine = Engine::new();
		let next = NodeRef::element("body");
		engine.reconcile(&document, &next, document.body()).unwrap();
		assert!(document.body().parent().is_some());
		assert!(next.parent().is_none());
	}
}
