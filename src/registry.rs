//! Component and merge-strategy registries.
//!
//! Pure keyed storage: lowercase trigger names map to callbacks, later
//! registrations for the same name overwrite earlier ones. Cloning a
//! registry yields an independent snapshot (the callbacks themselves are
//! shared `Rc`s).

use crate::dom::NodeRef;
use crate::error::HookError;
use crate::reconcile::MergeScope;
use hashbrown::HashMap;
use std::rc::Rc;

/// A mount or unmount hook.
pub type ComponentFn = Rc<dyn Fn(&NodeRef) -> Result<(), HookError>>;

/// A custom merge strategy; see [`crate::reconcile::MergeScope`].
pub type MergeFn = Rc<dyn Fn(&MergeScope<'_>) -> Result<(), HookError>>;

/// What a component registration is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
	/// Matched against the attributes present on an element.
	Attribute,
	/// Matched against the element's tag name.
	Tag,
}

#[derive(Clone, Default)]
pub struct ComponentRegistry {
	mount_attrs: HashMap<String, ComponentFn>,
	unmount_attrs: HashMap<String, ComponentFn>,
	mount_tags: HashMap<String, ComponentFn>,
	unmount_tags: HashMap<String, ComponentFn>,
}

impl ComponentRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Last write wins; `name` is lowercased.
	pub fn register_mount(&mut self, trigger: Trigger, name: &str, hook: ComponentFn) {
		let table = match trigger {
			Trigger::Attribute => &mut self.mount_attrs,
			Trigger::Tag => &mut self.mount_tags,
		};
		table.insert(name.to_ascii_lowercase(), hook);
	}

	/// Last write wins; `name` is lowercased.
	pub fn register_unmount(&mut self, trigger: Trigger, name: &str, hook: ComponentFn) {
		let table = match trigger {
			Trigger::Attribute => &mut self.unmount_attrs,
			Trigger::Tag => &mut self.unmount_tags,
		};
		table.insert(name.to_ascii_lowercase(), hook);
	}

	/// The mount hooks matching `node`, in invocation order: the tag hook
	/// first, then attribute hooks in the element's attribute order.
	#[must_use]
	pub fn mount_hooks(&self, node: &NodeRef) -> Vec<(String, ComponentFn)> {
		Self::hooks(&self.mount_tags, &self.mount_attrs, node)
	}

	/// The unmount hooks matching `node`, in the same order as
	/// [`mount_hooks`](`Self::mount_hooks`).
	#[must_use]
	pub fn unmount_hooks(&self, node: &NodeRef) -> Vec<(String, ComponentFn)> {
		Self::hooks(&self.unmount_tags, &self.unmount_attrs, node)
	}

	fn hooks(tags: &HashMap<String, ComponentFn>, attrs: &HashMap<String, ComponentFn>, node: &NodeRef) -> Vec<(String, ComponentFn)> {
		let mut hooks = Vec::new();
		if let Some(tag) = node.tag_name() {
			if let Some(hook) = tags.get(tag) {
				hooks.push((tag.to_owned(), Rc::clone(hook)));
			}
		}
		for name in node.attribute_names() {
			if let Some(hook) = attrs.get(&name) {
				hooks.push((name, Rc::clone(hook)));
			}
		}
		hooks
	}
}

#[derive(Clone, Default)]
pub struct MergeRegistry {
	merges: HashMap<String, MergeFn>,
}

impl MergeRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Last write wins; `key` is lowercased.
	pub fn register(&mut self, key: &str, merge: MergeFn) {
		self.merges.insert(key.to_ascii_lowercase(), merge);
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<MergeFn> {
		self.merges.get(key).map(Rc::clone)
	}
}
