//! The mount/unmount walker.
//!
//! Both walks are depth-first and children-before-self, so a component's
//! hooks always run after the hooks of everything beneath it. Non-element
//! nodes are skipped entirely.
//!
//! Pairing is enforced through the per-node mounted flag: a node already
//! mounted is not mounted again without an intervening unmount, and unmount
//! is a no-op on a node that was never mounted. A failing hook is captured
//! and queued for deferred surfacing; it never aborts the walk of sibling
//! or ancestor nodes.

use crate::dom::NodeRef;
use crate::error::{DeferredError, LifecyclePhase};
use crate::registry::ComponentRegistry;
use core::cell::RefCell;
use tracing::{trace, trace_span};

pub(crate) fn mount(registry: &ComponentRegistry, deferred: &RefCell<Vec<DeferredError>>, node: &NodeRef) {
	if !node.is_element() {
		return;
	}
	let span = trace_span!("mount", node = ?node);
	let _enter = span.enter();

	for child in node.children() {
		mount(registry, deferred, &child);
	}
	if node.mounted() {
		trace!("Already mounted; skipping hooks.");
		return;
	}
	for (trigger, hook) in registry.mount_hooks(node) {
		if let Err(error) = hook(node) {
			trace!("Mount hook {:?} failed; deferring the error.", trigger);
			deferred.borrow_mut().push(DeferredError {
				phase: LifecyclePhase::Mount,
				trigger,
				error,
			});
		}
	}
	node.set_mounted(true);
}

pub(crate) fn unmount(registry: &ComponentRegistry, deferred: &RefCell<Vec<DeferredError>>, node: &NodeRef) {
	if !node.is_element() {
		return;
	}
	let span = trace_span!("unmount", node = ?node);
	let _enter = span.enter();

	for child in node.children() {
		unmount(registry, deferred, &child);
	}
	if !node.mounted() {
		trace!("Not mounted; skipping hooks.");
		return;
	}
	for (trigger, hook) in registry.unmount_hooks(node) {
		if let Err(error) = hook(node) {
			trace!("Unmount hook {:?} failed; deferring the error.", trigger);
			deferred.borrow_mut().push(DeferredError {
				phase: LifecyclePhase::Unmount,
				trigger,
				error,
			});
		}
	}
	node.set_mounted(false);
}

#[cfg(test)]
mod tests {
	use super::{mount, unmount};
	use crate::dom::NodeRef;
	use crate::registry::{ComponentRegistry, Trigger};
	use core::cell::RefCell;
	use std::rc::Rc;

	fn recording_registry(log: &Rc<RefCell<Vec<String>>>) -> ComponentRegistry {
		let mut registry = ComponentRegistry::new();
		let mount_log = Rc::clone(log);
		registry.register_mount(
			Trigger::Attribute,
			"x-widget",
			Rc::new(move |node| {
				mount_log.borrow_mut().push(format!("mount {}", node.attribute("x-widget").unwrap_or_default()));
				Ok(())
			}),
		);
		let unmount_log = Rc::clone(log);
		registry.register_unmount(
			Trigger::Attribute,
			"x-widget",
			Rc::new(move |node| {
				unmount_log.borrow_mut().push(format!("unmount {}", node.attribute("x-widget").unwrap_or_default()));
				Ok(())
			}),
		);
		registry
	}

	#[test]
	fn children_before_self() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let registry = recording_registry(&log);
		let deferred = RefCell::new(Vec::new());

		let outer = NodeRef::element("div");
		outer.set_attribute("x-widget", "outer");
		let inner = NodeRef::element("div");
		inner.set_attribute("x-widget", "inner");
		inner.append_child(&NodeRef::text("ignored")).unwrap();
		outer.append_child(&inner).unwrap();

		mount(&registry, &deferred, &outer);
		assert_eq!(*log.borrow(), ["mount inner", "mount outer"]);

		unmount(&registry, &deferred, &outer);
		assert_eq!(*log.borrow(), ["mount inner", "mount outer", "unmount inner", "unmount outer"]);
		assert!(deferred.borrow().is_empty());
	}

	#[test]
	fn mount_is_idempotent_until_unmounted() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let registry = recording_registry(&log);
		let deferred = RefCell::new(Vec::new());

		let node = NodeRef::element("div");
		node.set_attribute("x-widget", "a");
		mount(&registry, &deferred, &node);
		mount(&registry, &deferred, &node);
		unmount(&registry, &deferred, &node);
		unmount(&registry, &deferred, &node);
		assert_eq!(*log.borrow(), ["mount a", "unmount a"]);
	}

	#[test]
	fn failing_hook_is_isolated() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let mut registry = recording_registry(&log);
		registry.register_mount(Trigger::Attribute, "x-broken", Rc::new(|_| Err("component exploded".into())));
		let deferred = RefCell::new(Vec::new());

		let parent = NodeRef::element("div");
		parent.set_attribute("x-widget", "parent");
		let broken = NodeRef::element("div");
		broken.set_attribute("x-broken", "");
		let sibling = NodeRef::element("div");
		sibling.set_attribute("x-widget", "sibling");
		parent.append_child(&broken).unwrap();
		parent.append_child(&sibling).unwrap();

		mount(&registry, &deferred, &parent);
		assert_eq!(*log.borrow(), ["mount sibling", "mount parent"]);
		let deferred = deferred.into_inner();
		assert_eq!(deferred.len(), 1);
		assert_eq!(deferred[0].trigger, "x-broken");
	}
}
