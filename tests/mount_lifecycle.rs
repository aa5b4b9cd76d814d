//! Component lifecycle over session-driven updates: depth-first order,
//! mount/unmount pairing, and hook-error isolation.

mod common;

use canopy_dom::{Config, LifecyclePhase};
use common::{fragment_response, harness, seed_body};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn logging_config(log: &Log) -> Config {
	let mount_log = Rc::clone(log);
	let unmount_log = Rc::clone(log);
	Config {
		mount_attrs: vec![(
			"x-comp".to_owned(),
			Rc::new(move |node| {
				mount_log.borrow_mut().push(format!("+{}", node.attribute("x-comp").unwrap_or_default()));
				Ok(())
			}),
		)],
		unmount_attrs: vec![(
			"x-comp".to_owned(),
			Rc::new(move |node| {
				unmount_log.borrow_mut().push(format!("-{}", node.attribute("x-comp").unwrap_or_default()));
				Ok(())
			}),
		)],
		..Config::default()
	}
}

#[test]
fn init_mounts_the_seeded_body_children_before_their_parents() {
	let h = harness();
	seed_body(&h.session, "<div id=\"outer\" x-comp=\"outer\"><span x-comp=\"inner\"></span></div>");
	let log = Log::default();
	h.session.init(logging_config(&log)).unwrap();

	assert_eq!(*log.borrow(), ["+inner", "+outer"]);
}

#[test]
fn a_replacement_unmounts_the_old_subtree_and_mounts_the_new_one() {
	let h = harness();
	seed_body(&h.session, "<div id=\"slot\"><span x-comp=\"old\"></span></div>");
	let log = Log::default();
	h.session.init(logging_config(&log)).unwrap();
	log.borrow_mut().clear();

	h.session.request("GET", "/slot", None, None).unwrap();
	h.transport.respond(
		0,
		fragment_response("<div id=\"slot\"><span x-comp=\"a\"></span><span x-comp=\"b\"></span></div>"),
	);

	assert_eq!(*log.borrow(), ["-old", "+a", "+b"]);
}

#[test]
fn mounting_an_already_mounted_subtree_is_a_no_op() {
	let h = harness();
	seed_body(&h.session, "<div id=\"slot\" x-comp=\"w\"></div>");
	let log = Log::default();
	h.session.init(logging_config(&log)).unwrap();
	log.borrow_mut().clear();

	let slot = h.session.document().element_by_id("slot").unwrap();
	h.session.mount(&slot);
	assert!(log.borrow().is_empty());

	h.session.unmount(&slot);
	h.session.unmount(&slot);
	assert_eq!(*log.borrow(), ["-w"]);
}

#[test]
fn removal_unmounts_before_detaching() {
	let h = harness();
	seed_body(&h.session, "<div id=\"slot\" x-comp=\"w\"></div>");
	let attached_at_unmount = Rc::new(RefCell::new(None));
	let seen = Rc::clone(&attached_at_unmount);
	let config = Config {
		unmount_attrs: vec![(
			"x-comp".to_owned(),
			Rc::new(move |node| {
				*seen.borrow_mut() = Some(node.parent().is_some());
				Ok(())
			}),
		)],
		..Config::default()
	};
	h.session.init(config).unwrap();

	let slot = h.session.document().element_by_id("slot").unwrap();
	h.session.remove(&slot);

	assert_eq!(*attached_at_unmount.borrow(), Some(true));
	assert!(slot.parent().is_none());
	assert!(h.session.document().element_by_id("slot").is_none());
}

#[test]
fn a_failing_hook_is_isolated_and_surfaced_later() {
	let h = harness();
	seed_body(&h.session, "<div><span x-broken></span><span id=\"ok\" x-comp=\"ok\"></span></div>");
	let log = Log::default();
	let mut config = logging_config(&log);
	config.mount_attrs.push(("x-broken".to_owned(), Rc::new(|_| Err("component exploded".into()))));
	h.session.init(config).unwrap();

	// The sibling still mounted.
	assert_eq!(*log.borrow(), ["+ok"]);

	let deferred = h.session.take_deferred_errors();
	assert_eq!(deferred.len(), 1);
	assert_eq!(deferred[0].phase, LifecyclePhase::Mount);
	assert_eq!(deferred[0].trigger, "x-broken");
	assert_eq!(deferred[0].error.to_string(), "component exploded");
}
