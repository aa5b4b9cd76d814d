//! The update ledger: node identity key → last applied request sequence
//! number.
//!
//! A response may only update a node if its sequence number is at least the
//! highest number already applied to that node *or any of its ancestors*;
//! replacing a container invalidates all descendant state, so a late child
//! response must not resurrect content under a newer parent. Entries are
//! never pruned; the map is bounded by the page lifetime.

use crate::dom::{Document, NodeRef};
use hashbrown::HashMap;

/// Node identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	/// The whole document body. Authoritative: once set, the ancestor walk
	/// stops here.
	Root,
	/// An element's `id` attribute.
	Id(String),
}

#[derive(Debug, Default)]
pub struct UpdateLedger {
	updates: HashMap<Key, u64>,
}

impl UpdateLedger {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Unconditional insert. Monotonicity is the caller's responsibility;
	/// the orchestrator checks [`last_update`](`Self::last_update`) before
	/// recording, and equal sequence numbers are allowed so one response
	/// can update several keys.
	pub fn record(&mut self, key: Key, request_id: u64) {
		self.updates.insert(key, request_id);
	}

	/// The most recent request id applied to `node` or any of its
	/// ancestors; 0 when nothing on the chain has been updated.
	#[must_use]
	pub fn last_update(&self, document: &Document, node: &NodeRef) -> u64 {
		if node == document.body() {
			return self.updates.get(&Key::Root).copied().unwrap_or(0);
		}
		let own = node
			.attribute("id")
			.and_then(|id| self.updates.get(&Key::Id(id)).copied())
			.unwrap_or(0);
		match node.parent() {
			Some(parent) => own.max(self.last_update(document, &parent)),
			None => own,
		}
	}
}
