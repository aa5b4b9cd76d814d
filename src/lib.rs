#![doc(html_root_url = "https://docs.rs/canopy-dom/0.1.0")]
#![warn(clippy::pedantic)]

//! A fragment reconciler for partial-page navigation.
//!
//! The [`Session`] issues requests through an abstract transport, matches
//! the HTML fragments the server returns against live DOM nodes by
//! identity, discards stale out-of-order responses via a sequence-number
//! ledger, and runs a recursive mount/unmount component lifecycle (with
//! pluggable per-node merge strategies) over every affected subtree.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod dom;
pub mod error;
pub mod form;
pub mod intercept;
pub mod ledger;
pub mod markup;
pub mod reconcile;
pub mod registry;
pub mod session;
mod walker;

pub use dom::{Document, NodeRef};
pub use error::{DeferredError, Error, HookError, LifecyclePhase, TransportError};
pub use intercept::Modifiers;
pub use reconcile::{Engine, MergeScope, MERGE_ATTR};
pub use registry::{ComponentFn, MergeFn, Trigger};
pub use session::{Config, History, Method, Navigator, Request, Response, ResponseCallback, Session, Setting, Transport};
