use thiserror::Error;

/// Synchronous failures: programmer misuse of the configuration surface or
/// of the reconciliation entry points. These fail fast at the call site and
/// never leave partial mutations behind.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	#[error("unknown configuration key {0:?}")]
	UnknownConfigKey(String),
	#[error("configuration value for {0:?} has the wrong kind")]
	InvalidConfigValue(String),
	#[error("init has already been called")]
	AlreadyInitialised,
	#[error("unknown request method {0:?}")]
	UnknownMethod(String),
	#[error("expected an element node")]
	NotAnElement,
	#[error("cannot update with an element that is already attached to a parent node")]
	AlreadyAttached,
	#[error("cannot update an element that is not attached to the document")]
	Detached,
	#[error("node is not a child of the given parent")]
	NotAChild,
	#[error("recursive merge {0:?}: the element is already being merged")]
	RecursiveMerge(String),
}

/// Transport-level conditions are data, not exceptions; they are routed to
/// the host's network-error signal.
#[derive(Debug, Clone, Error)]
#[error("network error: {0}")]
pub struct TransportError(pub String);

/// Error type for component and merge callbacks.
pub type HookError = Box<dyn std::error::Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
	Mount,
	Unmount,
	Merge,
}

/// A captured callback failure.
///
/// Hook errors are isolated at the walker boundary so one broken component
/// cannot abort the traversal of unrelated nodes. They are queued and
/// surfaced on the next cooperative turn via
/// [`Session::take_deferred_errors`](`crate::Session::take_deferred_errors`).
#[derive(Debug)]
pub struct DeferredError {
	pub phase: LifecyclePhase,
	/// Lowercase tag or attribute name (or merge key) whose hook failed.
	pub trigger: String,
	pub error: HookError,
}
