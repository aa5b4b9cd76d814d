//! The request orchestrator.
//!
//! A [`Session`] owns the document, the reconciliation [`Engine`], the
//! update ledger and the monotonic request counter, and routes transport
//! completions (which may arrive in any order) into reconciliation. The
//! transport channel, the browser history stack and outward navigation are
//! external collaborators behind the [`Transport`], [`History`] and
//! [`Navigator`] traits.

use crate::dom::{Document, NodeRef};
use crate::error::{DeferredError, Error, TransportError};
use crate::form::FormData;
use crate::ledger::{Key, UpdateLedger};
use crate::markup;
use crate::reconcile::Engine;
use crate::registry::{ComponentFn, MergeFn, Trigger};
use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::Rc;
use tracing::{trace, trace_span, warn};

/// Content type of a full-page partial: enough of a page that a history
/// entry is recorded before reconciling.
pub const PARTIAL_CONTENT_TYPE: &str = "application/x.canopy-html-partial+xml";
/// Content type of a fragment: an update for addressable nodes only, with
/// no history side effect.
pub const FRAGMENT_CONTENT_TYPE: &str = "application/x.canopy-html-fragment+xml";
/// Response header instructing the client to navigate outright.
pub const SEE_OTHER_HEADER: &str = "x-canopy-see-other";
/// Response header carrying the canonical URL to record in history.
pub const RESPONSE_URL_HEADER: &str = "x-response-url";
/// Response header selecting `replace` instead of `push` for the history
/// entry of a full-page partial.
pub const HISTORY_HEADER: &str = "x-canopy-history";

/// The request method whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	Get,
	Post,
	Put,
	Patch,
	Delete,
}

impl Method {
	/// Case-insensitive.
	///
	/// # Errors
	///
	/// [`Error::UnknownMethod`] for anything outside the whitelist.
	pub fn parse(method: &str) -> Result<Self, Error> {
		match method.to_ascii_uppercase().as_str() {
			"GET" => Ok(Self::Get),
			"POST" => Ok(Self::Post),
			"PUT" => Ok(Self::Put),
			"PATCH" => Ok(Self::Patch),
			"DELETE" => Ok(Self::Delete),
			_ => Err(Error::UnknownMethod(method.to_owned())),
		}
	}

	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug)]
pub struct Request {
	pub method: Method,
	pub url: String,
	pub body: Option<Vec<u8>>,
	/// Includes the Accept header and, when a body is present, the content
	/// type.
	pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Response {
	pub status: u16,
	/// The URL the response was ultimately served from.
	pub url: String,
	pub headers: Vec<(String, String)>,
	pub body: String,
}

impl Response {
	/// First header with the given name, case-insensitively.
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}
}

/// Completion callback handed to the transport; invoked exactly once, on
/// the session's (single) thread, in any order relative to other requests.
pub type ResponseCallback = Box<dyn FnOnce(Result<Response, TransportError>)>;

/// The abstract transport channel.
pub trait Transport {
	fn send(&self, request: Request, done: ResponseCallback);
}

/// The host's history stack.
pub trait History {
	fn push(&self, url: &str);
	fn replace(&self, url: &str);
}

/// Outward navigation, for redirect instructions.
pub trait Navigator {
	fn assign(&self, url: &str);
}

pub type NetworkErrorFn = Rc<dyn Fn(&TransportError)>;
pub type UnsupportedFn = Rc<dyn Fn(&Response, &str)>;
pub type ActivityFn = Rc<dyn Fn()>;

/// Initialization-time configuration.
#[derive(Clone)]
pub struct Config {
	pub mount_attrs: Vec<(String, ComponentFn)>,
	pub unmount_attrs: Vec<(String, ComponentFn)>,
	pub merge: Vec<(String, MergeFn)>,
	pub on_network_error: Option<NetworkErrorFn>,
	pub on_unsupported: Option<UnsupportedFn>,
	pub on_load_start: Option<ActivityFn>,
	pub on_load_end: Option<ActivityFn>,
	pub intercept_links: bool,
	pub intercept_forms: bool,
	pub intercept_submitters: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			mount_attrs: Vec::new(),
			unmount_attrs: Vec::new(),
			merge: Vec::new(),
			on_network_error: None,
			on_unsupported: None,
			on_load_start: None,
			on_load_end: None,
			intercept_links: true,
			intercept_forms: true,
			intercept_submitters: true,
		}
	}
}

/// A dynamically keyed configuration value, for hosts assembling their
/// configuration from non-static sources. See [`Config::from_entries`].
pub enum Setting {
	Components(Vec<(String, ComponentFn)>),
	Merges(Vec<(String, MergeFn)>),
	NetworkError(NetworkErrorFn),
	Unsupported(UnsupportedFn),
	Activity(ActivityFn),
	Flag(bool),
}

impl Config {
	/// Builds a configuration from `(key, value)` pairs with
	/// case-insensitive keys: `mountAttrs`, `unmountAttrs`, `merge`,
	/// `onNetworkError`, `onUnsupported`, `onLoadStart`, `onLoadEnd`,
	/// `links`, `forms`, `submitters`.
	///
	/// # Errors
	///
	/// [`Error::UnknownConfigKey`] for an unrecognized key and
	/// [`Error::InvalidConfigValue`] for a value of the wrong kind. The
	/// wrong-kind case fails loudly rather than dropping the value, so a
	/// host porting a configuration from a loosely typed environment
	/// (where non-callable callback slots are silently ignored) hears
	/// about the mismatch here.
	pub fn from_entries<I: IntoIterator<Item = (String, Setting)>>(entries: I) -> Result<Self, Error> {
		let mut config = Self::default();
		for (key, setting) in entries {
			match (key.to_ascii_lowercase().as_str(), setting) {
				("mountattrs", Setting::Components(components)) => config.mount_attrs = components,
				("unmountattrs", Setting::Components(components)) => config.unmount_attrs = components,
				("merge", Setting::Merges(merges)) => config.merge = merges,
				("onnetworkerror", Setting::NetworkError(hook)) => config.on_network_error = Some(hook),
				("onunsupported", Setting::Unsupported(hook)) => config.on_unsupported = Some(hook),
				("onloadstart", Setting::Activity(hook)) => config.on_load_start = Some(hook),
				("onloadend", Setting::Activity(hook)) => config.on_load_end = Some(hook),
				("links", Setting::Flag(flag)) => config.intercept_links = flag,
				("forms", Setting::Flag(flag)) => config.intercept_forms = flag,
				("submitters", Setting::Flag(flag)) => config.intercept_submitters = flag,
				(known @ ("mountattrs" | "unmountattrs" | "merge" | "onnetworkerror" | "onunsupported" | "onloadstart" | "onloadend" | "links" | "forms" | "submitters"), _) => {
					return Err(Error::InvalidConfigValue(known.to_owned()))
				}
				(unknown, _) => return Err(Error::UnknownConfigKey(unknown.to_owned())),
			}
		}
		Ok(config)
	}
}

/// One page session.
///
/// Cheap to clone; clones share the same underlying state.
#[derive(Clone)]
pub struct Session {
	pub(crate) inner: Rc<Inner>,
}

pub(crate) struct Inner {
	pub(crate) document: Document,
	pub(crate) engine: Engine,
	ledger: RefCell<UpdateLedger>,
	transport: Box<dyn Transport>,
	history: Box<dyn History>,
	navigator: Box<dyn Navigator>,
	pub(crate) config: RefCell<Config>,
	initialised: Cell<bool>,
	last_request_id: Cell<u64>,
	in_flight: Cell<u32>,
	/// Set while the built-in interception body component is mounted.
	pub(crate) delegation_active: Cell<bool>,
}

impl Session {
	#[must_use]
	pub fn new(transport: Box<dyn Transport>, history: Box<dyn History>, navigator: Box<dyn Navigator>) -> Self {
		Self {
			inner: Rc::new(Inner {
				document: Document::new(),
				engine: Engine::new(),
				ledger: RefCell::new(UpdateLedger::new()),
				transport,
				history,
				navigator,
				config: RefCell::new(Config::default()),
				initialised: Cell::new(false),
				last_request_id: Cell::new(0),
				in_flight: Cell::new(0),
				delegation_active: Cell::new(false),
			}),
		}
	}

	/// Applies `config` and mounts the document body.
	///
	/// Mounting is not reversible (the DOM is stateful), so this must only
	/// ever happen once in the lifetime of a page.
	///
	/// # Errors
	///
	/// [`Error::AlreadyInitialised`] on a second call.
	pub fn init(&self, config: Config) -> Result<(), Error> {
		if self.inner.initialised.replace(true) {
			return Err(Error::AlreadyInitialised);
		}
		let engine = &self.inner.engine;
		for (name, hook) in &config.mount_attrs {
			engine.register_mount(Trigger::Attribute, name, Rc::clone(hook));
		}
		for (name, hook) in &config.unmount_attrs {
			engine.register_unmount(Trigger::Attribute, name, Rc::clone(hook));
		}
		for (key, merge) in &config.merge {
			engine.register_merge(key, Rc::clone(merge));
		}
		if config.intercept_links || config.intercept_forms {
			let weak = Rc::downgrade(&self.inner);
			engine.register_mount(
				Trigger::Tag,
				"body",
				Rc::new(move |_| {
					if let Some(inner) = weak.upgrade() {
						inner.delegation_active.set(true);
					}
					Ok(())
				}),
			);
			let weak = Rc::downgrade(&self.inner);
			engine.register_unmount(
				Trigger::Tag,
				"body",
				Rc::new(move |_| {
					if let Some(inner) = weak.upgrade() {
						inner.delegation_active.set(false);
					}
					Ok(())
				}),
			);
		}
		*self.inner.config.borrow_mut() = config;
		engine.mount(self.inner.document.body());
		Ok(())
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.inner.document
	}

	/// Issues a request. The response is handled internally; the returned
	/// sequence number identifies the request in traces.
	///
	/// # Errors
	///
	/// [`Error::UnknownMethod`] for a method outside
	/// {GET, POST, PUT, PATCH, DELETE}.
	pub fn request(&self, method: &str, url: &str, body: Option<Vec<u8>>, content_type: Option<&str>) -> Result<u64, Error> {
		self.request_with_headers(method, url, body, content_type, Vec::new())
	}

	/// As [`request`](`Self::request`), with additional request headers.
	///
	/// # Errors
	///
	/// As [`request`](`Self::request`).
	pub fn request_with_headers(
		&self,
		method: &str,
		url: &str,
		body: Option<Vec<u8>>,
		content_type: Option<&str>,
		extra_headers: Vec<(String, String)>,
	) -> Result<u64, Error> {
		let method = Method::parse(method)?;
		// The sequence number is assigned before the network call begins
		// and is never reused.
		let request_id = self.inner.last_request_id.get() + 1;
		self.inner.last_request_id.set(request_id);
		Inner::begin_activity(&self.inner);

		let mut headers = vec![("accept".to_owned(), format!("{}, {}", PARTIAL_CONTENT_TYPE, FRAGMENT_CONTENT_TYPE))];
		if let Some(content_type) = content_type {
			headers.push(("content-type".to_owned(), content_type.to_owned()));
		}
		headers.extend(extra_headers);

		trace!(request_id, %method, url, "Dispatching request.");
		let weak = Rc::downgrade(&self.inner);
		let request_url = url.to_owned();
		self.inner.transport.send(
			Request {
				method,
				url: url.to_owned(),
				body,
				headers,
			},
			Box::new(move |result| {
				if let Some(inner) = weak.upgrade() {
					Inner::complete(&inner, request_id, &request_url, result);
				}
			}),
		);
		Ok(request_id)
	}

	/// Serializes `form` per its method and enctype and issues the derived
	/// request.
	///
	/// # Errors
	///
	/// As [`request`](`Self::request`).
	pub fn submit(&self, form: &FormData) -> Result<u64, Error> {
		let encoded = form.encode();
		self.request(encoded.method.as_str(), &encoded.url, encoded.body, encoded.content_type.as_deref())
	}

	/// Reconciles an externally constructed `next` element against the
	/// attached `prev` element, with the usual strategy selection and
	/// lifecycle.
	///
	/// # Errors
	///
	/// As [`Engine::reconcile`].
	pub fn update_element(&self, next: &NodeRef, prev: &NodeRef) -> Result<(), Error> {
		self.inner.engine.reconcile(&self.inner.document, next, prev)
	}

	/// Runs the mount walk over an externally constructed node.
	pub fn mount(&self, node: &NodeRef) {
		self.inner.engine.mount(node);
	}

	/// Runs the unmount walk over a node.
	pub fn unmount(&self, node: &NodeRef) {
		self.inner.engine.unmount(node);
	}

	/// Grafts `child` as the last child of `parent` and mounts it.
	///
	/// # Errors
	///
	/// [`Error::NotAnElement`] when `parent` cannot take children.
	pub fn append_child(&self, parent: &NodeRef, child: &NodeRef) -> Result<(), Error> {
		self.inner.engine.append_child(parent, child)
	}

	/// Grafts `new` immediately before `reference` and mounts it.
	///
	/// # Errors
	///
	/// [`Error::Detached`] when `reference` has no parent.
	pub fn insert_before(&self, new: &NodeRef, reference: &NodeRef) -> Result<(), Error> {
		self.inner.engine.insert_before(new, reference)
	}

	/// Grafts `new` immediately after `reference` and mounts it.
	///
	/// # Errors
	///
	/// [`Error::Detached`] when `reference` has no parent.
	pub fn insert_after(&self, new: &NodeRef, reference: &NodeRef) -> Result<(), Error> {
		self.inner.engine.insert_after(new, reference)
	}

	/// Unmounts `node` and removes it from its parent.
	pub fn remove(&self, node: &NodeRef) {
		self.inner.engine.remove(node);
	}

	/// A snapshot of the configuration, useful for debugging. Mutating the
	/// returned value does not affect the session.
	#[must_use]
	pub fn config(&self) -> Config {
		self.inner.config.borrow().clone()
	}

	/// Drains hook errors captured since the last call. Errors from
	/// component and merge callbacks are isolated and surfaced here, on
	/// the host's next cooperative turn, rather than aborting the
	/// traversal that observed them.
	#[must_use]
	pub fn take_deferred_errors(&self) -> Vec<DeferredError> {
		self.inner.engine.drain_deferred()
	}

	/// Outstanding request count.
	#[must_use]
	pub fn in_flight(&self) -> u32 {
		self.inner.in_flight.get()
	}

	/// The most recently assigned request sequence number.
	#[must_use]
	pub fn last_request_id(&self) -> u64 {
		self.inner.last_request_id.get()
	}
}

impl Inner {
	fn begin_activity(inner: &Rc<Inner>) {
		let count = inner.in_flight.get() + 1;
		inner.in_flight.set(count);
		if count == 1 {
			let hook = inner.config.borrow().on_load_start.clone();
			if let Some(hook) = hook {
				hook();
			}
		}
	}

	fn end_activity(inner: &Rc<Inner>) {
		let count = inner.in_flight.get().saturating_sub(1);
		inner.in_flight.set(count);
		if count == 0 {
			let hook = inner.config.borrow().on_load_end.clone();
			if let Some(hook) = hook {
				hook();
			}
		}
	}

	fn complete(inner: &Rc<Inner>, request_id: u64, request_url: &str, result: Result<Response, TransportError>) {
		let span = trace_span!("complete", request_id);
		let _enter = span.enter();
		match result {
			Err(error) => {
				warn!("Transport failure: {}", error);
				let hook = inner.config.borrow().on_network_error.clone();
				if let Some(hook) = hook {
					hook(&error);
				}
			}
			Ok(response) => Self::route(inner, request_id, request_url, &response),
		}
		Self::end_activity(inner);
	}

	fn route(inner: &Rc<Inner>, request_id: u64, request_url: &str, response: &Response) {
		if let Some(location) = response.header(SEE_OTHER_HEADER) {
			trace!(location, "Redirect instruction; handing off to the navigator.");
			inner.navigator.assign(location);
			return;
		}
		let content_type = response.header("content-type").unwrap_or("");
		if content_type == PARTIAL_CONTENT_TYPE {
			// Part of a larger page: record a history entry before
			// reconciling.
			let url = response.header(RESPONSE_URL_HEADER).unwrap_or(&response.url).to_owned();
			if response.header(HISTORY_HEADER).map_or(false, |mode| mode.eq_ignore_ascii_case("replace")) {
				inner.history.replace(&url);
			} else {
				inner.history.push(&url);
			}
			Self::apply(inner, request_id, &response.body, true);
		} else if content_type == FRAGMENT_CONTENT_TYPE {
			Self::apply(inner, request_id, &response.body, false);
		} else {
			trace!(content_type, "Unsupported response; signalling the host.");
			let hook = inner.config.borrow().on_unsupported.clone();
			if let Some(hook) = hook {
				hook(response, request_url);
			}
		}
	}

	/// Matches the response's top-level elements against live nodes and
	/// reconciles the accepted pairs.
	///
	/// Scanning and ledger recording complete for every candidate before
	/// the first reconciliation mutates the DOM, so later candidates'
	/// lookups are not perturbed by earlier splices within the same
	/// response.
	fn apply(inner: &Rc<Inner>, request_id: u64, body: &str, full_page: bool) {
		let span = trace_span!("apply", request_id, full_page);
		let _enter = span.enter();

		let mut queued = Vec::new();
		{
			let mut ledger = inner.ledger.borrow_mut();
			for candidate in markup::parse_fragment(body) {
				if !candidate.is_element() {
					continue;
				}
				let target = match candidate.tag_name() {
					Some("body") => {
						// The document root container is informational
						// only; it is never structurally replaced.
						trace!("Ignoring body element in response.");
						continue;
					}
					Some("title") => inner.document.first_by_tag("title"),
					_ => candidate.attribute("id").and_then(|id| inner.document.element_by_id(&id)),
				};
				let target = match target {
					Some(target) => target,
					None => {
						trace!(candidate = ?candidate, "No attached counterpart; skipping.");
						continue;
					}
				};
				let last = ledger.last_update(&inner.document, &target);
				if request_id < last {
					trace!(last, "Stale response for {:?}; discarding.", target);
					continue;
				}
				if full_page {
					ledger.record(Key::Root, request_id);
				} else if let Some(id) = candidate.attribute("id") {
					ledger.record(Key::Id(id), request_id);
				}
				queued.push((candidate, target));
			}
		}
		for (next, prev) in queued {
			if let Err(error) = inner.engine.reconcile(&inner.document, &next, &prev) {
				// Typically the target was detached by an earlier pair in
				// the same response.
				warn!("Skipping reconciliation: {}", error);
			}
		}
	}
}
