//! Shared fakes: a transport that lets tests complete requests in any
//! order, and recording history/navigator stubs.

#![allow(dead_code)]

use canopy_dom::session::{FRAGMENT_CONTENT_TYPE, PARTIAL_CONTENT_TYPE};
use canopy_dom::{History, Navigator, Request, Response, ResponseCallback, Session, Transport, TransportError};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
pub struct FakeTransport {
	requests: RefCell<Vec<Request>>,
	callbacks: RefCell<Vec<Option<ResponseCallback>>>,
}

impl FakeTransport {
	pub fn new() -> Rc<Self> {
		Rc::new(Self::default())
	}

	pub fn sent(&self) -> usize {
		self.requests.borrow().len()
	}

	pub fn method(&self, index: usize) -> String {
		self.requests.borrow()[index].method.as_str().to_owned()
	}

	pub fn url(&self, index: usize) -> String {
		self.requests.borrow()[index].url.clone()
	}

	pub fn body(&self, index: usize) -> Option<Vec<u8>> {
		self.requests.borrow()[index].body.clone()
	}

	pub fn header(&self, index: usize, name: &str) -> Option<String> {
		self.requests.borrow()[index]
			.headers
			.iter()
			.find(|(n, _)| n.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.clone())
	}

	/// Completes the request at `index` (in dispatch order) with
	/// `response`. Requests may be completed in any order.
	pub fn respond(&self, index: usize, response: Response) {
		let done = self.callbacks.borrow_mut()[index].take().expect("request already completed");
		done(Ok(response));
	}

	/// Fails the request at `index` at the transport level.
	pub fn fail(&self, index: usize, message: &str) {
		let done = self.callbacks.borrow_mut()[index].take().expect("request already completed");
		done(Err(TransportError(message.to_owned())));
	}
}

pub struct TransportHandle(pub Rc<FakeTransport>);

impl Transport for TransportHandle {
	fn send(&self, request: Request, done: ResponseCallback) {
		self.0.requests.borrow_mut().push(request);
		self.0.callbacks.borrow_mut().push(Some(done));
	}
}

#[derive(Default)]
pub struct FakeHistory {
	pub entries: RefCell<Vec<(String, String)>>,
}

pub struct HistoryHandle(pub Rc<FakeHistory>);

impl History for HistoryHandle {
	fn push(&self, url: &str) {
		self.0.entries.borrow_mut().push(("push".to_owned(), url.to_owned()));
	}

	fn replace(&self, url: &str) {
		self.0.entries.borrow_mut().push(("replace".to_owned(), url.to_owned()));
	}
}

#[derive(Default)]
pub struct FakeNavigator {
	pub assigned: RefCell<Vec<String>>,
}

pub struct NavigatorHandle(pub Rc<FakeNavigator>);

impl Navigator for NavigatorHandle {
	fn assign(&self, url: &str) {
		self.0.assigned.borrow_mut().push(url.to_owned());
	}
}

pub struct Harness {
	pub session: Session,
	pub transport: Rc<FakeTransport>,
	pub history: Rc<FakeHistory>,
	pub navigator: Rc<FakeNavigator>,
}

pub fn harness() -> Harness {
	let transport = FakeTransport::new();
	let history = Rc::new(FakeHistory::default());
	let navigator = Rc::new(FakeNavigator::default());
	let session = Session::new(
		Box::new(TransportHandle(Rc::clone(&transport))),
		Box::new(HistoryHandle(Rc::clone(&history))),
		Box::new(NavigatorHandle(Rc::clone(&navigator))),
	);
	Harness {
		session,
		transport,
		history,
		navigator,
	}
}

/// Appends parsed markup to the (not yet mounted) document body.
pub fn seed_body(session: &Session, markup: &str) {
	for node in canopy_dom::markup::parse_fragment(markup) {
		session.document().body().append_child(&node).unwrap();
	}
}

pub fn fragment_response(body: &str) -> Response {
	Response {
		status: 200,
		url: "/fragment".to_owned(),
		headers: vec![("content-type".to_owned(), FRAGMENT_CONTENT_TYPE.to_owned())],
		body: body.to_owned(),
	}
}

pub fn partial_response(url: &str, body: &str) -> Response {
	Response {
		status: 200,
		url: url.to_owned(),
		headers: vec![("content-type".to_owned(), PARTIAL_CONTENT_TYPE.to_owned())],
		body: body.to_owned(),
	}
}

/// Text content of the element with the given id; panics when absent.
pub fn text_of(session: &Session, id: &str) -> String {
	session.document().element_by_id(id).expect("element not found").text_content()
}
