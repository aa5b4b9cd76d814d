//! A lenient tag-soup parser for server-rendered fragments.
//!
//! Response bodies are parsed into a forest of top-level nodes for identity
//! matching. This is deliberately not a conforming HTML parser: it accepts
//! the markup a fragment endpoint realistically produces (elements with
//! quoted or unquoted attributes, text with basic entities, comments, void
//! and self-closing elements) and recovers silently from mismatched close
//! tags. Hosts with a full HTML implementation can substitute their own
//! parse and hand the engine the resulting [`NodeRef`] forest directly.

use crate::dom::NodeRef;
use tracing::warn;

const VOID_TAGS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

/// Parses `input` into a forest of top-level nodes.
///
/// Unclosed elements are closed at the end of input; a close tag with no
/// matching open element is dropped.
#[must_use]
pub fn parse_fragment(input: &str) -> Vec<NodeRef> {
	Parser {
		input: input.as_bytes(),
		position: 0,
		roots: Vec::new(),
		stack: Vec::new(),
	}
	.run()
}

struct Parser<'a> {
	input: &'a [u8],
	position: usize,
	roots: Vec<NodeRef>,
	stack: Vec<NodeRef>,
}

impl Parser<'_> {
	fn run(mut self) -> Vec<NodeRef> {
		let mut text_start = self.position;
		while self.position < self.input.len() {
			if self.input[self.position] != b'<' {
				self.position += 1;
				continue;
			}
			self.flush_text(text_start, self.position);
			if self.starts_with("<!--") {
				self.comment();
			} else if self.starts_with("</") {
				self.close_tag();
			} else if self.starts_with("<!") {
				// Doctype or other declaration; skip it.
				self.skip_past(b'>');
			} else if self.input.get(self.position + 1).map_or(false, u8::is_ascii_alphabetic) {
				self.open_tag();
			} else {
				// A stray `<` is treated as text.
				self.position += 1;
				self.flush_text(self.position - 1, self.position);
			}
			text_start = self.position;
		}
		self.flush_text(text_start, self.input.len());
		self.roots
	}

	fn flush_text(&mut self, start: usize, end: usize) {
		if start < end {
			let raw = core::str::from_utf8(&self.input[start..end]).unwrap_or_default();
			self.attach(&NodeRef::text(&decode_entities(raw)));
		}
	}

	fn attach(&mut self, node: &NodeRef) {
		match self.stack.last() {
			Some(parent) => parent.append_child(node).expect("open elements are elements"),
			None => self.roots.push(node.clone()),
		}
	}

	fn starts_with(&self, prefix: &str) -> bool {
		self.input[self.position..].starts_with(prefix.as_bytes())
	}

	fn skip_past(&mut self, delimiter: u8) {
		while self.position < self.input.len() {
			let byte = self.input[self.position];
			self.position += 1;
			if byte == delimiter {
				return;
			}
		}
	}

	fn comment(&mut self) {
		self.position += "<!--".len();
		let start = self.position;
		let end = loop {
			if self.position + 3 > self.input.len() {
				self.position = self.input.len();
				break self.input.len();
			}
			if &self.input[self.position..self.position + 3] == b"-->" {
				let end = self.position;
				self.position += 3;
				break end;
			}
			self.position += 1;
		};
		let data = core::str::from_utf8(&self.input[start..end]).unwrap_or_default();
		self.attach(&NodeRef::comment(data));
	}

	fn close_tag(&mut self) {
		self.position += "</".len();
		let name = self.tag_name();
		self.skip_past(b'>');
		match self.stack.iter().rposition(|open| open.tag_name() == Some(name.as_str())) {
			Some(index) => self.stack.truncate(index),
			None => warn!("Dropping close tag </{}> with no matching open element.", name),
		}
	}

	fn open_tag(&mut self) {
		self.position += 1;
		let name = self.tag_name();
		let element = NodeRef::element(&name);
		let mut self_closing = false;
		loop {
			self.skip_whitespace();
			match self.input.get(self.position) {
				None => break,
				Some(b'>') => {
					self.position += 1;
					break;
				}
				Some(b'/') => {
					self.position += 1;
					if self.input.get(self.position) == Some(&b'>') {
						self.position += 1;
						self_closing = true;
						break;
					}
				}
				Some(_) => {
					let (attr_name, value) = self.attribute();
					if !attr_name.is_empty() {
						element.set_attribute(&attr_name, &value);
					}
				}
			}
		}
		self.attach(&element);
		if !self_closing && !VOID_TAGS.contains(&name.as_str()) {
			self.stack.push(element);
		}
	}

	fn tag_name(&mut self) -> String {
		let start = self.position;
		while self.position < self.input.len() && matches!(self.input[self.position], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b':') {
			self.position += 1;
		}
		core::str::from_utf8(&self.input[start..self.position]).unwrap_or_default().to_ascii_lowercase()
	}

	fn attribute(&mut self) -> (String, String) {
		let start = self.position;
		while self.position < self.input.len() && !matches!(self.input[self.position], b'=' | b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r') {
			self.position += 1;
		}
		let name = core::str::from_utf8(&self.input[start..self.position]).unwrap_or_default().to_owned();
		self.skip_whitespace();
		if self.input.get(self.position) != Some(&b'=') {
			return (name, String::new());
		}
		self.position += 1;
		self.skip_whitespace();
		let value = match self.input.get(self.position) {
			Some(&quote @ (b'"' | b'\'')) => {
				self.position += 1;
				let start = self.position;
				while self.position < self.input.len() && self.input[self.position] != quote {
					self.position += 1;
				}
				let value = &self.input[start..self.position];
				if self.position < self.input.len() {
					self.position += 1;
				}
				value
			}
			_ => {
				let start = self.position;
				while self.position < self.input.len() && !matches!(self.input[self.position], b'>' | b' ' | b'\t' | b'\n' | b'\r') {
					self.position += 1;
				}
				&self.input[start..self.position]
			}
		};
		let value = core::str::from_utf8(value).unwrap_or_default();
		(name, decode_entities(value))
	}

	fn skip_whitespace(&mut self) {
		while self.position < self.input.len() && self.input[self.position].is_ascii_whitespace() {
			self.position += 1;
		}
	}
}

/// Decodes the named entities fragment endpoints commonly emit, plus
/// decimal and hexadecimal character references.
#[must_use]
pub fn decode_entities(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	let mut rest = input;
	while let Some(index) = rest.find('&') {
		out.push_str(&rest[..index]);
		rest = &rest[index..];
		let semicolon = match rest.find(';') {
			Some(semicolon) if semicolon <= 12 => semicolon,
			_ => {
				out.push('&');
				rest = &rest[1..];
				continue;
			}
		};
		let entity = &rest[1..semicolon];
		let decoded = match entity {
			"amp" => Some('&'),
			"lt" => Some('<'),
			"gt" => Some('>'),
			"quot" => Some('"'),
			"apos" => Some('\''),
			_ => entity
				.strip_prefix('#')
				.and_then(|reference| match reference.strip_prefix('x').or_else(|| reference.strip_prefix('X')) {
					Some(hex) => u32::from_str_radix(hex, 16).ok(),
					None => reference.parse().ok(),
				})
				.and_then(core::char::from_u32),
		};
		match decoded {
			Some(decoded) => {
				out.push(decoded);
				rest = &rest[semicolon + 1..];
			}
			None => {
				out.push('&');
				rest = &rest[1..];
			}
		}
	}
	out.push_str(rest);
	out
}
