//! Form serialization: derives a request from a form-like field collection
//! per the standard form-encoding rules.
//!
//! GET encodes the fields as a query string (replacing any existing query,
//! preserving the fragment); POST supports url-encoded, plain-text and
//! multipart encodings. Under non-multipart encodings file fields are
//! reduced to their file names.

use crate::session::Method;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct FileUpload {
	pub filename: String,
	pub content_type: String,
	pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
	Text(String),
	File(FileUpload),
}

/// One named form control. Unchecked checkboxes and radio buttons are
/// simply not collected.
#[derive(Debug, Clone)]
pub struct Field {
	pub name: String,
	pub value: FieldValue,
}

impl Field {
	#[must_use]
	pub fn text(name: &str, value: &str) -> Self {
		Self {
			name: name.to_owned(),
			value: FieldValue::Text(value.to_owned()),
		}
	}

	#[must_use]
	pub fn file(name: &str, filename: &str, content_type: &str, bytes: Vec<u8>) -> Self {
		Self {
			name: name.to_owned(),
			value: FieldValue::File(FileUpload {
				filename: filename.to_owned(),
				content_type: content_type.to_owned(),
				bytes,
			}),
		}
	}
}

/// A form-like input collection.
#[derive(Debug, Clone)]
pub struct FormData {
	/// Any method other than POST encodes as GET.
	pub method: String,
	pub action: String,
	/// POST encoding; `None` means `application/x-www-form-urlencoded`.
	pub enctype: Option<String>,
	pub fields: Vec<Field>,
}

/// The derived request.
#[derive(Debug)]
pub struct EncodedForm {
	pub method: Method,
	pub url: String,
	pub body: Option<Vec<u8>>,
	pub content_type: Option<String>,
}

const URLENCODED: &str = "application/x-www-form-urlencoded";
const PLAIN: &str = "text/plain";
const MULTIPART: &str = "multipart/form-data";

impl FormData {
	#[must_use]
	pub fn encode(&self) -> EncodedForm {
		if self.method.eq_ignore_ascii_case("post") {
			match self.enctype.as_deref().unwrap_or(URLENCODED) {
				MULTIPART => self.encode_multipart(),
				PLAIN => EncodedForm {
					method: Method::Post,
					url: self.action.clone(),
					body: Some(self.join_pairs(plain_escape, "\r\n").into_bytes()),
					content_type: Some(PLAIN.to_owned()),
				},
				_ => EncodedForm {
					method: Method::Post,
					url: self.action.clone(),
					body: Some(self.join_pairs(encode_component, "&").into_bytes()),
					content_type: Some(URLENCODED.to_owned()),
				},
			}
		} else {
			self.encode_query()
		}
	}

	fn encode_query(&self) -> EncodedForm {
		let (base, fragment) = match self.action.find('#') {
			Some(index) => (&self.action[..index], &self.action[index..]),
			None => (self.action.as_str(), ""),
		};
		let base = base.split('?').next().unwrap_or(base);
		let query = self.join_pairs(encode_component, "&");
		let url = if query.is_empty() {
			format!("{}{}", base, fragment)
		} else {
			format!("{}?{}{}", base, query, fragment)
		};
		EncodedForm {
			method: Method::Get,
			url,
			body: None,
			content_type: None,
		}
	}

	/// `name=value` pairs with `filter` applied to both sides. File fields
	/// contribute their file name.
	fn join_pairs(&self, filter: fn(&str) -> String, separator: &str) -> String {
		self.fields
			.iter()
			.map(|field| {
				let value = match &field.value {
					FieldValue::Text(text) => text.as_str(),
					FieldValue::File(file) => file.filename.as_str(),
				};
				format!("{}={}", filter(&field.name), filter(value))
			})
			.collect::<Vec<_>>()
			.join(separator)
	}

	fn encode_multipart(&self) -> EncodedForm {
		let boundary = format!("---------------------------{:x}", unix_millis());
		let mut body = Vec::new();
		for field in &self.fields {
			body.extend_from_slice(b"--");
			body.extend_from_slice(boundary.as_bytes());
			body.extend_from_slice(b"\r\n");
			match &field.value {
				FieldValue::Text(text) => {
					body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field.name).as_bytes());
					body.extend_from_slice(text.as_bytes());
				}
				FieldValue::File(file) => {
					body.extend_from_slice(
						format!(
							"Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
							field.name, file.filename, file.content_type
						)
						.as_bytes(),
					);
					body.extend_from_slice(&file.bytes);
				}
			}
			body.extend_from_slice(b"\r\n");
		}
		body.extend_from_slice(b"--");
		body.extend_from_slice(boundary.as_bytes());
		body.extend_from_slice(b"--\r\n");
		EncodedForm {
			method: Method::Post,
			url: self.action.clone(),
			body: Some(body),
			content_type: Some(format!("{}; boundary={}", MULTIPART, boundary)),
		}
	}
}

fn unix_millis() -> u128 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis()).unwrap_or(0)
}

/// RFC 3986 component encoding (space as `%20`).
#[must_use]
pub fn encode_component(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for byte in input.bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
			_ => out.push_str(&format!("%{:02X}", byte)),
		}
	}
	out
}

/// Escaping for the `text/plain` encoding: whitespace, `=` and `\` are
/// prefixed with a backslash.
fn plain_escape(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for character in input.chars() {
		if character.is_whitespace() || character == '=' || character == '\\' {
			out.push('\\');
		}
		out.push(character);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::{encode_component, Field, FormData};
	use crate::session::Method;

	fn form(method: &str, action: &str, enctype: Option<&str>, fields: Vec<Field>) -> FormData {
		FormData {
			method: method.to_owned(),
			action: action.to_owned(),
			enctype: enctype.map(str::to_owned),
			fields,
		}
	}

	#[test]
	fn get_builds_a_query_string_and_preserves_the_fragment() {
		let encoded = form(
			"GET",
			"/search?stale=1#results",
			None,
			vec![Field::text("q", "two words"), Field::text("page", "2")],
		)
		.encode();
		assert_eq!(encoded.method, Method::Get);
		assert_eq!(encoded.url, "/search?q=two%20words&page=2#results");
		assert!(encoded.body.is_none());
		assert!(encoded.content_type.is_none());
	}

	#[test]
	fn get_without_fields_drops_the_query() {
		let encoded = form("get", "/search?stale=1", None, Vec::new()).encode();
		assert_eq!(encoded.url, "/search");
	}

	#[test]
	fn post_urlencoded_is_the_default() {
		let encoded = form("POST", "/submit", None, vec![Field::text("a", "1&2"), Field::text("b", "x")]).encode();
		assert_eq!(encoded.method, Method::Post);
		assert_eq!(encoded.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
		assert_eq!(encoded.body.unwrap(), b"a=1%262&b=x");
	}

	#[test]
	fn post_plain_text_escapes_and_joins_with_crlf() {
		let encoded = form("post", "/submit", Some("text/plain"), vec![Field::text("a", "x = y"), Field::text("b", "z")]).encode();
		assert_eq!(encoded.content_type.as_deref(), Some("text/plain"));
		assert_eq!(encoded.body.unwrap(), b"a=x\\ \\=\\ y\r\nb=z");
	}

	#[test]
	fn post_multipart_delimits_parts_with_the_boundary() {
		let encoded = form(
			"POST",
			"/upload",
			Some("multipart/form-data"),
			vec![Field::text("note", "hello"), Field::file("doc", "a.txt", "text/plain", b"contents".to_vec())],
		)
		.encode();
		let content_type = encoded.content_type.unwrap();
		let boundary = content_type.split("boundary=").nth(1).unwrap().to_owned();
		let body = String::from_utf8(encoded.body.unwrap()).unwrap();
		assert!(body.starts_with(&format!("--{}\r\n", boundary)));
		assert!(body.contains("Content-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n"));
		assert!(body.contains("Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\ncontents\r\n"));
		assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
	}

	#[test]
	fn files_become_file_names_outside_multipart() {
		let encoded = form("GET", "/upload", None, vec![Field::file("doc", "a b.txt", "text/plain", Vec::new())]).encode();
		assert_eq!(encoded.url, "/upload?doc=a%20b.txt");
	}

	#[test]
	fn component_encoding() {
		assert_eq!(encode_component("a-b_c.~"), "a-b_c.~");
		assert_eq!(encode_component("ü ?"), "%C3%BC%20%3F");
	}
}
