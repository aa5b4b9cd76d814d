//! Built-in link/form interception.
//!
//! The session registers a body tag component at init (when interception is
//! enabled); while the body is mounted, the host forwards click and submit
//! events here and the session decides whether the navigation is hijacked
//! into a fragment request.
//!
//! Opt-in is per element: anchors carry the `canopy` attribute next to
//! `href` (or use `canopy-link` in place of `href`), forms carry `canopy`
//! next to `action`. `canopy="disabled"` opts back out.

use crate::dom::NodeRef;
use crate::error::Error;
use crate::form::{Field, FieldValue, FormData};
use crate::session::Session;
use tracing::trace;

/// Marker attribute enabling interception on an anchor or form.
pub const INTERCEPT_ATTR: &str = "canopy";
/// Alternative to `href` for elements whose default `href` behaviour is
/// undesirable.
pub const LINK_ATTR: &str = "canopy-link";

/// Modifier-key state at click time; any modifier defers to default
/// browser behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
	pub shift: bool,
	pub ctrl: bool,
	pub meta: bool,
}

impl Modifiers {
	#[must_use]
	pub fn none() -> Self {
		Self::default()
	}

	#[must_use]
	fn any(self) -> bool {
		self.shift || self.ctrl || self.meta
	}
}

impl Session {
	/// Handles a click event. Returns `true` iff the navigation was
	/// hijacked into a fragment request (the host should then suppress
	/// the default action).
	#[must_use]
	pub fn link_clicked(&self, target: &NodeRef, modifiers: Modifiers) -> bool {
		if !self.inner.delegation_active.get() || !self.inner.config.borrow().intercept_links {
			return false;
		}
		// The click may have landed on a descendant of the anchor.
		let mut anchor = target.clone();
		while anchor.tag_name() != Some("a") {
			match anchor.parent() {
				Some(parent) => anchor = parent,
				None => return false,
			}
		}
		if modifiers.any() || attribute_disabled(&anchor) {
			return false;
		}
		let url = match anchor.attribute(LINK_ATTR) {
			Some(url) => url,
			None if anchor.has_attribute(INTERCEPT_ATTR) => match anchor.attribute("href") {
				Some(href) => href,
				None => return false,
			},
			None => return false,
		};
		trace!(url = url.as_str(), "Hijacking link click.");
		self.request("GET", &url, None, None).is_ok()
	}

	/// Handles a form submission. `data` is the host's serialization of
	/// the form's controls; `submitter` is the button that triggered the
	/// submission, if any. Returns `true` iff the submission was hijacked.
	///
	/// # Errors
	///
	/// As [`Session::request`] when the (possibly submitter-overridden)
	/// method is outside the whitelist.
	pub fn form_submitted(&self, form: &NodeRef, data: &FormData, submitter: Option<&NodeRef>) -> Result<bool, Error> {
		let (forms_enabled, submitters_enabled) = {
			let config = self.inner.config.borrow();
			(config.intercept_forms, config.intercept_submitters)
		};
		if !self.inner.delegation_active.get() || !forms_enabled {
			return Ok(false);
		}
		if data.action.is_empty() || !form.has_attribute(INTERCEPT_ATTR) || attribute_disabled(form) {
			return Ok(false);
		}
		let mut data = data.clone();
		if let Some(submitter) = submitter {
			if submitters_enabled {
				if let Some(action) = submitter.attribute("formaction") {
					data.action = action;
				}
				if let Some(method) = submitter.attribute("formmethod") {
					data.method = method;
				}
				if let Some(name) = submitter.attribute("name") {
					data.fields.push(Field {
						name,
						value: FieldValue::Text(submitter.attribute("value").unwrap_or_default()),
					});
				}
			}
		}
		trace!(action = data.action.as_str(), "Hijacking form submission.");
		self.submit(&data)?;
		Ok(true)
	}
}

fn attribute_disabled(element: &NodeRef) -> bool {
	element.attribute(INTERCEPT_ATTR).map_or(false, |value| value.eq_ignore_ascii_case("disabled"))
}
