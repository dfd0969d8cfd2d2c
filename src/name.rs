//! Parsing and normalization of distinguished names.
//!
//! Entry names reach the library in several forms: a bare user name
//! (`john`), a distinguished name (`uid=john,ou=people,dc=example,dc=com`)
//! or an addressable path (`ldap://host:389/uid=john,...`). The functions in
//! this module convert between them without touching the directory. They never
//! fail; input which cannot be parsed is passed through unchanged.
use std::{borrow::Cow, fmt};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use unicase::UniCase;
use url::Url;

use crate::config::NameType;

/// One component of a distinguished name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rdn {
	/// The attribute type, as written
	pub attribute: String,
	/// The attribute value with all escapes resolved
	pub value: String,
	/// The attribute value as written, escapes included
	raw_value: String,
}

impl Rdn {
	/// Whether both components name the same attribute and value, ignoring
	/// case.
	#[must_use]
	pub fn matches(&self, other: &Rdn) -> bool {
		self.attribute.eq_ignore_ascii_case(&other.attribute)
			&& UniCase::new(self.value.as_str()) == UniCase::new(other.value.as_str())
	}
}

impl fmt::Display for Rdn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.attribute, self.raw_value)
	}
}

/// Split a distinguished name into its components, following the string
/// representation of RFC 4514. The empty DN has no components. Returns `None`
/// if `dn` is not a distinguished name.
#[must_use]
pub fn parse_dn(dn: &str) -> Option<Vec<Rdn>> {
	if dn.trim().is_empty() {
		return Some(Vec::new());
	}
	split_unescaped(dn, ',').into_iter().map(parse_rdn).collect()
}

/// Parse a single `attribute=value` component.
fn parse_rdn(component: &str) -> Option<Rdn> {
	let (attribute, raw_value) = split_unescaped(component, '=').split_first().and_then(
		|(attribute, _)| Some((*attribute, component.get(attribute.len() + 1..)?)),
	)?;
	let attribute = attribute.trim();
	if attribute.is_empty() {
		return None;
	}
	let raw_value = raw_value.trim();
	Some(Rdn {
		attribute: attribute.to_owned(),
		value: unescape(raw_value)?,
		raw_value: raw_value.to_owned(),
	})
}

/// Split `input` at every occurrence of `separator` which is not preceded by
/// a backslash.
fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
	let mut pieces = Vec::new();
	let mut start = 0;
	let mut escaped = false;
	for (index, c) in input.char_indices() {
		if escaped {
			escaped = false;
		} else if c == '\\' {
			escaped = true;
		} else if c == separator {
			pieces.push(&input[start..index]);
			start = index + c.len_utf8();
		}
	}
	pieces.push(&input[start..]);
	pieces
}

/// Resolve `\c` and `\XX` escapes of an attribute value.
fn unescape(value: &str) -> Option<String> {
	let mut bytes = Vec::with_capacity(value.len());
	let mut chars = value.chars().peekable();
	while let Some(c) = chars.next() {
		if c != '\\' {
			let mut buf = [0; 4];
			bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
			continue;
		}
		let first = chars.next()?;
		match (first.to_digit(16), chars.peek().and_then(|c| c.to_digit(16))) {
			(Some(high), Some(low)) => {
				chars.next();
				bytes.push(u8::try_from(high * 16 + low).ok()?);
			}
			_ => {
				let mut buf = [0; 4];
				bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
			}
		}
	}
	String::from_utf8(bytes).ok()
}

/// URL schemes of addressable paths
const SCHEMES: [&str; 3] = ["ldap", "ldaps", "ldapi"];

/// Characters of a DN which are percent-encoded in an addressable path
const PATH_ESCAPES: &AsciiSet =
	&CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>').add(b'?').add(b'`');

/// Strip the scheme and authority from an addressable path, leaving the DN.
/// Anything which is not an LDAP URL is taken to be a DN already.
fn strip_path(path: &str) -> Cow<'_, str> {
	match Url::parse(path) {
		Ok(url) if SCHEMES.contains(&url.scheme()) => {
			let dn = url.path().trim_start_matches('/');
			Cow::Owned(percent_decode_str(dn).decode_utf8_lossy().into_owned())
		}
		_ => Cow::Borrowed(path),
	}
}

/// The addressable path of the entry named `dn` on the server at `server`.
#[must_use]
pub fn get_path(server: &str, dn: &str) -> String {
	format!("{}/{}", server.trim_end_matches('/'), utf8_percent_encode(dn, PATH_ESCAPES))
}

/// Extract the distinguished name from an addressable path such as
/// `ldap://host:389/uid=john,dc=example,dc=com`. A plain DN is returned as is,
/// a path without a DN yields an empty string.
#[must_use]
pub fn get_dn(path: &str) -> String {
	strip_path(path).into_owned()
}

/// Whether `entry_name` is already the distinguished name of an entry named
/// by `rdn_attribute` somewhere below `base`. A name like this can be turned
/// into a user name without a directory lookup.
#[must_use]
pub fn rdn_in_name(entry_name: &str, rdn_attribute: &str, base: &str) -> bool {
	let (Some(rdns), Some(base)) = (parse_dn(&strip_path(entry_name)), parse_dn(base)) else {
		return false;
	};
	let Some((first, parents)) = rdns.split_first() else {
		return false;
	};
	if !first.attribute.eq_ignore_ascii_case(rdn_attribute) || parents.len() < base.len() {
		return false;
	}
	parents[parents.len() - base.len()..].iter().zip(&base).all(|(rdn, base)| rdn.matches(base))
}

/// Extract the name of an entry in the form configured by `name_type`. Names
/// which are not distinguished names are returned unchanged.
#[must_use]
pub fn get_name(name_type: NameType, entry_name: &str) -> String {
	let dn = strip_path(entry_name);
	let first = parse_dn(&dn).and_then(|rdns| rdns.into_iter().next());
	match (first, name_type) {
		(Some(rdn), NameType::Value) => rdn.value,
		(Some(rdn), NameType::Rdn) => rdn.to_string(),
		(Some(_), NameType::Dn) => dn.trim().to_owned(),
		(None, _) => entry_name.to_owned(),
	}
}
