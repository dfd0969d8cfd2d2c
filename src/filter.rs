//! Composition of search filters.
//!
//! Every value interpolated into a filter is escaped with
//! [`ldap_escape`](ldap3::ldap_escape), so that user input such as `a)(uid=*`
//! is matched literally instead of changing the structure of the filter.
use std::borrow::Cow;

use ldap3::ldap_escape;

/// An equality clause `(attribute=value)` with `value` escaped.
#[must_use]
pub fn equality(attribute: &str, value: &str) -> String {
	format!("({}={})", attribute.trim(), ldap_escape(value))
}

/// Wrap a filter in parentheses unless it already is.
fn parenthesize(filter: &str) -> Cow<'_, str> {
	let filter = filter.trim();
	if filter.starts_with('(') && filter.ends_with(')') {
		Cow::Borrowed(filter)
	} else {
		Cow::Owned(format!("({filter})"))
	}
}

/// Combine filters with `op`. Empty filters are skipped, a single remaining
/// filter is returned as is.
fn combine<'a>(op: char, filters: impl IntoIterator<Item = &'a str>) -> String {
	let filters: Vec<_> =
		filters.into_iter().filter(|filter| !filter.trim().is_empty()).map(parenthesize).collect();
	match filters.as_slice() {
		[] => String::new(),
		[single] => single.clone().into_owned(),
		_ => format!("({op}{})", filters.concat()),
	}
}

/// Conjunction of the given filters.
#[must_use]
pub fn and<'a>(filters: impl IntoIterator<Item = &'a str>) -> String {
	combine('&', filters)
}

/// Disjunction of the given filters.
#[must_use]
pub fn or<'a>(filters: impl IntoIterator<Item = &'a str>) -> String {
	combine('|', filters)
}

/// Restrict `base_filter` to entries where `attribute` equals `value`.
#[must_use]
pub fn attach_filter(attribute: &str, value: &str, base_filter: &str) -> String {
	and([base_filter, equality(attribute, value).as_str()])
}

/// Restrict `base_filter` to entries where the RDN attribute or any of the
/// `attributes` equals `value`, for searching by any of several fields.
#[must_use]
pub fn attach_attribute_filters<S: AsRef<str>>(
	value: &str,
	base_filter: &str,
	rdn_attribute: &str,
	attributes: &[S],
) -> String {
	let mut names: Vec<&str> = Vec::with_capacity(attributes.len() + 1);
	for name in std::iter::once(rdn_attribute).chain(attributes.iter().map(AsRef::as_ref)) {
		let name = name.trim();
		if !name.is_empty() && !names.iter().any(|known| known.eq_ignore_ascii_case(name)) {
			names.push(name);
		}
	}
	let clauses: Vec<String> = names.into_iter().map(|name| equality(name, value)).collect();
	and([base_filter, or(clauses.iter().map(String::as_str)).as_str()])
}
