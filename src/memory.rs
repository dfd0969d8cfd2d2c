//! A [`Directory`] held in memory.
//!
//! Useful for tests and for embedding a small, fixed set of users. Filters
//! are evaluated with case-insensitive matching of attribute names and values,
//! which is what most user attributes use in real directories. Virtual list
//! views are answered like a server would, including its habit of returning
//! the last entry for offsets beyond the end of the result.
use std::{
	collections::HashMap,
	sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use ldap3::Scope;
use tokio::sync::RwLock;

use crate::{
	directory::{
		Credentials, Directory, Outcome, SearchRequest, SearchResults, VirtualListView,
		ALL_ATTRIBUTES, NO_ATTRIBUTES,
	},
	entry::Entry,
	error::Error,
	name, vlv,
};

/// An entry stored in a [`MemoryDirectory`].
#[derive(Debug, Clone)]
struct StoredEntry {
	/// The DN as given
	dn: String,
	/// The normalized DN
	key: String,
	/// Attribute values
	attrs: HashMap<String, Vec<String>>,
	/// The password to bind as this entry with
	password: Option<String>,
}

impl StoredEntry {
	/// Values of an attribute, matching the name case-insensitively.
	fn values(&self, attr: &str) -> &[String] {
		self.attrs
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(attr))
			.map(|(_, values)| values.as_slice())
			.unwrap_or_default()
	}

	/// Whether the entry lies within `scope` of the entry with normalized DN
	/// `base`.
	fn in_scope(&self, base: &str, scope: Scope) -> bool {
		let Some(parent) = self.key.strip_suffix(base) else {
			return false;
		};
		match scope {
			Scope::Base => parent.is_empty(),
			Scope::OneLevel => parent.strip_suffix(',').is_some_and(|rdn| {
				!rdn.is_empty() && name::parse_dn(rdn).is_some_and(|rdns| rdns.len() == 1)
			}),
			Scope::Subtree => base.is_empty() || parent.is_empty() || parent.ends_with(','),
		}
	}

	/// Convert to an [`Entry`] with the requested attributes.
	fn to_entry(&self, url: &str, attributes: &[String]) -> Entry {
		let wanted = |attr: &str| {
			!attributes.iter().any(|wanted| wanted == NO_ATTRIBUTES)
				&& attributes
					.iter()
					.any(|wanted| wanted == ALL_ATTRIBUTES || wanted.eq_ignore_ascii_case(attr))
		};
		Entry {
			path: name::get_path(url, &self.dn),
			dn: self.dn.clone(),
			attrs: self
				.attrs
				.iter()
				.filter(|(attr, _)| wanted(attr))
				.map(|(attr, values)| (attr.clone(), values.clone()))
				.collect(),
			bin_attrs: HashMap::new(),
		}
	}
}

/// Normalize a DN for comparisons. Escapes are kept so that the result can
/// be split into its components again.
fn normalize(dn: &str) -> String {
	match name::parse_dn(dn) {
		Some(rdns) => {
			rdns.iter().map(|rdn| rdn.to_string().to_lowercase()).collect::<Vec<_>>().join(",")
		}
		None => dn.trim().to_lowercase(),
	}
}

/// A directory held in memory.
#[derive(Debug)]
pub struct MemoryDirectory {
	/// URL entry paths are based on
	url: String,
	/// The entries, in insertion order
	entries: RwLock<Vec<StoredEntry>>,
	/// Number of searches run
	searches: AtomicUsize,
}

impl MemoryDirectory {
	/// An empty directory whose entries have paths below `url`.
	#[must_use]
	pub fn new(url: &str) -> Self {
		Self {
			url: url.trim_end_matches('/').to_owned(),
			entries: RwLock::new(Vec::new()),
			searches: AtomicUsize::new(0),
		}
	}

	/// Build a stored entry from attribute-value pairs. Repeated attributes
	/// collect several values.
	fn stored(dn: &str, attrs: &[(&str, &str)]) -> StoredEntry {
		let mut values: HashMap<String, Vec<String>> = HashMap::new();
		for (attr, value) in attrs {
			values.entry((*attr).to_owned()).or_default().push((*value).to_owned());
		}
		StoredEntry { dn: dn.to_owned(), key: normalize(dn), attrs: values, password: None }
	}

	/// Add an entry while setting up the directory.
	#[must_use]
	pub fn with_entry(mut self, dn: &str, attrs: &[(&str, &str)]) -> Self {
		self.entries.get_mut().push(Self::stored(dn, attrs));
		self
	}

	/// Add an entry which can be bound as with `password`.
	#[must_use]
	pub fn with_user(mut self, dn: &str, password: &str, attrs: &[(&str, &str)]) -> Self {
		let mut entry = Self::stored(dn, attrs);
		entry.password = Some(password.to_owned());
		self.entries.get_mut().push(entry);
		self
	}

	/// Add an entry.
	pub async fn insert(&self, dn: &str, attrs: &[(&str, &str)]) {
		self.entries.write().await.push(Self::stored(dn, attrs));
	}

	/// Remove an entry. Returns whether it existed.
	pub async fn remove(&self, dn: &str) -> bool {
		let key = normalize(dn);
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|entry| entry.key != key);
		entries.len() != before
	}

	/// The number of searches run so far.
	#[must_use]
	pub fn search_count(&self) -> usize {
		self.searches.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Directory for MemoryDirectory {
	async fn search(
		&self,
		request: &SearchRequest,
		credentials: Option<&Credentials>,
	) -> Result<Outcome, Error> {
		self.searches.fetch_add(1, Ordering::SeqCst);
		let entries = self.entries.read().await;

		if let Some(credentials) = credentials {
			let key = normalize(&credentials.dn);
			// An empty password makes an unauthenticated bind, which servers accept.
			let accepted = credentials.password().is_empty()
				|| entries.iter().any(|entry| {
					entry.key == key && entry.password.as_deref() == Some(credentials.password())
				});
			if !accepted {
				return Ok(Outcome::Rejected);
			}
		}

		let base = normalize(&request.base);
		if !base.is_empty() && !entries.iter().any(|entry| entry.key == base) {
			return Ok(Outcome::NoSuchObject);
		}
		let filter = Filter::parse(&request.filter).ok_or_else(|| {
			Error::InvalidArgument(format!("bad search filter {}", request.filter))
		})?;

		let mut matches: Vec<&StoredEntry> = entries
			.iter()
			.filter(|entry| entry.in_scope(&base, request.scope) && filter.matches(entry))
			.collect();

		let mut content_count = None;
		if let Some(view) = &request.view {
			// Refuse views which cannot be sent to a server.
			vlv::view_control(view)?;
			content_count = Some(matches.len());
			matches = window(matches, view);
		}

		let entries = matches
			.into_iter()
			.map(|entry| entry.to_entry(&self.url, &request.attributes))
			.collect();
		Ok(Outcome::Found(SearchResults { entries, content_count }))
	}
}

/// Sort `matches` and cut out the window of `view`. Offsets beyond the end
/// target the last entry.
fn window<'a>(mut matches: Vec<&'a StoredEntry>, view: &VirtualListView) -> Vec<&'a StoredEntry> {
	let sort_key =
		|entry: &StoredEntry| entry.values(&view.sort_by).first().map(|value| value.to_lowercase());
	matches.sort_by_key(|entry| sort_key(entry));
	if matches.is_empty() {
		return matches;
	}
	let target = view.offset.clamp(1, matches.len()) - 1;
	let start = target.saturating_sub(view.before_count);
	let end = target.saturating_add(view.after_count).min(matches.len() - 1);
	matches.drain(start..=end).collect()
}

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
	/// All filters match
	And(Vec<Filter>),
	/// Any filter matches
	Or(Vec<Filter>),
	/// The filter does not match
	Not(Box<Filter>),
	/// The attribute has a value
	Present(String),
	/// A value equals the given one
	Equal(String, String),
	/// A value consists of the given pieces with anything in between, the
	/// first and last piece anchored unless empty
	Substring(String, Vec<String>),
	/// A value is at least the given one
	GreaterOrEqual(String, String),
	/// A value is at most the given one
	LessOrEqual(String, String),
}

impl Filter {
	/// Parse the string representation of RFC 4515.
	fn parse(filter: &str) -> Option<Filter> {
		let (filter, rest) = Self::parse_one(filter.trim())?;
		rest.is_empty().then_some(filter)
	}

	/// Parse one parenthesized filter, returning the unparsed remainder.
	fn parse_one(input: &str) -> Option<(Filter, &str)> {
		let input = input.strip_prefix('(')?;
		let (filter, rest) = match input.chars().next()? {
			'&' => {
				let (filters, rest) = Self::parse_list(&input[1..])?;
				(Filter::And(filters), rest)
			}
			'|' => {
				let (filters, rest) = Self::parse_list(&input[1..])?;
				(Filter::Or(filters), rest)
			}
			'!' => {
				let (filter, rest) = Self::parse_one(&input[1..])?;
				(Filter::Not(Box::new(filter)), rest)
			}
			_ => {
				let end = input.find(')')?;
				(Self::parse_item(&input[..end])?, &input[end..])
			}
		};
		Some((filter, rest.strip_prefix(')')?))
	}

	/// Parse filters until the closing parenthesis of the enclosing set.
	fn parse_list(mut input: &str) -> Option<(Vec<Filter>, &str)> {
		let mut filters = Vec::new();
		while input.starts_with('(') {
			let (filter, rest) = Self::parse_one(input)?;
			filters.push(filter);
			input = rest;
		}
		Some((filters, input))
	}

	/// Parse a simple `attribute<op>value` item.
	fn parse_item(item: &str) -> Option<Filter> {
		let equals = item.find('=')?;
		let (attr, value) = (&item[..equals], &item[equals + 1..]);
		if let Some(attr) = attr.strip_suffix('>') {
			return Some(Filter::GreaterOrEqual(attr.to_owned(), unescape(value)?));
		}
		if let Some(attr) = attr.strip_suffix('<') {
			return Some(Filter::LessOrEqual(attr.to_owned(), unescape(value)?));
		}
		let attr = attr.strip_suffix('~').unwrap_or(attr).to_owned();
		if attr.is_empty() {
			return None;
		}
		if value == "*" {
			return Some(Filter::Present(attr));
		}
		if value.contains('*') {
			let pieces = value.split('*').map(unescape).collect::<Option<Vec<_>>>()?;
			return Some(Filter::Substring(attr, pieces));
		}
		Some(Filter::Equal(attr, unescape(value)?))
	}

	/// Whether `entry` matches the filter.
	fn matches(&self, entry: &StoredEntry) -> bool {
		let any = |attr: &str, check: &dyn Fn(&str) -> bool| {
			entry.values(attr).iter().any(|value| check(&value.to_lowercase()))
		};
		match self {
			Filter::And(filters) => filters.iter().all(|filter| filter.matches(entry)),
			Filter::Or(filters) => filters.iter().any(|filter| filter.matches(entry)),
			Filter::Not(filter) => !filter.matches(entry),
			Filter::Present(attr) => {
				attr.eq_ignore_ascii_case("objectClass") || !entry.values(attr).is_empty()
			}
			Filter::Equal(attr, expected) => any(attr, &|value| value == expected.to_lowercase()),
			Filter::GreaterOrEqual(attr, bound) => {
				any(attr, &|value| value >= bound.to_lowercase().as_str())
			}
			Filter::LessOrEqual(attr, bound) => {
				any(attr, &|value| value <= bound.to_lowercase().as_str())
			}
			Filter::Substring(attr, pieces) => any(attr, &|value| substring_matches(value, pieces)),
		}
	}
}

/// Match `value` against the pieces of a substring filter.
fn substring_matches(value: &str, pieces: &[String]) -> bool {
	let pieces: Vec<String> = pieces.iter().map(|piece| piece.to_lowercase()).collect();
	let Some((initial, rest)) = pieces.split_first() else {
		return true;
	};
	let Some(mut remainder) = value.strip_prefix(initial.as_str()) else {
		return false;
	};
	let Some((last, middle)) = rest.split_last() else {
		return remainder.is_empty();
	};
	for piece in middle {
		match remainder.find(piece.as_str()) {
			Some(index) => remainder = &remainder[index + piece.len()..],
			None => return false,
		}
	}
	remainder.ends_with(last.as_str())
}

/// Resolve the `\XX` escapes of a filter value.
fn unescape(value: &str) -> Option<String> {
	let mut bytes = Vec::with_capacity(value.len());
	let mut rest = value.as_bytes();
	while let Some((&byte, tail)) = rest.split_first() {
		if byte == b'\\' {
			let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
			bytes.push(u8::from_str_radix(hex, 16).ok()?);
			rest = &tail[2..];
		} else {
			bytes.push(byte);
			rest = tail;
		}
	}
	String::from_utf8(bytes).ok()
}
