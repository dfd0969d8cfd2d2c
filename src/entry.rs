//! Directory entries and collections of them.
use std::collections::HashMap;

use ldap3::SearchEntry;

use crate::name;

/// An extension trait for [`SearchEntry`] that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Get the first value of an attribute. Will return `None` if attribute
	/// value is not valid UTF-8.
	fn attr_first(&self, attr: &str) -> Option<&str>;

	/// Get the first value of an attribute, in binary form
	fn bin_attr_first(&self, attr: &str) -> Option<&[u8]>;
}

impl SearchEntryExt for SearchEntry {
	fn attr_first(&self, attr: &str) -> Option<&str> {
		lookup(&self.attrs, attr)?.first().map(String::as_str)
	}

	fn bin_attr_first(&self, attr: &str) -> Option<&[u8]> {
		if let Some(values) = lookup(&self.attrs, attr) {
			return values.first().map(String::as_bytes);
		}
		lookup(&self.bin_attrs, attr)?.first().map(Vec::as_slice)
	}
}

/// Look up an attribute, ignoring the case of its name as servers may return
/// it spelled differently than requested.
fn lookup<'a, V>(attrs: &'a HashMap<String, V>, attr: &str) -> Option<&'a V> {
	attrs.get(attr).or_else(|| {
		attrs.iter().find(|(name, _)| name.eq_ignore_ascii_case(attr)).map(|(_, values)| values)
	})
}

/// A record found in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	/// Addressable location of the entry, `ldap://host:port/<dn>`
	pub path: String,
	/// The distinguished name
	pub dn: String,
	/// Text attributes
	pub attrs: HashMap<String, Vec<String>>,
	/// Attributes whose values are not valid UTF-8
	pub bin_attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl Entry {
	/// Wrap a search result of the server at `server`.
	#[must_use]
	pub fn from_search(server: &str, entry: SearchEntry) -> Self {
		Self {
			path: name::get_path(server, &entry.dn),
			dn: entry.dn,
			attrs: entry.attrs,
			bin_attrs: entry.bin_attrs,
		}
	}

	/// All text values of an attribute, in the order the server returned them.
	#[must_use]
	pub fn values(&self, attr: &str) -> &[String] {
		lookup(&self.attrs, attr).map(Vec::as_slice).unwrap_or_default()
	}
}

impl SearchEntryExt for Entry {
	fn attr_first(&self, attr: &str) -> Option<&str> {
		self.values(attr).first().map(String::as_str)
	}

	fn bin_attr_first(&self, attr: &str) -> Option<&[u8]> {
		if let Some(value) = self.attr_first(attr) {
			return Some(value.as_bytes());
		}
		lookup(&self.bin_attrs, attr)?.first().map(Vec::as_slice)
	}
}

/// The number of records matching a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalRecords {
	/// Counted from the complete result set
	Exact(usize),
	/// The server's estimate, as reported for virtual list views. May be off
	/// when the directory changes between requests.
	Approximate(usize),
}

impl TotalRecords {
	/// The count, whether exact or not.
	#[must_use]
	pub fn count(self) -> usize {
		match self {
			TotalRecords::Exact(count) | TotalRecords::Approximate(count) => count,
		}
	}
}

/// An ordered page of entries and the total number of matching records, which
/// exceeds the length of the page when only part of the result was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCollection {
	/// The entries in this collection
	entries: Vec<Entry>,
	/// The number of records in the complete result
	total: TotalRecords,
}

impl Default for EntryCollection {
	fn default() -> Self {
		Self { entries: Vec::new(), total: TotalRecords::Exact(0) }
	}
}

impl EntryCollection {
	/// A collection holding the complete result of a search.
	#[must_use]
	pub fn new(entries: Vec<Entry>) -> Self {
		let total = TotalRecords::Exact(entries.len());
		Self { entries, total }
	}

	/// A collection holding one page of a larger result.
	#[must_use]
	pub fn with_total(entries: Vec<Entry>, total: TotalRecords) -> Self {
		Self { entries, total }
	}

	/// The number of records in the complete result.
	#[must_use]
	pub fn total_records(&self) -> TotalRecords {
		self.total
	}

	/// Number of entries materialized in this collection.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether no entries were materialized.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterate over the entries.
	pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
		self.entries.iter()
	}

	/// Slice out page `page_index` of `page_size` entries. Pages past the end
	/// are empty. The total is kept.
	#[must_use]
	pub fn paged(self, page_index: usize, page_size: usize) -> Self {
		let start = page_index.saturating_mul(page_size);
		let entries =
			self.entries.into_iter().skip(start).take(page_size).collect::<Vec<_>>();
		Self { entries, total: self.total }
	}

	/// Take the entries out of the collection.
	#[must_use]
	pub fn into_entries(self) -> Vec<Entry> {
		self.entries
	}
}

impl IntoIterator for EntryCollection {
	type Item = Entry;
	type IntoIter = std::vec::IntoIter<Entry>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_iter()
	}
}

impl<'a> IntoIterator for &'a EntryCollection {
	type Item = &'a Entry;
	type IntoIter = std::slice::Iter<'a, Entry>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}
