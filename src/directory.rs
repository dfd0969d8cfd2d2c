//! Access to entries of a directory server.
//!
//! The [`Directory`] trait is the only place where the library talks to a
//! server. [`LdapDirectory`](crate::ldap::LdapDirectory) implements it over
//! the network, [`MemoryDirectory`](crate::memory::MemoryDirectory) in memory.
//! On top of it, [`EntryProvider`] hands out lazily bound [`EntryHandle`]s from
//! which [`Searcher`]s are created.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
pub use ldap3::Scope;
use tracing::debug;

use crate::{config::EntryConfig, entry::Entry, error::Error, filter, name};

/// Request all user attributes of an entry.
pub const ALL_ATTRIBUTES: &str = "*";
/// Request no attributes at all, only the DN.
pub const NO_ATTRIBUTES: &str = "1.1";
/// Filter matching every entry.
pub const ANY_OBJECT: &str = "(objectClass=*)";

/// Credentials to bind as.
#[derive(Clone)]
pub struct Credentials {
	/// The DN to bind as
	pub dn: String,
	/// The password
	password: String,
}

impl Credentials {
	/// Credentials for a simple bind.
	#[must_use]
	pub fn new(dn: impl Into<String>, password: impl Into<String>) -> Self {
		Self { dn: dn.into(), password: password.into() }
	}

	/// The password to bind with.
	#[must_use]
	pub fn password(&self) -> &str {
		&self.password
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials").field("dn", &self.dn).finish_non_exhaustive()
	}
}

/// A window into a sorted result, as requested with the [virtual list view]
/// control. Offsets are 1-based.
///
/// [virtual list view]: https://datatracker.ietf.org/doc/html/draft-ietf-ldapext-ldapv3-vlv-09
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualListView {
	/// Entries before the target entry
	pub before_count: usize,
	/// Entries after the target entry
	pub after_count: usize,
	/// Position of the target entry
	pub offset: usize,
	/// The client's estimate of the result size, 0 if unknown
	pub content_count: usize,
	/// The attribute the result is sorted by on the server
	pub sort_by: String,
}

impl VirtualListView {
	/// The window holding page `page_index` of `page_size` entries.
	#[must_use]
	pub fn page(page_index: usize, page_size: usize, sort_by: impl Into<String>) -> Self {
		Self {
			before_count: 0,
			after_count: page_size.saturating_sub(1),
			offset: page_index.saturating_mul(page_size).saturating_add(1),
			content_count: 0,
			sort_by: sort_by.into(),
		}
	}
}

/// Parameters of a search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
	/// DN of the entry the search starts at
	pub base: String,
	/// How far below the base to search
	pub scope: Scope,
	/// The search filter
	pub filter: String,
	/// Attributes to return
	pub attributes: Vec<String>,
	/// If set, only return this window of the sorted result
	pub view: Option<VirtualListView>,
}

/// Entries returned by a search.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
	/// The entries, in the order the server sent them
	pub entries: Vec<Entry>,
	/// The server's estimate of the complete result size when a virtual list
	/// view was requested
	pub content_count: Option<usize>,
}

/// The result of running a search.
#[derive(Debug)]
pub enum Outcome {
	/// The search was executed
	Found(SearchResults),
	/// The base entry of the search does not exist
	NoSuchObject,
	/// The server rejected the credentials the search was to be run with
	Rejected,
}

impl Outcome {
	/// The search results, or `None` if the search could not start.
	#[must_use]
	pub fn found(self) -> Option<SearchResults> {
		match self {
			Outcome::Found(results) => Some(results),
			Outcome::NoSuchObject | Outcome::Rejected => None,
		}
	}
}

/// A directory server.
#[async_trait]
pub trait Directory: fmt::Debug + Send + Sync {
	/// Run a search, bound as the configured search user or, if given, as
	/// `credentials`. A missing base entry and rejected credentials are
	/// reported through the [`Outcome`], failures to talk to the server as
	/// errors.
	async fn search(
		&self,
		request: &SearchRequest,
		credentials: Option<&Credentials>,
	) -> Result<Outcome, Error>;
}

/// Hands out handles to entries of a directory.
#[derive(Debug, Clone)]
pub struct EntryProvider {
	/// The directory the entries live in
	directory: Arc<dyn Directory>,
}

impl EntryProvider {
	/// Provide entries of `directory`.
	#[must_use]
	pub fn new(directory: Arc<dyn Directory>) -> Self {
		Self { directory }
	}

	/// A handle to the entry at `path`, which may be a DN or an addressable
	/// path. Whether the entry exists is not checked.
	#[must_use]
	pub fn entry(&self, path: &str) -> EntryHandle<'_> {
		EntryHandle { directory: &*self.directory, dn: name::get_dn(path), credentials: None }
	}

	/// A handle to the entry at `path` through which searches bind as
	/// `credentials`.
	#[must_use]
	pub fn entry_with_credentials<'a>(
		&'a self,
		path: &str,
		credentials: &'a Credentials,
	) -> EntryHandle<'a> {
		EntryHandle {
			directory: &*self.directory,
			dn: name::get_dn(path),
			credentials: Some(credentials),
		}
	}

	/// Find the entry called `name` among the entries described by `config`.
	/// `name` may be the value of the RDN attribute or the DN of the entry;
	/// either way the entry must match the configured filter. Only the RDN
	/// attribute is loaded.
	pub async fn resolve(&self, name: &str, config: &EntryConfig) -> Result<Option<Entry>, Error> {
		let attributes = [config.rdn_attribute.as_str()];
		if name::rdn_in_name(name, &config.rdn_attribute, &config.base) {
			return self
				.entry(name)
				.searcher(Scope::Base)
				.filter(config.filter.as_str())
				.attributes(attributes)
				.find_one()
				.await;
		}
		self.entry(&config.base)
			.searcher(Scope::Subtree)
			.filter(filter::attach_filter(&config.rdn_attribute, name, &config.filter))
			.attributes(attributes)
			.find_one()
			.await
	}
}

/// A lazily bound reference to an entry.
#[derive(Debug, Clone)]
pub struct EntryHandle<'a> {
	/// The directory holding the entry
	directory: &'a dyn Directory,
	/// DN of the entry
	dn: String,
	/// Credentials to search with instead of the search user's
	credentials: Option<&'a Credentials>,
}

impl<'a> EntryHandle<'a> {
	/// DN of the entry.
	#[must_use]
	pub fn dn(&self) -> &str {
		&self.dn
	}

	/// Check that the entry exists, returning it without attributes.
	pub async fn bind(&self) -> Result<Option<Entry>, Error> {
		self.searcher(Scope::Base).attributes([NO_ATTRIBUTES]).find_one().await
	}

	/// Prepare a search starting at this entry. It matches any entry and
	/// returns all attributes until configured otherwise.
	#[must_use]
	pub fn searcher(&self, scope: Scope) -> Searcher<'a> {
		Searcher {
			directory: self.directory,
			credentials: self.credentials,
			request: SearchRequest {
				base: self.dn.clone(),
				scope,
				filter: ANY_OBJECT.to_owned(),
				attributes: vec![ALL_ATTRIBUTES.to_owned()],
				view: None,
			},
		}
	}
}

/// A configured search.
#[derive(Debug, Clone)]
pub struct Searcher<'a> {
	/// The directory to search in
	directory: &'a dyn Directory,
	/// Credentials to search with instead of the search user's
	credentials: Option<&'a Credentials>,
	/// The search to run
	request: SearchRequest,
}

impl<'a> Searcher<'a> {
	/// Only match entries matching `filter`.
	#[must_use]
	pub fn filter(mut self, filter: impl Into<String>) -> Self {
		self.request.filter = filter.into();
		self
	}

	/// Return these attributes of the entries.
	#[must_use]
	pub fn attributes<I, S>(mut self, attributes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.request.attributes = attributes.into_iter().map(Into::into).collect();
		self
	}

	/// Only return a window of the result.
	#[must_use]
	pub fn view(mut self, view: VirtualListView) -> Self {
		self.request.view = Some(view);
		self
	}

	/// The search this searcher runs.
	#[must_use]
	pub fn request(&self) -> &SearchRequest {
		&self.request
	}

	/// The first matching entry in the order of the server. Which entry that is
	/// when several match is up to the server.
	pub async fn find_one(self) -> Result<Option<Entry>, Error> {
		Ok(self.find_all().await?.and_then(|results| results.entries.into_iter().next()))
	}

	/// All matching entries, or `None` if the base entry does not exist or the
	/// credentials were rejected.
	pub async fn find_all(self) -> Result<Option<SearchResults>, Error> {
		debug!(
			base = %self.request.base,
			filter = %self.request.filter,
			scope = ?self.request.scope,
			"Searching directory"
		);
		Ok(self.directory.search(&self.request, self.credentials).await?.found())
	}
}
