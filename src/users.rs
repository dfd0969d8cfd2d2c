//! Lookup of user entries.
//!
//! [`UserEntries`] resolves user names, e-mail addresses and credentials to
//! entries below the configured user base, and lists users page by page.
//! Missing entries, including ones hidden by the configured filter, and
//! rejected credentials all come back as `None` or an empty collection; only
//! failures to talk to the directory are errors.
use std::sync::Arc;

use tracing::debug;

use crate::{
	config::{Config, EntryConfig},
	directory::{Credentials, Directory, EntryProvider, Scope, VirtualListView, ALL_ATTRIBUTES},
	entry::{Entry, EntryCollection, SearchEntryExt, TotalRecords},
	error::Error,
	filter, name, vlv,
};

/// Lookup of user entries in a directory.
#[derive(Debug, Clone)]
pub struct UserEntries {
	/// The configuration; only the server and user sections are used
	config: Arc<Config>,
	/// Access to the directory entries
	entries: EntryProvider,
}

impl UserEntries {
	/// Look up users in `directory` as described by `config`. Fails if the
	/// configuration is incomplete.
	pub fn new(config: Arc<Config>, directory: Arc<dyn Directory>) -> Result<Self, Error> {
		config.validate()?;
		Ok(Self { config, entries: EntryProvider::new(directory) })
	}

	/// The configuration of user entries.
	#[must_use]
	pub fn users(&self) -> &EntryConfig {
		&self.config.users
	}

	/// The entry of `username`, with only its RDN attribute loaded.
	pub async fn get_user_entry(&self, username: &str) -> Result<Option<Entry>, Error> {
		self.entries.resolve(username, self.users()).await
	}

	/// The entry of `username` with all of its attributes. Users excluded by
	/// the configured filter are not found.
	pub async fn get_user_entry_and_load_properties(
		&self,
		username: &str,
	) -> Result<Option<Entry>, Error> {
		match self.get_user_entry(username).await? {
			Some(user) => self.load_properties(&user.path, None).await,
			None => Ok(None),
		}
	}

	/// The first user with the e-mail address `email`. Which user that is when
	/// several share an address depends on the server.
	pub async fn get_user_entry_by_email(&self, email: &str) -> Result<Option<Entry>, Error> {
		self.entries
			.entry(&self.users().base)
			.searcher(Scope::Subtree)
			.filter(self.email_filter(email))
			.find_one()
			.await
	}

	/// The user name for `entry_name`, which may be a user name or the DN of a
	/// user entry. DNs below the user base are converted without asking the
	/// directory.
	pub async fn get_user_name(&self, entry_name: &str) -> Result<Option<String>, Error> {
		let users = self.users();
		if name::rdn_in_name(entry_name, &users.rdn_attribute, &users.base) {
			return Ok(Some(name::get_name(users.name_type, entry_name)));
		}
		let Some(entry) = self.get_user_entry(entry_name).await? else {
			return Ok(None);
		};
		Ok(entry.attr_first(&users.rdn_attribute).map(|rdn| name::get_name(users.name_type, rdn)))
	}

	/// The user names referenced by `attribute` of `entry`, such as the
	/// members of a group. References which cannot be resolved are skipped.
	pub async fn user_names_from_entry(
		&self,
		entry: &Entry,
		attribute: &str,
	) -> Result<Vec<String>, Error> {
		let mut names = Vec::new();
		for value in entry.values(attribute) {
			match self.get_user_name(value).await? {
				Some(name) => names.push(name),
				None => debug!(value, "Skipping unresolvable user reference"),
			}
		}
		Ok(names)
	}

	/// The entry of `username` if `password` is correct. The entry is read
	/// while bound as the user, and must still match the configured filter.
	/// Unknown users and wrong passwords are indistinguishable.
	pub async fn authenticate(
		&self,
		username: &str,
		password: &str,
	) -> Result<Option<Entry>, Error> {
		let Some(user) = self.get_user_entry(username).await? else {
			return Ok(None);
		};
		// An empty password would make an unauthenticated bind, which succeeds.
		if password.is_empty() {
			debug!(username, "Refusing to authenticate with an empty password");
			return Ok(None);
		}
		let credentials = Credentials::new(name::get_dn(&user.path), password);
		self.load_properties(&user.path, Some(&credentials)).await
	}

	/// All users, one page at a time.
	pub async fn get_all_user_entries(
		&self,
		page_index: usize,
		page_size: usize,
	) -> Result<EntryCollection, Error> {
		self.user_entries(self.users().filter.clone(), page_index, page_size).await
	}

	/// Users whose name matches `username`, one page at a time. The name is
	/// compared with the RDN attribute and all configured search attributes.
	pub async fn find_users_by_name(
		&self,
		username: &str,
		page_index: usize,
		page_size: usize,
	) -> Result<EntryCollection, Error> {
		let users = self.users();
		let filter = if users.attributes.is_empty() {
			filter::attach_filter(&users.rdn_attribute, username, &users.filter)
		} else {
			filter::attach_attribute_filters(
				username,
				&users.filter,
				&users.rdn_attribute,
				&users.attributes,
			)
		};
		self.user_entries(filter, page_index, page_size).await
	}

	/// Users with the e-mail address `email`, one page at a time.
	pub async fn find_users_by_email(
		&self,
		email: &str,
		page_index: usize,
		page_size: usize,
	) -> Result<EntryCollection, Error> {
		self.user_entries(self.email_filter(email), page_index, page_size).await
	}

	/// All users matching `filter` in addition to the configured filter, with
	/// all of their attributes.
	pub async fn find_all_users_matching(&self, filter: &str) -> Result<Vec<Entry>, Error> {
		let users = self.users();
		let results = self
			.entries
			.entry(&users.base)
			.searcher(Scope::Subtree)
			.filter(filter::and([users.filter.as_str(), filter]))
			.find_all()
			.await?;
		Ok(results.map(|results| results.entries).unwrap_or_default())
	}

	/// Filter for users with the e-mail address `email`.
	fn email_filter(&self, email: &str) -> String {
		let users = self.users();
		filter::attach_filter(&users.email_attribute, email, &users.filter)
	}

	/// Read all attributes of the entry at `path` if it matches the user
	/// filter.
	async fn load_properties(
		&self,
		path: &str,
		credentials: Option<&Credentials>,
	) -> Result<Option<Entry>, Error> {
		let entry = match credentials {
			Some(credentials) => self.entries.entry_with_credentials(path, credentials),
			None => self.entries.entry(path),
		};
		entry
			.searcher(Scope::Base)
			.filter(self.users().filter.as_str())
			.attributes([ALL_ATTRIBUTES])
			.find_one()
			.await
	}

	/// One page of the users matching `filter`.
	async fn user_entries(
		&self,
		filter: String,
		page_index: usize,
		page_size: usize,
	) -> Result<EntryCollection, Error> {
		if page_size == 0 {
			return Err(Error::InvalidArgument("the page size must be positive".to_owned()));
		}
		let users = self.users();
		let base = self.entries.entry(&users.base);
		if base.bind().await?.is_none() {
			debug!(base = %users.base, "User base does not exist");
			return Ok(EntryCollection::default());
		}

		let searcher = base.searcher(Scope::Subtree).filter(filter);
		if !self.config.server.virtual_list_view_support {
			let Some(results) = searcher.find_all().await? else {
				return Ok(EntryCollection::default());
			};
			return Ok(EntryCollection::new(results.entries).paged(page_index, page_size));
		}

		let mut view = VirtualListView::page(page_index, page_size, users.rdn_attribute.as_str());
		let offset = view.offset;
		// Larger offsets do not fit the control, and select the last entry anyway.
		view.offset = offset.min(vlv::MAX_INT);
		view.after_count = view.after_count.min(vlv::MAX_INT);
		let Some(results) = searcher.view(view).find_all().await? else {
			return Ok(EntryCollection::default());
		};
		let total = results.content_count.unwrap_or(results.entries.len());
		// Servers answer offsets past the end with the last entry.
		let entries = if offset > total {
			Vec::new()
		} else {
			results.entries.into_iter().take(page_size).collect()
		};
		Ok(EntryCollection::with_total(entries, TotalRecords::Approximate(total)))
	}
}
