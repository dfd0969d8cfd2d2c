//! Users and their properties.
//!
//! [`UserRepository`] is the interface user stores implement;
//! [`CachingUserRepository`](crate::cache::CachingUserRepository) wraps any of
//! them. [`DirectoryUserRepository`] is a read-only store over the user
//! entries of a directory.
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
	context::Context,
	entry::Entry,
	error::Error,
	filter, name,
	users::UserEntries,
};

/// A named property with its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
	/// Name of the property
	pub name: String,
	/// Values of the property, in order
	pub values: Vec<String>,
}

/// The properties of a user in one context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyCollection {
	/// The context the properties belong to
	pub context: Context,
	/// The properties
	pub properties: Vec<Property>,
}

impl PropertyCollection {
	/// An empty collection in `context`.
	#[must_use]
	pub fn new(context: Context) -> Self {
		Self { context, properties: Vec::new() }
	}

	/// Look up a property; names are compared case-insensitively.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Property> {
		self.properties.iter().find(|property| property.name.eq_ignore_ascii_case(name))
	}

	/// The first value of a property.
	#[must_use]
	pub fn first(&self, name: &str) -> Option<&str> {
		self.get(name).and_then(|property| property.values.first()).map(String::as_str)
	}

	/// Set the values of a property, replacing previous ones.
	pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
		let name = name.into();
		let existing =
			self.properties.iter_mut().find(|property| property.name.eq_ignore_ascii_case(&name));
		match existing {
			Some(property) => property.values = values,
			None => self.properties.push(Property { name, values }),
		}
	}
}

/// A user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
	/// Identifier, unique within the repository
	pub id: String,
	/// The user name
	pub user_name: String,
	/// The domain the user belongs to, if the repository has domains
	pub domain: Option<String>,
	/// Properties in the default context
	pub properties: PropertyCollection,
}

/// A condition on a property of users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
	/// The property to check
	pub property: String,
	/// The value it must have
	pub value: String,
	/// Whether users must match this condition, or any of the optional ones
	pub required: bool,
}

impl SearchCriteria {
	/// A condition users must match.
	#[must_use]
	pub fn required(property: impl Into<String>, value: impl Into<String>) -> Self {
		Self { property: property.into(), value: value.into(), required: true }
	}

	/// A condition of which users must match at least one.
	#[must_use]
	pub fn optional(property: impl Into<String>, value: impl Into<String>) -> Self {
		Self { property: property.into(), value: value.into(), required: false }
	}
}

/// The properties a context holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSchema {
	/// Names of the properties
	pub properties: Vec<String>,
}

/// A store of users.
#[async_trait]
pub trait UserRepository: fmt::Debug + Send + Sync {
	/// The user with the identifier `id`.
	async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, Error>;
	/// The user called `user_name` in `domain`.
	async fn get_user_by_user_name(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<Option<User>, Error>;
	/// The users matching the criteria.
	async fn get_users_by_search_criteria(
		&self,
		criteria: &[SearchCriteria],
	) -> Result<Vec<User>, Error>;
	/// All users of `domain`.
	async fn get_users_by_domain(&self, domain: &str) -> Result<Vec<User>, Error>;
	/// Names of all domains.
	async fn get_domains(&self) -> Result<Vec<String>, Error>;
	/// A new user which is not saved yet.
	async fn create_user_instance(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<User, Error>;
	/// Store a user.
	async fn save_user(&self, user: &User) -> Result<(), Error>;
	/// Store several users.
	async fn save_users(&self, users: &[User]) -> Result<(), Error>;
	/// Change the password of a user.
	async fn set_password(&self, user: &User, password: &str) -> Result<(), Error>;
	/// Whether `password` is the password of the user.
	async fn check_password(&self, user: &User, password: &str) -> Result<bool, Error>;
	/// Store properties of a user in the context of the collection.
	async fn save_properties(
		&self,
		user: &User,
		properties: &PropertyCollection,
	) -> Result<(), Error>;
	/// Remove a user.
	async fn delete_user(&self, user: &User) -> Result<(), Error>;
	/// An empty property collection with all properties of `context`.
	async fn get_properties(&self, context: &Context) -> Result<PropertyCollection, Error>;
	/// The properties of a user in `context`, if the user has any there.
	async fn get_user_properties(
		&self,
		user: &User,
		context: &Context,
	) -> Result<Option<PropertyCollection>, Error>;
	/// All contexts besides the default one.
	async fn get_contexts(&self) -> Result<Vec<Context>, Error>;
	/// The context called `name`.
	async fn get_context(&self, name: &str) -> Result<Option<Context>, Error>;
	/// Create a context holding the properties of `schema`.
	async fn create_context(&self, name: &str, schema: &ContextSchema) -> Result<Context, Error>;
	/// Remove a context with all properties stored in it.
	async fn delete_context(&self, context: &Context) -> Result<(), Error>;
	/// The properties of the default context.
	async fn get_default_context_schema(&self) -> Result<ContextSchema, Error>;
}

/// A read-only [`UserRepository`] over the user entries of a directory. Users
/// are identified by the DN of their entry, and their properties are the
/// attributes of the entry, all in the default context.
#[derive(Debug, Clone)]
pub struct DirectoryUserRepository {
	/// The user entries
	entries: UserEntries,
}

impl DirectoryUserRepository {
	/// Serve the users of `entries`.
	#[must_use]
	pub fn new(entries: UserEntries) -> Self {
		Self { entries }
	}

	/// Convert an entry with loaded attributes to a user.
	fn user(&self, entry: Entry) -> User {
		let config = self.entries.users();
		let user_name = name::get_name(config.name_type, &entry.dn);
		let properties = PropertyCollection {
			context: Context::default(),
			properties: entry
				.attrs
				.into_iter()
				.map(|(name, values)| Property { name, values })
				.collect(),
		};
		User { id: entry.dn, user_name, domain: config.domain.clone(), properties }
	}

	/// Whether `domain` is the domain of the users.
	fn in_domain(&self, domain: Option<&str>) -> bool {
		match (domain, &self.entries.users().domain) {
			(None, _) => true,
			(Some(domain), Some(own)) => domain.eq_ignore_ascii_case(own),
			(Some(domain), None) => domain.is_empty(),
		}
	}
}

#[async_trait]
impl UserRepository for DirectoryUserRepository {
	async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, Error> {
		let entry = self.entries.get_user_entry_and_load_properties(id).await?;
		Ok(entry.map(|entry| self.user(entry)))
	}

	async fn get_user_by_user_name(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<Option<User>, Error> {
		if !self.in_domain(domain) {
			debug!(user_name, domain, "User requested for a foreign domain");
			return Ok(None);
		}
		// User names of the form `uid=john` are looked up by their value.
		let rdn_attribute = &self.entries.users().rdn_attribute;
		let rdns = name::parse_dn(user_name);
		let user_name = match rdns.as_deref() {
			Some([rdn]) if rdn.attribute.eq_ignore_ascii_case(rdn_attribute) => rdn.value.as_str(),
			_ => user_name,
		};
		let entry = self.entries.get_user_entry_and_load_properties(user_name).await?;
		Ok(entry.map(|entry| self.user(entry)))
	}

	async fn get_users_by_search_criteria(
		&self,
		criteria: &[SearchCriteria],
	) -> Result<Vec<User>, Error> {
		let clauses = |required: bool| {
			criteria
				.iter()
				.filter(|criteria| criteria.required == required)
				.map(|criteria| filter::equality(&criteria.property, &criteria.value))
				.collect::<Vec<_>>()
		};
		let (required, optional) = (clauses(true), clauses(false));
		let required = filter::and(required.iter().map(String::as_str));
		let optional = filter::or(optional.iter().map(String::as_str));
		let criteria = filter::and([required.as_str(), optional.as_str()]);
		let entries = self.entries.find_all_users_matching(&criteria).await?;
		Ok(entries.into_iter().map(|entry| self.user(entry)).collect())
	}

	async fn get_users_by_domain(&self, domain: &str) -> Result<Vec<User>, Error> {
		if !self.in_domain(Some(domain)) {
			return Ok(Vec::new());
		}
		let entries = self.entries.find_all_users_matching("").await?;
		Ok(entries.into_iter().map(|entry| self.user(entry)).collect())
	}

	async fn get_domains(&self) -> Result<Vec<String>, Error> {
		Ok(self.entries.users().domain.iter().cloned().collect())
	}

	async fn create_user_instance(
		&self,
		_user_name: &str,
		_domain: Option<&str>,
	) -> Result<User, Error> {
		Err(Error::ReadOnly)
	}

	async fn save_user(&self, _user: &User) -> Result<(), Error> {
		Err(Error::ReadOnly)
	}

	async fn save_users(&self, _users: &[User]) -> Result<(), Error> {
		Err(Error::ReadOnly)
	}

	async fn set_password(&self, _user: &User, _password: &str) -> Result<(), Error> {
		Err(Error::ReadOnly)
	}

	async fn check_password(&self, user: &User, password: &str) -> Result<bool, Error> {
		Ok(self.entries.authenticate(&user.id, password).await?.is_some())
	}

	async fn save_properties(
		&self,
		_user: &User,
		_properties: &PropertyCollection,
	) -> Result<(), Error> {
		Err(Error::ReadOnly)
	}

	async fn delete_user(&self, _user: &User) -> Result<(), Error> {
		Err(Error::ReadOnly)
	}

	async fn get_properties(&self, context: &Context) -> Result<PropertyCollection, Error> {
		let mut properties = PropertyCollection::new(context.clone());
		if context.is_default() {
			for property in self.get_default_context_schema().await?.properties {
				properties.set(property, Vec::new());
			}
		}
		Ok(properties)
	}

	async fn get_user_properties(
		&self,
		user: &User,
		context: &Context,
	) -> Result<Option<PropertyCollection>, Error> {
		if !context.is_default() {
			return Ok(None);
		}
		let entry = self.entries.get_user_entry_and_load_properties(&user.id).await?;
		Ok(entry.map(|entry| self.user(entry).properties))
	}

	async fn get_contexts(&self) -> Result<Vec<Context>, Error> {
		Ok(Vec::new())
	}

	async fn get_context(&self, name: &str) -> Result<Option<Context>, Error> {
		Ok(name.is_empty().then(Context::default))
	}

	async fn create_context(&self, _name: &str, _schema: &ContextSchema) -> Result<Context, Error> {
		Err(Error::ReadOnly)
	}

	async fn delete_context(&self, _context: &Context) -> Result<(), Error> {
		Err(Error::ReadOnly)
	}

	async fn get_default_context_schema(&self) -> Result<ContextSchema, Error> {
		let config = self.entries.users();
		let mut properties: Vec<String> = Vec::new();
		let names = [&config.rdn_attribute, &config.email_attribute].into_iter();
		for name in names.chain(&config.attributes) {
			if !properties.iter().any(|known| known.eq_ignore_ascii_case(name)) {
				properties.push(name.clone());
			}
		}
		Ok(ContextSchema { properties })
	}
}

#[cfg(test)]
mod tests {
	use super::{Property, PropertyCollection};
	use crate::context::Context;

	#[test]
	fn property_lookup_ignores_case() {
		let mut properties = PropertyCollection::new(Context::default());
		properties.set("displayName", vec!["John Doe".to_owned()]);
		properties.set("DISPLAYNAME", vec!["Johnny".to_owned(), "JD".to_owned()]);
		properties.set("mail", Vec::new());

		assert_eq!(properties.properties.len(), 2);
		assert_eq!(properties.first("displayname"), Some("Johnny"));
		assert_eq!(properties.first("mail"), None);
		assert_eq!(
			properties.get("Mail"),
			Some(&Property { name: "mail".to_owned(), values: Vec::new() })
		);
		assert!(properties.get("cn").is_none());
	}
}
