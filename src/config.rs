//! Config for the LDAP user lookup.
use std::{path::Path, time::Duration};

use ldap3::LdapConnSettings;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::Error, name};

/// Top level configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
	/// How to reach the directory server
	pub server: ServerConfig,
	/// Where and how to find user entries
	pub users: EntryConfig,
	/// Caching of repository lookups
	#[serde(default)]
	pub cache: CacheConfig,
}

impl Config {
	/// Read a TOML configuration file and validate it.
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
		let content = tokio::fs::read_to_string(path).await?;
		let config: Config = toml::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	/// Check that the configuration can be used for lookups.
	pub fn validate(&self) -> Result<(), Error> {
		match self.server.url.scheme() {
			"ldap" | "ldaps" | "ldapi" => {}
			scheme => return Err(Error::Config(format!("unsupported URL scheme `{scheme}`"))),
		}
		self.users.validate()
	}
}

/// The directory server.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
	/// The DN of the search user. Searches are anonymous if empty.
	#[serde(default)]
	pub search_user: String,
	/// The password for the search user
	#[serde(default)]
	pub search_password: String,
	/// Whether the server implements the [virtual list view] control. Paged
	/// listings are sliced client-side otherwise.
	///
	/// [virtual list view]: https://datatracker.ietf.org/doc/html/draft-ietf-ldapext-ldapv3-vlv-09
	#[serde(default)]
	pub virtual_list_view_support: bool,
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,
	/// LDAP operation timeout.
	pub operation_timeout: Duration,
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,
	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			timeout: 5,
			operation_timeout: Duration::from_secs(30),
			starttls: false,
			no_tls_verify: false,
		}
	}
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) fn to_settings(&self) -> LdapConnSettings {
		LdapConnSettings::new()
			.set_conn_timeout(Duration::from_secs(self.timeout))
			.set_starttls(self.starttls)
			.set_no_tls_verify(self.no_tls_verify)
	}
}

/// How names of entries are presented to the application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameType {
	/// The value of the relative distinguished name, e.g. `john`
	#[default]
	Value,
	/// The relative distinguished name, e.g. `uid=john`
	Rdn,
	/// The full distinguished name, e.g. `uid=john,ou=people,dc=example,dc=com`
	Dn,
}

/// Describes where and how to find one class of entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryConfig {
	/// The DN of the container holding the entries
	pub base: String,
	/// The attribute making up the relative distinguished name of an entry
	pub rdn_attribute: String,
	/// How entry names are returned
	#[serde(default)]
	pub name_type: NameType,
	/// Filter every lookup is restricted to
	#[serde(default = "default_filter")]
	pub filter: String,
	/// The attribute holding the e-mail address
	#[serde(default = "default_email_attribute")]
	pub email_attribute: String,
	/// Further attributes matched when searching by name
	#[serde(default)]
	pub attributes: Vec<String>,
	/// If set, full fetches use the [simple paged search control] with this
	/// page size
	///
	/// [simple paged search control]: https://www.rfc-editor.org/rfc/rfc2696.html
	#[serde(default)]
	pub page_size: Option<i32>,
	/// Domain reported for users of this directory
	#[serde(default)]
	pub domain: Option<String>,
}

/// The filter used when none is configured.
fn default_filter() -> String {
	"(objectClass=*)".to_owned()
}

/// The e-mail attribute of `inetOrgPerson`.
fn default_email_attribute() -> String {
	"mail".to_owned()
}

impl EntryConfig {
	/// The addressable path of the container on the given server.
	#[must_use]
	pub fn path(&self, server: &Url) -> String {
		name::get_path(server.as_str(), &self.base)
	}

	/// Check that the required fields are set.
	pub fn validate(&self) -> Result<(), Error> {
		if self.base.trim().is_empty() {
			return Err(Error::Config("the entry base must not be empty".to_owned()));
		}
		if self.rdn_attribute.trim().is_empty() {
			return Err(Error::Config("the RDN attribute must not be empty".to_owned()));
		}
		if self.filter.trim().is_empty() {
			return Err(Error::Config("the entry filter must not be empty".to_owned()));
		}
		if matches!(self.page_size, Some(size) if size <= 0) {
			return Err(Error::Config("the page size must be positive".to_owned()));
		}
		Ok(())
	}

	/// Returns an example EntryConfig
	#[allow(dead_code)]
	pub(crate) fn example() -> Self {
		EntryConfig {
			base: "ou=people,dc=example,dc=com".to_owned(),
			rdn_attribute: "uid".to_owned(),
			name_type: NameType::Value,
			filter: "(objectClass=inetOrgPerson)".to_owned(),
			email_attribute: default_email_attribute(),
			attributes: vec!["cn".to_owned(), "displayName".to_owned()],
			page_size: None,
			domain: None,
		}
	}
}

/// Configuration of the user cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Cache lookups at all
	pub enabled: bool,
	/// Seconds after which a cached value is fetched again. Values are only
	/// dropped on writes if unset.
	pub ttl: Option<u64>,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self { enabled: true, ttl: None }
	}
}

impl CacheConfig {
	/// The time to live as a [`Duration`]
	#[must_use]
	pub fn ttl(&self) -> Option<Duration> {
		self.ttl.map(Duration::from_secs)
	}
}
