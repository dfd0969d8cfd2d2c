//! Look up users stored in an LDAP directory server.
//!
//! The library resolves user names, e-mail addresses and credentials to the
//! entries of users below a configured base entry, lists users page by page,
//! and puts a cache in front of repeated user and property lookups.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource. The site
//! "firstyear's blog-a-log" also has [a guide][firstyear] which is more
//! visually oriented and goes into more detail about searching
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//! [firstyear]: https://fy.blackhats.net.au/blog/html/pages/ldap_guide_part_1_foundations.html
//!
//! # Layers
//! * [`Directory`] is where searches are sent. [`LdapDirectory`] talks to a
//!   server, [`MemoryDirectory`] keeps entries in memory.
//! * [`UserEntries`] finds user entries, checks passwords and pages through
//!   listings, using [a virtual list view] if the server supports it.
//! * [`UserRepository`] is the interface of user stores.
//!   [`DirectoryUserRepository`] serves the users of [`UserEntries`] read-only,
//!   and [`CachingUserRepository`] caches the lookups of any store.
//!
//! [a virtual list view]: https://datatracker.ietf.org/doc/html/draft-ietf-ldapext-ldapv3-vlv-09
//!
//! # Getting started
//! A minimal example of looking up a user might look like so:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use url::Url;
//! use ldap_users::{
//!     config::{CacheConfig, Config, ConnectionConfig, EntryConfig, NameType, ServerConfig},
//!     CachingUserRepository, DirectoryUserRepository, LdapDirectory, UserEntries,
//!     UserRepository,
//! };
//!
//! // Configuration can also be loaded from a TOML file with `Config::load`.
//! // It's hand-constructed here for demonstration purposes.
//! let config = Arc::new(Config {
//!     server: ServerConfig {
//!         url: Url::parse("ldap://localhost")?,
//!         connection: ConnectionConfig::default(),
//!         search_user: "cn=admin,dc=example,dc=com".to_owned(),
//!         search_password: "verysecret".to_owned(),
//!         virtual_list_view_support: false,
//!     },
//!     users: EntryConfig {
//!         base: "ou=people,dc=example,dc=com".to_owned(),
//!         rdn_attribute: "uid".to_owned(),
//!         name_type: NameType::Value,
//!         filter: "(objectClass=inetOrgPerson)".to_owned(),
//!         email_attribute: "mail".to_owned(),
//!         attributes: vec!["cn".to_owned()],
//!         page_size: None,
//!         domain: None,
//!     },
//!     cache: CacheConfig::default(),
//! });
//!
//! let directory = Arc::new(LdapDirectory::from_config(&config));
//! let users = UserEntries::new(Arc::clone(&config), directory)?;
//!
//! let page = users.get_all_user_entries(0, 20).await?;
//! println!("First {} of about {} users", page.len(), page.total_records().count());
//!
//! let repository =
//!     CachingUserRepository::new(DirectoryUserRepository::new(users), config.cache.clone());
//! if let Some(user) = repository.get_user_by_user_name("john", None).await? {
//!     println!("Found {}: {:?}", user.id, user.properties.first("cn"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Every directory operation opens a new connection; there is no pool.
//! * [`DirectoryUserRepository`] is read-only, and has no contexts besides the
//!   default one.
//! * [secrecy](https://docs.rs/secrecy) is not used for storing passwords, it
//!   probably should be

pub mod cache;
pub mod config;
pub mod context;
pub mod directory;
pub mod entry;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod memory;
pub mod name;
pub mod repository;
pub mod users;
pub mod vlv;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	cache::CachingUserRepository,
	config::Config,
	context::Context,
	directory::{Directory, EntryProvider, Scope},
	entry::{Entry, EntryCollection, SearchEntryExt, TotalRecords},
	error::Error,
	ldap::LdapDirectory,
	memory::MemoryDirectory,
	repository::{DirectoryUserRepository, User, UserRepository},
	users::UserEntries,
};
