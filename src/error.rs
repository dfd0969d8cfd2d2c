//! Error codes
use std::sync::Arc;

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The configuration is incomplete or contradictory.
	#[error("Invalid configuration: {0}")]
	Config(String),
	/// A caller passed an argument the operation cannot work with.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	/// The server sent data which did not conform to the expected syntax.
	#[error("Malformed data: {0}")]
	Invalid(String),
	/// The repository does not support modifications.
	#[error("The user repository is read-only")]
	ReadOnly,
	/// A failure of the underlying user repository, shared between all
	/// callers which were waiting for the same lookup.
	#[error("User repository lookup failed: {0}")]
	Repository(Arc<Error>),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
	/// Reading a file failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// A configuration file could not be deserialized.
	#[error(transparent)]
	Toml(#[from] toml::de::Error),
}
