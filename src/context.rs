//! Named scopes for user properties
use std::fmt;

use unicase::UniCase;

use crate::error::Error;

/// A named group of user properties. Names compare and hash
/// case-insensitively, independent of the locale. The default context has an
/// empty name, which no other context may have.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context(UniCase<String>);

impl Context {
	/// The context called `name`.
	pub fn new(name: impl Into<String>) -> Result<Self, Error> {
		let name = name.into();
		if name.is_empty() {
			return Err(Error::InvalidArgument("context name can not be empty".to_owned()));
		}
		Ok(Self(UniCase::new(name)))
	}

	/// The name as it was given.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.0
	}

	/// Whether this is the default context.
	#[must_use]
	pub fn is_default(&self) -> bool {
		self.name().is_empty()
	}
}

impl Default for Context {
	fn default() -> Self {
		Self(UniCase::new(String::new()))
	}
}

impl fmt::Display for Context {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::collections::HashSet;

	use super::Context;

	#[test]
	fn names_are_case_insensitive() {
		let sales = Context::new("Sales").unwrap();
		assert_eq!(sales, Context::new("SALES").unwrap());
		assert_eq!(sales.name(), "Sales");

		let contexts: HashSet<_> = ["sales", "SALES", "Ärger"]
			.into_iter()
			.map(|name| Context::new(name).unwrap())
			.collect();
		assert_eq!(contexts.len(), 2);
		assert!(contexts.contains(&Context::new("äRGER").unwrap()));
	}

	#[test]
	fn default_context() {
		assert_eq!(Context::default().name(), "");
		assert!(Context::default().is_default());
		assert!(!Context::new("sales").unwrap().is_default());
		assert!(Context::new("").is_err());
	}
}
