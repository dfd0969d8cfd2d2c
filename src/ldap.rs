//! Client for searching an LDAP server

use async_trait::async_trait;
use ldap3::{
	adapters::{Adapter, EntriesOnly, PagedResults},
	LdapConnAsync, LdapResult, SearchEntry,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
	config::{Config, ServerConfig},
	directory::{Credentials, Directory, Outcome, SearchRequest, SearchResults},
	entry::Entry,
	error::Error,
	vlv,
};

/// LDAP result code for a missing base entry
const NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code for rejected credentials
const INVALID_CREDENTIALS: u32 = 49;

/// A [`Directory`] on an LDAP server. Every search opens its own connection,
/// which is closed again before the search returns.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
	/// How to reach the server
	config: ServerConfig,
	/// If set, searches without a virtual list view use the simple paged
	/// results control with this page size
	page_size: Option<i32>,
}

/// An open, bound connection.
struct Session {
	/// The LDAP handle
	ldap: ldap3::Ldap,
	/// The task driving the connection
	driver: JoinHandle<()>,
}

impl Session {
	/// Unbind and wait for the connection to shut down.
	async fn close(mut self) {
		if let Err(err) = self.ldap.unbind().await {
			warn!("Failed to unbind from LDAP server: {err}");
		}
		if let Err(err) = (&mut self.driver).await {
			warn!("Failed to join background task: {err}");
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		// Closed sessions are already finished, anything else was interrupted.
		self.driver.abort();
	}
}

impl LdapDirectory {
	/// Search the server described by `config`.
	#[must_use]
	pub fn new(config: ServerConfig) -> Self {
		Self { config, page_size: None }
	}

	/// Search the server of `config`, fetching user listings in pages of the
	/// configured size.
	#[must_use]
	pub fn from_config(config: &Config) -> Self {
		Self::new(config.server.clone()).with_page_size(config.users.page_size)
	}

	/// Use the [simple paged results control] with pages of `page_size`
	/// entries when fetching complete results.
	///
	/// [simple paged results control]: https://www.rfc-editor.org/rfc/rfc2696.html
	#[must_use]
	pub fn with_page_size(mut self, page_size: Option<i32>) -> Self {
		self.page_size = page_size;
		self
	}

	/// Create a connection to the ldap server and bind, either as `credentials`
	/// or as the configured search user. Returns `None` if the server rejects
	/// the credentials.
	async fn connect(&self, credentials: Option<&Credentials>) -> Result<Option<Session>, Error> {
		let settings = self.config.connection.to_settings();
		let (conn, ldap) = LdapConnAsync::from_url_with_settings(settings, &self.config.url).await?;
		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});
		let mut session = Session { ldap, driver };

		let (dn, password) = match credentials {
			Some(credentials) => (credentials.dn.as_str(), credentials.password()),
			None if self.config.search_user.is_empty() => return Ok(Some(session)),
			None => (self.config.search_user.as_str(), self.config.search_password.as_str()),
		};
		let result = session
			.ldap
			.with_timeout(self.config.connection.operation_timeout)
			.simple_bind(dn, password)
			.await?;
		if result.rc == INVALID_CREDENTIALS {
			debug!(dn, "Bind rejected");
			session.close().await;
			return Ok(None);
		}
		result.success()?;
		Ok(Some(session))
	}

	/// Run `request` on an open session.
	async fn run(&self, session: &mut Session, request: &SearchRequest) -> Result<Outcome, Error> {
		let mut controls = Vec::new();
		let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
		if let Some(view) = &request.view {
			controls.push(vlv::sort_control(&view.sort_by)?);
			controls.push(vlv::view_control(view)?);
		} else if let Some(page_size) = self.page_size {
			adapters.push(Box::new(PagedResults::new(page_size)));
		}

		let mut search = session
			.ldap
			.with_timeout(self.config.connection.operation_timeout)
			.with_controls(controls)
			.streaming_search_with(
				adapters,
				&request.base,
				request.scope,
				&request.filter,
				request.attributes.clone(),
			)
			.await?;

		let server = self.config.url.as_str();
		let mut entries = Vec::new();
		while let Some(entry) = search.next().await?.map(SearchEntry::construct) {
			entries.push(Entry::from_search(server, entry));
		}
		let result = search.finish().await;
		if result.rc == NO_SUCH_OBJECT {
			return Ok(Outcome::NoSuchObject);
		}
		let result = result.success()?;

		let content_count = match request.view {
			Some(_) => Some(view_content_count(&result)?),
			None => None,
		};
		Ok(Outcome::Found(SearchResults { entries, content_count }))
	}
}

/// The content count from the virtual list view response control of a
/// search.
fn view_content_count(result: &LdapResult) -> Result<usize, Error> {
	let control = result
		.ctrls
		.iter()
		.find(|control| control.1.ctype == vlv::VLV_RESPONSE_OID)
		.ok_or_else(|| Error::Invalid("virtual list view response missing".to_owned()))?;
	let value = control
		.1
		.val
		.as_deref()
		.ok_or_else(|| Error::Invalid("virtual list view response is empty".to_owned()))?;
	let response = vlv::parse_view_response(value)?;
	if response.result != 0 {
		return Err(Error::Invalid(format!(
			"virtual list view failed with result code {}",
			response.result
		)));
	}
	Ok(response.content_count)
}

#[async_trait]
impl Directory for LdapDirectory {
	async fn search(
		&self,
		request: &SearchRequest,
		credentials: Option<&Credentials>,
	) -> Result<Outcome, Error> {
		let Some(mut session) = self.connect(credentials).await? else {
			return Ok(Outcome::Rejected);
		};
		let outcome = self.run(&mut session, request).await;
		session.close().await;
		outcome
	}
}
