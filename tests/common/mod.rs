#![allow(dead_code)]

use std::{
	collections::HashMap,
	error::Error as StdError,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use async_trait::async_trait;
use ldap3::LdapConnAsync;
use ldap_users::{
	config::{CacheConfig, Config, ConnectionConfig, EntryConfig, NameType, ServerConfig},
	repository::{ContextSchema, PropertyCollection, SearchCriteria},
	Context, Error, MemoryDirectory, User, UserRepository,
};
use tokio::sync::RwLock;
use url::Url;

pub const PEOPLE: &str = "ou=people,dc=example,dc=com";

pub fn config(virtual_list_view_support: bool) -> Config {
	Config {
		server: ServerConfig {
			url: Url::parse("ldap://localhost:1389").unwrap(),
			connection: ConnectionConfig::default(),
			search_user: String::new(),
			search_password: String::new(),
			virtual_list_view_support,
		},
		users: EntryConfig {
			base: PEOPLE.to_owned(),
			rdn_attribute: "uid".to_owned(),
			name_type: NameType::Value,
			filter: "(objectClass=inetOrgPerson)".to_owned(),
			email_attribute: "mail".to_owned(),
			attributes: vec!["cn".to_owned()],
			page_size: None,
			domain: Some("example.com".to_owned()),
		},
		cache: CacheConfig::default(),
	}
}

pub fn person(uid: &str) -> String {
	format!("uid={uid},{PEOPLE}")
}

/// Five enabled people, one disabled person and a group. Carol and Bob share
/// an e-mail address; Bob comes first.
pub fn directory() -> MemoryDirectory {
	MemoryDirectory::new("ldap://localhost:1389")
		.with_entry("dc=example,dc=com", &[("objectClass", "domain")])
		.with_entry(PEOPLE, &[("objectClass", "organizationalUnit")])
		.with_entry("ou=groups,dc=example,dc=com", &[("objectClass", "organizationalUnit")])
		.with_user(
			&person("frank"),
			"frank-pw",
			&[("objectClass", "inetOrgPerson"), ("uid", "frank"), ("cn", "Frank Castle")],
		)
		.with_user(
			&person("alice"),
			"wonderland",
			&[
				("objectClass", "inetOrgPerson"),
				("uid", "alice"),
				("cn", "Alice Liddell"),
				("mail", "alice@example.com"),
			],
		)
		.with_user(
			&person("bob"),
			"builder",
			&[
				("objectClass", "inetOrgPerson"),
				("uid", "bob"),
				("cn", "Bob"),
				("mail", "shared@example.com"),
			],
		)
		.with_user(
			&person("carol"),
			"carol-pw",
			&[
				("objectClass", "inetOrgPerson"),
				("uid", "carol"),
				("cn", "Carol"),
				("mail", "shared@example.com"),
			],
		)
		.with_user(
			&person("erin"),
			"erin-pw",
			&[("objectClass", "inetOrgPerson"), ("uid", "erin"), ("cn", "Erin")],
		)
		.with_user(
			&person("dave"),
			"hunter2",
			&[("objectClass", "person"), ("uid", "dave"), ("cn", "Dave")],
		)
		.with_entry(
			"cn=admins,ou=groups,dc=example,dc=com",
			&[
				("objectClass", "groupOfNames"),
				("member", "uid=alice,ou=people,dc=example,dc=com"),
				("member", "bob"),
				("member", "nobody"),
				("member", "cn=Printer,ou=devices,dc=example,dc=com"),
			],
		)
}

pub fn user(id: &str, user_name: &str) -> User {
	User {
		id: id.to_owned(),
		user_name: user_name.to_owned(),
		domain: None,
		properties: PropertyCollection::default(),
	}
}

/// Counts of calls to the lookups of a [`CountingRepository`].
#[derive(Debug, Default)]
pub struct Calls {
	pub by_id: AtomicUsize,
	pub by_name: AtomicUsize,
	pub properties: AtomicUsize,
}

impl Calls {
	pub fn by_id(&self) -> usize {
		self.by_id.load(Ordering::SeqCst)
	}

	pub fn by_name(&self) -> usize {
		self.by_name.load(Ordering::SeqCst)
	}

	pub fn properties(&self) -> usize {
		self.properties.load(Ordering::SeqCst)
	}
}

/// A user store in memory which counts its lookups. Lookups take `delay`, so
/// concurrent callers overlap.
#[derive(Debug, Default)]
pub struct CountingRepository {
	pub users: RwLock<HashMap<String, User>>,
	pub properties: RwLock<HashMap<(String, String), PropertyCollection>>,
	pub contexts: RwLock<Vec<Context>>,
	pub passwords: RwLock<HashMap<String, String>>,
	pub calls: Arc<Calls>,
	pub delay: Duration,
	pub failing: AtomicBool,
}

impl CountingRepository {
	pub fn new(delay: Duration) -> Self {
		Self { delay, ..Self::default() }
	}

	pub async fn put(&self, user: User) {
		self.users.write().await.insert(user.id.clone(), user);
	}

	async fn lookup(&self, counter: &AtomicUsize) -> Result<(), Error> {
		counter.fetch_add(1, Ordering::SeqCst);
		tokio::time::sleep(self.delay).await;
		if self.failing.load(Ordering::SeqCst) {
			return Err(Error::InvalidArgument("backend unavailable".to_owned()));
		}
		Ok(())
	}
}

#[async_trait]
impl UserRepository for CountingRepository {
	async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, Error> {
		self.lookup(&self.calls.by_id).await?;
		Ok(self.users.read().await.get(id).cloned())
	}

	async fn get_user_by_user_name(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<Option<User>, Error> {
		self.lookup(&self.calls.by_name).await?;
		Ok(self
			.users
			.read()
			.await
			.values()
			.find(|user| {
				user.user_name.eq_ignore_ascii_case(user_name)
					&& (domain.is_none() || user.domain.as_deref() == domain)
			})
			.cloned())
	}

	async fn get_users_by_search_criteria(
		&self,
		criteria: &[SearchCriteria],
	) -> Result<Vec<User>, Error> {
		Ok(self
			.users
			.read()
			.await
			.values()
			.filter(|user| {
				criteria.iter().all(|criteria| {
					user.properties.first(&criteria.property) == Some(criteria.value.as_str())
				})
			})
			.cloned()
			.collect())
	}

	async fn get_users_by_domain(&self, domain: &str) -> Result<Vec<User>, Error> {
		Ok(self
			.users
			.read()
			.await
			.values()
			.filter(|user| user.domain.as_deref() == Some(domain))
			.cloned()
			.collect())
	}

	async fn get_domains(&self) -> Result<Vec<String>, Error> {
		let mut domains: Vec<String> =
			self.users.read().await.values().filter_map(|user| user.domain.clone()).collect();
		domains.sort();
		domains.dedup();
		Ok(domains)
	}

	async fn create_user_instance(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<User, Error> {
		Ok(User {
			id: format!("{}@{}", user_name, domain.unwrap_or_default()),
			user_name: user_name.to_owned(),
			domain: domain.map(str::to_owned),
			properties: PropertyCollection::default(),
		})
	}

	async fn save_user(&self, user: &User) -> Result<(), Error> {
		self.put(user.clone()).await;
		Ok(())
	}

	async fn save_users(&self, users: &[User]) -> Result<(), Error> {
		for user in users {
			self.put(user.clone()).await;
		}
		Ok(())
	}

	async fn set_password(&self, user: &User, password: &str) -> Result<(), Error> {
		self.passwords.write().await.insert(user.id.clone(), password.to_owned());
		Ok(())
	}

	async fn check_password(&self, user: &User, password: &str) -> Result<bool, Error> {
		Ok(self.passwords.read().await.get(&user.id).is_some_and(|stored| stored == password))
	}

	async fn save_properties(
		&self,
		user: &User,
		properties: &PropertyCollection,
	) -> Result<(), Error> {
		let key = (user.id.clone(), properties.context.name().to_lowercase());
		self.properties.write().await.insert(key, properties.clone());
		Ok(())
	}

	async fn delete_user(&self, user: &User) -> Result<(), Error> {
		self.users.write().await.remove(&user.id);
		Ok(())
	}

	async fn get_properties(&self, context: &Context) -> Result<PropertyCollection, Error> {
		Ok(PropertyCollection::new(context.clone()))
	}

	async fn get_user_properties(
		&self,
		user: &User,
		context: &Context,
	) -> Result<Option<PropertyCollection>, Error> {
		self.lookup(&self.calls.properties).await?;
		let key = (user.id.clone(), context.name().to_lowercase());
		Ok(self.properties.read().await.get(&key).cloned())
	}

	async fn get_contexts(&self) -> Result<Vec<Context>, Error> {
		Ok(self.contexts.read().await.clone())
	}

	async fn get_context(&self, name: &str) -> Result<Option<Context>, Error> {
		let wanted = Context::new(name)?;
		Ok(self.contexts.read().await.iter().find(|context| **context == wanted).cloned())
	}

	async fn create_context(&self, name: &str, _schema: &ContextSchema) -> Result<Context, Error> {
		let context = Context::new(name)?;
		self.contexts.write().await.push(context.clone());
		Ok(context)
	}

	async fn delete_context(&self, context: &Context) -> Result<(), Error> {
		self.contexts.write().await.retain(|known| known != context);
		let name = context.name().to_lowercase();
		self.properties.write().await.retain(|(_, known), _| *known != name);
		Ok(())
	}

	async fn get_default_context_schema(&self) -> Result<ContextSchema, Error> {
		Ok(ContextSchema::default())
	}
}

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn StdError>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?.success()?;
	Ok(ldap)
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn StdError>> {
	ldap.add(
		&format!("ou={ou},dc=example,dc=org"),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

/// Remove an organizational unit together with the people in it.
pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn StdError>> {
	let base = format!("ou={ou},dc=example,dc=org");
	let (entries, _res) = ldap
		.search(&base, ldap3::Scope::OneLevel, "(objectClass=*)", vec!["1.1"])
		.await?
		.success()?;
	for entry in entries {
		let dn = ldap3::SearchEntry::construct(entry).dn;
		ldap.delete(&dn).await?.success()?;
	}
	ldap.delete(&base).await?.success()?;
	Ok(())
}

pub async fn ldap_add_person(
	ldap: &mut ldap3::Ldap,
	uid: &str,
	mail: &str,
	password: &str,
) -> Result<(), Box<dyn StdError>> {
	ldap.add(
		&format!("uid={uid},ou=users,dc=example,dc=org"),
		vec![
			("objectClass", ["inetOrgPerson"].into()),
			("uid", [uid].into()),
			("cn", [uid].into()),
			("sn", [uid].into()),
			("mail", [mail].into()),
			("userPassword", [password].into()),
		],
	)
	.await?
	.success()?;
	Ok(())
}
