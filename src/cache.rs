//! Caching of user lookups.
//!
//! Lookups are single-flight: while one caller fetches a key from the wrapped
//! repository, other callers of the same key wait for its result instead of
//! fetching again. Writes through the cache invalidate the affected keys
//! before they return.
use std::{collections::HashMap, fmt, future::Future, hash::Hash, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;
use unicase::UniCase;

use crate::{
	config::CacheConfig,
	context::Context,
	error::Error,
	repository::{ContextSchema, PropertyCollection, SearchCriteria, User, UserRepository},
};

/// What a lookup produced.
#[derive(Debug, Clone)]
enum Fetched<V> {
	/// The value, or `None` if the repository has none
	Value(Option<V>),
	/// The lookup failed
	Failed(Arc<Error>),
}

/// A lookup result and when it was stored.
#[derive(Debug)]
struct Cached<V> {
	/// The result
	fetched: Fetched<V>,
	/// When the result was stored
	stored: Instant,
}

/// The result of the lookup of one key. Empty while the first lookup is
/// running; its caller holds the lock for that time.
type Slot<V> = Arc<Mutex<Option<Cached<V>>>>;

/// The slot of a key and what is known about its value without locking it.
struct Tracked<V> {
	/// The slot
	slot: Slot<V>,
	/// Id of the user the cached value belongs to
	owner: Option<String>,
	/// Users invalidated while the slot was locked
	invalidated: Vec<String>,
}

impl<V> Default for Tracked<V> {
	fn default() -> Self {
		Self { slot: Arc::default(), owner: None, invalidated: Vec::new() }
	}
}

/// Single-flight cache of lookups by key.
struct Registry<K, V> {
	/// Name of the cache, for logging
	name: &'static str,
	/// Id of the user a value belongs to
	owner: fn(&K, &V) -> String,
	/// The slot of every cached or currently fetched key
	slots: Mutex<HashMap<K, Tracked<V>>>,
}

impl<K, V> fmt::Debug for Registry<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry").field("name", &self.name).finish_non_exhaustive()
	}
}

impl<K, V> Registry<K, V>
where
	K: Eq + Hash + Clone + fmt::Debug,
	V: Clone,
{
	/// An empty cache of values belonging to the user named by `owner`.
	fn new(name: &'static str, owner: fn(&K, &V) -> String) -> Self {
		Self { name, owner, slots: Mutex::new(HashMap::new()) }
	}

	/// The cached value of `key`, or the result of `fetch` if there is none
	/// or it is older than `ttl`.
	///
	/// Only found values stay cached, and only if their user was not
	/// invalidated during the fetch. Callers which waited for a lookup that
	/// found nothing or failed share its result, after which the key is
	/// forgotten.
	async fn get_or_fetch<F, Fut>(
		&self,
		key: K,
		ttl: Option<Duration>,
		fetch: F,
	) -> Result<Option<V>, Error>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Option<V>, Error>>,
	{
		let slot = Arc::clone(&self.slots.lock().await.entry(key.clone()).or_default().slot);
		let mut cached = slot.lock().await;
		if let Some(Cached { fetched, stored }) = &*cached {
			let fresh = ttl.map_or(true, |ttl| stored.elapsed() < ttl);
			match fetched {
				Fetched::Value(value) if fresh => {
					debug!(cache = self.name, ?key, "Cache hit");
					return Ok(value.clone());
				}
				Fetched::Failed(err) => return Err(Error::Repository(Arc::clone(err))),
				Fetched::Value(_) => debug!(cache = self.name, ?key, "Cache entry expired"),
			}
		} else {
			debug!(cache = self.name, ?key, "Cache miss");
		}

		if let Some(tracked) = self.slots.lock().await.get_mut(&key) {
			if Arc::ptr_eq(&tracked.slot, &slot) {
				tracked.invalidated.clear();
			}
		}
		let fetched = match fetch().await {
			Ok(value) => Fetched::Value(value),
			Err(err) => Fetched::Failed(Arc::new(err)),
		};

		let mut slots = self.slots.lock().await;
		let current = slots.get_mut(&key).filter(|tracked| Arc::ptr_eq(&tracked.slot, &slot));
		match fetched {
			Fetched::Value(Some(value)) => {
				let owner = (self.owner)(&key, &value);
				let stale = match current {
					Some(tracked) if tracked.invalidated.contains(&owner) => true,
					Some(tracked) => {
						tracked.owner = Some(owner);
						tracked.invalidated.clear();
						false
					}
					None => false,
				};
				if stale {
					debug!(cache = self.name, ?key, "Cache entry invalidated during lookup");
					slots.remove(&key);
				} else {
					let fetched = Fetched::Value(Some(value.clone()));
					*cached = Some(Cached { fetched, stored: Instant::now() });
				}
				Ok(Some(value))
			}
			fetched => {
				if current.is_some() {
					slots.remove(&key);
				}
				*cached = Some(Cached { fetched: fetched.clone(), stored: Instant::now() });
				match fetched {
					Fetched::Value(value) => Ok(value),
					Fetched::Failed(err) => Err(Error::Repository(err)),
				}
			}
		}
	}

	/// Drop the cached value of `key`. A lookup still running for it finishes,
	/// but its result is not kept.
	async fn remove(&self, key: &K) {
		if self.slots.lock().await.remove(key).is_some() {
			debug!(cache = self.name, ?key, "Cache entry invalidated");
		}
	}

	/// Drop all keys for which `invalid` returns true, whether they are
	/// cached or being looked up.
	async fn remove_where(&self, mut invalid: impl FnMut(&K) -> bool) {
		self.slots.lock().await.retain(|key, _| {
			let keep = !invalid(key);
			if !keep {
				debug!(cache = self.name, ?key, "Cache entry invalidated");
			}
			keep
		});
	}

	/// Drop every cached value of the user `id`. Lookups running meanwhile
	/// keep their result only if it belongs to another user.
	async fn invalidate(&self, id: &str) {
		self.slots.lock().await.retain(|key, tracked| {
			if tracked.owner.as_deref() == Some(id) {
				debug!(cache = self.name, ?key, "Cache entry invalidated");
				return false;
			}
			let fetching = tracked.slot.try_lock().is_err();
			if fetching && !tracked.invalidated.iter().any(|seen| seen == id) {
				tracked.invalidated.push(id.to_owned());
			}
			true
		});
	}

	/// Number of keys being cached or looked up.
	async fn len(&self) -> usize {
		self.slots.lock().await.len()
	}
}

/// Key of a user lookup by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NameKey {
	/// The user name
	user_name: UniCase<String>,
	/// The domain, if one was given
	domain: Option<UniCase<String>>,
}

impl NameKey {
	/// The key of `user_name` in `domain`.
	fn new(user_name: &str, domain: Option<&str>) -> Self {
		Self {
			user_name: UniCase::new(user_name.to_owned()),
			domain: domain.map(|domain| UniCase::new(domain.to_owned())),
		}
	}
}

/// A [`UserRepository`] caching user and property lookups of another one.
#[derive(Debug)]
pub struct CachingUserRepository<R> {
	/// The repository the lookups go to
	inner: R,
	/// Cache settings
	config: CacheConfig,
	/// Users by id
	by_id: Registry<String, User>,
	/// Users by name and domain
	by_name: Registry<NameKey, User>,
	/// Properties by user id and context
	properties: Registry<(String, Context), PropertyCollection>,
}

impl<R: UserRepository> CachingUserRepository<R> {
	/// Cache lookups of `inner` as configured.
	#[must_use]
	pub fn new(inner: R, config: CacheConfig) -> Self {
		Self {
			inner,
			config,
			by_id: Registry::new("users by id", |_, user: &User| user.id.clone()),
			by_name: Registry::new("users by name", |_, user: &User| user.id.clone()),
			properties: Registry::new("user properties", |(id, _): &(String, Context), _| {
				id.clone()
			}),
		}
	}

	/// The wrapped repository.
	#[must_use]
	pub fn inner(&self) -> &R {
		&self.inner
	}

	/// Number of cached or currently fetched lookups.
	pub async fn cached_entries(&self) -> usize {
		self.by_id.len().await + self.by_name.len().await + self.properties.len().await
	}

	/// Drop every cached lookup concerning `user`, including lookups by a
	/// previous name.
	async fn invalidate(&self, user: &User) {
		self.by_id.remove(&user.id).await;
		self.by_id.invalidate(&user.id).await;
		self.by_name.remove(&NameKey::new(&user.user_name, user.domain.as_deref())).await;
		self.by_name.invalidate(&user.id).await;
		self.properties.invalidate(&user.id).await;
	}
}

#[async_trait]
impl<R: UserRepository> UserRepository for CachingUserRepository<R> {
	async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, Error> {
		if !self.config.enabled {
			return self.inner.get_user_by_id(id).await;
		}
		self.by_id
			.get_or_fetch(id.to_owned(), self.config.ttl(), || self.inner.get_user_by_id(id))
			.await
	}

	async fn get_user_by_user_name(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<Option<User>, Error> {
		if !self.config.enabled {
			return self.inner.get_user_by_user_name(user_name, domain).await;
		}
		self.by_name
			.get_or_fetch(NameKey::new(user_name, domain), self.config.ttl(), || {
				self.inner.get_user_by_user_name(user_name, domain)
			})
			.await
	}

	async fn get_users_by_search_criteria(
		&self,
		criteria: &[SearchCriteria],
	) -> Result<Vec<User>, Error> {
		self.inner.get_users_by_search_criteria(criteria).await
	}

	async fn get_users_by_domain(&self, domain: &str) -> Result<Vec<User>, Error> {
		self.inner.get_users_by_domain(domain).await
	}

	async fn get_domains(&self) -> Result<Vec<String>, Error> {
		self.inner.get_domains().await
	}

	async fn create_user_instance(
		&self,
		user_name: &str,
		domain: Option<&str>,
	) -> Result<User, Error> {
		self.inner.create_user_instance(user_name, domain).await
	}

	async fn save_user(&self, user: &User) -> Result<(), Error> {
		let result = self.inner.save_user(user).await;
		self.invalidate(user).await;
		result
	}

	async fn save_users(&self, users: &[User]) -> Result<(), Error> {
		let result = self.inner.save_users(users).await;
		for user in users {
			self.invalidate(user).await;
		}
		result
	}

	async fn set_password(&self, user: &User, password: &str) -> Result<(), Error> {
		let result = self.inner.set_password(user, password).await;
		self.invalidate(user).await;
		result
	}

	async fn check_password(&self, user: &User, password: &str) -> Result<bool, Error> {
		self.inner.check_password(user, password).await
	}

	async fn save_properties(
		&self,
		user: &User,
		properties: &PropertyCollection,
	) -> Result<(), Error> {
		let result = self.inner.save_properties(user, properties).await;
		self.invalidate(user).await;
		result
	}

	async fn delete_user(&self, user: &User) -> Result<(), Error> {
		let result = self.inner.delete_user(user).await;
		self.invalidate(user).await;
		result
	}

	async fn get_properties(&self, context: &Context) -> Result<PropertyCollection, Error> {
		self.inner.get_properties(context).await
	}

	async fn get_user_properties(
		&self,
		user: &User,
		context: &Context,
	) -> Result<Option<PropertyCollection>, Error> {
		if !self.config.enabled {
			return self.inner.get_user_properties(user, context).await;
		}
		self.properties
			.get_or_fetch((user.id.clone(), context.clone()), self.config.ttl(), || {
				self.inner.get_user_properties(user, context)
			})
			.await
	}

	async fn get_contexts(&self) -> Result<Vec<Context>, Error> {
		self.inner.get_contexts().await
	}

	async fn get_context(&self, name: &str) -> Result<Option<Context>, Error> {
		self.inner.get_context(name).await
	}

	async fn create_context(&self, name: &str, schema: &ContextSchema) -> Result<Context, Error> {
		self.inner.create_context(name, schema).await
	}

	async fn delete_context(&self, context: &Context) -> Result<(), Error> {
		let result = self.inner.delete_context(context).await;
		self.properties.remove_where(|(_, cached)| cached == context).await;
		result
	}

	async fn get_default_context_schema(&self) -> Result<ContextSchema, Error> {
		self.inner.get_default_context_schema().await
	}
}
