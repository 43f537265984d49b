//! Keyed read cache over the backend client.
//!
//! Reads go through [`Query`] values that name their cache key; writes go
//! through [`Mutation`] values that name the keys they make stale. A stale or
//! invalidated entry is refetched on its next read.

use crate::{error::Result, mutations::Mutation};
use serde::Serialize;
use snapnest_backend::BackendClient;
use snapnest_common::model::{Id, post::PostMarker, user::UserMarker};
use std::{any::Any, collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum QueryKey {
    RecentPosts,
    InfinitePosts,
    SearchPosts(String),
    CurrentUser,
    PostById(Id<PostMarker>),
    Users(Option<u32>),
    UserById(Id<UserMarker>),
    UserPosts(Id<UserMarker>),
    SavedPosts(Id<UserMarker>),
    LikedPosts(Id<UserMarker>),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum QueryName {
    RecentPosts,
    InfinitePosts,
    SearchPosts,
    CurrentUser,
    PostById,
    Users,
    UserById,
    UserPosts,
    SavedPosts,
    LikedPosts,
}

impl QueryKey {
    #[must_use]
    pub fn name(&self) -> QueryName {
        match self {
            QueryKey::RecentPosts => QueryName::RecentPosts,
            QueryKey::InfinitePosts => QueryName::InfinitePosts,
            QueryKey::SearchPosts(_) => QueryName::SearchPosts,
            QueryKey::CurrentUser => QueryName::CurrentUser,
            QueryKey::PostById(_) => QueryName::PostById,
            QueryKey::Users(_) => QueryName::Users,
            QueryKey::UserById(_) => QueryName::UserById,
            QueryKey::UserPosts(_) => QueryName::UserPosts,
            QueryKey::SavedPosts(_) => QueryName::SavedPosts,
            QueryKey::LikedPosts(_) => QueryName::LikedPosts,
        }
    }
}

/// Selects cache entries for invalidation.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum QueryFilter {
    Any,
    All(QueryName),
    Exact(QueryKey),
}

impl QueryFilter {
    #[must_use]
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            QueryFilter::Any => true,
            QueryFilter::All(name) => key.name() == *name,
            QueryFilter::Exact(exact) => exact == key,
        }
    }
}

impl From<QueryKey> for QueryFilter {
    fn from(value: QueryKey) -> Self {
        QueryFilter::Exact(value)
    }
}

impl From<QueryName> for QueryFilter {
    fn from(value: QueryName) -> Self {
        QueryFilter::All(value)
    }
}

/// A cached read.
pub trait Query: Send + Sync {
    type Output: Clone + Send + Sync + 'static;

    /// `None` disables the query: it resolves to nothing without a remote
    /// call.
    fn key(&self) -> Option<QueryKey>;

    fn enabled(&self) -> bool {
        self.key().is_some()
    }

    fn fetch(&self, backend: &BackendClient) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// A cached read assembled page by page.
pub trait InfiniteQuery: Send + Sync {
    type Item: Clone + Send + Sync + 'static;
    type Cursor: Clone + Send + Sync + 'static;

    fn key(&self) -> Option<QueryKey>;

    fn fetch_page(
        &self,
        backend: &BackendClient,
        cursor: Option<Self::Cursor>,
    ) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;

    /// Where the page after `last_page` starts, or `None` when there is none.
    fn next_cursor(&self, last_page: &[Self::Item]) -> Option<Self::Cursor>;
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct InfiniteData<T, C> {
    pub pages: Vec<Vec<T>>,
    pub next_cursor: Option<C>,
}

impl<T, C> InfiniteData<T, C> {
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flatten()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct QueryConfig {
    /// How long fetched data is served without refetching.
    pub stale_time: Duration,
    /// How long an entry that nobody reads is kept.
    pub gc_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            gc_time: Duration::from_secs(5 * 60),
        }
    }
}

struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
    last_used: Instant,
    invalidated: bool,
}

enum Cached<T> {
    Fresh(T),
    Stale(T),
    Missing,
}

pub struct QueryClient {
    backend: Arc<BackendClient>,
    config: QueryConfig,
    cache: Mutex<HashMap<QueryKey, CacheEntry>>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    #[must_use]
    pub fn new(backend: Arc<BackendClient>, config: QueryConfig) -> Self {
        Self {
            backend,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> QueryConfig {
        self.config
    }

    async fn cached<T: Clone + 'static>(&self, key: &QueryKey) -> Cached<T> {
        let now = Instant::now();
        let mut cache = self.cache.lock().await;
        cache.retain(|_, entry| now.duration_since(entry.last_used) < self.config.gc_time);

        let Some(entry) = cache.get_mut(key) else {
            return Cached::Missing;
        };
        entry.last_used = now;

        let Some(data) = entry.data.downcast_ref::<T>() else {
            warn!(?key, "Cached data has an unexpected type");
            return Cached::Missing;
        };
        if !entry.invalidated && now.duration_since(entry.fetched_at) < self.config.stale_time {
            Cached::Fresh(data.clone())
        } else {
            Cached::Stale(data.clone())
        }
    }

    async fn store<T: Send + Sync + 'static>(&self, key: QueryKey, data: T) {
        let now = Instant::now();
        let entry = CacheEntry {
            data: Arc::new(data),
            fetched_at: now,
            last_used: now,
            invalidated: false,
        };
        self.cache.lock().await.insert(key, entry);
    }

    /// Resolves a query from the cache while it is fresh, and from the
    /// backend otherwise.
    pub async fn fetch<Q: Query>(&self, query: &Q) -> Result<Option<Q::Output>> {
        let Some(key) = query.key().filter(|_| query.enabled()) else {
            return Ok(None);
        };

        if let Cached::Fresh(data) = self.cached(&key).await {
            return Ok(Some(data));
        }

        debug!(?key, "Fetching query");
        let data = query
            .fetch(&self.backend)
            .await
            .inspect_err(|err| warn!(?key, error = %err, "Query failed"))?;
        self.store(key, data.clone()).await;
        Ok(Some(data))
    }

    /// Whatever is cached under `key`, fresh or not.
    pub async fn get_query_data<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        match self.cached(key).await {
            Cached::Fresh(data) | Cached::Stale(data) => Some(data),
            Cached::Missing => None,
        }
    }

    pub async fn set_query_data<T: Send + Sync + 'static>(&self, key: QueryKey, data: T) {
        self.store(key, data).await;
    }

    /// Marks matching entries so their next read refetches. Returns how many
    /// entries matched.
    pub async fn invalidate(&self, filter: &QueryFilter) -> usize {
        let mut cache = self.cache.lock().await;
        let mut count = 0;
        for (key, entry) in cache.iter_mut() {
            if filter.matches(key) {
                entry.invalidated = true;
                count += 1;
            }
        }
        debug!(?filter, count, "Invalidated queries");
        count
    }

    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Runs a mutation and, once it succeeded, invalidates what it declares.
    pub async fn mutate<M: Mutation>(&self, mutation: M) -> Result<M::Output> {
        let filters = mutation.invalidates();

        let output = mutation
            .execute(&self.backend)
            .await
            .inspect_err(|err| warn!(error = %err, "Mutation failed"))?;

        for filter in &filters {
            self.invalidate(filter).await;
        }
        Ok(output)
    }

    async fn load_pages<Q: InfiniteQuery>(
        &self,
        query: &Q,
        count: usize,
    ) -> Result<InfiniteData<Q::Item, Q::Cursor>> {
        let mut data = InfiniteData {
            pages: Vec::new(),
            next_cursor: None,
        };

        let mut cursor = None;
        for _ in 0..count.max(1) {
            let page = query.fetch_page(&self.backend, cursor).await?;
            data.next_cursor = query.next_cursor(&page);
            data.pages.push(page);

            cursor = data.next_cursor.clone();
            if cursor.is_none() {
                break;
            }
        }
        Ok(data)
    }

    /// The pages loaded so far. A stale entry is refetched from the first
    /// page up to as many pages as it held.
    pub async fn fetch_infinite<Q: InfiniteQuery>(
        &self,
        query: &Q,
    ) -> Result<Option<InfiniteData<Q::Item, Q::Cursor>>> {
        let Some(key) = query.key() else {
            return Ok(None);
        };

        let page_count = match self.cached::<InfiniteData<Q::Item, Q::Cursor>>(&key).await {
            Cached::Fresh(data) => return Ok(Some(data)),
            Cached::Stale(data) => data.pages.len(),
            Cached::Missing => 1,
        };

        debug!(?key, page_count, "Fetching pages");
        let data = self
            .load_pages(query, page_count)
            .await
            .inspect_err(|err| warn!(?key, error = %err, "Query failed"))?;
        self.store(key, data.clone()).await;
        Ok(Some(data))
    }

    /// Appends the next page. Without a next cursor the data is returned
    /// as is.
    pub async fn fetch_next_page<Q: InfiniteQuery>(
        &self,
        query: &Q,
    ) -> Result<Option<InfiniteData<Q::Item, Q::Cursor>>> {
        let Some(key) = query.key() else {
            return Ok(None);
        };

        let mut data = match self.cached::<InfiniteData<Q::Item, Q::Cursor>>(&key).await {
            Cached::Fresh(data) | Cached::Stale(data) => data,
            Cached::Missing => return self.fetch_infinite(query).await,
        };
        let Some(cursor) = data.next_cursor.clone() else {
            return Ok(Some(data));
        };

        let page = query
            .fetch_page(&self.backend, Some(cursor))
            .await
            .inspect_err(|err| warn!(?key, error = %err, "Next page failed"))?;
        data.next_cursor = query.next_cursor(&page);
        data.pages.push(page);

        self.store(key, data.clone()).await;
        Ok(Some(data))
    }
}
