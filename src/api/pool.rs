//! Batched execution of independent remote reads.
//!
//! A pool collects queries, serves what it can from the cache, runs the
//! rest with bounded concurrency, and either completes as a unit or
//! fails as a unit: the first business or transport error cancels
//! everything still in flight and nothing from the batch is cached.

use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use super::{QueryError, RemoteSource};
use crate::cache::QueryCache;

/// Upper bound on requests in flight for one batch.
pub const CONCURRENT_REQUESTS: usize = 5;

type SuccessHook<'a> = Box<dyn FnMut(&Value) + 'a>;
type Continuation<'a> =
    Box<dyn FnOnce(Option<QueryError>, Rc<Vec<Value>>) -> LocalBoxFuture<'a, Option<QueryError>> + 'a>;

struct Query<'a> {
    path: String,
    cache_key: String,
    ttl_minutes: Option<i64>,
    on_success: Option<SuccessHook<'a>>,
    document: Option<Value>,
}

/// A batch of independent reads sharing one concurrency and
/// error-abort policy.
pub struct QueryPool<'a, S> {
    source: &'a S,
    cache: &'a dyn QueryCache,
    queries: Vec<Query<'a>>,
    continuations: Vec<Continuation<'a>>,
    last_error: Option<QueryError>,
    carry: Option<QueryError>,
}

impl<'a, S: RemoteSource> QueryPool<'a, S> {
    pub fn new(source: &'a S, cache: &'a dyn QueryCache) -> Self {
        Self {
            source,
            cache,
            queries: Vec::new(),
            continuations: Vec::new(),
            last_error: None,
            carry: None,
        }
    }

    /// The cache slot a query path maps to.
    fn cache_key(path: &str) -> String {
        format!("QueryPool;{path}")
    }

    /// Register a query. The cache is consulted immediately; a hit is
    /// stored inline and never touches the network.
    pub fn add_query(&mut self, path: impl Into<String>, ttl_minutes: Option<i64>) {
        self.push_query(path.into(), ttl_minutes, None);
    }

    /// Register a query with a hook that receives its document once the
    /// whole batch has succeeded.
    pub fn add_query_with<F>(&mut self, path: impl Into<String>, ttl_minutes: Option<i64>, hook: F)
    where
        F: FnMut(&Value) + 'a,
    {
        self.push_query(path.into(), ttl_minutes, Some(Box::new(hook)));
    }

    fn push_query(&mut self, path: String, ttl_minutes: Option<i64>, on_success: Option<SuccessHook<'a>>) {
        let cache_key = Self::cache_key(&path);
        let document = self.cache.get(&cache_key);
        if document.is_some() {
            debug!("cache hit for {}", path);
        }

        self.queries.push(Query {
            path,
            cache_key,
            ttl_minutes,
            on_success,
            document,
        });
    }

    /// Schedule work to run after every query in the batch succeeded.
    /// Continuations run in registration order; each receives the
    /// previous one's carry and the full ordered document list. The
    /// final carry is left for the caller to check via [`take_carry`].
    ///
    /// [`take_carry`]: QueryPool::take_carry
    pub fn then<F, Fut>(&mut self, continuation: F)
    where
        F: FnOnce(Option<QueryError>, Rc<Vec<Value>>) -> Fut + 'a,
        Fut: Future<Output = Option<QueryError>> + 'a,
    {
        self.continuations
            .push(Box::new(move |carry, documents| Box::pin(continuation(carry, documents))));
    }

    /// The batch failure, valid after [`process`] returned `false`.
    ///
    /// [`process`]: QueryPool::process
    pub fn last_error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    /// Consume the batch failure for propagation.
    pub fn take_last_error(&mut self) -> QueryError {
        self.last_error
            .take()
            .unwrap_or_else(|| QueryError::Transport("batch aborted".to_string()))
    }

    /// The final continuation carry, if any continuation reported one.
    pub fn take_carry(&mut self) -> Option<QueryError> {
        self.carry.take()
    }

    /// Execute the batch. Queries without a cached document run with at
    /// most [`CONCURRENT_REQUESTS`] in flight; the first failure aborts
    /// the rest and returns `false`. Only a fully successful batch
    /// writes the cache, fires the per-query hooks and runs the
    /// continuations.
    pub async fn process(&mut self) -> bool {
        self.last_error = None;

        let pending: Vec<(usize, String)> = self
            .queries
            .iter()
            .enumerate()
            .filter(|(_, query)| query.document.is_none())
            .map(|(index, query)| (index, query.path.clone()))
            .collect();

        if !pending.is_empty() {
            let source = self.source;
            let mut in_flight = stream::iter(pending.into_iter().map(|(index, path)| async move {
                let result = source.fetch(&path).await;
                (index, result)
            }))
            .buffer_unordered(CONCURRENT_REQUESTS);

            let mut fetched: Vec<(usize, Value)> = Vec::new();
            while let Some((index, result)) = in_flight.next().await {
                match result {
                    Ok(document) => match business_error(&document) {
                        Some(code) => {
                            debug!("query {} reported {}", self.queries[index].path, code);
                            self.last_error = Some(QueryError::Upstream(code));
                            break;
                        }
                        None => fetched.push((index, document)),
                    },
                    Err(error) => {
                        self.last_error = Some(error);
                        break;
                    }
                }
            }

            // Dropping the stream aborts in-flight requests; queued
            // ones were never created.
            drop(in_flight);

            if self.last_error.is_some() {
                return false;
            }

            for (index, document) in fetched {
                let query = &mut self.queries[index];
                if let Some(ttl_minutes) = query.ttl_minutes {
                    self.cache.put(&query.cache_key, &document, ttl_minutes);
                }
                query.document = Some(document);
            }
        }

        for query in &mut self.queries {
            if let (Some(document), Some(hook)) = (query.document.as_ref(), query.on_success.as_mut()) {
                hook(document);
            }
        }

        let documents: Rc<Vec<Value>> = Rc::new(
            self.queries
                .iter()
                .map(|query| query.document.clone().unwrap_or(Value::Null))
                .collect(),
        );

        let mut carry = None;
        for continuation in self.continuations.drain(..) {
            carry = continuation(carry, Rc::clone(&documents)).await;
        }
        self.carry = carry;

        true
    }

    /// Run a single query as its own batch.
    pub async fn unique(
        source: &'a S,
        cache: &'a dyn QueryCache,
        path: &str,
        ttl_minutes: Option<i64>,
    ) -> Result<Value, QueryError> {
        let mut pool = QueryPool::new(source, cache);
        pool.add_query(path, ttl_minutes);

        if !pool.process().await {
            return Err(pool.take_last_error());
        }

        Ok(pool.queries.swap_remove(0).document.unwrap_or(Value::Null))
    }
}

/// The upstream marks success with `ErrorCode == 1`; anything else is a
/// business failure named by `ErrorStatus`.
pub fn business_error(document: &Value) -> Option<String> {
    match document.pointer("/ErrorCode").and_then(Value::as_i64) {
        Some(1) => None,
        _ => Some(
            document
                .pointer("/ErrorStatus")
                .and_then(Value::as_str)
                .unwrap_or("UnknownErrorStatus")
                .to_string(),
        ),
    }
}
