//! In-flight request coalescing
//!
//! Concurrent callers asking for the same key share a single execution of the
//! fetch. The fetch runs on its own task, so it completes and clears its map
//! entry even when every caller has gone away.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream fetch task aborted")]
    Aborted,
}

pub type FetchResult<T> = Result<Arc<T>, FetchError>;

type SharedFetch<T> = Shared<BoxFuture<'static, FetchResult<T>>>;

pub struct RequestCoalescer<T> {
    in_flight: Arc<Mutex<HashMap<String, SharedFetch<T>>>>,
}

impl<T> Default for RequestCoalescer<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestCoalescer<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `fetch` for `key`, or join the execution already in flight
    ///
    /// `fetch` is only invoked when no execution for `key` is in flight.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock().await;

            if let Some(existing) = in_flight.get(key) {
                debug!(key = %key, "Joining in-flight upstream request");
                existing.clone()
            } else {
                let future = fetch();
                let map = Arc::clone(&self.in_flight);
                let owned_key = key.to_string();

                // The entry is inserted below before this lock is released,
                // so the task's removal always finds it.
                let handle = tokio::spawn(async move {
                    let result = future.await.map(Arc::new);
                    map.lock().await.remove(&owned_key);
                    result
                });

                let shared = async move { handle.await.unwrap_or(Err(FetchError::Aborted)) }
                    .boxed()
                    .shared();
                in_flight.insert(key.to_string(), shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Number of keys with an upstream call in flight
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
