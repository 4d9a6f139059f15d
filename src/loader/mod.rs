//! Request-scoped batch loading.
//!
//! A [`BatchLoader`] collects the keys requested while one request's resolvers
//! are being polled, fetches them with a single multi-key call and caches the
//! outcome (including "not found") until the loader is dropped with the
//! request. Writes made during the request never touch the cache.

mod entities;

pub use entities::{Loaders, PostBatch, UserBatch};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::AppError;

/// One multi-key fetch against the store.
#[async_trait]
pub trait BatchFn: Send + Sync {
    type Key: Eq + Hash + Clone + Send + Sync + std::fmt::Debug;
    type Value: Clone + Send + Sync;

    /// Used in log lines only.
    const NAME: &'static str;

    /// Keys absent from the returned map are treated as not found.
    async fn fetch(&self, keys: &[Self::Key]) -> Result<HashMap<Self::Key, Self::Value>, AppError>;
}

struct LoaderState<K, V> {
    resolved: HashMap<K, Option<V>>,
    pending: Vec<K>,
}

pub struct BatchLoader<F: BatchFn> {
    fetcher: F,
    state: Mutex<LoaderState<F::Key, F::Value>>,
    dispatched: AtomicUsize,
}

impl<F: BatchFn> BatchLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            state: Mutex::new(LoaderState {
                resolved: HashMap::new(),
                pending: Vec::new(),
            }),
            dispatched: AtomicUsize::new(0),
        }
    }

    /// Loads one key, coalescing with every other key queued in the same tick.
    pub async fn load(&self, key: F::Key) -> Result<Option<F::Value>, AppError> {
        {
            let mut state = self.state.lock().await;
            if let Some(hit) = state.resolved.get(&key) {
                return Ok(hit.clone());
            }
            if !state.pending.contains(&key) {
                state.pending.push(key.clone());
            }
        }

        // Give sibling resolvers polled alongside this one a chance to enqueue.
        tokio::task::yield_now().await;

        // The lock is held across the fetch: later callers wait for the
        // in-flight batch and then read its result from the cache.
        let mut state = self.state.lock().await;
        if let Some(hit) = state.resolved.get(&key) {
            return Ok(hit.clone());
        }

        // A failed batch drained our key without resolving it.
        if !state.pending.contains(&key) {
            state.pending.push(key.clone());
        }
        let batch = std::mem::take(&mut state.pending);
        self.dispatch(&mut state, batch).await?;

        Ok(state.resolved.get(&key).cloned().flatten())
    }

    /// Loads `keys` with at most one fetch. The output is aligned with the
    /// input, duplicates included; unknown keys yield `None`.
    pub async fn load_many(&self, keys: &[F::Key]) -> Result<Vec<Option<F::Value>>, AppError> {
        let mut state = self.state.lock().await;

        let mut missing: Vec<F::Key> = Vec::new();
        for key in keys {
            if !state.resolved.contains_key(key) && !missing.contains(key) {
                missing.push(key.clone());
            }
        }

        if !missing.is_empty() {
            // Anything already queued by `load` rides along.
            for key in std::mem::take(&mut state.pending) {
                if !state.resolved.contains_key(&key) && !missing.contains(&key) {
                    missing.push(key);
                }
            }
            self.dispatch(&mut state, missing).await?;
        }

        Ok(keys
            .iter()
            .map(|key| state.resolved.get(key).cloned().flatten())
            .collect())
    }

    /// Number of keys resolved so far, found or not.
    pub async fn cached(&self) -> usize {
        self.state.lock().await.resolved.len()
    }

    /// Number of fetches issued against the store.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    async fn dispatch(
        &self,
        state: &mut LoaderState<F::Key, F::Value>,
        batch: Vec<F::Key>,
    ) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(loader = F::NAME, keys = batch.len(), "dispatching batch");
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut found = self.fetcher.fetch(&batch).await?;

        for key in batch {
            let value = found.remove(&key);
            state.resolved.insert(key, value);
        }
        Ok(())
    }
}
