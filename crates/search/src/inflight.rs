//! In-flight request coalescer
//!
//! A process-wide map of pending results keyed by `"{document_id}:{language}"`.
//! The first caller for a key installs the shared future; concurrent callers
//! await the same one. Entries remove themselves when the future settles —
//! but only while the stored entry is still the same future, so a
//! replacement installed in the meantime is never clobbered.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

type SharedResult<T> = Shared<BoxFuture<'static, T>>;

/// Map of in-flight computations, at most one per key
pub struct InflightMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<String, SharedResult<T>>>,
}

impl<T> Clone for InflightMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for InflightMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InflightMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Canonical key format
    pub fn key(document_id: &str, language: &str) -> String {
        format!("{}:{}", document_id, language)
    }

    /// The pending result for a key, if one is in flight
    pub fn get(&self, key: &str) -> Option<SharedResult<T>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store a computation and schedule its self-removal on settle
    pub fn insert(
        &self,
        key: String,
        fut: impl Future<Output = T> + Send + 'static,
    ) -> SharedResult<T> {
        let shared = fut.boxed().shared();
        self.entries.insert(key.clone(), shared.clone());
        self.spawn_cleanup(key, shared.clone());
        shared
    }

    /// Join the in-flight computation for `key`, or start one with `build`.
    ///
    /// The check-and-insert is atomic per key: two racing callers get the
    /// same shared future and `build` runs once.
    pub fn fetch<F, Fut>(&self, key: String, build: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let shared = build().boxed().shared();
                vacant.insert(shared.clone());
                self.spawn_cleanup(key, shared.clone());
                shared
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn spawn_cleanup(&self, key: String, shared: SharedResult<T>) {
        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            let _ = shared.clone().await;
            // Remove only if the settled future is still the stored one
            entries.remove_if(&key, |_, stored| stored.ptr_eq(&shared));
        });
    }
}
