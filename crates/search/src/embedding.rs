//! Tiered embedding provider
//!
//! A bounded 24-hour memory tier in front of the indefinite Postgres tier,
//! in front of the remote back-end. Lookups flow down the tiers; hits in
//! the persistent tier are promoted into memory; fresh embeddings are
//! written through to both. Results always come back in input order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use maktaba_config::constants::cache;
use maktaba_core::EmbeddingModel;
use maktaba_persistence::EmbeddingCacheStore;

use crate::ttl_cache::TtlCache;
use crate::SearchError;

/// A remote embedding service for one model
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model(&self) -> EmbeddingModel;

    /// Largest batch one call may carry
    fn max_batch(&self) -> usize;

    /// Embed texts, aligned with the input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;
}

/// Embedding access as the orchestrator sees it
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed_batch(
        &self,
        texts: &[String],
        model: EmbeddingModel,
    ) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_one(
        &self,
        text: &str,
        model: EmbeddingModel,
    ) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed_batch(&[text.to_string()], model).await?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::Embedding("back-end returned no vector".to_string()))
    }
}

/// Two-tier cached embedding provider
pub struct EmbeddingProvider {
    memory: TtlCache<String, Vec<f32>>,
    persistent: Arc<dyn EmbeddingCacheStore>,
    large_backend: Arc<dyn EmbeddingBackend>,
    jina_backend: Arc<dyn EmbeddingBackend>,
}

impl EmbeddingProvider {
    pub fn new(
        persistent: Arc<dyn EmbeddingCacheStore>,
        large_backend: Arc<dyn EmbeddingBackend>,
        jina_backend: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            memory: TtlCache::new(
                cache::EMBEDDING_TTL,
                cache::EMBEDDING_MAX_ENTRIES,
                cache::EVICTION_BATCH,
            ),
            persistent,
            large_backend,
            jina_backend,
        }
    }

    fn backend(&self, model: EmbeddingModel) -> &Arc<dyn EmbeddingBackend> {
        match model {
            EmbeddingModel::Large3072 => &self.large_backend,
            EmbeddingModel::Jina1024 => &self.jina_backend,
        }
    }

    fn cache_key(model: EmbeddingModel, text: &str) -> String {
        format!("{}{}", model.cache_prefix(), text)
    }

    pub fn memory_stats(&self) -> crate::ttl_cache::CacheStats {
        self.memory.stats()
    }
}

#[async_trait]
impl TextEmbedder for EmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        model: EmbeddingModel,
    ) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = texts
            .iter()
            .map(|text| Self::cache_key(model, text))
            .collect();

        // Tier 1: memory
        let mut resolved: HashMap<String, Vec<f32>> = self.memory.get_many(&keys);

        // Tier 2: persistent, one batched call for the misses.
        // The persistent tier is a hint; its failure degrades to misses.
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| !resolved.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            match self.persistent.get_many(&missing).await {
                Ok(stored) => {
                    self.memory
                        .set_many(stored.iter().map(|(k, v)| (k.clone(), v.clone())));
                    resolved.extend(stored);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Persistent embedding tier unavailable");
                }
            }
        }

        // Tier 3: the back-end, chunked at its batch bound. Only distinct
        // uncached texts are sent.
        let mut uncached: Vec<(String, String)> = Vec::new();
        for (key, text) in keys.iter().zip(texts.iter()) {
            if !resolved.contains_key(key) && !uncached.iter().any(|(k, _)| k == key) {
                uncached.push((key.clone(), text.clone()));
            }
        }

        if !uncached.is_empty() {
            let backend = self.backend(model);
            let mut fresh: Vec<(String, Vec<f32>)> = Vec::with_capacity(uncached.len());

            for chunk in uncached.chunks(backend.max_batch().max(1)) {
                let chunk_texts: Vec<String> =
                    chunk.iter().map(|(_, text)| text.clone()).collect();
                let vectors = backend.embed(&chunk_texts).await?;
                for ((key, _), vector) in chunk.iter().zip(vectors) {
                    fresh.push((key.clone(), vector));
                }
            }

            self.memory
                .set_many(fresh.iter().map(|(k, v)| (k.clone(), v.clone())));
            if let Err(e) = self.persistent.set_many(&fresh).await {
                tracing::warn!(error = %e, "Failed to persist fresh embeddings");
            }
            resolved.extend(fresh);
        }

        // Assemble in input order
        keys.iter()
            .map(|key| {
                resolved.get(key).cloned().ok_or_else(|| {
                    SearchError::Embedding("back-end returned fewer vectors than requested".into())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        model: EmbeddingModel,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl StubBackend {
        fn new(model: EmbeddingModel) -> Self {
            Self {
                model,
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        fn model(&self) -> EmbeddingModel {
            self.model
        }

        fn max_batch(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().push(texts.len());
            Ok(texts
                .iter()
                .map(|text| vec![text.chars().count() as f32])
                .collect())
        }
    }

    #[derive(Default)]
    struct StubPersistent {
        rows: Mutex<HashMap<String, Vec<f32>>>,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingCacheStore for StubPersistent {
        async fn get_many(
            &self,
            keys: &[String],
        ) -> Result<HashMap<String, Vec<f32>>, maktaba_persistence::PersistenceError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock();
            Ok(keys
                .iter()
                .filter_map(|k| rows.get(k).map(|v| (k.clone(), v.clone())))
                .collect())
        }

        async fn set_many(
            &self,
            entries: &[(String, Vec<f32>)],
        ) -> Result<(), maktaba_persistence::PersistenceError> {
            let mut rows = self.rows.lock();
            for (k, v) in entries {
                rows.insert(k.clone(), v.clone());
            }
            Ok(())
        }
    }

    fn provider(
        backend: Arc<StubBackend>,
        persistent: Arc<StubPersistent>,
    ) -> EmbeddingProvider {
        EmbeddingProvider::new(
            persistent,
            backend,
            Arc::new(StubBackend::new(EmbeddingModel::Jina1024)),
        )
    }

    #[tokio::test]
    async fn test_results_in_input_order() {
        let backend = Arc::new(StubBackend::new(EmbeddingModel::Large3072));
        let provider = provider(Arc::clone(&backend), Arc::new(StubPersistent::default()));

        let texts = vec!["aa".to_string(), "b".to_string(), "cccc".to_string()];
        let vectors = provider
            .embed_batch(&texts, EmbeddingModel::Large3072)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![2.0], vec![1.0], vec![4.0]]);
        // max_batch = 2 split three texts into two calls
        assert_eq!(*backend.batch_sizes.lock(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_memory_tier_short_circuits_backend() {
        let backend = Arc::new(StubBackend::new(EmbeddingModel::Large3072));
        let provider = provider(Arc::clone(&backend), Arc::new(StubPersistent::default()));

        let texts = vec!["hello".to_string()];
        provider.embed_batch(&texts, EmbeddingModel::Large3072).await.unwrap();
        provider.embed_batch(&texts, EmbeddingModel::Large3072).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistent_hit_promoted_to_memory() {
        let backend = Arc::new(StubBackend::new(EmbeddingModel::Large3072));
        let persistent = Arc::new(StubPersistent::default());
        persistent
            .rows
            .lock()
            .insert("stored".to_string(), vec![9.0]);

        let provider = provider(Arc::clone(&backend), Arc::clone(&persistent));

        let texts = vec!["stored".to_string()];
        let first = provider
            .embed_batch(&texts, EmbeddingModel::Large3072)
            .await
            .unwrap();
        assert_eq!(first, vec![vec![9.0]]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(persistent.gets.load(Ordering::SeqCst), 1);

        // second call must be served from memory: no further persistent reads
        provider.embed_batch(&texts, EmbeddingModel::Large3072).await.unwrap();
        assert_eq!(persistent.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_jina_keys_are_model_prefixed() {
        assert_eq!(
            EmbeddingProvider::cache_key(EmbeddingModel::Jina1024, "نص"),
            "jina:نص"
        );
        assert_eq!(
            EmbeddingProvider::cache_key(EmbeddingModel::Large3072, "نص"),
            "نص"
        );
    }

    #[tokio::test]
    async fn test_duplicate_texts_sent_once() {
        let backend = Arc::new(StubBackend::new(EmbeddingModel::Large3072));
        let provider = provider(Arc::clone(&backend), Arc::new(StubPersistent::default()));

        let texts = vec!["dup".to_string(), "dup".to_string()];
        let vectors = provider
            .embed_batch(&texts, EmbeddingModel::Large3072)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(*backend.batch_sizes.lock(), vec![1]);
    }
}
