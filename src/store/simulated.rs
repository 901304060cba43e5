//! Simulated Document Store with Fault Injection
//!
//! Wraps another store and fails calls with `StoreError::Transport` before
//! they reach it. Faults come from a seeded ChaCha RNG, so a failing run can
//! be replayed with the same seed, or from a scripted budget that fails the
//! first N calls.

use super::{
    BulkResponse, CountResponse, DeleteRequest, DeleteResponse, DocumentStore, GetRequest,
    IndexRequest, IndexResponse, StoreFuture,
};
use crate::error::StoreError;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability that any call fails with a transport error
    pub transport_fail_prob: f64,
    /// Unconditionally fail this many calls before applying the probability
    pub fail_first: u32,
    /// Simulated latency range in milliseconds (min, max)
    pub latency_range_ms: (u64, u64),
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            transport_fail_prob: 0.05, // 5%
            fail_first: 0,
            latency_range_ms: (0, 0),
        }
    }
}

impl SimulatedStoreConfig {
    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            transport_fail_prob: 0.0,
            fail_first: 0,
            latency_range_ms: (0, 0),
        }
    }

    /// Store that is never reachable
    pub fn unreachable() -> Self {
        SimulatedStoreConfig {
            transport_fail_prob: 1.0,
            ..Self::no_faults()
        }
    }

    /// Fail exactly the first `n` calls, then behave
    pub fn failing_first(n: u32) -> Self {
        SimulatedStoreConfig {
            fail_first: n,
            ..Self::no_faults()
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStoreStats {
    pub attempts: u64,
    pub injected_failures: u64,
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    scripted_failures_left: u32,
    stats: SimulatedStoreStats,
}

/// Store wrapper that injects transport failures
pub struct SimulatedDocumentStore<S: DocumentStore> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

impl<S: DocumentStore> SimulatedDocumentStore<S> {
    pub fn new(inner_store: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedDocumentStore {
            inner_store,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: ChaCha8Rng::seed_from_u64(seed),
                scripted_failures_left: config.fail_first,
                stats: SimulatedStoreStats::default(),
            })),
            config,
        }
    }

    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Decide the fate of one call; the lock is released before any sleep
    async fn before_call(&self, operation: &'static str) -> Result<(), StoreError> {
        let (fail, latency_ms) = {
            let mut s = self.state.lock();
            s.stats.attempts += 1;
            let fail = if s.scripted_failures_left > 0 {
                s.scripted_failures_left -= 1;
                true
            } else {
                let prob = self.config.transport_fail_prob.clamp(0.0, 1.0);
                s.rng.gen_bool(prob)
            };
            if fail {
                s.stats.injected_failures += 1;
            }
            let (min, max) = self.config.latency_range_ms;
            let latency_ms = if max > min {
                s.rng.gen_range(min..max)
            } else {
                min
            };
            (fail, latency_ms)
        };

        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }
        if fail {
            return Err(StoreError::Transport(format!(
                "simulated connection failure during {}",
                operation
            )));
        }
        Ok(())
    }
}

impl<S: DocumentStore> DocumentStore for SimulatedDocumentStore<S> {
    fn index_document<'a>(&'a self, request: &'a IndexRequest) -> StoreFuture<'a, IndexResponse> {
        Box::pin(async move {
            self.before_call("index").await?;
            self.inner_store.index_document(request).await
        })
    }

    fn get_document<'a>(&'a self, request: &'a GetRequest) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.before_call("get").await?;
            self.inner_store.get_document(request).await
        })
    }

    fn delete_document<'a>(
        &'a self,
        request: &'a DeleteRequest,
    ) -> StoreFuture<'a, DeleteResponse> {
        Box::pin(async move {
            self.before_call("delete").await?;
            self.inner_store.delete_document(request).await
        })
    }

    fn count<'a>(
        &'a self,
        index: &'a str,
        doc_type: Option<&'a str>,
    ) -> StoreFuture<'a, CountResponse> {
        Box::pin(async move {
            self.before_call("count").await?;
            self.inner_store.count(index, doc_type).await
        })
    }

    fn bulk<'a>(&'a self, actions: &'a [Value], chunk_size: usize) -> StoreFuture<'a, BulkResponse> {
        Box::pin(async move {
            self.before_call("bulk").await?;
            self.inner_store.bulk(actions, chunk_size).await
        })
    }

    fn index_exists<'a>(&'a self, index: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.before_call("index_exists").await?;
            self.inner_store.index_exists(index).await
        })
    }

    fn create_index<'a>(&'a self, index: &'a str, body: &'a Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.before_call("create_index").await?;
            self.inner_store.create_index(index, body).await
        })
    }

    fn put_mapping<'a>(
        &'a self,
        index: &'a str,
        doc_type: &'a str,
        body: &'a Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.before_call("put_mapping").await?;
            self.inner_store.put_mapping(index, doc_type, body).await
        })
    }

    fn get_mapping<'a>(&'a self, index: &'a str, doc_type: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.before_call("get_mapping").await?;
            self.inner_store.get_mapping(index, doc_type).await
        })
    }

    fn delete_index<'a>(&'a self, index: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.before_call("delete_index").await?;
            self.inner_store.delete_index(index).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let store = SimulatedDocumentStore::new(
            InMemoryDocumentStore::new(),
            42,
            SimulatedStoreConfig::failing_first(2),
        );

        assert!(matches!(
            store.index_exists("a").await,
            Err(StoreError::Transport(_))
        ));
        assert!(store.index_exists("a").await.is_err());
        assert_eq!(store.index_exists("a").await, Ok(false));

        let stats = store.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.injected_failures, 2);
        assert_eq!(store.inner().stats().admin_calls, 1);
    }

    #[tokio::test]
    async fn test_same_seed_same_faults() {
        async fn run(seed: u64) -> Vec<bool> {
            let config = SimulatedStoreConfig {
                transport_fail_prob: 0.5,
                ..SimulatedStoreConfig::no_faults()
            };
            let store = SimulatedDocumentStore::new(InMemoryDocumentStore::new(), seed, config);
            let mut outcomes = Vec::new();
            for _ in 0..32 {
                outcomes.push(store.index_exists("x").await.is_ok());
            }
            outcomes
        }

        assert_eq!(run(7).await, run(7).await);
    }

    #[tokio::test]
    async fn test_unreachable_never_reaches_inner() {
        let store = SimulatedDocumentStore::new(
            InMemoryDocumentStore::new(),
            1,
            SimulatedStoreConfig::unreachable(),
        );
        for _ in 0..5 {
            assert!(store.count("x", None).await.is_err());
        }
        assert_eq!(store.inner().stats().count_calls, 0);
    }
}
