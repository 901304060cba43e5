//! Bulk Queue
//!
//! Buffers document envelopes per destination index and sends each
//! destination as one bulk call once it reaches the size threshold.
//!
//! ```text
//! append(doc, "blog") ──► pending["blog"] = [e1, e2, ...]
//!                              │ len >= limit
//!                              ▼
//!                         bulk(store, [e1, e2, ...])  (retried)
//!                              │ ok
//!                              ▼
//!                         pending["blog"] = []
//! ```
//!
//! A failed flush leaves the destination's documents pending so the next
//! flush retries them. Per-item failures reported inside a successful bulk
//! response are not re-queued; the response is handed back to the caller.

use crate::config::DEFAULT_BULK_SIZE;
use crate::connections::Connections;
use crate::document::Document;
use crate::error::DocumentError;
use crate::retry::{retry, RetryPolicy};
use crate::store::BulkResponse;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-destination batching buffer
#[derive(Debug)]
pub struct BulkQueue {
    /// Destination used when a call names none
    index: Option<String>,
    using: Option<String>,
    limit: usize,
    pending: BTreeMap<String, Vec<Value>>,
    connections: Arc<Connections>,
    policy: RetryPolicy,
}

impl BulkQueue {
    pub fn new(
        index: Option<String>,
        using: Option<String>,
        limit: usize,
        connections: Arc<Connections>,
        policy: RetryPolicy,
    ) -> Self {
        BulkQueue {
            index,
            using,
            limit: if limit == 0 { DEFAULT_BULK_SIZE } else { limit },
            pending: BTreeMap::new(),
            connections,
            policy,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending_len(&self, index: &str) -> usize {
        self.pending.get(index).map(Vec::len).unwrap_or(0)
    }

    /// Total number of queued documents across destinations
    pub fn total_pending(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Destinations with queued documents
    pub fn destinations(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(index, _)| index.clone())
            .collect()
    }

    fn destination(&self, index: Option<&str>) -> Result<String, DocumentError> {
        index
            .or(self.index.as_deref())
            .map(str::to_string)
            .ok_or_else(|| DocumentError::Configuration("bulk queue has no destination index".into()))
    }

    /// Queue a document; flushes the destination once it holds `limit` documents
    ///
    /// A failed threshold flush returns its error with the document still queued.
    pub async fn append(
        &mut self,
        document: &Document,
        index: Option<&str>,
    ) -> Result<Option<BulkResponse>, DocumentError> {
        let destination = self.destination(index)?;
        let mut envelope = document.to_wire();
        if let Some(obj) = envelope.as_object_mut() {
            obj.insert("_index".to_string(), json!(destination));
        }

        let pending = self.pending.entry(destination.clone()).or_default();
        pending.push(envelope);
        let queued = pending.len();
        debug!(index = %destination, queued, limit = self.limit, "document appended to bulk queue");

        if queued >= self.limit {
            return self.flush(Some(&destination)).await;
        }
        Ok(None)
    }

    /// Send one destination's pending documents as a single bulk call
    ///
    /// Returns `None` without contacting the store when nothing is pending.
    pub async fn flush(&mut self, index: Option<&str>) -> Result<Option<BulkResponse>, DocumentError> {
        let destination = self.destination(index)?;
        let actions = match self.pending.get(&destination) {
            Some(docs) if !docs.is_empty() => docs.clone(),
            _ => return Ok(None),
        };

        let store = self.connections.get_connection(self.using.as_deref())?;
        let response = {
            let store = &*store;
            let actions = actions.as_slice();
            let chunk_size = self.limit;
            retry(&self.policy, "bulk", move || store.bulk(actions, chunk_size)).await?
        };

        self.pending.remove(&destination);
        info!(index = %destination, documents = actions.len(), "bulk queue flushed");
        if response.errors {
            let failed = response.failed_items().count();
            warn!(index = %destination, failed, "bulk flush reported item failures");
        }
        Ok(Some(response))
    }

    /// Flush every destination, stopping at the first failure
    pub async fn flush_all(&mut self) -> Result<Vec<BulkResponse>, DocumentError> {
        let mut responses = Vec::new();
        for destination in self.destinations() {
            if let Some(response) = self.flush(Some(&destination)).await? {
                responses.push(response);
            }
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::connections::DEFAULT_ALIAS;
    use crate::doctype::DocType;
    use crate::field::Field;
    use crate::store::{InMemoryDocumentStore, SimulatedDocumentStore, SimulatedStoreConfig};
    use std::time::Duration;

    fn queue_with(store: Arc<dyn crate::store::DocumentStore>, limit: usize) -> (BulkQueue, Arc<DocType>) {
        let connections = Connections::new();
        connections.register(DEFAULT_ALIAS, store);
        let doc_type = DocType::builder("LogLine")
            .field("message", Field::string())
            .connections(connections.clone())
            .build();
        let queue = BulkQueue::new(
            Some("logs".into()),
            None,
            limit,
            connections,
            RetryPolicy::fixed(2, Duration::from_millis(1)),
        );
        (queue, doc_type)
    }

    fn line(doc_type: &Arc<DocType>, n: usize) -> Document {
        doc_type
            .create(json!({"message": format!("line {}", n)}))
            .unwrap()
    }

    #[tokio::test]
    async fn test_below_threshold_makes_no_call() {
        let store = InMemoryDocumentStore::new();
        let (mut queue, doc_type) = queue_with(Arc::new(store.clone()), 5);

        for n in 0..4 {
            assert!(queue.append(&line(&doc_type, n), None).await.unwrap().is_none());
        }

        assert_eq!(store.stats().bulk_calls, 0);
        assert_eq!(queue.pending_len("logs"), 4);
    }

    #[tokio::test]
    async fn test_reaching_threshold_flushes_once() {
        let store = InMemoryDocumentStore::new();
        let (mut queue, doc_type) = queue_with(Arc::new(store.clone()), 5);

        let mut responses = Vec::new();
        for n in 0..5 {
            if let Some(response) = queue.append(&line(&doc_type, n), None).await.unwrap() {
                responses.push(response);
            }
        }

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].items.len(), 5);
        assert!(!responses[0].errors);
        assert_eq!(store.stats().bulk_calls, 1);
        assert_eq!(store.len("logs"), 5);
        assert_eq!(queue.pending_len("logs"), 0);
    }

    #[tokio::test]
    async fn test_empty_flush_makes_no_call() {
        let store = InMemoryDocumentStore::new();
        let (mut queue, _) = queue_with(Arc::new(store.clone()), 5);

        assert!(queue.flush(None).await.unwrap().is_none());
        assert!(queue.flush(Some("other")).await.unwrap().is_none());
        assert_eq!(store.stats().bulk_calls, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_documents() {
        let store = SimulatedDocumentStore::new(
            InMemoryDocumentStore::new(),
            3,
            SimulatedStoreConfig::failing_first(2),
        );
        let inner = store.inner().clone();
        let (mut queue, doc_type) = queue_with(Arc::new(store), 10);

        queue.append(&line(&doc_type, 0), None).await.unwrap();
        queue.append(&line(&doc_type, 1), None).await.unwrap();

        let err = queue.flush(None).await.unwrap_err();
        assert!(matches!(err, DocumentError::Store(_)));
        assert_eq!(queue.pending_len("logs"), 2);

        let response = queue.flush(None).await.unwrap().unwrap();
        assert_eq!(response.items.len(), 2);
        assert_eq!(inner.len("logs"), 2);
        assert_eq!(queue.pending_len("logs"), 0);
    }

    #[tokio::test]
    async fn test_destinations_are_independent() {
        let store = InMemoryDocumentStore::new();
        let (mut queue, doc_type) = queue_with(Arc::new(store.clone()), 3);

        queue.append(&line(&doc_type, 0), Some("a")).await.unwrap();
        queue.append(&line(&doc_type, 1), Some("b")).await.unwrap();
        queue.append(&line(&doc_type, 2), Some("a")).await.unwrap();

        assert_eq!(queue.destinations(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queue.total_pending(), 3);

        let responses = queue.flush_all().await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(store.len("a"), 2);
        assert_eq!(store.len("b"), 1);
        assert_eq!(queue.total_pending(), 0);
    }

    #[tokio::test]
    async fn test_envelopes_carry_destination_index() {
        let store = InMemoryDocumentStore::new();
        let (mut queue, doc_type) = queue_with(Arc::new(store.clone()), 1);

        let mut doc = line(&doc_type, 7);
        doc.meta_mut().id = Some("l7".into());
        doc.meta_mut().index = Some("ignored".into());
        queue.append(&doc, Some("logs-2015")).await.unwrap();

        let stored = store.document("logs-2015", "log_line", "l7").unwrap();
        assert_eq!(stored["message"], json!("line 7"));
        assert!(!store.has_index("ignored"));
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let queue = BulkQueue::new(
            None,
            None,
            0,
            Connections::new(),
            RetryConfig::test().bulk,
        );
        assert_eq!(queue.limit(), DEFAULT_BULK_SIZE);
    }
}
