//! In-memory document store for unit tests and local development
//!
//! Mirrors the behaviour the mapping layer relies on: indices are created on
//! first write, versions increase per write, mappings merge field by field
//! and a field cannot change its type once mapped.

use super::{
    BulkItem, BulkResponse, CountResponse, DeleteRequest, DeleteResponse, DocumentStore,
    GetRequest, IndexRequest, IndexResponse, StoreFuture, DEFAULT_DOC_TYPE,
};
use crate::error::StoreError;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Call counters, for asserting how many remote calls an operation made
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub index_calls: u64,
    pub get_calls: u64,
    pub delete_calls: u64,
    pub count_calls: u64,
    pub bulk_calls: u64,
    pub bulk_items: u64,
    pub mapping_calls: u64,
    pub admin_calls: u64,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    source: Map<String, Value>,
    version: u64,
    routing: Option<String>,
    parent: Option<String>,
}

#[derive(Debug, Default)]
struct InMemoryIndex {
    /// Type name -> per-type mapping body
    mappings: Map<String, Value>,
    /// (type, id) -> document
    documents: BTreeMap<(String, String), StoredDocument>,
}

/// In-memory document store; clones share state
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    indices: Arc<RwLock<HashMap<String, InMemoryIndex>>>,
    next_id: Arc<AtomicU64>,
    stats: Arc<Mutex<StoreStats>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = StoreStats::default();
    }

    /// Stored source of a document (for testing)
    pub fn document(&self, index: &str, doc_type: &str, id: &str) -> Option<Map<String, Value>> {
        self.indices.read().get(index).and_then(|idx| {
            idx.documents
                .get(&(doc_type.to_string(), id.to_string()))
                .map(|doc| doc.source.clone())
        })
    }

    /// Number of documents in an index (for testing)
    pub fn len(&self, index: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .map(|idx| idx.documents.len())
            .unwrap_or(0)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.read().contains_key(index)
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("doc-{:08}", n)
    }

    /// Write path shared by single-document and bulk writes
    fn write_document(
        &self,
        index: &str,
        doc_type: &str,
        id: Option<&str>,
        source: Map<String, Value>,
        hints: &Map<String, Value>,
    ) -> Result<IndexResponse, StoreError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.generate_id(),
        };
        let mut indices = self.indices.write();
        let idx = indices.entry(index.to_string()).or_default();
        let key = (doc_type.to_string(), id.clone());
        let existing = idx.documents.get(&key).map(|doc| doc.version);

        if hint_str(hints, "op_type") == Some("create") && existing.is_some() {
            return Err(StoreError::Conflict(format!(
                "[{}][{}]: document already exists",
                doc_type, id
            )));
        }
        if let Some(expected) = hints.get("version").and_then(Value::as_u64) {
            if existing != Some(expected) {
                return Err(version_conflict(doc_type, &id, expected, existing));
            }
        }

        let version = existing.map(|v| v + 1).unwrap_or(1);
        idx.documents.insert(
            key,
            StoredDocument {
                source,
                version,
                routing: hint_str(hints, "routing").map(str::to_string),
                parent: hint_str(hints, "parent").map(str::to_string),
            },
        );

        Ok(IndexResponse {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id,
            version,
            created: existing.is_none(),
        })
    }

    fn apply_bulk_action(&self, action: &Value) -> BulkItem {
        let Some(envelope) = action.as_object() else {
            return BulkItem {
                index: None,
                id: None,
                status: 400,
                error: Some("bulk action must be an object".to_string()),
            };
        };
        let index = envelope.get("_index").and_then(Value::as_str);
        let id = envelope.get("_id").and_then(Value::as_str);
        let Some(index) = index else {
            return BulkItem {
                index: None,
                id: id.map(str::to_string),
                status: 400,
                error: Some("bulk action without _index".to_string()),
            };
        };
        let doc_type = envelope
            .get("_type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_DOC_TYPE);

        let source = match envelope.get("_source") {
            Some(Value::Object(source)) => source.clone(),
            _ => envelope
                .iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };
        let mut hints = Map::new();
        for key in ["routing", "parent"] {
            if let Some(value) = envelope.get(&format!("_{}", key)) {
                hints.insert(key.to_string(), value.clone());
            }
        }

        match self.write_document(index, doc_type, id, source, &hints) {
            Ok(resp) => BulkItem {
                index: Some(resp.index),
                id: Some(resp.id),
                status: if resp.created { 201 } else { 200 },
                error: None,
            },
            Err(e) => BulkItem {
                index: Some(index.to_string()),
                id: id.map(str::to_string),
                status: 409,
                error: Some(e.to_string()),
            },
        }
    }
}

fn hint_str<'a>(hints: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    hints.get(key).and_then(Value::as_str)
}

fn version_conflict(doc_type: &str, id: &str, expected: u64, actual: Option<u64>) -> StoreError {
    StoreError::Conflict(format!(
        "[{}][{}]: version conflict, current [{}], provided [{}]",
        doc_type,
        id,
        actual.map(|v| v.to_string()).unwrap_or_else(|| "none".into()),
        expected
    ))
}

fn index_missing(index: &str) -> StoreError {
    StoreError::NotFound(format!("no such index [{}]", index))
}

/// Merge an incoming per-type mapping body into the stored one
fn merge_type_mapping(existing: &mut Map<String, Value>, incoming: &Map<String, Value>) -> Result<(), StoreError> {
    if let Some(Value::Object(new_props)) = incoming.get("properties") {
        let props = existing
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(props) = props else {
            return Err(StoreError::Rejected("stored properties are not an object".into()));
        };
        for (name, definition) in new_props {
            if let Some(current) = props.get(name) {
                let old_type = current.get("type");
                let new_type = definition.get("type");
                if old_type.is_some() && new_type.is_some() && old_type != new_type {
                    return Err(StoreError::Conflict(format!(
                        "mapper [{}] of different type, current_type [{}], merged_type [{}]",
                        name,
                        old_type.and_then(Value::as_str).unwrap_or_default(),
                        new_type.and_then(Value::as_str).unwrap_or_default()
                    )));
                }
            }
        }
        for (name, definition) in new_props {
            props.insert(name.clone(), definition.clone());
        }
    }
    for (key, value) in incoming {
        if key != "properties" {
            existing.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

impl DocumentStore for InMemoryDocumentStore {
    fn index_document<'a>(&'a self, request: &'a IndexRequest) -> StoreFuture<'a, IndexResponse> {
        Box::pin(async move {
            self.stats.lock().index_calls += 1;
            self.write_document(
                &request.index,
                &request.doc_type,
                request.id.as_deref(),
                request.body.clone(),
                &request.hints,
            )
        })
    }

    fn get_document<'a>(&'a self, request: &'a GetRequest) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.stats.lock().get_calls += 1;
            let indices = self.indices.read();
            let idx = indices
                .get(&request.index)
                .ok_or_else(|| index_missing(&request.index))?;
            let found = idx.documents.iter().find(|((doc_type, id), _)| {
                id == &request.id
                    && request
                        .doc_type
                        .as_deref()
                        .map(|wanted| wanted == doc_type)
                        .unwrap_or(true)
            });
            let ((doc_type, id), doc) = found.ok_or_else(|| {
                StoreError::NotFound(format!("[{}][{}] not found", request.index, request.id))
            })?;

            let mut hit = json!({
                "_index": request.index,
                "_type": doc_type,
                "_id": id,
                "_version": doc.version,
                "found": true,
                "_source": doc.source,
            });
            if let Some(routing) = &doc.routing {
                hit["_routing"] = json!(routing);
            }
            if let Some(parent) = &doc.parent {
                hit["_parent"] = json!(parent);
            }
            Ok(hit)
        })
    }

    fn delete_document<'a>(
        &'a self,
        request: &'a DeleteRequest,
    ) -> StoreFuture<'a, DeleteResponse> {
        Box::pin(async move {
            self.stats.lock().delete_calls += 1;
            let mut indices = self.indices.write();
            let idx = indices
                .get_mut(&request.index)
                .ok_or_else(|| index_missing(&request.index))?;
            let key = (request.doc_type.clone(), request.id.clone());
            let current = idx.documents.get(&key).map(|doc| doc.version);
            let Some(current) = current else {
                return Err(StoreError::NotFound(format!(
                    "[{}][{}] not found",
                    request.index, request.id
                )));
            };
            if let Some(expected) = request.hints.get("version").and_then(Value::as_u64) {
                if expected != current {
                    return Err(version_conflict(
                        &request.doc_type,
                        &request.id,
                        expected,
                        Some(current),
                    ));
                }
            }
            idx.documents.remove(&key);
            Ok(DeleteResponse {
                found: true,
                version: Some(current + 1),
            })
        })
    }

    fn count<'a>(
        &'a self,
        index: &'a str,
        doc_type: Option<&'a str>,
    ) -> StoreFuture<'a, CountResponse> {
        Box::pin(async move {
            self.stats.lock().count_calls += 1;
            let indices = self.indices.read();
            let idx = indices.get(index).ok_or_else(|| index_missing(index))?;
            let count = idx
                .documents
                .keys()
                .filter(|(t, _)| doc_type.map(|wanted| wanted == t).unwrap_or(true))
                .count();
            Ok(CountResponse {
                count: Some(count as u64),
            })
        })
    }

    fn bulk<'a>(&'a self, actions: &'a [Value], _chunk_size: usize) -> StoreFuture<'a, BulkResponse> {
        Box::pin(async move {
            {
                let mut stats = self.stats.lock();
                stats.bulk_calls += 1;
                stats.bulk_items += actions.len() as u64;
            }
            let items: Vec<BulkItem> = actions
                .iter()
                .map(|action| self.apply_bulk_action(action))
                .collect();
            Ok(BulkResponse {
                errors: items.iter().any(|item| !item.is_ok()),
                items,
            })
        })
    }

    fn index_exists<'a>(&'a self, index: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.stats.lock().admin_calls += 1;
            Ok(self.indices.read().contains_key(index))
        })
    }

    fn create_index<'a>(&'a self, index: &'a str, body: &'a Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.stats.lock().admin_calls += 1;
            let mut indices = self.indices.write();
            if indices.contains_key(index) {
                return Err(StoreError::Conflict(format!(
                    "index [{}] already exists",
                    index
                )));
            }
            let mut idx = InMemoryIndex::default();
            if let Some(Value::Object(mappings)) = body.get("mappings") {
                idx.mappings = mappings.clone();
            }
            indices.insert(index.to_string(), idx);
            Ok(())
        })
    }

    fn put_mapping<'a>(
        &'a self,
        index: &'a str,
        doc_type: &'a str,
        body: &'a Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.stats.lock().mapping_calls += 1;
            let incoming = body
                .get(doc_type)
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    StoreError::Rejected(format!("mapping body has no type [{}]", doc_type))
                })?;
            let mut indices = self.indices.write();
            let idx = indices.get_mut(index).ok_or_else(|| index_missing(index))?;
            let existing = idx
                .mappings
                .entry(doc_type)
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(existing) = existing else {
                return Err(StoreError::Rejected("stored mapping is not an object".into()));
            };
            let mut merged = existing.clone();
            merge_type_mapping(&mut merged, incoming)?;
            *existing = merged;
            Ok(())
        })
    }

    fn get_mapping<'a>(&'a self, index: &'a str, doc_type: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.stats.lock().mapping_calls += 1;
            let indices = self.indices.read();
            let idx = indices.get(index).ok_or_else(|| index_missing(index))?;
            let mut mappings = Map::new();
            if let Some(body) = idx.mappings.get(doc_type) {
                mappings.insert(doc_type.to_string(), body.clone());
            }
            Ok(json!({ index: { "mappings": mappings } }))
        })
    }

    fn delete_index<'a>(&'a self, index: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.stats.lock().admin_calls += 1;
            self.indices
                .write()
                .remove(index)
                .map(|_| json!({"acknowledged": true}))
                .ok_or_else(|| index_missing(index))
        })
    }
}
