//! Document Store Abstraction
//!
//! Trait-based boundary to the remote document store. Everything above this
//! module (retry, queue, documents) talks to the store only through
//! `DocumentStore`, so a real client, the in-memory store and the
//! fault-injecting simulated store are interchangeable.
//!
//! Implementations:
//! - `InMemoryDocumentStore`: For unit tests and local development
//! - `SimulatedDocumentStore`: Wraps another store and injects transport faults
//!
//! ## Wire Shapes
//!
//! ```text
//! hit / bulk action:  {"_index", "_type", "_id", "_version", "_source": {...}}
//! mapping:            {"<index>": {"mappings": {"<type>": {"properties": {...}}}}}
//! ```

pub mod memory;
pub mod simulated;

pub use memory::{InMemoryDocumentStore, StoreStats};
pub use simulated::{SimulatedDocumentStore, SimulatedStoreConfig, SimulatedStoreStats};

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every store call
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Type name used by bulk actions that carry no `_type`
pub const DEFAULT_DOC_TYPE: &str = "_doc";

/// Write a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    pub index: String,
    pub doc_type: String,
    /// `None` lets the store assign an identifier
    pub id: Option<String>,
    pub body: Map<String, Value>,
    /// Store-specific parameters: `parent`, `routing`, `ttl`, `version`, `op_type`, ...
    #[serde(default)]
    pub hints: Map<String, Value>,
}

/// Store's answer to a single write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: u64,
    /// True when the write created the document, false when it replaced one
    pub created: bool,
}

/// Fetch a single document by identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub index: String,
    /// `None` matches any type
    pub doc_type: Option<String>,
    pub id: String,
    #[serde(default)]
    pub hints: Map<String, Value>,
}

/// Delete a single document by identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    #[serde(default)]
    pub hints: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub found: bool,
    #[serde(rename = "_version")]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    /// Absent when the store did not report a count
    pub count: Option<u64>,
}

/// Outcome of one action inside a bulk call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_index")]
    pub index: Option<String>,
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItem {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Raw response of a bulk call; per-item failures are left to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| !item.is_ok())
    }
}

/// Remote document store
///
/// Methods return boxed futures so the trait stays object safe
/// (`Arc<dyn DocumentStore>`).
pub trait DocumentStore: Send + Sync + 'static {
    /// Create or replace a document
    fn index_document<'a>(&'a self, request: &'a IndexRequest) -> StoreFuture<'a, IndexResponse>;

    /// Fetch a document as a hit envelope; `NotFound` if absent
    fn get_document<'a>(&'a self, request: &'a GetRequest) -> StoreFuture<'a, Value>;

    /// Delete a document; `NotFound` if absent, `Conflict` on version mismatch
    fn delete_document<'a>(&'a self, request: &'a DeleteRequest)
        -> StoreFuture<'a, DeleteResponse>;

    /// Count documents of a type (or all types) in an index
    fn count<'a>(&'a self, index: &'a str, doc_type: Option<&'a str>)
        -> StoreFuture<'a, CountResponse>;

    /// Apply a batch of wire envelopes
    fn bulk<'a>(&'a self, actions: &'a [Value], chunk_size: usize) -> StoreFuture<'a, BulkResponse>;

    /// Check if an index exists
    fn index_exists<'a>(&'a self, index: &'a str) -> StoreFuture<'a, bool>;

    /// Create an index with `{"mappings": {...}}`; `Conflict` if it exists
    fn create_index<'a>(&'a self, index: &'a str, body: &'a Value) -> StoreFuture<'a, ()>;

    /// Merge a type mapping into an existing index
    fn put_mapping<'a>(
        &'a self,
        index: &'a str,
        doc_type: &'a str,
        body: &'a Value,
    ) -> StoreFuture<'a, ()>;

    /// Fetch `{"<index>": {"mappings": {"<type>": {...}}}}`
    fn get_mapping<'a>(&'a self, index: &'a str, doc_type: &'a str) -> StoreFuture<'a, Value>;

    /// Delete a whole index
    fn delete_index<'a>(&'a self, index: &'a str) -> StoreFuture<'a, Value>;
}
