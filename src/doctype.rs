//! Document Types
//!
//! A `DocTypeBuilder` collects a kind's fields, options and base types;
//! `build()` computes the final descriptor once and hands out an
//! `Arc<DocType>`.
//!
//! ## Inheritance
//!
//! ```text
//! mapping  = pre-built mapping (or empty) + own fields
//!            then each base merged with update_only (earlier bases win)
//! index, using, bulk, bulk_size = own value, else first base that has one
//! read_only = own || any base
//! doc_type  = own option, else snake_case(declared name); never inherited
//! ```
//!
//! After `build()` only `refresh` changes the live mapping.

use crate::config::{DocTypeOptions, RetryConfig, DEFAULT_BULK_SIZE};
use crate::connections::Connections;
use crate::document::{Document, RequestOptions};
use crate::error::DocumentError;
use crate::field::Field;
use crate::mapping::Mapping;
use crate::queue::BulkQueue;
use crate::retry::retry;
use crate::store::{BulkResponse, DocumentStore, GetRequest};
use crate::sync::SchemaSynchronizer;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hook run on every save after cleaning and before validation
pub type PreSaveHook = Arc<dyn Fn(&mut Document) -> Result<(), DocumentError> + Send + Sync>;

/// `MyDoc` -> `my_doc`
///
/// An underscore goes before every upper-case letter that follows another
/// character; pairs are matched left to right without overlap.
pub fn derive_type_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        match chars.get(i + 1) {
            Some(next) if next.is_uppercase() => {
                out.push(chars[i]);
                out.push('_');
                out.push(*next);
                i += 2;
            }
            _ => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out.to_lowercase()
}

/// Declaring state of a document type
pub struct DocTypeBuilder {
    name: String,
    fields: Vec<(String, Field)>,
    options: DocTypeOptions,
    bases: Vec<Arc<DocType>>,
    connections: Option<Arc<Connections>>,
    retry: Option<RetryConfig>,
    pre_save: Option<PreSaveHook>,
}

impl DocTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        DocTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
            options: DocTypeOptions::default(),
            bases: Vec::new(),
            connections: None,
            retry: None,
            pre_save: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Replace the whole option block
    pub fn options(mut self, options: DocTypeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.options.index = Some(index.into());
        self
    }

    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.options.using = Some(alias.into());
        self
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.options.doc_type = Some(doc_type.into());
        self
    }

    /// Start from a pre-built mapping; declared fields replace its entries
    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.options.mapping = Some(mapping);
        self
    }

    pub fn bulk(mut self, bulk: bool) -> Self {
        self.options.bulk = Some(bulk);
        self
    }

    pub fn bulk_size(mut self, size: usize) -> Self {
        self.options.bulk_size = Some(size);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.options.read_only = Some(read_only);
        self
    }

    /// Add a base type; earlier bases take precedence over later ones
    pub fn base(mut self, base: &Arc<DocType>) -> Self {
        self.bases.push(base.clone());
        self
    }

    pub fn connections(mut self, connections: Arc<Connections>) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn pre_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Document) -> Result<(), DocumentError> + Send + Sync + 'static,
    {
        self.pre_save = Some(Arc::new(hook));
        self
    }

    /// Finalize the type
    pub fn build(self) -> Arc<DocType> {
        let DocTypeBuilder {
            name,
            fields,
            options,
            bases,
            connections,
            retry,
            pre_save,
        } = self;

        let doc_type = options
            .doc_type
            .clone()
            .unwrap_or_else(|| derive_type_name(&name));

        let mut mapping = options
            .mapping
            .clone()
            .unwrap_or_else(|| Mapping::new(doc_type.clone()));
        mapping.set_doc_type(doc_type.clone());
        for (field_name, field) in fields {
            mapping.field(field_name, field);
        }
        for base in &bases {
            mapping.update(&base.mapping(), true);
        }

        let index = options
            .index
            .clone()
            .or_else(|| bases.iter().find_map(|b| b.declared_index.clone()));
        let using = options
            .using
            .clone()
            .or_else(|| bases.iter().find_map(|b| b.using.clone()));
        let bulk = options.bulk.or_else(|| bases.iter().find_map(|b| b.bulk));
        let bulk_size = options
            .bulk_size
            .or_else(|| bases.iter().find_map(|b| b.bulk_size));
        let read_only =
            options.read_only.unwrap_or(false) || bases.iter().any(|b| b.read_only);

        let connections = connections
            .or_else(|| bases.first().map(|b| b.connections.clone()))
            .unwrap_or_else(Connections::global);
        let retry = retry
            .or_else(|| bases.first().map(|b| b.retry.clone()))
            .unwrap_or_default();
        let pre_save = pre_save.or_else(|| bases.iter().find_map(|b| b.pre_save.clone()));

        let queue = BulkQueue::new(
            index.clone(),
            using.clone(),
            bulk_size.unwrap_or(DEFAULT_BULK_SIZE),
            connections.clone(),
            retry.bulk.clone(),
        );

        debug!(
            name = %name,
            doc_type = %doc_type,
            fields = mapping.len(),
            bases = bases.len(),
            "document type declared"
        );

        Arc::new(DocType {
            name,
            doc_type,
            mapping: RwLock::new(mapping),
            active_index: RwLock::new(index.clone()),
            declared_index: index,
            using,
            bulk,
            bulk_size,
            read_only,
            connections,
            retry,
            pre_save,
            scope_index: RwLock::new(None),
            scope_destinations: Mutex::new(BTreeSet::new()),
            scope_depth: AtomicUsize::new(0),
            queue: tokio::sync::Mutex::new(queue),
        })
    }
}

/// Finalized descriptor of one document kind
pub struct DocType {
    name: String,
    doc_type: String,
    mapping: RwLock<Mapping>,
    declared_index: Option<String>,
    /// Index used when a call names none; overridden inside a bulk scope
    active_index: RwLock<Option<String>>,
    using: Option<String>,
    bulk: Option<bool>,
    bulk_size: Option<usize>,
    read_only: bool,
    connections: Arc<Connections>,
    retry: RetryConfig,
    pre_save: Option<PreSaveHook>,
    /// Destination named by the innermost bulk scope; beats instance metadata
    scope_index: RwLock<Option<String>>,
    /// Every destination queued into while a scope is open
    scope_destinations: Mutex<BTreeSet<String>>,
    scope_depth: AtomicUsize,
    queue: tokio::sync::Mutex<BulkQueue>,
}

impl fmt::Debug for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocType")
            .field("name", &self.name)
            .field("doc_type", &self.doc_type)
            .field("index", &*self.active_index.read())
            .field("using", &self.using)
            .field("bulk", &self.bulk_enabled())
            .field("bulk_size", &self.bulk_size())
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Restores the type's index and scope depth when a bulk scope ends
struct BulkScope<'a> {
    doc_type: &'a DocType,
    prior_index: Option<String>,
    prior_scope_index: Option<String>,
}

impl Drop for BulkScope<'_> {
    fn drop(&mut self) {
        *self.doc_type.active_index.write() = self.prior_index.take();
        *self.doc_type.scope_index.write() = self.prior_scope_index.take();
        self.doc_type.scope_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DocType {
    pub fn builder(name: impl Into<String>) -> DocTypeBuilder {
        DocTypeBuilder::new(name)
    }

    /// Store type name (`my_doc`)
    pub fn name(&self) -> &str {
        &self.doc_type
    }

    /// Name the type was declared with (`MyDoc`)
    pub fn declared_name(&self) -> &str {
        &self.name
    }

    /// Index used when a call names none
    pub fn index(&self) -> Option<String> {
        self.active_index.read().clone()
    }

    pub fn using(&self) -> Option<&str> {
        self.using.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn bulk_enabled(&self) -> bool {
        self.bulk.unwrap_or(false)
    }

    pub fn bulk_size(&self) -> usize {
        self.bulk_size.unwrap_or(DEFAULT_BULK_SIZE)
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    /// Snapshot of the live mapping
    pub fn mapping(&self) -> Mapping {
        self.mapping.read().clone()
    }

    pub(crate) fn with_mapping<R>(&self, f: impl FnOnce(&Mapping) -> R) -> R {
        f(&self.mapping.read())
    }

    pub(crate) fn pre_save_hook(&self) -> Option<PreSaveHook> {
        self.pre_save.clone()
    }

    pub(crate) fn in_bulk_scope(&self) -> bool {
        self.scope_depth.load(Ordering::SeqCst) > 0
    }

    /// Index forced by an open `bulk(Some(index), ..)` scope
    pub(crate) fn scope_index(&self) -> Option<String> {
        self.scope_index.read().clone()
    }

    /// Alias the bulk queue sends through
    pub(crate) fn queue_alias(&self) -> String {
        self.using
            .clone()
            .unwrap_or_else(|| self.connections.default_alias())
    }

    /// Resolve a connection: explicit alias, else the type's, else the default
    pub fn connection(&self, using: Option<&str>) -> Result<Arc<dyn DocumentStore>, DocumentError> {
        self.connections
            .get_connection(using.or(self.using.as_deref()))
    }

    pub(crate) fn resolve_index(&self, explicit: Option<&str>) -> Result<String, DocumentError> {
        if let Some(index) = explicit {
            return Ok(index.to_string());
        }
        self.index().ok_or_else(|| {
            DocumentError::Configuration(format!(
                "no index configured for document type '{}'",
                self.doc_type
            ))
        })
    }

    /// New instance from a JSON object of values
    pub fn create(self: &Arc<Self>, values: Value) -> Result<Document, DocumentError> {
        match values {
            Value::Object(input) => Ok(Document::from_values(self.clone(), &input)),
            Value::Null => Ok(Document::from_values(self.clone(), &Map::new())),
            other => Err(DocumentError::Configuration(format!(
                "document values must be an object, got {}",
                other
            ))),
        }
    }

    /// Rehydrate an instance from a store hit envelope
    pub fn from_hit(self: &Arc<Self>, hit: &Value) -> Result<Document, DocumentError> {
        let envelope = hit.as_object().ok_or_else(|| {
            DocumentError::Configuration("hit envelope must be an object".to_string())
        })?;
        Ok(Document::from_envelope(self.clone(), envelope))
    }

    /// Fetch one document by id
    pub async fn get(
        self: &Arc<Self>,
        id: &str,
        options: RequestOptions,
    ) -> Result<Document, DocumentError> {
        let index = self.resolve_index(options.index.as_deref())?;
        let store = self.connection(options.using.as_deref())?;
        let request = GetRequest {
            index,
            doc_type: Some(self.doc_type.clone()),
            id: id.to_string(),
            hints: options.hints,
        };
        let hit = {
            let store = &*store;
            let request = &request;
            retry(&self.retry.document, "get", move || store.get_document(request)).await?
        };
        self.from_hit(&hit)
    }

    /// Number of documents of this type; zero when the store reports none
    pub async fn count(&self, options: RequestOptions) -> Result<u64, DocumentError> {
        let index = self.resolve_index(options.index.as_deref())?;
        let store = self.connection(options.using.as_deref())?;
        let response = {
            let store = &*store;
            let index = index.as_str();
            let doc_type = self.doc_type.as_str();
            retry(&self.retry.structural, "count", move || {
                store.count(index, Some(doc_type))
            })
            .await?
        };
        Ok(response.count.unwrap_or(0))
    }

    /// Delete the type's index; any failure yields `None`
    pub async fn drop_index(&self, options: RequestOptions) -> Option<Value> {
        let attempt = async {
            let index = self.resolve_index(options.index.as_deref())?;
            let store = self.connection(options.using.as_deref())?;
            let store = &*store;
            let index = index.as_str();
            let response =
                retry(&self.retry.structural, "delete_index", move || store.delete_index(index))
                    .await?;
            info!(index, doc_type = %self.doc_type, "index dropped");
            Ok::<_, DocumentError>(response)
        };
        match attempt.await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(doc_type = %self.doc_type, error = %e, "dropping index failed");
                None
            }
        }
    }

    /// Push this type's mapping to its index
    pub async fn init(&self, options: RequestOptions) -> Result<(), DocumentError> {
        let index = self.resolve_index(options.index.as_deref())?;
        let store = self.connection(options.using.as_deref())?;
        let mapping = self.mapping();
        SchemaSynchronizer::new(self.retry.structural.clone())
            .push(&mapping, &index, &*store)
            .await
    }

    /// Replace the live mapping with the store's version
    pub async fn refresh(&self, options: RequestOptions) -> Result<(), DocumentError> {
        let index = self.resolve_index(options.index.as_deref())?;
        let store = self.connection(options.using.as_deref())?;
        let live = SchemaSynchronizer::new(self.retry.structural.clone())
            .pull(&self.doc_type, &index, &*store)
            .await?;
        self.mapping.write().update(&live, false);
        debug!(doc_type = %self.doc_type, index = %index, "mapping refreshed");
        Ok(())
    }

    /// Queue a saved document; returns the destination's pending count
    ///
    /// The document stays queued when the threshold or requested flush
    /// fails; the error is returned all the same.
    pub(crate) async fn enqueue(
        &self,
        document: &Document,
        index: &str,
        flush: bool,
    ) -> Result<usize, DocumentError> {
        if self.in_bulk_scope() {
            self.scope_destinations.lock().insert(index.to_string());
        }
        let mut queue = self.queue.lock().await;
        queue.append(document, Some(index)).await?;
        if flush {
            queue.flush(Some(index)).await?;
        }
        Ok(queue.pending_len(index))
    }

    /// Flush queued documents of one destination (default: the active index)
    pub async fn flush(&self, index: Option<&str>) -> Result<Option<BulkResponse>, DocumentError> {
        let index = self.resolve_index(index)?;
        self.queue.lock().await.flush(Some(&index)).await
    }

    pub async fn flush_all(&self) -> Result<Vec<BulkResponse>, DocumentError> {
        self.queue.lock().await.flush_all().await
    }

    /// Documents waiting in the queue for `index`
    pub async fn pending(&self, index: &str) -> usize {
        self.queue.lock().await.pending_len(index)
    }

    /// Run `body` with every save of this type forced through the queue
    ///
    /// When `index` is given it becomes the type's index for the duration of
    /// the scope, and saves without an explicit `SaveOptions::index` go there
    /// even if the instance was loaded from another index. On exit the prior
    /// index is restored and the active destination is flushed, even when
    /// `body` failed. The outermost scope also flushes every other
    /// destination queued into while it was open. A flush failure takes
    /// precedence over the body's result.
    pub async fn bulk<T, F, Fut>(&self, index: Option<&str>, body: F) -> Result<T, DocumentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DocumentError>>,
    {
        let prior_index = self.index();
        let prior_scope_index = self.scope_index();
        let destination = index.map(str::to_string).or_else(|| prior_index.clone());
        if index.is_some() {
            *self.active_index.write() = destination.clone();
            *self.scope_index.write() = destination.clone();
        }
        self.scope_depth.fetch_add(1, Ordering::SeqCst);
        let scope = BulkScope {
            doc_type: self,
            prior_index,
            prior_scope_index,
        };

        let outcome = body().await;
        drop(scope);

        if outcome.is_err() {
            debug!(doc_type = %self.doc_type, "bulk scope body failed, flushing anyway");
        }

        let mut targets = BTreeSet::new();
        if !self.in_bulk_scope() {
            targets.append(&mut self.scope_destinations.lock());
        }
        targets.extend(destination);

        let mut first_failure = None;
        for target in &targets {
            if let Err(e) = self.flush(Some(target)).await {
                warn!(doc_type = %self.doc_type, index = %target, error = %e, "bulk scope flush failed");
                first_failure.get_or_insert(e);
            }
        }
        if let Some(e) = first_failure {
            return Err(e);
        }
        outcome
    }
}
