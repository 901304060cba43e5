//! Document Instances
//!
//! A `Document` is one object bound to a `DocType`. It holds:
//!
//! - the values of the type's declared fields (always coerced)
//! - a bag of every attribute ever assigned, declared or not
//! - a per-instance metadata record (`id`, `index`, `version`, ...)
//!
//! Persistence goes through the type's connection and retry configuration;
//! bulk saves are handed to the type's queue.
//!
//! ## Wire Envelope
//!
//! ```text
//! {"_index", "_type", "_id", "_version", "_parent", "_routing",
//!  "_ttl", "_timestamp", "_source": {<body>}}
//! ```
//!
//! Metadata entries that are unset are left out of the envelope.

use crate::doctype::DocType;
use crate::error::{DocumentError, ValidationError};
use crate::field::is_absent;
use crate::retry::retry;
use crate::store::{DeleteRequest, DeleteResponse, IndexRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Keys of `DocType::create` input that populate the metadata record
const META_KEYS: [&str; 9] = [
    "id",
    "index",
    "doc_type",
    "version",
    "parent",
    "routing",
    "ttl",
    "timestamp",
    "score",
];

/// Per-instance store metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub id: Option<String>,
    pub index: Option<String>,
    pub doc_type: Option<String>,
    pub version: Option<u64>,
    pub parent: Option<String>,
    pub routing: Option<String>,
    pub ttl: Option<Value>,
    pub timestamp: Option<String>,
    pub score: Option<f64>,
}

impl DocMeta {
    pub fn is_meta_key(key: &str) -> bool {
        META_KEYS.contains(&key)
    }

    /// Set one entry from a loosely typed value; returns false for unknown keys
    pub fn set(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "id" => self.id = value_to_string(value),
            "index" => self.index = value_to_string(value),
            "doc_type" => self.doc_type = value_to_string(value),
            "version" => self.version = value.as_u64(),
            "parent" => self.parent = value_to_string(value),
            "routing" => self.routing = value_to_string(value),
            "ttl" => self.ttl = (!value.is_null()).then(|| value.clone()),
            "timestamp" => self.timestamp = value_to_string(value),
            "score" => self.score = value.as_f64(),
            _ => return false,
        }
        true
    }

    /// Read the metadata of a hit envelope (`_id`, `_index`, ...)
    pub fn from_envelope(envelope: &Map<String, Value>) -> Self {
        let mut meta = DocMeta::default();
        for key in META_KEYS {
            if let Some(value) = envelope.get(&format!("_{}", key)) {
                meta.set(key, value);
            }
        }
        if let Some(doc_type) = envelope.get("_type") {
            meta.doc_type = value_to_string(doc_type);
        }
        meta
    }

    /// Hints forwarded to single-document calls
    fn hints(&self) -> Map<String, Value> {
        let mut hints = Map::new();
        if let Some(parent) = &self.parent {
            hints.insert("parent".to_string(), json!(parent));
        }
        if let Some(routing) = &self.routing {
            hints.insert("routing".to_string(), json!(routing));
        }
        if let Some(ttl) = &self.ttl {
            hints.insert("ttl".to_string(), ttl.clone());
        }
        if let Some(timestamp) = &self.timestamp {
            hints.insert("timestamp".to_string(), json!(timestamp));
        }
        hints
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Connection and destination overrides for a single call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub using: Option<String>,
    pub index: Option<String>,
    /// Extra store parameters; these override hints taken from metadata
    pub hints: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.using = Some(alias.into());
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }
}

/// Options of [`Document::save`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    pub using: Option<String>,
    pub index: Option<String>,
    /// Queue the document instead of writing it
    pub bulk: bool,
    /// Save even if the type is read-only
    pub force: bool,
    /// Flush the destination right after queueing
    pub flush: bool,
    pub hints: Map<String, Value>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.using = Some(alias.into());
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn bulk(mut self) -> Self {
        self.bulk = true;
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn flush(mut self) -> Self {
        self.flush = true;
        self
    }

    pub fn hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }
}

/// What a save did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The store created a new document
    Created,
    /// The store replaced an existing document
    Updated,
    /// The document was queued; `pending` is the destination's queue length
    Queued { pending: usize },
}

impl SaveOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, SaveOutcome::Created)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, SaveOutcome::Queued { .. })
    }
}

/// One object of a document type
#[derive(Clone)]
pub struct Document {
    doc_type: Arc<DocType>,
    values: Map<String, Value>,
    bag: Map<String, Value>,
    meta: DocMeta,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("doc_type", &self.doc_type.name())
            .field("values", &self.values)
            .field("bag", &self.bag)
            .field("meta", &self.meta)
            .finish()
    }
}

impl Document {
    /// Build from caller-supplied values: declared keys are coerced, meta
    /// keys go to the metadata record, anything else lands in the bag
    pub(crate) fn from_values(doc_type: Arc<DocType>, input: &Map<String, Value>) -> Self {
        let mut values = Map::new();
        let mut bag = Map::new();
        let mut meta = DocMeta::default();

        doc_type.with_mapping(|mapping| {
            for (name, raw) in input {
                if let Some(field) = mapping.get(name) {
                    let coerced = field.coerce(raw);
                    values.insert(name.clone(), coerced.clone());
                    bag.insert(name.clone(), coerced);
                } else if !meta.set(name, raw) {
                    bag.insert(name.clone(), raw.clone());
                }
            }
            for (name, field) in mapping.iter() {
                if !values.contains_key(name) {
                    values.insert(name.to_string(), field.initial_value());
                }
            }
        });

        Document {
            doc_type,
            values,
            bag,
            meta,
        }
    }

    /// Build from a store hit; the body comes from `_source`
    pub(crate) fn from_envelope(
        doc_type: Arc<DocType>,
        envelope: &Map<String, Value>,
    ) -> Self {
        let meta = DocMeta::from_envelope(envelope);
        let empty = Map::new();
        let source = envelope
            .get("_source")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut values = Map::new();
        let mut bag = Map::new();
        doc_type.with_mapping(|mapping| {
            for (name, raw) in source {
                match mapping.get(name) {
                    Some(field) => {
                        let coerced = field.coerce(raw);
                        values.insert(name.clone(), coerced.clone());
                        bag.insert(name.clone(), coerced);
                    }
                    None => {
                        bag.insert(name.clone(), raw.clone());
                    }
                }
            }
            for (name, field) in mapping.iter() {
                if !values.contains_key(name) {
                    values.insert(name.to_string(), field.initial_value());
                }
            }
        });

        Document {
            doc_type,
            values,
            bag,
            meta,
        }
    }

    pub fn doc_type(&self) -> &Arc<DocType> {
        &self.doc_type
    }

    pub fn id(&self) -> Option<&str> {
        self.meta.id.as_deref()
    }

    pub fn meta(&self) -> &DocMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut DocMeta {
        &mut self.meta
    }

    /// Current value of a declared field or bag attribute
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| self.bag.get(name))
    }

    /// Assign an attribute; declared fields are coerced
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        let coerced = self
            .doc_type
            .with_mapping(|mapping| mapping.get(&name).map(|field| field.coerce(&value)));
        match coerced {
            Some(coerced) => {
                self.values.insert(name.clone(), coerced.clone());
                self.bag.insert(name, coerced);
            }
            None => {
                self.bag.insert(name, value);
            }
        }
        self
    }

    /// Declared field values
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Every attribute assigned so far
    pub fn bag(&self) -> &Map<String, Value> {
        &self.bag
    }

    /// Re-coerce declared fields and fill defaults for absent ones
    pub fn clean(&mut self) {
        let doc_type = self.doc_type.clone();
        doc_type.with_mapping(|mapping| {
            for (name, field) in mapping.iter() {
                let cleaned = match self.values.get(name) {
                    Some(current) if !is_absent(current) => field.coerce(current),
                    _ => field.initial_value(),
                };
                self.values.insert(name.to_string(), cleaned);
            }
        });
    }

    /// Check every declared field, reporting all failures at once
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.doc_type
            .with_mapping(|mapping| mapping.validate_object(&self.values))
    }

    /// Body of every tracked attribute, nulls omitted
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut body = Map::new();
        for (name, value) in &self.bag {
            if !self.values.contains_key(name) && !value.is_null() {
                body.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.values {
            if !value.is_null() {
                body.insert(name.clone(), value.clone());
            }
        }
        body
    }

    /// Store envelope of this document
    pub fn to_wire(&self) -> Value {
        let mut envelope = Map::new();
        if let Some(index) = &self.meta.index {
            envelope.insert("_index".to_string(), json!(index));
        }
        let doc_type = self
            .meta
            .doc_type
            .clone()
            .unwrap_or_else(|| self.doc_type.name().to_string());
        envelope.insert("_type".to_string(), json!(doc_type));
        if let Some(id) = &self.meta.id {
            envelope.insert("_id".to_string(), json!(id));
        }
        if let Some(version) = self.meta.version {
            envelope.insert("_version".to_string(), json!(version));
        }
        if let Some(parent) = &self.meta.parent {
            envelope.insert("_parent".to_string(), json!(parent));
        }
        if let Some(routing) = &self.meta.routing {
            envelope.insert("_routing".to_string(), json!(routing));
        }
        if let Some(ttl) = &self.meta.ttl {
            envelope.insert("_ttl".to_string(), ttl.clone());
        }
        if let Some(timestamp) = &self.meta.timestamp {
            envelope.insert("_timestamp".to_string(), json!(timestamp));
        }
        envelope.insert("_source".to_string(), Value::Object(self.to_dict()));
        Value::Object(envelope)
    }

    /// Destination: explicit > instance metadata > type's active index
    fn resolve_index(&self, explicit: Option<&str>) -> Result<String, DocumentError> {
        match explicit.or(self.meta.index.as_deref()) {
            Some(index) => Ok(index.to_string()),
            None => self.doc_type.resolve_index(None),
        }
    }

    /// Save destination: explicit > open bulk scope's index > `resolve_index`
    fn save_index(&self, explicit: Option<&str>) -> Result<String, DocumentError> {
        match explicit {
            Some(index) => Ok(index.to_string()),
            None => match self.doc_type.scope_index() {
                Some(index) => Ok(index),
                None => self.resolve_index(None),
            },
        }
    }

    fn request_hints(&self, overrides: &Map<String, Value>) -> Map<String, Value> {
        let mut hints = self.meta.hints();
        for (key, value) in overrides {
            hints.insert(key.clone(), value.clone());
        }
        hints
    }

    /// Persist this document, directly or through the type's bulk queue
    ///
    /// Queued saves go through the type's connection alias; asking for any
    /// other alias with `SaveOptions::using` is a `Configuration` error. When
    /// the flush triggered by a queued save fails, the error is returned but
    /// the document stays queued and goes out with the next flush of its
    /// destination, so it must not be saved again.
    pub async fn save(&mut self, options: SaveOptions) -> Result<SaveOutcome, DocumentError> {
        let doc_type = self.doc_type.clone();
        if doc_type.is_read_only() && !options.force {
            return Err(DocumentError::ReadOnly {
                doc_type: doc_type.name().to_string(),
            });
        }

        self.clean();
        if let Some(hook) = doc_type.pre_save_hook() {
            hook(self)?;
        }
        self.validate()?;

        let index = self.save_index(options.index.as_deref())?;

        if options.bulk || doc_type.bulk_enabled() || doc_type.in_bulk_scope() {
            if let Some(alias) = options.using.as_deref() {
                let queue_alias = doc_type.queue_alias();
                if alias != queue_alias {
                    return Err(DocumentError::Configuration(format!(
                        "queued saves of '{}' go through alias '{}', not '{}'",
                        doc_type.name(),
                        queue_alias,
                        alias
                    )));
                }
            }
            let pending = doc_type.enqueue(self, &index, options.flush).await?;
            debug!(doc_type = doc_type.name(), index = %index, pending, "document queued");
            return Ok(SaveOutcome::Queued { pending });
        }

        let store = doc_type.connection(options.using.as_deref())?;
        let request = IndexRequest {
            index,
            doc_type: doc_type.name().to_string(),
            id: self.meta.id.clone(),
            body: self.to_dict(),
            hints: self.request_hints(&options.hints),
        };
        let response = {
            let store = &*store;
            let request = &request;
            retry(&doc_type.retry_config().document, "index", move || {
                store.index_document(request)
            })
            .await?
        };

        debug!(
            doc_type = doc_type.name(),
            index = %response.index,
            id = %response.id,
            version = response.version,
            created = response.created,
            "document saved"
        );
        let created = response.created;
        self.meta.id = Some(response.id);
        self.meta.index = Some(response.index);
        self.meta.version = Some(response.version);

        Ok(if created {
            SaveOutcome::Created
        } else {
            SaveOutcome::Updated
        })
    }

    /// Delete this document from the store; it must have an id
    pub async fn delete(&mut self, options: RequestOptions) -> Result<DeleteResponse, DocumentError> {
        let doc_type = self.doc_type.clone();
        let id = self.meta.id.clone().ok_or_else(|| {
            DocumentError::Configuration(format!(
                "cannot delete a '{}' document without an id",
                doc_type.name()
            ))
        })?;
        let index = self.resolve_index(options.index.as_deref())?;
        let store = doc_type.connection(options.using.as_deref())?;
        let request = DeleteRequest {
            index,
            doc_type: doc_type.name().to_string(),
            id,
            hints: self.request_hints(&options.hints),
        };
        let response = {
            let store = &*store;
            let request = &request;
            retry(&doc_type.retry_config().document, "delete", move || {
                store.delete_document(request)
            })
            .await?
        };

        debug!(doc_type = doc_type.name(), id = %request.id, "document deleted");
        if response.version.is_some() {
            self.meta.version = response.version;
        }
        Ok(response)
    }
}
