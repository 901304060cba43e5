//! Client-side document mapping for a remote document store.
//!
//! Declare document types with typed fields, convert instances to and from
//! the store's wire envelopes, and persist them directly or through a
//! batching queue. Every remote call is wrapped in a retry policy.

pub mod config;
pub mod connections;
pub mod doctype;
pub mod document;
pub mod error;
pub mod field;
pub mod mapping;
pub mod observability;
pub mod queue;
pub mod retry;
pub mod store;
pub mod sync;

pub use config::{DocTypeOptions, RetryConfig, DEFAULT_BULK_SIZE};
pub use connections::{Connections, DEFAULT_ALIAS};
pub use doctype::{DocType, DocTypeBuilder, PreSaveHook};
pub use document::{DocMeta, Document, RequestOptions, SaveOptions, SaveOutcome};
pub use error::{DocumentError, StoreError, ValidationError};
pub use field::{Field, FieldError, FieldKind};
pub use mapping::Mapping;
pub use queue::BulkQueue;
pub use retry::{retry, RetryPolicy};
pub use store::{DocumentStore, InMemoryDocumentStore, SimulatedDocumentStore, SimulatedStoreConfig};
pub use sync::SchemaSynchronizer;
