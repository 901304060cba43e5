//! Schema Synchronizer
//!
//! Pushes a type's mapping to the store and pulls the live mapping back.
//! Every call goes through the retry wrapper with the structural policy.
//!
//! ## Push
//!
//! ```text
//! index_exists(index)?
//!   no  -> create_index(index, {"mappings": {<type>: {...}}})
//!   yes -> put_mapping(index, <type>, {<type>: {...}})
//! ```

use crate::error::{DocumentError, StoreError};
use crate::mapping::Mapping;
use crate::retry::{retry, RetryPolicy};
use crate::store::DocumentStore;
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SchemaSynchronizer {
    policy: RetryPolicy,
}

impl Default for SchemaSynchronizer {
    fn default() -> Self {
        SchemaSynchronizer::new(RetryPolicy::structural_default())
    }
}

impl SchemaSynchronizer {
    pub fn new(policy: RetryPolicy) -> Self {
        SchemaSynchronizer { policy }
    }

    /// Create the index with this mapping, or merge it into the existing index
    pub async fn push(
        &self,
        mapping: &Mapping,
        index: &str,
        store: &dyn DocumentStore,
    ) -> Result<(), DocumentError> {
        let exists = retry(&self.policy, "index_exists", move || store.index_exists(index)).await?;

        if exists {
            let body = mapping.to_dict();
            let body = &body;
            let doc_type = mapping.doc_type();
            retry(&self.policy, "put_mapping", move || {
                store.put_mapping(index, doc_type, body)
            })
            .await?;
            info!(index, doc_type, "mapping updated");
        } else {
            let body = json!({ "mappings": mapping.to_dict() });
            let body = &body;
            retry(&self.policy, "create_index", move || store.create_index(index, body)).await?;
            info!(index, doc_type = mapping.doc_type(), "index created with mapping");
        }
        Ok(())
    }

    /// Fetch and rehydrate the live mapping of `doc_type` in `index`
    pub async fn pull(
        &self,
        doc_type: &str,
        index: &str,
        store: &dyn DocumentStore,
    ) -> Result<Mapping, DocumentError> {
        let raw = retry(&self.policy, "get_mapping", move || {
            store.get_mapping(index, doc_type)
        })
        .await?;

        let body = raw
            .get(index)
            .and_then(|idx| idx.get("mappings"))
            .and_then(|mappings| mappings.get(doc_type))
            .ok_or_else(|| {
                StoreError::NotFound(format!("no mapping for [{}] in index [{}]", doc_type, index))
            })?;
        Ok(Mapping::from_dict(doc_type, body))
    }

    /// Overwrite `mapping` with what the store currently holds
    pub async fn refresh(
        &self,
        mapping: &mut Mapping,
        index: &str,
        store: &dyn DocumentStore,
    ) -> Result<(), DocumentError> {
        let live = self.pull(mapping.doc_type(), index, store).await?;
        mapping.update(&live, false);
        Ok(())
    }
}
