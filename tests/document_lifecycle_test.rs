//! Document Lifecycle Tests
//!
//! End-to-end behaviour of declared document types against the in-memory
//! store: mapping push, save, fetch, count, delete, bulk scopes and mapping
//! refresh.

use doc_mapper::{
    Connections, DocType, DocTypeOptions, DocumentError, Field, InMemoryDocumentStore, Mapping,
    RequestOptions, RetryConfig, SaveOptions, SaveOutcome, DEFAULT_ALIAS,
};
use serde_json::json;
use std::sync::Arc;

fn connections_for(store: &InMemoryDocumentStore) -> Arc<Connections> {
    let connections = Connections::new();
    connections.register(DEFAULT_ALIAS, Arc::new(store.clone()));
    connections
}

fn article(connections: Arc<Connections>) -> Arc<DocType> {
    DocType::builder("Article")
        .field("title", Field::string().required().meta("index", "analyzed"))
        .field("views", Field::integer().default_value(0).min_value(0.0))
        .field("published", Field::date())
        .field("tags", Field::list())
        .index("blog")
        .connections(connections)
        .retry(RetryConfig::test())
        .build()
}

// =============================================================================
// Single Document Operations
// =============================================================================

#[tokio::test]
async fn test_save_get_count_delete() {
    let store = InMemoryDocumentStore::new();
    let article = article(connections_for(&store));
    article.init(RequestOptions::new()).await.unwrap();

    let mut doc = article
        .create(json!({
            "title": "Mapping documents",
            "published": "2015-04-02T10:00:00+02:00",
            "tags": "rust,search",
        }))
        .unwrap();
    assert_eq!(doc.save(SaveOptions::new()).await.unwrap(), SaveOutcome::Created);
    let id = doc.id().unwrap().to_string();

    let fetched = article.get(&id, RequestOptions::new()).await.unwrap();
    assert_eq!(fetched.get("title"), Some(&json!("Mapping documents")));
    assert_eq!(fetched.get("views"), Some(&json!(0)));
    assert_eq!(fetched.get("published"), Some(&json!("2015-04-02T08:00:00Z")));
    assert_eq!(fetched.get("tags"), Some(&json!(["rust", "search"])));
    assert_eq!(fetched.meta().version, Some(1));
    assert_eq!(fetched.meta().index.as_deref(), Some("blog"));

    assert_eq!(article.count(RequestOptions::new()).await.unwrap(), 1);

    let mut fetched = fetched;
    let response = fetched.delete(RequestOptions::new()).await.unwrap();
    assert!(response.found);
    assert_eq!(article.count(RequestOptions::new()).await.unwrap(), 0);

    let err = article.get(&id, RequestOptions::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_validation_reports_every_field() {
    let store = InMemoryDocumentStore::new();
    let article = article(connections_for(&store));

    let mut doc = article.create(json!({"views": -1})).unwrap();
    let err = doc.save(SaveOptions::new()).await.unwrap_err();

    let errors = match err {
        DocumentError::Validation(errors) => errors,
        other => panic!("expected validation error, got {:?}", other),
    };
    assert!(errors.contains("title"));
    assert!(errors.contains("views"));
    assert_eq!(store.stats().index_calls, 0);
}

#[tokio::test]
async fn test_explicit_index_and_alias() {
    let primary = InMemoryDocumentStore::new();
    let archive = InMemoryDocumentStore::new();
    let connections = connections_for(&primary);
    connections.register("archive", Arc::new(archive.clone()));
    let article = article(connections);

    let mut doc = article.create(json!({"title": "old news"})).unwrap();
    doc.save(SaveOptions::new().using("archive").index("blog-2014"))
        .await
        .unwrap();

    assert_eq!(archive.len("blog-2014"), 1);
    assert!(!primary.has_index("blog-2014"));

    let err = doc
        .save(SaveOptions::new().using("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::Configuration(_)));
}

#[tokio::test]
async fn test_unknown_attributes_are_persisted() {
    let store = InMemoryDocumentStore::new();
    let article = article(connections_for(&store));

    let mut doc = article.create(json!({"title": "x"})).unwrap();
    doc.set("mood", "curious");
    doc.save(SaveOptions::new()).await.unwrap();

    let stored = store
        .document("blog", "article", doc.id().unwrap())
        .unwrap();
    assert_eq!(stored["mood"], json!("curious"));
    assert!(!stored.contains_key("published"));
}

// =============================================================================
// Inheritance and Options
// =============================================================================

#[tokio::test]
async fn test_derived_type_pushes_merged_mapping() {
    let store = InMemoryDocumentStore::new();
    let connections = connections_for(&store);
    let base = article(connections);

    let options = DocTypeOptions::from_toml_str(
        r#"
        index = "features"
        bulk_size = 3
        "#,
    )
    .unwrap();
    let feature = DocType::builder("FeatureArticle")
        .field("editor", Field::string())
        .field("views", Field::float())
        .options(options)
        .base(&base)
        .build();

    assert_eq!(feature.name(), "feature_article");
    assert_eq!(feature.bulk_size(), 3);
    feature.init(RequestOptions::new()).await.unwrap();

    let pulled = doc_mapper::SchemaSynchronizer::default()
        .pull("feature_article", "features", &store)
        .await
        .unwrap();
    assert_eq!(
        pulled.names().collect::<Vec<_>>(),
        vec!["editor", "published", "tags", "title", "views"]
    );
    assert_eq!(pulled.get("views").unwrap().mapping(), json!({"type": "double"}));
    assert_eq!(base.mapping().get("views").unwrap().mapping(), json!({"type": "long"}));
}

#[tokio::test]
async fn test_refresh_picks_up_remote_fields() {
    let store = InMemoryDocumentStore::new();
    let connections = connections_for(&store);
    let article = article(connections.clone());
    article.init(RequestOptions::new()).await.unwrap();

    let mut remote = Mapping::new("article").with_field("summary", Field::string());
    remote.meta("_all", json!({"enabled": false}));
    doc_mapper::SchemaSynchronizer::default()
        .push(&remote, "blog", &store)
        .await
        .unwrap();

    article.refresh(RequestOptions::new()).await.unwrap();
    let mapping = article.mapping();
    assert!(mapping.contains("summary"));
    assert_eq!(mapping.meta_entries()["_all"], json!({"enabled": false}));

    let doc = article
        .create(json!({"title": "x", "summary": 42}))
        .unwrap();
    assert_eq!(doc.get("summary"), Some(&json!("42")));
}

// =============================================================================
// Bulk Scope
// =============================================================================

#[tokio::test]
async fn test_bulk_scope_batches_saves() {
    let store = InMemoryDocumentStore::new();
    let article = article(connections_for(&store));

    let scoped = article.clone();
    let saved = article
        .bulk(None, move || async move {
            let mut outcomes = Vec::new();
            for n in 0..5 {
                let mut doc = scoped.create(json!({"title": format!("post {}", n)}))?;
                outcomes.push(doc.save(SaveOptions::new()).await?);
            }
            Ok::<_, DocumentError>(outcomes)
        })
        .await
        .unwrap();

    assert!(saved.iter().all(SaveOutcome::is_queued));
    let stats = store.stats();
    assert_eq!(stats.index_calls, 0);
    assert_eq!(stats.bulk_calls, 1);
    assert_eq!(stats.bulk_items, 5);
    assert_eq!(store.len("blog"), 5);
    assert_eq!(article.pending("blog").await, 0);
}

#[tokio::test]
async fn test_explicit_bulk_save_with_flush() {
    let store = InMemoryDocumentStore::new();
    let article = article(connections_for(&store));

    let mut doc = article.create(json!({"title": "queued"})).unwrap();
    let outcome = doc.save(SaveOptions::new().bulk()).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Queued { pending: 1 });
    assert_eq!(store.len("blog"), 0);

    let mut doc = article.create(json!({"title": "flushed"})).unwrap();
    let outcome = doc.save(SaveOptions::new().bulk().flush()).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Queued { pending: 0 });
    assert_eq!(store.len("blog"), 2);
    assert_eq!(store.stats().bulk_calls, 1);

    assert!(article.flush(None).await.unwrap().is_none());
    assert_eq!(store.stats().bulk_calls, 1);
}
