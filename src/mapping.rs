//! Schema Model ("Mapping")
//!
//! A mapping is the authoritative set of field descriptors for one document
//! type, plus type-level store metadata such as `_all` or `dynamic`.
//!
//! ## Wire Shape
//!
//! ```text
//! { "<doc_type>": { "properties": { "<field>": {"type": ...} }, "_all": {...} } }
//! ```
//!
//! Field names are unique; properties are kept sorted so the rendered
//! mapping is deterministic.

use crate::error::ValidationError;
use crate::field::Field;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Named collection of field descriptors and store metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    doc_type: String,
    properties: BTreeMap<String, Field>,
    meta: BTreeMap<String, Value>,
}

impl Mapping {
    /// Create an empty mapping for the given type name
    pub fn new(doc_type: impl Into<String>) -> Self {
        Mapping {
            doc_type: doc_type.into(),
            properties: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Rebuild a mapping from the per-type body the store returns
    /// (`{"properties": {...}, "_all": {...}}`)
    pub fn from_dict(doc_type: impl Into<String>, raw: &Value) -> Self {
        let mut mapping = Mapping::new(doc_type);
        mapping.update_from_dict(raw, false);
        mapping
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub(crate) fn set_doc_type(&mut self, doc_type: impl Into<String>) {
        self.doc_type = doc_type.into();
    }

    /// Add or replace a field
    pub fn field(&mut self, name: impl Into<String>, field: Field) -> &mut Self {
        self.properties.insert(name.into(), field);
        self
    }

    /// Builder form of [`Mapping::field`]
    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.field(name, field);
        self
    }

    /// Set a type-level metadata entry; a null value removes it
    pub fn meta(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        let name = name.into();
        if value.is_null() {
            self.meta.remove(&name);
        } else {
            self.meta.insert(name, value);
        }
        self
    }

    pub fn remove_meta(&mut self, name: &str) -> Option<Value> {
        self.meta.remove(name)
    }

    pub fn meta_entries(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.properties.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.properties.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Merge another mapping into this one
    ///
    /// With `update_only`, existing fields win (inner object schemas are
    /// merged recursively) and only missing metadata is copied. Without it,
    /// `other` overwrites same-named fields and metadata.
    pub fn update(&mut self, other: &Mapping, update_only: bool) {
        for (name, field) in &other.properties {
            if update_only {
                if let Some(existing) = self.properties.get_mut(name) {
                    if let (Some(mine), Some(theirs)) =
                        (existing.inner_mapping_mut(), field.inner_mapping())
                    {
                        mine.update(theirs, true);
                    }
                    continue;
                }
            }
            self.properties.insert(name.clone(), field.clone());
        }

        for (name, value) in &other.meta {
            if update_only {
                self.meta
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            } else {
                self.meta.insert(name.clone(), value.clone());
            }
        }
    }

    /// Merge a store-side per-type body into this mapping
    ///
    /// Only `properties` and `_`-prefixed metadata are taken; other keys
    /// such as `dynamic` are ignored.
    pub fn update_from_dict(&mut self, raw: &Value, update_only: bool) {
        let Some(obj) = raw.as_object() else {
            return;
        };
        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            self.update_properties(props, update_only);
        }
        for (name, value) in obj {
            if !name.starts_with('_') {
                continue;
            }
            if update_only && self.meta.contains_key(name) {
                continue;
            }
            self.meta.insert(name.clone(), value.clone());
        }
    }

    pub(crate) fn update_properties(&mut self, props: &Map<String, Value>, update_only: bool) {
        let mut incoming = Mapping::new(self.doc_type.clone());
        for (name, definition) in props {
            incoming.field(name.clone(), Field::from_mapping(name, definition));
        }
        self.update(&incoming, update_only);
    }

    /// `{"<field>": <field mapping>, ...}`
    pub fn properties_dict(&self) -> Value {
        let props: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, field)| (name.clone(), field.mapping()))
            .collect();
        Value::Object(props)
    }

    /// Full store representation keyed by type name
    pub fn to_dict(&self) -> Value {
        let mut body = Map::new();
        body.insert("properties".to_string(), self.properties_dict());
        for (name, value) in &self.meta {
            body.insert(name.clone(), value.clone());
        }
        let mut out = Map::new();
        out.insert(self.doc_type.clone(), Value::Object(body));
        Value::Object(out)
    }

    /// Coerce every declared key of `raw`; unknown keys pass through
    pub fn coerce_object(&self, raw: &Map<String, Value>) -> Map<String, Value> {
        raw.iter()
            .map(|(name, value)| {
                let coerced = match self.properties.get(name) {
                    Some(field) => field.coerce(value),
                    None => value.clone(),
                };
                (name.clone(), coerced)
            })
            .collect()
    }

    /// Validate every declared field of `obj`, collecting all failures
    pub fn validate_object(&self, obj: &Map<String, Value>) -> Result<(), ValidationError> {
        let errors: Vec<_> = self
            .properties
            .iter()
            .filter_map(|(name, field)| {
                let value = obj.get(name).unwrap_or(&Value::Null);
                field.validate(value).err().map(|e| (name.clone(), e))
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldError;
    use serde_json::json;

    fn my_doc() -> Mapping {
        Mapping::new("my_doc")
            .with_field("title", Field::string().meta("index", "analyzed"))
            .with_field("name", Field::string())
            .with_field("created_at", Field::date())
    }

    #[test]
    fn test_to_dict_shape() {
        assert_eq!(
            my_doc().to_dict(),
            json!({
                "my_doc": {
                    "properties": {
                        "created_at": {"type": "date"},
                        "name": {"type": "string"},
                        "title": {"index": "analyzed", "type": "string"},
                    }
                }
            })
        );
    }

    #[test]
    fn test_meta_is_rendered_next_to_properties() {
        let mut mapping = Mapping::new("my_d");
        mapping.field("title", Field::string());
        mapping.meta("_all", json!({"enabled": false}));

        assert_eq!(
            mapping.to_dict(),
            json!({
                "my_d": {
                    "_all": {"enabled": false},
                    "properties": {"title": {"type": "string"}}
                }
            })
        );

        mapping.meta("_all", Value::Null);
        assert!(mapping.meta_entries().is_empty());
    }

    #[test]
    fn test_update_only_keeps_existing_fields() {
        let mut child = Mapping::new("child")
            .with_field("name", Field::string().meta("index", "not_analyzed"));
        child.meta("_all", json!({"enabled": false}));

        let mut parent = my_doc();
        parent.meta("_all", json!({"enabled": true}));
        parent.meta("dynamic", json!("strict"));

        child.update(&parent, true);

        assert_eq!(child.len(), 3);
        assert_eq!(
            child.get("name").unwrap().mapping(),
            json!({"type": "string", "index": "not_analyzed"})
        );
        assert_eq!(child.meta_entries()["_all"], json!({"enabled": false}));
        assert_eq!(child.meta_entries()["dynamic"], json!("strict"));
    }

    #[test]
    fn test_update_overwrites_without_update_only() {
        let mut mapping = my_doc();
        mapping.meta("_all", json!({"enabled": true}));

        let mut other = Mapping::new("other").with_field("name", Field::integer());
        other.meta("_all", json!({"enabled": false}));

        mapping.update(&other, false);

        assert_eq!(mapping.get("name").unwrap().mapping(), json!({"type": "long"}));
        assert_eq!(mapping.meta_entries()["_all"], json!({"enabled": false}));
    }

    #[test]
    fn test_update_merges_inner_objects_recursively() {
        let mut mapping = Mapping::new("doc").with_field(
            "inner",
            Field::object(Mapping::new("inner").with_field("old_field", Field::string())),
        );
        let other = Mapping::new("doc").with_field(
            "inner",
            Field::object(
                Mapping::new("inner")
                    .with_field("old_field", Field::integer())
                    .with_field("new_field", Field::boolean()),
            ),
        );

        mapping.update(&other, true);

        let inner = mapping.get("inner").unwrap().inner_mapping().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(
            inner.get("old_field").unwrap().mapping(),
            json!({"type": "string"})
        );
        assert!(inner.contains("new_field"));
    }

    #[test]
    fn test_self_merge_is_noop() {
        let mut mapping = my_doc();
        mapping.meta("_all", json!({"enabled": false}));
        let before = mapping.clone();

        let same = mapping.clone();
        mapping.update(&same, true);

        assert_eq!(mapping, before);
    }

    #[test]
    fn test_from_dict_rehydrates_fields_and_meta() {
        let raw = json!({
            "_all": {"enabled": false},
            "properties": {
                "title": {"type": "string", "index": "analyzed"},
                "views": {"type": "long"},
            }
        });
        let mapping = Mapping::from_dict("article", &raw);

        assert_eq!(mapping.doc_type(), "article");
        assert_eq!(mapping.names().collect::<Vec<_>>(), vec!["title", "views"]);
        assert_eq!(mapping.meta_entries()["_all"], json!({"enabled": false}));
        assert_eq!(mapping.to_dict()["article"], raw);
    }

    #[test]
    fn test_from_dict_skips_plain_keys() {
        let raw = json!({
            "_source": {"enabled": true},
            "dynamic": "strict",
            "properties": {"title": {"type": "string"}}
        });
        let mapping = Mapping::from_dict("article", &raw);

        assert_eq!(mapping.names().collect::<Vec<_>>(), vec!["title"]);
        assert_eq!(mapping.meta_entries()["_source"], json!({"enabled": true}));
        assert!(!mapping.meta_entries().contains_key("dynamic"));
    }

    #[test]
    fn test_validate_object_aggregates() {
        let mapping = Mapping::new("article")
            .with_field("title", Field::string().required())
            .with_field("views", Field::integer().min_value(0.0));

        let obj = json!({"views": -3});
        let err = mapping
            .validate_object(obj.as_object().unwrap())
            .unwrap_err();

        assert_eq!(
            err.errors(),
            &[
                ("title".to_string(), FieldError::Required),
                (
                    "views".to_string(),
                    FieldError::BelowMinimum { bound: "0".into() }
                ),
            ]
        );
    }
}
