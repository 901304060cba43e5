//! Field Descriptors
//!
//! A `Field` declares the semantic kind of one document attribute, whether it
//! is required, its default, and any store-specific mapping parameters
//! (e.g. `index: "not_analyzed"`).
//!
//! Values are carried as `serde_json::Value`. A value is considered absent
//! when it is null, an empty string or an empty array.
//!
//! `coerce` is best-effort and never fails; `validate` reports the first
//! violated constraint.

use crate::mapping::Mapping;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Naive timestamp layouts accepted by date fields, tried in order
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Canonical rendering of naive timestamps
const NAIVE_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Default number of fractional digits kept by decimal fields
pub const DEFAULT_DECIMAL_PRECISION: u32 = 2;

/// Reason a single field failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Required field is absent
    Required,
    /// Value has the wrong JSON type
    WrongType { expected: &'static str },
    /// Value (or length) below the declared minimum
    BelowMinimum { bound: String },
    /// Value (or length) above the declared maximum
    AboveMaximum { bound: String },
    /// List contains nested lists or objects
    MalformedList,
    /// Value could not be interpreted at all
    Invalid(String),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Required => write!(f, "field is required"),
            FieldError::WrongType { expected } => write!(f, "field must be {}", expected),
            FieldError::BelowMinimum { bound } => {
                write!(f, "field value is too small (minimum {})", bound)
            }
            FieldError::AboveMaximum { bound } => {
                write!(f, "field value is too large (maximum {})", bound)
            }
            FieldError::MalformedList => {
                write!(f, "field must be a list of scalar values of one kind")
            }
            FieldError::Invalid(reason) => write!(f, "field is invalid: {}", reason),
        }
    }
}

impl std::error::Error for FieldError {}

/// Semantic kind of a field, with its kind-specific constraints
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Integer {
        min_value: Option<i64>,
        max_value: Option<i64>,
    },
    Float {
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
    /// Fixed-precision decimal, rounded half-up to `precision` digits
    Decimal {
        precision: u32,
        min_value: Option<Decimal>,
        max_value: Option<Decimal>,
    },
    Boolean,
    Date,
    /// Homogeneous list of scalars
    List,
    /// Inner object with its own schema
    Object(Mapping),
    /// Store type this crate has no dedicated handling for
    Other(String),
}

impl FieldKind {
    /// Mapping `type` sent to the store
    pub fn type_name(&self) -> &str {
        match self {
            FieldKind::String { .. } | FieldKind::List => "string",
            FieldKind::Integer { .. } => "long",
            FieldKind::Float { .. } | FieldKind::Decimal { .. } => "double",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Object(_) => "object",
            FieldKind::Other(name) => name,
        }
    }
}

/// Declaration of one document attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    kind: FieldKind,
    required: bool,
    default: Option<Value>,
    meta: BTreeMap<String, Value>,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Field {
            kind,
            required: false,
            default: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String {
            min_length: None,
            max_length: None,
        })
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer {
            min_value: None,
            max_value: None,
        })
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Float {
            min_value: None,
            max_value: None,
        })
    }

    pub fn decimal(precision: u32) -> Self {
        Self::new(FieldKind::Decimal {
            precision,
            min_value: None,
            max_value: None,
        })
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    pub fn list() -> Self {
        Self::new(FieldKind::List)
    }

    pub fn object(mapping: Mapping) -> Self {
        Self::new(FieldKind::Object(mapping))
    }

    pub fn other(type_name: impl Into<String>) -> Self {
        Self::new(FieldKind::Other(type_name.into()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Add a store mapping parameter (e.g. `analyzer`, `index`)
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        if let FieldKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(len);
        }
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        if let FieldKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(len);
        }
        self
    }

    /// Lower bound for numeric kinds; ignored by other kinds
    pub fn min_value(mut self, bound: f64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { min_value, .. } => *min_value = Some(bound.ceil() as i64),
            FieldKind::Float { min_value, .. } => *min_value = Some(bound),
            FieldKind::Decimal { min_value, .. } => *min_value = Decimal::from_f64(bound),
            _ => {}
        }
        self
    }

    /// Upper bound for numeric kinds; ignored by other kinds
    pub fn max_value(mut self, bound: f64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { max_value, .. } => *max_value = Some(bound.floor() as i64),
            FieldKind::Float { max_value, .. } => *max_value = Some(bound),
            FieldKind::Decimal { max_value, .. } => *max_value = Decimal::from_f64(bound),
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn meta_entries(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    /// Inner schema, for object fields
    pub fn inner_mapping(&self) -> Option<&Mapping> {
        match &self.kind {
            FieldKind::Object(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub(crate) fn inner_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match &mut self.kind {
            FieldKind::Object(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// Store mapping definition: `{"type": ..., <meta>..., "properties"?}`
    pub fn mapping(&self) -> Value {
        let mut out = Map::new();
        out.insert(
            "type".to_string(),
            Value::String(self.kind.type_name().to_string()),
        );
        for (key, value) in &self.meta {
            out.insert(key.clone(), value.clone());
        }
        if let FieldKind::Object(inner) = &self.kind {
            out.insert("properties".to_string(), inner.properties_dict());
        }
        Value::Object(out)
    }

    /// Rebuild a field from a store mapping definition
    ///
    /// Store types without dedicated handling keep their original name, and
    /// aliases (e.g. `keyword`) are kept in the meta so the definition
    /// round-trips.
    pub fn from_mapping(name: &str, definition: &Value) -> Self {
        let obj = match definition.as_object() {
            Some(obj) => obj,
            None => return Field::string(),
        };
        let type_name = obj.get("type").and_then(Value::as_str);
        let properties = obj.get("properties").and_then(Value::as_object);

        let mut field = match (type_name, properties) {
            (Some("object") | Some("nested"), _) | (None, Some(_)) => {
                let mut inner = Mapping::new(name);
                if let Some(props) = properties {
                    inner.update_properties(props, false);
                }
                Field::object(inner)
            }
            (Some("string") | Some("text") | Some("keyword"), _) | (None, None) => Field::string(),
            (Some("long") | Some("integer") | Some("short") | Some("byte"), _) => Field::integer(),
            (Some("double") | Some("float") | Some("half_float") | Some("scaled_float"), _) => {
                Field::float()
            }
            (Some("boolean"), _) => Field::boolean(),
            (Some("date"), _) => Field::date(),
            (Some(other), _) => Field::other(other),
        };

        for (key, value) in obj {
            if key == "properties" {
                continue;
            }
            if key == "type" && Some(field.kind.type_name()) == value.as_str() {
                continue;
            }
            field.meta.insert(key.clone(), value.clone());
        }
        field
    }

    /// Best-effort conversion of a raw value; never fails
    pub fn coerce(&self, raw: &Value) -> Value {
        if raw.is_null() {
            return Value::Null;
        }
        match &self.kind {
            FieldKind::String { .. } => coerce_string(raw),
            FieldKind::Integer { .. } => coerce_integer(raw),
            FieldKind::Float { .. } => coerce_float(raw),
            FieldKind::Decimal { precision, .. } => coerce_decimal(raw, *precision),
            FieldKind::Boolean => coerce_boolean(raw),
            FieldKind::Date => coerce_date(raw),
            FieldKind::List => coerce_list(raw),
            FieldKind::Object(inner) => match raw {
                Value::Object(map) => Value::Object(inner.coerce_object(map)),
                _ => raw.clone(),
            },
            FieldKind::Other(_) => raw.clone(),
        }
    }

    /// Value used when a document is created without this field
    pub fn initial_value(&self) -> Value {
        match &self.default {
            Some(default) => self.coerce(default),
            None => Value::Null,
        }
    }

    /// Check a (coerced) value against this field's constraints
    pub fn validate(&self, value: &Value) -> Result<(), FieldError> {
        if is_absent(value) {
            return if self.required {
                Err(FieldError::Required)
            } else {
                Ok(())
            };
        }

        match &self.kind {
            FieldKind::String {
                min_length,
                max_length,
            } => {
                let s = value
                    .as_str()
                    .ok_or(FieldError::WrongType { expected: "string" })?;
                let len = s.chars().count();
                check_bounds(&len, min_length.as_ref(), max_length.as_ref())
            }
            FieldKind::Integer {
                min_value,
                max_value,
            } => {
                let i = value
                    .as_i64()
                    .ok_or(FieldError::WrongType { expected: "integer" })?;
                check_bounds(&i, min_value.as_ref(), max_value.as_ref())
            }
            FieldKind::Float {
                min_value,
                max_value,
            } => {
                let f = value
                    .as_f64()
                    .ok_or(FieldError::WrongType { expected: "float" })?;
                check_bounds(&f, min_value.as_ref(), max_value.as_ref())
            }
            FieldKind::Decimal {
                min_value,
                max_value,
                ..
            } => {
                let d = parse_decimal(value)
                    .ok_or_else(|| FieldError::Invalid("cannot convert to decimal".into()))?;
                check_bounds(&d, min_value.as_ref(), max_value.as_ref())
            }
            FieldKind::Boolean => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(FieldError::WrongType { expected: "boolean" })
                }
            }
            FieldKind::Date => {
                if coerce_date(value).is_null() {
                    Err(FieldError::WrongType {
                        expected: "a valid date/datetime",
                    })
                } else {
                    Ok(())
                }
            }
            FieldKind::List => match value {
                Value::String(_) => Ok(()),
                Value::Array(items) => {
                    let first = items.first().map(scalar_kind);
                    if items.iter().all(|item| is_scalar(item) && Some(scalar_kind(item)) == first) {
                        Ok(())
                    } else {
                        Err(FieldError::MalformedList)
                    }
                }
                _ => Err(FieldError::WrongType { expected: "list" }),
            },
            FieldKind::Object(inner) => {
                let obj = value
                    .as_object()
                    .ok_or(FieldError::WrongType { expected: "object" })?;
                inner
                    .validate_object(obj)
                    .map_err(|e| FieldError::Invalid(e.to_string()))
            }
            FieldKind::Other(_) => Ok(()),
        }
    }
}

/// Null, empty string and empty list all count as "not set"
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_bounds<T: PartialOrd + fmt::Display>(
    value: &T,
    min: Option<&T>,
    max: Option<&T>,
) -> Result<(), FieldError> {
    if let Some(min) = min {
        if value < min {
            return Err(FieldError::BelowMinimum {
                bound: min.to_string(),
            });
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(FieldError::AboveMaximum {
                bound: max.to_string(),
            });
        }
    }
    Ok(())
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_string(raw: &Value) -> Value {
    match raw {
        Value::String(s) if s.is_empty() => Value::Null,
        Value::String(_) => raw.clone(),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) if items.iter().all(is_scalar) => {
            let joined: Vec<String> = items.iter().map(scalar_to_string).collect();
            Value::String(joined.join(","))
        }
        _ => raw.clone(),
    }
}

fn coerce_integer(raw: &Value) -> Value {
    match raw {
        Value::Number(n) => {
            if n.is_i64() {
                raw.clone()
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite() && !n.is_u64()) {
                Value::from(f.trunc() as i64)
            } else {
                raw.clone()
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Value::Null;
            }
            if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else if let Some(f) = s.parse::<f64>().ok().filter(|f| f.is_finite()) {
                Value::from(f.trunc() as i64)
            } else {
                raw.clone()
            }
        }
        Value::Bool(b) => Value::from(i64::from(*b)),
        _ => raw.clone(),
    }
}

fn float_value(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

fn coerce_float(raw: &Value) -> Value {
    let converted = match raw {
        Value::Number(n) => n.as_f64().and_then(float_value),
        Value::String(s) if s.trim().is_empty() => return Value::Null,
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(float_value),
        Value::Bool(b) => float_value(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    converted.unwrap_or_else(|| raw.clone())
}

fn parse_decimal(raw: &Value) -> Option<Decimal> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn coerce_decimal(raw: &Value, precision: u32) -> Value {
    if let Value::String(s) = raw {
        if s.trim().is_empty() {
            return Value::Null;
        }
    }
    match parse_decimal(raw) {
        Some(d) => {
            let mut rounded =
                d.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(precision);
            Value::String(rounded.to_string())
        }
        None => raw.clone(),
    }
}

fn coerce_boolean(raw: &Value) -> Value {
    match raw {
        Value::Bool(_) => raw.clone(),
        Value::Number(n) => Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(true)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Value::Null,
            "true" | "t" | "yes" | "y" | "on" | "1" => Value::Bool(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Value::Bool(false),
            _ => raw.clone(),
        },
        _ => raw.clone(),
    }
}

/// Normalize a timestamp string; `None` if no accepted layout matches
pub fn parse_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
    }
    for layout in NAIVE_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(ndt.format(NAIVE_OUTPUT_FORMAT).to_string());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(midnight.format(NAIVE_OUTPUT_FORMAT).to_string())
}

fn coerce_date(raw: &Value) -> Value {
    match raw {
        Value::String(s) => parse_timestamp(s).map(Value::String).unwrap_or(Value::Null),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_list(raw: &Value) -> Value {
    match raw {
        Value::String(s) if s.is_empty() => Value::Null,
        Value::String(s) => Value::Array(
            s.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        ),
        Value::Array(_) | Value::Object(_) => raw.clone(),
        scalar => Value::Array(vec![scalar.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_mapping_includes_meta() {
        let field = Field::string().meta("index", "analyzed");
        assert_eq!(
            field.mapping(),
            json!({"type": "string", "index": "analyzed"})
        );
    }

    #[test]
    fn test_meta_can_override_type() {
        let field = Field::string().meta("type", "keyword");
        assert_eq!(field.mapping(), json!({"type": "keyword"}));
    }

    #[test]
    fn test_string_coercion() {
        let field = Field::string();
        assert_eq!(field.coerce(&json!("hello")), json!("hello"));
        assert_eq!(field.coerce(&json!(42)), json!("42"));
        assert_eq!(field.coerce(&json!(true)), json!("true"));
        assert_eq!(field.coerce(&json!(["a", "b"])), json!("a,b"));
        assert_eq!(field.coerce(&json!("")), Value::Null);
    }

    #[test]
    fn test_string_length_bounds() {
        let field = Field::string().min_length(2).max_length(4);
        assert_eq!(
            field.validate(&json!("a")),
            Err(FieldError::BelowMinimum { bound: "2".into() })
        );
        assert!(field.validate(&json!("abc")).is_ok());
        assert_eq!(
            field.validate(&json!("abcde")),
            Err(FieldError::AboveMaximum { bound: "4".into() })
        );
        assert_eq!(
            field.validate(&json!(5)),
            Err(FieldError::WrongType { expected: "string" })
        );
    }

    #[test]
    fn test_required_absent_values() {
        let field = Field::string().required();
        assert_eq!(field.validate(&Value::Null), Err(FieldError::Required));
        assert_eq!(field.validate(&json!("")), Err(FieldError::Required));
        assert!(Field::string().validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_integer_coercion_keeps_zero() {
        let field = Field::integer();
        assert_eq!(field.coerce(&json!(0)), json!(0));
        assert_eq!(field.coerce(&json!("17")), json!(17));
        assert_eq!(field.coerce(&json!(3.9)), json!(3));
        assert_eq!(field.coerce(&json!("2.5")), json!(2));
        assert_eq!(field.coerce(&json!(true)), json!(1));
        assert_eq!(field.coerce(&json!("abc")), json!("abc"));
    }

    #[test]
    fn test_integer_bounds() {
        let field = Field::integer().min_value(0.0).max_value(10.0);
        assert!(field.validate(&json!(0)).is_ok());
        assert_eq!(
            field.validate(&json!(-1)),
            Err(FieldError::BelowMinimum { bound: "0".into() })
        );
        assert_eq!(
            field.validate(&json!(11)),
            Err(FieldError::AboveMaximum { bound: "10".into() })
        );
        assert_eq!(
            field.validate(&json!("abc")),
            Err(FieldError::WrongType { expected: "integer" })
        );
    }

    #[test]
    fn test_float_coercion_and_bounds() {
        let field = Field::float().min_value(0.5);
        assert_eq!(field.coerce(&json!(3)), json!(3.0));
        assert_eq!(field.coerce(&json!("1.25")), json!(1.25));
        assert!(field.validate(&json!(1.0)).is_ok());
        assert!(matches!(
            field.validate(&json!(0.25)),
            Err(FieldError::BelowMinimum { .. })
        ));
    }

    #[test]
    fn test_decimal_rounds_half_up() {
        let field = Field::decimal(2);
        assert_eq!(field.coerce(&json!("1.005")), json!("1.01"));
        assert_eq!(field.coerce(&json!(12.3)), json!("12.30"));
        assert_eq!(field.coerce(&json!("-2.345")), json!("-2.35"));
        assert_eq!(field.coerce(&json!("n/a")), json!("n/a"));
    }

    #[test]
    fn test_decimal_validation() {
        let field = Field::decimal(2).max_value(100.0);
        assert!(field.validate(&json!("99.99")).is_ok());
        assert!(matches!(
            field.validate(&json!("100.01")),
            Err(FieldError::AboveMaximum { .. })
        ));
        assert!(matches!(
            field.validate(&json!("n/a")),
            Err(FieldError::Invalid(_))
        ));
    }

    #[test]
    fn test_boolean_coercion() {
        let field = Field::boolean();
        assert_eq!(field.coerce(&json!("yes")), json!(true));
        assert_eq!(field.coerce(&json!("0")), json!(false));
        assert_eq!(field.coerce(&json!(2)), json!(true));
        assert!(field.validate(&json!(false)).is_ok());
        assert_eq!(
            field.validate(&json!("maybe")),
            Err(FieldError::WrongType { expected: "boolean" })
        );
    }

    #[test]
    fn test_date_coercion_layouts() {
        let field = Field::date();
        assert_eq!(
            field.coerce(&json!("2024-03-01 10:20:30")),
            json!("2024-03-01T10:20:30")
        );
        assert_eq!(
            field.coerce(&json!("2024-03-01 10:20")),
            json!("2024-03-01T10:20:00")
        );
        assert_eq!(field.coerce(&json!("2024-03-01")), json!("2024-03-01T00:00:00"));
        assert_eq!(
            field.coerce(&json!("2024-03-01T10:20:30+02:00")),
            json!("2024-03-01T08:20:30Z")
        );
        assert_eq!(field.coerce(&json!(0)), json!("1970-01-01T00:00:00Z"));
        assert_eq!(field.coerce(&json!("not a date")), Value::Null);
    }

    #[test]
    fn test_date_coercion_is_idempotent() {
        let field = Field::date();
        for raw in [
            json!("2024-03-01 10:20:30.250"),
            json!("2024-03-01T10:20:30Z"),
            json!("2024-03-01"),
        ] {
            let once = field.coerce(&raw);
            assert_eq!(field.coerce(&once), once);
            assert!(field.validate(&once).is_ok());
        }
    }

    #[test]
    fn test_list_coercion_and_validation() {
        let field = Field::list();
        assert_eq!(field.coerce(&json!("a, b,c")), json!(["a", "b", "c"]));
        assert_eq!(field.coerce(&json!(7)), json!([7]));
        assert!(field.validate(&json!(["a", "b"])).is_ok());
        assert!(field.validate(&json!([1, 2.5])).is_ok());
        assert_eq!(
            field.validate(&json!([1, "a", true])),
            Err(FieldError::MalformedList)
        );
        assert_eq!(
            field.validate(&json!([["nested"]])),
            Err(FieldError::MalformedList)
        );
        assert_eq!(
            field.validate(&json!({"a": 1})),
            Err(FieldError::WrongType { expected: "list" })
        );
    }

    #[test]
    fn test_default_is_coerced() {
        let field = Field::integer().default_value("5");
        assert_eq!(field.initial_value(), json!(5));
        assert_eq!(Field::integer().initial_value(), Value::Null);
    }

    #[test]
    fn test_object_field_coerces_inner_fields() {
        let mut inner = Mapping::new("address");
        inner.field("zip", Field::integer());
        let field = Field::object(inner);

        let coerced = field.coerce(&json!({"zip": "12345", "extra": "kept"}));
        assert_eq!(coerced, json!({"zip": 12345, "extra": "kept"}));
        assert_eq!(
            field.mapping(),
            json!({"type": "object", "properties": {"zip": {"type": "long"}}})
        );
    }

    #[test]
    fn test_from_mapping_round_trips() {
        let definitions = [
            json!({"type": "string", "index": "not_analyzed"}),
            json!({"type": "keyword"}),
            json!({"type": "long"}),
            json!({"type": "date", "format": "yyyy-MM-dd"}),
            json!({"type": "geo_point"}),
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        ];
        for definition in definitions {
            let field = Field::from_mapping("f", &definition);
            assert_eq!(field.mapping(), definition);
        }
    }
}
