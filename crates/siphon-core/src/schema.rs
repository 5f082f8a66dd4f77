//! Translation of internal stream schemas into flat wire schemas.
//!
//! A wire schema keeps the field order and names of its stream definition
//! and maps every attribute type through [`WireType::from_attribute`]. The
//! mapping is fixed; a type without a wire representation makes the whole
//! translation fail, since the receiving service could not decode it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::definition::{AttributeType, StreamDefinition, StreamRegistry};
use crate::event::Value;

/// Version assigned to every wire schema the relay registers.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

/// Errors raised while building wire schemas or fitting events to them.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Attribute '{attribute}' of stream '{stream}' has type '{attr_type}' with no wire representation")]
    UnsupportedType {
        stream: String,
        attribute: String,
        attr_type: AttributeType,
    },

    #[error("Exported stream '{0}' is not defined in the execution plan")]
    UnknownStream(String),

    #[error("Stream '{0}' is exported more than once")]
    DuplicateExport(String),

    #[error("Event of stream '{stream}' has {actual} values, expected {expected}")]
    ArityMismatch {
        stream: String,
        expected: usize,
        actual: usize,
    },

    #[error("Value {value} does not fit field '{field}' of type '{wire_type}' in stream '{stream}'")]
    ValueMismatch {
        stream: String,
        field: String,
        wire_type: WireType,
        value: Value,
    },
}

/// Field type as understood by the receiving service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Int,
    Long,
    Float,
    Double,
    Bool,
    String,
}

impl WireType {
    /// Wire representation of an internal attribute type, if it has one.
    pub const fn from_attribute(attr_type: AttributeType) -> Option<Self> {
        match attr_type {
            AttributeType::Int => Some(Self::Int),
            AttributeType::Long => Some(Self::Long),
            AttributeType::Float => Some(Self::Float),
            AttributeType::Double => Some(Self::Double),
            AttributeType::Bool => Some(Self::Bool),
            AttributeType::String => Some(Self::String),
            AttributeType::Object => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
        }
    }

    /// Convert `value` to this type.
    ///
    /// Integers widen to any numeric type, `long` narrows to `int` only when
    /// it fits, and `double` narrows to `float` only when it stays finite.
    /// `Null` fits every type.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn coerce(self, value: &Value) -> Option<Value> {
        let coerced = match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Int, Value::Int(v)) => Value::Int(*v),
            (Self::Int, Value::Long(v)) => Value::Int(i32::try_from(*v).ok()?),
            (Self::Long, Value::Int(v)) => Value::Long(i64::from(*v)),
            (Self::Long, Value::Long(v)) => Value::Long(*v),
            (Self::Float, Value::Int(v)) => Value::Float(*v as f32),
            (Self::Float, Value::Long(v)) => Value::Float(*v as f32),
            (Self::Float, Value::Float(v)) => Value::Float(*v),
            (Self::Float, Value::Double(v)) => {
                let narrowed = *v as f32;
                if narrowed.is_infinite() && v.is_finite() {
                    return None;
                }
                Value::Float(narrowed)
            }
            (Self::Double, Value::Int(v)) => Value::Double(f64::from(*v)),
            (Self::Double, Value::Long(v)) => Value::Double(*v as f64),
            (Self::Double, Value::Float(v)) => Value::Double(f64::from(*v)),
            (Self::Double, Value::Double(v)) => Value::Double(*v),
            (Self::Bool, Value::Bool(v)) => Value::Bool(*v),
            (Self::String, Value::String(v)) => Value::String(v.clone()),
            _ => return None,
        };
        Some(coerced)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flat field of a wire schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireField {
    pub name: String,
    pub wire_type: WireType,
}

/// Flat, ordered schema registered with the receiving service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSchema {
    /// Stream id the schema was derived from.
    pub name: String,
    pub version: String,
    pub fields: Vec<WireField>,
}

impl WireSchema {
    /// Identifier the receiving service knows this schema by (`name:version`).
    pub fn wire_id(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Fit one event's values to this schema, in field order.
    ///
    /// Fails when the value count differs from the field count or a value
    /// cannot be represented as its field's type.
    pub fn conform(&self, values: &[Value]) -> Result<Vec<Value>, SchemaError> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::ArityMismatch {
                stream: self.name.clone(),
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        self.fields
            .iter()
            .zip(values)
            .map(|(field, value)| {
                field
                    .wire_type
                    .coerce(value)
                    .ok_or_else(|| SchemaError::ValueMismatch {
                        stream: self.name.clone(),
                        field: field.name.clone(),
                        wire_type: field.wire_type,
                        value: value.clone(),
                    })
            })
            .collect()
    }

    /// `(name, type)` pairs in field order.
    pub fn columns(&self) -> Vec<(&str, WireType)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.wire_type))
            .collect()
    }
}

/// Translate a stream definition into its wire schema.
pub fn to_wire_schema(definition: &StreamDefinition) -> Result<WireSchema, SchemaError> {
    let fields = definition
        .attributes
        .iter()
        .map(|attr| {
            WireType::from_attribute(attr.attr_type)
                .map(|wire_type| WireField {
                    name: attr.name.clone(),
                    wire_type,
                })
                .ok_or_else(|| SchemaError::UnsupportedType {
                    stream: definition.id.clone(),
                    attribute: attr.name.clone(),
                    attr_type: attr.attr_type,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WireSchema {
        name: definition.id.clone(),
        version: DEFAULT_SCHEMA_VERSION.to_string(),
        fields,
    })
}

/// Exported stream id to wire schema, built once and never mutated.
#[derive(Debug, Clone, Default)]
pub struct SchemaMap {
    order: Vec<String>,
    by_stream: HashMap<String, Arc<WireSchema>>,
}

impl SchemaMap {
    /// Translate every exported stream of `registry`.
    ///
    /// Fails on the first stream that is undefined, exported twice, or not
    /// representable on the wire.
    pub fn build<S: AsRef<str>>(
        registry: &StreamRegistry,
        exported: &[S],
    ) -> Result<Self, SchemaError> {
        let mut map = Self::default();
        for id in exported {
            let id = id.as_ref();
            if map.by_stream.contains_key(id) {
                return Err(SchemaError::DuplicateExport(id.to_string()));
            }
            let definition = registry
                .stream(id)
                .ok_or_else(|| SchemaError::UnknownStream(id.to_string()))?;
            let schema = to_wire_schema(definition)?;
            map.order.push(id.to_string());
            map.by_stream.insert(id.to_string(), Arc::new(schema));
        }
        Ok(map)
    }

    pub fn get(&self, stream_id: &str) -> Option<&Arc<WireSchema>> {
        self.by_stream.get(stream_id)
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.by_stream.contains_key(stream_id)
    }

    /// Schemas in export order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<WireSchema>)> {
        self.order
            .iter()
            .filter_map(|id| self.by_stream.get(id).map(|s| (id.as_str(), s)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Attribute;

    #[test]
    fn translation_preserves_order_and_names() {
        let def = StreamDefinition::new(
            "Trades",
            vec![
                Attribute::new("symbol", AttributeType::String),
                Attribute::new("price", AttributeType::Double),
                Attribute::new("qty", AttributeType::Int),
                Attribute::new("ts", AttributeType::Long),
                Attribute::new("ratio", AttributeType::Float),
                Attribute::new("buy", AttributeType::Bool),
            ],
        );
        let schema = to_wire_schema(&def).unwrap();
        assert_eq!(schema.name, "Trades");
        assert_eq!(schema.wire_id(), "Trades:1.0.0");
        assert_eq!(
            schema.columns(),
            vec![
                ("symbol", WireType::String),
                ("price", WireType::Double),
                ("qty", WireType::Int),
                ("ts", WireType::Long),
                ("ratio", WireType::Float),
                ("buy", WireType::Bool),
            ]
        );
    }

    #[test]
    fn object_attribute_is_fatal() {
        let def = StreamDefinition::new(
            "Opaque",
            vec![
                Attribute::new("id", AttributeType::Int),
                Attribute::new("payload", AttributeType::Object),
            ],
        );
        let err = to_wire_schema(&def).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsupportedType { ref attribute, .. } if attribute == "payload"
        ));
    }

    fn schema(fields: &[(&str, WireType)]) -> WireSchema {
        WireSchema {
            name: "S".into(),
            version: DEFAULT_SCHEMA_VERSION.into(),
            fields: fields
                .iter()
                .map(|(name, wire_type)| WireField {
                    name: (*name).into(),
                    wire_type: *wire_type,
                })
                .collect(),
        }
    }

    #[test]
    fn json_numbers_narrow_to_declared_types() {
        let schema = schema(&[("qty", WireType::Int), ("ratio", WireType::Float)]);
        let values = schema
            .conform(&[Value::Long(7), Value::Double(0.5)])
            .unwrap();
        assert_eq!(values, vec![Value::Int(7), Value::Float(0.5)]);
    }

    #[test]
    fn integers_widen_and_null_passes() {
        let schema = schema(&[
            ("ts", WireType::Long),
            ("price", WireType::Double),
            ("symbol", WireType::String),
        ]);
        let values = schema
            .conform(&[Value::Int(3), Value::Long(100), Value::Null])
            .unwrap();
        assert_eq!(
            values,
            vec![Value::Long(3), Value::Double(100.0), Value::Null]
        );
    }

    #[test]
    fn wrong_value_count_is_rejected() {
        let schema = schema(&[("qty", WireType::Int), ("ratio", WireType::Float)]);
        assert!(matches!(
            schema.conform(&[]),
            Err(SchemaError::ArityMismatch {
                expected: 2,
                actual: 0,
                ..
            })
        ));
        assert!(matches!(
            schema.conform(&[Value::Int(1), Value::Float(1.0), Value::Int(2)]),
            Err(SchemaError::ArityMismatch { actual: 3, .. })
        ));
    }

    #[test]
    fn unrepresentable_values_are_rejected() {
        let int = schema(&[("qty", WireType::Int)]);
        assert!(matches!(
            int.conform(&[Value::Long(i64::from(i32::MAX) + 1)]),
            Err(SchemaError::ValueMismatch { ref field, .. }) if field == "qty"
        ));
        assert!(int.conform(&[Value::Double(1.5)]).is_err());

        let float = schema(&[("ratio", WireType::Float)]);
        assert!(float.conform(&[Value::Double(1e300)]).is_err());

        let flag = schema(&[("buy", WireType::Bool)]);
        assert!(flag.conform(&[Value::from("true")]).is_err());
        assert!(flag.conform(&[Value::Long(1)]).is_err());
    }

    #[test]
    fn schema_map_follows_export_order() {
        let registry = StreamRegistry::from_plan(
            &[
                "define stream A (x int)",
                "define stream B (y string)",
                "define stream C (z double)",
            ],
            &[] as &[&str],
        )
        .unwrap();
        let map = SchemaMap::build(&registry, &["C", "A"]).unwrap();
        let ids: Vec<_> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["C", "A"]);
        assert!(!map.contains("B"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn schema_map_rejects_unknown_and_duplicate_exports() {
        let registry =
            StreamRegistry::from_plan(&["define stream A (x int)"], &[] as &[&str]).unwrap();
        assert!(matches!(
            SchemaMap::build(&registry, &["Missing"]),
            Err(SchemaError::UnknownStream(_))
        ));
        assert!(matches!(
            SchemaMap::build(&registry, &["A", "A"]),
            Err(SchemaError::DuplicateExport(_))
        ));
    }
}
