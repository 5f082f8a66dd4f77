//! Definition model types.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Attribute type of an internal stream schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Int,
    Long,
    Float,
    Double,
    Bool,
    String,
    /// Opaque engine object. Valid inside the engine, never on the wire.
    Object,
}

impl AttributeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "bool" | "boolean" => Ok(Self::Bool),
            "string" => Ok(Self::String),
            "object" => Ok(Self::Object),
            other => Err(Error::Definition(format!("Unknown attribute type '{other}'"))),
        }
    }
}

/// A named, typed attribute of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// Internal schema of a stream: its id and ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDefinition {
    pub id: String,
    pub attributes: Vec<Attribute>,
}

impl StreamDefinition {
    pub fn new(id: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

/// One `<stream>.<attribute>` key of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub stream_id: String,
    pub attribute: String,
}

/// Grouping of events by key attributes. Does not alter stream layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDefinition {
    pub id: String,
    pub keys: Vec<PartitionKey>,
}

impl PartitionDefinition {
    /// Whether any key of this partition is drawn from `stream_id`.
    pub fn applies_to(&self, stream_id: &str) -> bool {
        self.keys.iter().any(|k| k.stream_id == stream_id)
    }
}

/// A parsed `define ...` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Stream(StreamDefinition),
    Partition(PartitionDefinition),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_type_parsing_is_case_insensitive() {
        assert_eq!("DOUBLE".parse::<AttributeType>().unwrap(), AttributeType::Double);
        assert_eq!("Boolean".parse::<AttributeType>().unwrap(), AttributeType::Bool);
        assert!("decimal".parse::<AttributeType>().is_err());
    }

    #[test]
    fn partition_applies_to_keyed_stream_only() {
        let partition = PartitionDefinition {
            id: "BySymbol".into(),
            keys: vec![PartitionKey {
                stream_id: "StockStream".into(),
                attribute: "symbol".into(),
            }],
        };
        assert!(partition.applies_to("StockStream"));
        assert!(!partition.applies_to("OutStream"));
    }
}
