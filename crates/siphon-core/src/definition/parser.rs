//! Parser for `define stream` and `define partition` statements.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{
    Attribute, AttributeType, Definition, PartitionDefinition, PartitionKey, StreamDefinition,
};
use crate::error::{Error, Result};

static STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*define\s+stream\s+([A-Za-z_]\w*)\s*\((.*)\)\s*;?\s*$")
        .expect("static regex is valid")
});

static PARTITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*define\s+partition\s+([A-Za-z_]\w*)\s+by\s+(.+?)\s*;?\s*$")
        .expect("static regex is valid")
});

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s+([A-Za-z]+)$").expect("static regex is valid")
});

static PARTITION_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\.([A-Za-z_]\w*)$").expect("static regex is valid")
});

/// Parse a single definition statement.
///
/// Text containing `define stream` must be a well-formed stream definition,
/// text containing `define partition` a well-formed partition definition.
/// Anything else is rejected.
pub fn parse_definition(text: &str) -> Result<Definition> {
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("define stream") {
        parse_stream(text).map(Definition::Stream)
    } else if lowered.contains("define partition") {
        parse_partition(text).map(Definition::Partition)
    } else {
        Err(Error::Definition(format!("Invalid definition : {}", text.trim())))
    }
}

fn parse_stream(text: &str) -> Result<StreamDefinition> {
    let caps = STREAM_RE
        .captures(text)
        .ok_or_else(|| Error::Definition(format!("Malformed stream definition: {}", text.trim())))?;
    let id = &caps[1];
    let body = caps[2].trim();
    if body.is_empty() {
        return Err(Error::Definition(format!("Stream '{id}' declares no attributes")));
    }

    let mut seen = HashSet::new();
    let mut attributes = Vec::new();
    for raw in body.split(',') {
        let raw = raw.trim();
        let attr = ATTRIBUTE_RE.captures(raw).ok_or_else(|| {
            Error::Definition(format!("Malformed attribute '{raw}' in stream '{id}'"))
        })?;
        let name = attr[1].to_string();
        let attr_type: AttributeType = attr[2].parse()?;
        if !seen.insert(name.clone()) {
            return Err(Error::Definition(format!(
                "Duplicate attribute '{name}' in stream '{id}'"
            )));
        }
        attributes.push(Attribute { name, attr_type });
    }

    Ok(StreamDefinition::new(id, attributes))
}

fn parse_partition(text: &str) -> Result<PartitionDefinition> {
    let caps = PARTITION_RE.captures(text).ok_or_else(|| {
        Error::Definition(format!("Malformed partition definition: {}", text.trim()))
    })?;
    let id = caps[1].to_string();

    let keys = caps[2]
        .split(',')
        .map(|raw| {
            let raw = raw.trim();
            PARTITION_KEY_RE
                .captures(raw)
                .map(|k| PartitionKey {
                    stream_id: k[1].to_string(),
                    attribute: k[2].to_string(),
                })
                .ok_or_else(|| {
                    Error::Definition(format!(
                        "Partition key '{raw}' in '{id}' must be <stream>.<attribute>"
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PartitionDefinition { id, keys })
}
