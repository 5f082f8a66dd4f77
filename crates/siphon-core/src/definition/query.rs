//! Output-schema inference for `from ... select ... insert into ...` queries.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::registry::StreamRegistry;
use super::types::{Attribute, AttributeType, StreamDefinition};
use crate::error::{Error, Result};

static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*(?:@\w+\s*\([^)]*\)\s*)*from\s+([A-Za-z_]\w*)(.*?)\s+select\s+(.+?)\s+insert\s+(?:(?:current|expired|all)\s+events\s+)?into\s+([A-Za-z_]\w*)\s*;?\s*$",
    )
    .expect("static regex is valid")
});

/// Clauses that may follow the projection list inside the select section.
static CLAUSE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\s+(?:group\s+by|having|order\s+by|limit)\s+").expect("static regex is valid")
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^([A-Za-z_]\w*)\s*\(\s*(?:[A-Za-z_]\w*\.)?([A-Za-z_]\w*)?\s*\)\s+as\s+([A-Za-z_]\w*)$")
        .expect("static regex is valid")
});

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:[A-Za-z_]\w*\.)?([A-Za-z_]\w*)(?:\s+as\s+([A-Za-z_]\w*))?$")
        .expect("static regex is valid")
});

/// Stream written by a query, with its inferred schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutput {
    pub input_stream: String,
    pub output: StreamDefinition,
}

/// Infer the schema of the stream a query inserts into.
///
/// The input stream must already be known to `registry`.
pub fn infer_output(query: &str, registry: &StreamRegistry) -> Result<QueryOutput> {
    let caps = QUERY_RE
        .captures(query)
        .ok_or_else(|| Error::Query(format!("Unsupported query shape: {}", query.trim())))?;
    let input_id = &caps[1];
    let output_id = &caps[4];

    let input = registry.stream(input_id).ok_or_else(|| {
        Error::Query(format!("Query reads from undefined stream '{input_id}'"))
    })?;

    let select = caps[3].trim();
    let projection = CLAUSE_END_RE
        .find(select)
        .map_or(select, |m| &select[..m.start()]);

    let mut attributes = Vec::new();
    for item in split_top_level(projection) {
        if item == "*" {
            attributes.extend(input.attributes.iter().cloned());
        } else {
            attributes.push(project(item, input)?);
        }
    }

    let mut seen = HashSet::new();
    if let Some(dup) = attributes.iter().find(|a| !seen.insert(a.name.as_str())) {
        return Err(Error::Query(format!(
            "Duplicate output attribute '{}' for stream '{output_id}'",
            dup.name
        )));
    }

    Ok(QueryOutput {
        input_stream: input_id.to_string(),
        output: StreamDefinition::new(output_id, attributes),
    })
}

fn project(item: &str, input: &StreamDefinition) -> Result<Attribute> {
    if let Some(caps) = FUNCTION_RE.captures(item) {
        let function = caps[1].to_ascii_lowercase();
        let alias = caps[3].to_string();
        let arg_type = match caps.get(2) {
            Some(arg) => Some(input_attribute(arg.as_str(), input)?.attr_type),
            None => None,
        };
        return aggregate_type(&function, arg_type)
            .map(|t| Attribute::new(alias, t))
            .ok_or_else(|| {
                Error::Query(format!("Unsupported function call '{item}' in select clause"))
            });
    }

    let caps = ATTRIBUTE_RE
        .captures(item)
        .ok_or_else(|| Error::Query(format!("Unsupported select expression '{item}'")))?;
    let source = input_attribute(&caps[1], input)?;
    let name = caps.get(2).map_or(&caps[1], |alias| alias.as_str());
    Ok(Attribute::new(name, source.attr_type))
}

fn input_attribute<'a>(name: &str, input: &'a StreamDefinition) -> Result<&'a Attribute> {
    input.attribute(name).ok_or_else(|| {
        Error::Query(format!(
            "Attribute '{name}' is not defined in stream '{}'",
            input.id
        ))
    })
}

/// Result type of an aggregate over an argument of `arg` type.
fn aggregate_type(function: &str, arg: Option<AttributeType>) -> Option<AttributeType> {
    use AttributeType::{Double, Float, Int, Long};
    match (function, arg) {
        ("count", _) => Some(Long),
        ("avg", Some(Int | Long | Float | Double)) => Some(Double),
        ("sum", Some(Int | Long)) => Some(Long),
        ("sum", Some(Float | Double)) => Some(Double),
        ("min" | "max", Some(t @ (Int | Long | Float | Double))) => Some(t),
        _ => None,
    }
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}
