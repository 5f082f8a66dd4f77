//! Registry of the stream and partition definitions of one execution plan.

use std::collections::HashMap;

use tracing::debug;

use super::parser::parse_definition;
use super::query::infer_output;
use super::types::{Definition, PartitionDefinition, StreamDefinition};
use crate::error::{Error, Result};

/// Read-only view over a plan's streams once built.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    streams: HashMap<String, StreamDefinition>,
    partitions: HashMap<String, PartitionDefinition>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a plan's definitions, then its queries.
    ///
    /// Definitions are applied in order, so a partition may only key on a
    /// stream defined before it. Queries then contribute any output stream
    /// that has no explicit definition.
    pub fn from_plan<D, Q>(definitions: &[D], queries: &[Q]) -> Result<Self>
    where
        D: AsRef<str>,
        Q: AsRef<str>,
    {
        let mut registry = Self::new();
        for definition in definitions {
            registry.define(definition.as_ref())?;
        }
        for query in queries {
            registry.add_query(query.as_ref())?;
        }
        Ok(registry)
    }

    /// Parse and add one `define stream` / `define partition` statement.
    pub fn define(&mut self, text: &str) -> Result<()> {
        match parse_definition(text)? {
            Definition::Stream(stream) => self.insert_stream(stream),
            Definition::Partition(partition) => self.insert_partition(partition),
        }
    }

    /// Register the output stream of a query if it is not defined yet.
    pub fn add_query(&mut self, text: &str) -> Result<()> {
        let inferred = infer_output(text, self)?;
        let output_id = inferred.output.id.clone();
        if self.streams.contains_key(&output_id) {
            debug!(stream = %output_id, "Query output already defined, keeping explicit schema");
            return Ok(());
        }
        debug!(
            stream = %output_id,
            input = %inferred.input_stream,
            attributes = inferred.output.attributes.len(),
            "Inferred stream definition from query"
        );
        self.streams.insert(output_id, inferred.output);
        Ok(())
    }

    pub fn stream(&self, id: &str) -> Option<&StreamDefinition> {
        self.streams.get(id)
    }

    pub fn partition(&self, id: &str) -> Option<&PartitionDefinition> {
        self.partitions.get(id)
    }

    /// Partitions that group events of `stream_id`.
    pub fn partitions_of<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Iterator<Item = &'a PartitionDefinition> + 'a {
        self.partitions.values().filter(move |p| p.applies_to(stream_id))
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn insert_stream(&mut self, stream: StreamDefinition) -> Result<()> {
        if self.streams.contains_key(&stream.id) {
            return Err(Error::Definition(format!(
                "Stream '{}' is defined more than once",
                stream.id
            )));
        }
        self.streams.insert(stream.id.clone(), stream);
        Ok(())
    }

    fn insert_partition(&mut self, partition: PartitionDefinition) -> Result<()> {
        if self.partition(&partition.id).is_some() {
            return Err(Error::Definition(format!(
                "Partition '{}' is defined more than once",
                partition.id
            )));
        }
        for key in &partition.keys {
            let stream = self.streams.get(&key.stream_id).ok_or_else(|| {
                Error::Definition(format!(
                    "Partition '{}' keys on undefined stream '{}'",
                    partition.id, key.stream_id
                ))
            })?;
            if stream.attribute(&key.attribute).is_none() {
                return Err(Error::Definition(format!(
                    "Partition '{}' keys on unknown attribute '{}.{}'",
                    partition.id, key.stream_id, key.attribute
                )));
            }
        }
        self.partitions.insert(partition.id.clone(), partition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AttributeType;

    #[test]
    fn plan_with_definitions_partition_and_query() {
        let registry = StreamRegistry::from_plan(
            &[
                "define stream StockStream (symbol string, price double)",
                "define partition BySymbol by StockStream.symbol",
            ],
            &["from StockStream select symbol, price insert into OutStream"],
        )
        .unwrap();

        assert_eq!(registry.stream_count(), 2);
        let out = registry.stream("OutStream").unwrap();
        assert_eq!(out.attributes[1].attr_type, AttributeType::Double);
        assert!(registry.partition("BySymbol").is_some());
        assert_eq!(registry.partitions_of("StockStream").count(), 1);
        assert_eq!(registry.partitions_of("OutStream").count(), 0);
    }

    #[test]
    fn explicit_definition_wins_over_inference() {
        let registry = StreamRegistry::from_plan(
            &[
                "define stream In (a int)",
                "define stream Out (a long)",
            ],
            &["from In select a insert into Out"],
        )
        .unwrap();
        assert_eq!(
            registry.stream("Out").unwrap().attributes[0].attr_type,
            AttributeType::Long
        );
    }

    #[test]
    fn duplicate_stream_is_rejected() {
        let err = StreamRegistry::from_plan(
            &["define stream A (x int)", "define stream A (y int)"],
            &[] as &[&str],
        )
        .unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn partition_must_reference_known_attribute() {
        let mut registry = StreamRegistry::new();
        registry.define("define stream A (x int)").unwrap();
        assert!(registry.define("define partition P by B.x").is_err());
        assert!(registry.define("define partition P by A.y").is_err());
        assert!(registry.define("define partition P by A.x").is_ok());
    }

    #[test]
    fn duplicate_partition_is_rejected() {
        let mut registry = StreamRegistry::new();
        registry.define("define stream A (x int)").unwrap();
        registry.define("define partition P by A.x").unwrap();
        let err = registry.define("define partition P by A.x").unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
        assert_eq!(registry.partitions_of("A").count(), 1);
    }

    #[test]
    fn invalid_statement_aborts_plan() {
        let result = StreamRegistry::from_plan(&["create table T (x int)"], &[] as &[&str]);
        assert!(result.is_err());
    }
}
