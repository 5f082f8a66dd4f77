//! Stream, partition and query definitions of an execution plan.
//!
//! The relay never evaluates queries; it only needs the schema of every
//! stream it exports. Explicit `define stream` statements give those
//! schemas directly, while streams that only appear as `insert into`
//! targets have their schema inferred from the query's select clause.

mod parser;
mod query;
mod registry;
mod types;

pub use parser::parse_definition;
pub use query::{QueryOutput, infer_output};
pub use registry::StreamRegistry;
pub use types::*;
