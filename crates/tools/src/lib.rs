//! SQL tools for SQLPilot.
//!
//! A small toolkit over one SQLite database: list the tables, show table
//! schemas with sample rows, run a query, and have the model double-check
//! a query before it is run.

pub mod list_tables;
pub mod query;
pub mod query_checker;
pub mod sql_database;
pub mod table_schema;

use sqlpilot_core::{Generator, ToolRegistry};
use std::sync::Arc;

pub use list_tables::ListTablesTool;
pub use query::QueryTool;
pub use query_checker::QueryCheckerTool;
pub use sql_database::{MAX_RESULT_ROWS, SqlDatabase};
pub use table_schema::TableSchemaTool;

/// Build the registry with all four SQL tools.
///
/// `generator` backs the query checker; `top_k` is the row limit the query
/// tool asks the model to respect.
pub fn sql_toolkit(db: Arc<SqlDatabase>, generator: Arc<dyn Generator>, top_k: u32) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(QueryTool::new(db.clone(), top_k)));
    registry.register(Box::new(TableSchemaTool::new(db.clone())));
    registry.register(Box::new(ListTablesTool::new(db.clone())));
    registry.register(Box::new(QueryCheckerTool::new(generator, db.dialect())));
    registry
}
