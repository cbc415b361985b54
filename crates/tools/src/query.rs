//! `sql_db_query`: run a query and return its rows.

use async_trait::async_trait;
use sqlpilot_core::{Tool, ToolError, ToolInput};
use std::sync::Arc;
use tracing::debug;

use crate::sql_database::SqlDatabase;

pub struct QueryTool {
    db: Arc<SqlDatabase>,
    description: String,
}

impl QueryTool {
    pub fn new(db: Arc<SqlDatabase>, top_k: u32) -> Self {
        let description = format!(
            "Use this tool to execute query and get result from the database. \
Input to this tool is a SQL query, output is a result from the database. \
If the query is not correct, an error message will be returned. \
If an error is returned, rewrite the query and try again. \
If you encounter an issue with Unknown column 'xxxx' in 'field list', or no such column 'xxxx', \
use sql_db_schema to get the correct table columns. \
Unless asked otherwise, limit the query to at most {top_k} rows."
        );
        Self { db, description }
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        "sql_db_query"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &ToolInput) -> Result<String, ToolError> {
        let sql = input.as_text();
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ToolError::InvalidInput("empty SQL query".into()));
        }
        debug!(sql, "Running model query");
        self.db.run(sql).await
    }
}
