//! `sql_db_query_checker`: asks the model to double-check a query.
//!
//! The model sees the query with a list of common mistakes and replies
//! with the query, rewritten if it found any. Nothing is executed here.

use async_trait::async_trait;
use sqlpilot_core::{GenerationRequest, Generator, Tool, ToolError, ToolInput};
use std::sync::Arc;
use tracing::debug;

const CHECK_TEMPLATE: &str = "{query}
Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.

SQL Query: ";

pub struct QueryCheckerTool {
    generator: Arc<dyn Generator>,
    dialect: String,
    description: String,
}

impl QueryCheckerTool {
    pub fn new(generator: Arc<dyn Generator>, dialect: impl Into<String>) -> Self {
        Self {
            generator,
            dialect: dialect.into(),
            description: "Use this tool to check if your query is correct before executing it. \
Always use this tool before executing a query with sql_db_query!"
                .into(),
        }
    }

    fn prompt(&self, query: &str) -> String {
        CHECK_TEMPLATE
            .replace("{query}", query)
            .replace("{dialect}", &self.dialect)
    }
}

/// Drop a surrounding ```sql fence if the model added one.
fn strip_sql_fence(reply: &str) -> &str {
    let reply = reply.trim();
    let Some(inner) = reply.strip_prefix("```") else {
        return reply;
    };
    let inner = inner
        .strip_prefix("sql")
        .or_else(|| inner.strip_prefix("SQL"))
        .unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl Tool for QueryCheckerTool {
    fn name(&self) -> &str {
        "sql_db_query_checker"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &ToolInput) -> Result<String, ToolError> {
        let query = input.as_text();
        let query = query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidInput("empty SQL query".into()));
        }

        let request = GenerationRequest::new(self.prompt(query));
        let reply = self
            .generator
            .generate(request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let checked = strip_sql_fence(&reply);
        debug!(changed = checked != query, "Query checked");
        Ok(checked.to_string())
    }
}
