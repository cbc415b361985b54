//! `sql_db_schema`: schemas and sample rows for named tables.

use async_trait::async_trait;
use sqlpilot_core::{Tool, ToolError, ToolInput};
use std::sync::Arc;

use crate::sql_database::SqlDatabase;

pub struct TableSchemaTool {
    db: Arc<SqlDatabase>,
}

impl TableSchemaTool {
    pub fn new(db: Arc<SqlDatabase>) -> Self {
        Self { db }
    }
}

/// Split `"a, b,c"` into table names. Models often wrap the list in quotes.
fn table_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl Tool for TableSchemaTool {
    fn name(&self) -> &str {
        "sql_db_schema"
    }

    fn description(&self) -> &str {
        "Use this tool to get the schema of specific tables. Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. Be sure that the tables actually exist by calling sql_db_list_tables first! Example Input: 'table1, table2, table3'"
    }

    async fn invoke(&self, input: &ToolInput) -> Result<String, ToolError> {
        let names = table_list(&input.as_text());
        if names.is_empty() {
            return Err(ToolError::InvalidInput(
                "expected a comma-separated list of table names".into(),
            ));
        }
        self.db.table_info(&names).await
    }
}
