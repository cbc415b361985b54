//! `sql_db_list_tables`: comma-separated table names.

use async_trait::async_trait;
use sqlpilot_core::{Tool, ToolError, ToolInput};
use std::sync::Arc;

use crate::sql_database::SqlDatabase;

pub struct ListTablesTool {
    db: Arc<SqlDatabase>,
}

impl ListTablesTool {
    pub fn new(db: Arc<SqlDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        "sql_db_list_tables"
    }

    fn description(&self) -> &str {
        "Use this tool to list all table names in the database. Input to this tool is an empty string, output is a comma separated list of table names in the database."
    }

    async fn invoke(&self, _input: &ToolInput) -> Result<String, ToolError> {
        Ok(self.db.table_names().await?.join(", "))
    }
}
