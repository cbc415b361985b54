//! SQLite access for the SQL tools.
//!
//! Wraps a `SqlitePool` and renders what the model needs as text: table
//! names, table schemas with a few sample rows, and query results.

use futures::TryStreamExt;
use sqlpilot_core::ToolError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Decode, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, info};

/// Most rows rendered for one query result.
pub const MAX_RESULT_ROWS: usize = 100;

/// A SQLite database the agent can inspect and query.
pub struct SqlDatabase {
    pool: SqlitePool,
    sample_rows: u32,
    dialect: String,
}

impl SqlDatabase {
    /// Open a database by URL (`sqlite://path.db` or `sqlite::memory:`).
    pub async fn connect(url: &str) -> Result<Self, ToolError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ToolError::Database(format!("Invalid SQLite URL: {e}")))?;

        // Every connection to `:memory:` is a separate database.
        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| ToolError::Database(format!("Failed to open SQLite: {e}")))?;

        info!("SQL database connected at {url}");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            sample_rows: 3,
            dialect: "SQLite".into(),
        }
    }

    /// Sample rows shown under each table schema.
    pub fn with_sample_rows(mut self, sample_rows: u32) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// User tables and views, sorted by name.
    pub async fn table_names(&self) -> Result<Vec<String>, ToolError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ToolError::Database(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| ToolError::Database(e.to_string()))
            })
            .collect()
    }

    /// `CREATE` statements plus sample rows for the named tables.
    ///
    /// Every name must exist; unknown names are reported together.
    pub async fn table_info(&self, names: &[String]) -> Result<String, ToolError> {
        let known = self.table_names().await?;
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !known.contains(n))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidInput(format!(
                "table_names {{{}}} not found in database",
                missing.join(", ")
            )));
        }

        let mut sections = Vec::with_capacity(names.len());
        for name in names {
            let create: Option<String> =
                sqlx::query_scalar::<_, Option<String>>("SELECT sql FROM sqlite_master WHERE name = ?1")
                    .bind(name.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| ToolError::Database(e.to_string()))?
                    .flatten();

            let mut section = create.unwrap_or_default().trim().to_string();
            if self.sample_rows > 0 {
                section.push_str("\n\n/*\n");
                section.push_str(&self.sample_rows_text(name).await?);
                section.push_str("\n*/");
            }
            sections.push(section);
        }

        debug!(tables = names.len(), "Rendered table info");
        Ok(sections.join("\n\n"))
    }

    async fn sample_rows_text(&self, table: &str) -> Result<String, ToolError> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table),
            self.sample_rows
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ToolError::Database(e.to_string()))?;

        let mut lines = vec![format!("{} rows from {} table:", self.sample_rows, table)];
        if let Some(first) = rows.first() {
            lines.push(
                first
                    .columns()
                    .iter()
                    .map(|c| c.name())
                    .collect::<Vec<_>>()
                    .join("\t"),
            );
        }
        for row in &rows {
            lines.push(
                (0..row.len())
                    .map(|i| render_value(row, i, false))
                    .collect::<Vec<_>>()
                    .join("\t"),
            );
        }
        Ok(lines.join("\n"))
    }

    /// Execute `sql` and render the rows as a list of tuples.
    ///
    /// Statements without result rows render as an empty string.
    pub async fn run(&self, sql: &str) -> Result<String, ToolError> {
        // Rows past the cap are never read.
        let mut rows = sqlx::query(sql).fetch(&self.pool);
        let mut rendered = Vec::new();
        while rendered.len() < MAX_RESULT_ROWS
            && let Some(row) = rows
                .try_next()
                .await
                .map_err(|e| ToolError::Database(e.to_string()))?
        {
            rendered.push(render_row(&row));
        }

        debug!(rows = rendered.len(), "Query executed");
        if rendered.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("[{}]", rendered.join(", ")))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_row(row: &SqliteRow) -> String {
    let values: Vec<String> = (0..row.len()).map(|i| render_value(row, i, true)).collect();
    if values.len() == 1 {
        format!("({},)", values[0])
    } else {
        format!("({})", values.join(", "))
    }
}

/// Render one cell by its runtime storage class.
fn render_value(row: &SqliteRow, index: usize, quote_text: bool) -> String {
    let Ok(raw) = row.try_get_raw(index) else {
        return "?".into();
    };
    if raw.is_null() {
        return "None".into();
    }

    let type_name = raw.type_info().name().to_ascii_uppercase();
    let rendered = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => <i64 as Decode<'_, Sqlite>>::decode(raw).map(|v| v.to_string()),
        "REAL" => <f64 as Decode<'_, Sqlite>>::decode(raw).map(|v| v.to_string()),
        "BLOB" => <Vec<u8> as Decode<'_, Sqlite>>::decode(raw).map(|b| format!("<{} bytes>", b.len())),
        _ => <String as Decode<'_, Sqlite>>::decode(raw).map(|s| {
            if quote_text {
                format!("'{}'", s.replace('\'', "\\'"))
            } else {
                s
            }
        }),
    };
    rendered.unwrap_or_else(|_| "?".into())
}
