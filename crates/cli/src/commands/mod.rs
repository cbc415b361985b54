pub mod ask;
pub mod config_cmd;
pub mod doctor;
pub mod tables;

use sqlpilot_config::AppConfig;
use sqlpilot_tools::SqlDatabase;

/// Open the configured database with the configured sampling and dialect.
pub async fn open_database(config: &AppConfig) -> Result<SqlDatabase, Box<dyn std::error::Error>> {
    let db = SqlDatabase::connect(&config.database.url)
        .await
        .map_err(|e| format!("Cannot open {}: {e}", config.database.url))?;
    Ok(db
        .with_sample_rows(config.database.sample_rows)
        .with_dialect(config.database.dialect.clone()))
}
