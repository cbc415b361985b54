//! `sqlpilot tables`: list what the agent can see.

use sqlpilot_config::AppConfig;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db = super::open_database(config).await?;
    let names = db.table_names().await?;
    if names.is_empty() {
        eprintln!("No tables in {}", config.database.url);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}
