//! `sqlpilot doctor`: check that the database and inference server answer.

use sqlpilot_config::AppConfig;
use sqlpilot_core::Generator;
use sqlpilot_providers::TextGenInference;
use sqlpilot_tools::SqlDatabase;

/// Outcome of one diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Check {
    Ok(String),
    Failed(String),
}

impl Check {
    fn line(&self) -> String {
        match self {
            Check::Ok(detail) => format!("  ✅ {detail}"),
            Check::Failed(detail) => format!("  ❌ {detail}"),
        }
    }

    fn failed(&self) -> bool {
        matches!(self, Check::Failed(_))
    }
}

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("SQLPilot Doctor");
    println!("===============\n");

    let config_path = AppConfig::config_dir().join("config.toml");
    let mut checks = vec![if config_path.exists() {
        Check::Ok(format!("Config file valid ({})", config_path.display()))
    } else {
        Check::Ok("No config file, using defaults".into())
    }];

    checks.push(match super::open_database(config).await {
        Ok(db) => check_database(&db).await,
        Err(e) => Check::Failed(e.to_string()),
    });

    checks.push(match TextGenInference::from_config(&config.generation) {
        Ok(generator) => {
            check_inference(&generator, &config.generation.inference_server_url).await
        }
        Err(e) => Check::Failed(format!("Inference client: {e}")),
    });

    for check in &checks {
        println!("{}", check.line());
    }

    let issues = checks.iter().filter(|c| c.failed()).count();
    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}

async fn check_database(db: &SqlDatabase) -> Check {
    match db.table_names().await {
        Ok(names) if names.is_empty() => {
            Check::Failed("Database reachable but has no tables".into())
        }
        Ok(names) => Check::Ok(format!("Database reachable, {} table(s)", names.len())),
        Err(e) => Check::Failed(format!("Database unreadable: {e}")),
    }
}

async fn check_inference(generator: &dyn Generator, url: &str) -> Check {
    match generator.health_check().await {
        Ok(true) => Check::Ok(format!("Inference server healthy ({url})")),
        Ok(false) => Check::Failed(format!("Inference server at {url} reports unhealthy")),
        Err(e) => Check::Failed(format!("Inference server at {url} unreachable: {e}")),
    }
}
