//! `sqlpilot config`: show the effective configuration.

use sqlpilot_config::AppConfig;

pub fn show(config: &AppConfig) {
    println!("{}", config.to_toml());
}

pub fn path() {
    println!("{}", config_path().display());
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
