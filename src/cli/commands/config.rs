//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{ChartError, ChartResult};
use crate::ui;
use std::path::PathBuf;

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "catalog.cache_dir",
    "catalog.index_ttl_secs",
    "catalog.offline_fallback",
    "catalog.max_cache_mb",
    "fetch.timeout_secs",
    "fetch.max_archive_mb",
    "fetch.user_agent",
    "retry.max_attempts",
    "retry.initial_backoff_ms",
    "retry.max_backoff_ms",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> ChartResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> ChartResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> ChartResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail("Configuration initialized", &path.display().to_string());

    Ok(())
}

/// Update one key of the file-backed configuration
///
/// Starts from the file rather than the effective configuration, so that
/// command-line overrides are not persisted.
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> ChartResult<()> {
    if !VALID_KEYS.contains(&key) {
        ui::step_error_detail("Unknown config key", key);
        ui::remark("Valid keys:");
        for key in VALID_KEYS {
            eprintln!("  {}", key);
        }
        return Err(ChartError::User(format!("Unknown config key: {}", key)));
    }

    let mut config = manager.load().await?;
    apply_value(&mut config, key, value)?;
    manager.save(&config).await?;
    ui::step_ok(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply_value(config: &mut Config, key: &str, value: &str) -> ChartResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => {
                return Err(ChartError::User(format!(
                    "Invalid log format: {}. Use text or json",
                    value
                )))
            }
        },

        ["catalog", "cache_dir"] => {
            config.catalog.cache_dir = (!value.is_empty()).then(|| PathBuf::from(value))
        }
        ["catalog", "index_ttl_secs"] => config.catalog.index_ttl_secs = parse_u64(value)?,
        ["catalog", "offline_fallback"] => config.catalog.offline_fallback = parse_bool(value)?,
        ["catalog", "max_cache_mb"] => config.catalog.max_cache_mb = parse_u64(value)?,

        ["fetch", "timeout_secs"] => config.fetch.timeout_secs = parse_u64(value)?,
        ["fetch", "max_archive_mb"] => config.fetch.max_archive_mb = parse_u64(value)?,
        ["fetch", "user_agent"] => config.fetch.user_agent = value.to_string(),

        ["retry", "max_attempts"] => config.retry.max_attempts = parse_u32(value)?,
        ["retry", "initial_backoff_ms"] => config.retry.initial_backoff_ms = parse_u64(value)?,
        ["retry", "max_backoff_ms"] => config.retry.max_backoff_ms = parse_u64(value)?,

        _ => return Err(ChartError::User(format!("Unknown config key: {}", key))),
    }

    Ok(())
}

fn parse_bool(value: &str) -> ChartResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ChartError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u32(value: &str) -> ChartResult<u32> {
    value
        .parse()
        .map_err(|_| ChartError::User(format!("Invalid number: {}", value)))
}

fn parse_u64(value: &str) -> ChartResult<u64> {
    value
        .parse()
        .map_err(|_| ChartError::User(format!("Invalid number: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_known_keys() {
        let mut config = Config::default();
        apply_value(&mut config, "catalog.offline_fallback", "yes").unwrap();
        apply_value(&mut config, "retry.max_attempts", "2").unwrap();
        apply_value(&mut config, "catalog.cache_dir", "/srv/charts").unwrap();

        assert!(config.catalog.offline_fallback);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.catalog.cache_dir, Some(PathBuf::from("/srv/charts")));

        apply_value(&mut config, "catalog.cache_dir", "").unwrap();
        assert_eq!(config.catalog.cache_dir, None);
    }

    #[test]
    fn apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(apply_value(&mut config, "retry.max_attempts", "many").is_err());
        assert!(apply_value(&mut config, "general.log_format", "xml").is_err());
        assert!(apply_value(&mut config, "catalog.offline_fallback", "maybe").is_err());
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut config = Config::default();
        let err = apply_value(&mut config, "vm.name", "x").unwrap_err();
        assert!(err.to_string().contains("Unknown config key"));
    }

    #[test]
    fn valid_keys_are_all_settable() {
        for key in VALID_KEYS {
            let mut config = Config::default();
            let value = if key.ends_with("offline_fallback") {
                "true"
            } else if key.ends_with("log_format") {
                "json"
            } else {
                "7"
            };
            assert!(apply_value(&mut config, key, value).is_ok(), "{}", key);
        }
    }

    #[tokio::test]
    async fn set_value_persists_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));

        set_value(&manager, "catalog.index_ttl_secs", "60").await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.catalog.index_ttl_secs, 60);
    }
}
