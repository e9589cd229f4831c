//! Configuration loading and resolution.

use std::path::PathBuf;

use store_counter::EngineConfig;

use crate::types::McpResult;

const CONFIG_ENV: &str = "STORE_COUNTER_CONFIG";
const LOG_DIR_ENV: &str = "STORE_COUNTER_LOG_DIR";
const LOCAL_CONFIG: &str = ".store-counter/config.json";

/// Resolve the engine config file: `--config`, then `$STORE_COUNTER_CONFIG`,
/// then `./.store-counter/config.json`. `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    local.exists().then_some(local)
}

/// Load the engine config, applying a log directory override from the CLI or
/// `$STORE_COUNTER_LOG_DIR`.
pub fn load_engine_config(
    explicit: Option<&str>,
    log_dir: Option<&str>,
) -> McpResult<EngineConfig> {
    let mut config = match resolve_config_path(explicit) {
        Some(path) => {
            tracing::debug!("Loading engine config from {}", path.display());
            EngineConfig::from_file(&path)?
        }
        None => EngineConfig::default(),
    };

    let env_dir = std::env::var(LOG_DIR_ENV).ok().filter(|d| !d.is_empty());
    if let Some(dir) = log_dir.map(str::to_string).or(env_dir) {
        config.log_dir = Some(PathBuf::from(dir));
    }

    config.validate()?;
    Ok(config)
}
