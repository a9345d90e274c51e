//! Locating and reading the configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use mailgate_common::config::Config;

pub const CONFIG_ENV: &str = "MAILGATE_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./mailgate.config.ron", "/etc/mailgate/mailgate.config.ron"];

/// Find the configuration file using the following precedence:
/// 1. an explicit path (`--config`)
/// 2. the `MAILGATE_CONFIG` environment variable
/// 3. `./mailgate.config.ron`
/// 4. `/etc/mailgate/mailgate.config.ron`
///
/// # Errors
/// An explicit or environment path that does not exist, or no file at any of
/// the default locations.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    locate(
        explicit,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &DEFAULT_PATHS.map(PathBuf::from),
    )
}

fn locate(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(path) = from_env {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Parse and validate the configuration at `path`.
///
/// # Errors
/// The file cannot be read, is not a valid document, or fails validation.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = ron::from_str(&content)
        .with_context(|| format!("Failed to parse config in {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(config)
}
