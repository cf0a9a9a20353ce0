//! Configuration file lookup and parsing.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::defaults::{CONFIG_ENV_VAR, CONTAINER_CONFIG_FILE, LOCAL_CONFIG_FILE};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, RawConfig};
use crate::validate::validate;

/// Resolve the configuration path from the flag, the environment, or the default locations.
///
/// The local `config.yml` is preferred over the container path when it exists; when
/// neither exists the container path is returned so the read error names it.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    resolve_with(explicit, std::env::var_os(CONFIG_ENV_VAR), |path| {
        path.exists()
    })
}

fn resolve_with(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    exists: impl Fn(&Path) -> bool,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return PathBuf::from(value);
    }
    let local = Path::new(LOCAL_CONFIG_FILE);
    if exists(local) {
        return local.to_path_buf();
    }
    PathBuf::from(CONTAINER_CONFIG_FILE)
}

/// Read, parse, and validate the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, [`ConfigError::Parse`] for
/// malformed YAML, and [`ConfigError::InvalidField`] when validation fails.
pub fn load(path: &Path) -> ConfigResult<AppConfig> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.load.read",
        path: path.to_path_buf(),
        source,
    })?;
    let raw = parse_raw(&contents, Some(path))?;
    let config = validate(raw, Some(path.to_path_buf()))?;
    info!(
        path = %path.display(),
        directories = config.tree.groups.len(),
        repair = config.sync.enable_repair,
        "configuration loaded"
    );
    Ok(config)
}

/// Parse and validate an in-memory YAML document.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed YAML and [`ConfigError::InvalidField`]
/// when validation fails.
pub fn parse_str(contents: &str) -> ConfigResult<AppConfig> {
    let raw = parse_raw(contents, None)?;
    validate(raw, None)
}

fn parse_raw(contents: &str, path: Option<&Path>) -> ConfigResult<RawConfig> {
    if contents.trim().is_empty() {
        debug!("empty configuration document; using defaults");
        return Ok(RawConfig::default());
    }
    serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.map(Path::to_path_buf),
        source,
    })
}
