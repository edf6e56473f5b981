//! Configuration loading
//!
//! Looks for `<root>/timemachine.yaml`, then `<root>/.timemachine/config.yaml`,
//! and falls back to defaults. Environment overrides are applied last and
//! the result is validated before use.

use crate::errors::{io_error, Result};
use std::path::{Path, PathBuf};
use timemachine_core::config::TimeMachineConfig;
use timemachine_core::errors::{ExError, ExErrorKind};

pub const CONFIG_FILE: &str = "timemachine.yaml";
pub const STATE_CONFIG_FILE: &str = ".timemachine/config.yaml";

/// Setting either variable to `1` disables the large-object backend
pub const LARGE_OBJECTS_DISABLED_ENV: &str = "TM_LARGE_OBJECTS_DISABLED";
pub const DVC_DISABLED_ENV: &str = "TM_DVC_DISABLED";

/// First config file that exists under `root`
pub fn find_config(root: &Path) -> Option<PathBuf> {
    [CONFIG_FILE, STATE_CONFIG_FILE]
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

/// Parse YAML into a config. Missing keys take their defaults.
pub fn parse_config(yaml: &str) -> Result<TimeMachineConfig> {
    if yaml.trim().is_empty() {
        return Ok(TimeMachineConfig::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| {
        ExError::new(ExErrorKind::InvalidConfig)
            .with_op("config_parse")
            .with_message(e.to_string())
    })
}

/// Apply environment overrides through `lookup`
pub fn apply_env_overrides(
    config: &mut TimeMachineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let disabled = [LARGE_OBJECTS_DISABLED_ENV, DVC_DISABLED_ENV]
        .iter()
        .any(|key| lookup(key).as_deref() == Some("1"));
    if disabled {
        config.large_objects.enabled = false;
    }
}

/// Load, override from the process environment, and validate
pub fn load_config(root: &Path) -> Result<TimeMachineConfig> {
    let mut config = match find_config(root) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| io_error("read_config", e))?;
            tracing::debug!(path = %path.display(), "loading configuration");
            parse_config(&text)?
        }
        None => TimeMachineConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
