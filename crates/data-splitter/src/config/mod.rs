//! Configuration loading and validation.
//!
//! Config files may reference environment variables as `${VAR}` or `$VAR`.
//! A `.env` file in the working directory fills in variables that are not
//! already set in the process environment.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};

impl Config {
    /// Load configuration from a YAML file, expanding environment variables.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        apply_dotenv(Path::new(".env"));
        let expanded = expand_env(&content);
        Self::from_yaml(&expanded)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

/// Replace `${VAR}` and `$VAR` with process environment values. Unset
/// variables expand to the empty string.
fn expand_env(input: &str) -> String {
    shellexpand::env_with_context_no_errors(input, |key| {
        Some(std::env::var(key).unwrap_or_default())
    })
    .into_owned()
}

/// Load a dotenv file into the process environment without overwriting
/// variables that are already set. A missing file is ignored.
fn apply_dotenv(path: &Path) {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return,
        Err(e) => {
            warn!("Ignoring env file {}: {}", path.display(), e);
            return;
        }
    };

    for entry in entries {
        match entry {
            Ok((key, value)) => {
                if std::env::var_os(&key).map_or(true, |v| v.is_empty()) {
                    std::env::set_var(&key, value);
                }
            }
            Err(e) => {
                warn!("Stopped reading env file {}: {}", path.display(), e);
                return;
            }
        }
    }
    debug!("Loaded environment defaults from {}", path.display());
}
