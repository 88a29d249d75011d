//! Persisted run configuration.
//!
//! Stored as TOML at `<storage>/config.toml`. The only key the runner
//! relies on is `namespace`, a UUID generated on first use that becomes
//! the namespace of every converted document. All other keys are kept as
//! they are.

use std::path::{Path, PathBuf};

use crate::RunnerError;

const NAMESPACE_KEY: &str = "namespace";

/// Key/value configuration loaded from and saved to a TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    table: toml::Table,
}

impl Config {
    /// Reads `path`, or starts empty if it does not exist, and makes sure
    /// a namespace is present.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] if the file is not valid TOML or
    /// holds a non-string namespace, and [`RunnerError::Io`] if it cannot
    /// be read.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let mut table = if path.is_file() {
            let text = std::fs::read_to_string(path).map_err(RunnerError::io(path))?;
            text.parse::<toml::Table>()
                .map_err(|e| config_error(path, e.to_string()))?
        } else {
            log::info!("No config at {}, starting fresh", path.display());
            toml::Table::new()
        };

        match table.get(NAMESPACE_KEY) {
            Some(toml::Value::String(_)) => {}
            Some(other) => {
                return Err(config_error(
                    path,
                    format!("{NAMESPACE_KEY} must be a string, found {}", other.type_str()),
                ));
            }
            None => {
                let namespace = uuid::Uuid::new_v4().to_string();
                log::info!("Generated namespace {namespace}");
                table.insert(NAMESPACE_KEY.to_owned(), toml::Value::String(namespace));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    /// Namespace of converted documents.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.table
            .get(NAMESPACE_KEY)
            .and_then(toml::Value::as_str)
            .unwrap_or_default()
    }

    /// A raw configuration value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    /// Sets a configuration value. The namespace cannot be replaced.
    pub fn set(&mut self, key: &str, value: toml::Value) {
        if key == NAMESPACE_KEY {
            log::warn!("Ignoring attempt to replace the namespace");
            return;
        }
        self.table.insert(key.to_owned(), value);
    }

    /// File this configuration is saved to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the configuration back to its file.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Io`] if the file cannot be written.
    pub fn save(&self) -> Result<(), RunnerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(RunnerError::io(parent))?;
        }
        let text =
            toml::to_string_pretty(&self.table).map_err(|e| config_error(&self.path, e.to_string()))?;
        std::fs::write(&self.path, text).map_err(RunnerError::io(&self.path))
    }
}

fn config_error(path: &Path, message: String) -> RunnerError {
    RunnerError::Config {
        path: path.display().to_string(),
        message,
    }
}
