//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use turnstile_engine::EngineConfig;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Engine tuning block.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_config_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("turnstile.db"),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[allow(clippy::result_large_err)]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TURNSTILE_*)
        figment = figment.merge(Env::prefixed("TURNSTILE_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for turnstile.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("turnstile"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/custom.db\"").unwrap();
        writeln!(file, "[engine]").unwrap();
        writeln!(file, "session_length_minutes = 90").unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.engine.session_length_minutes, 90);
        // Untouched engine fields keep their defaults.
        assert_eq!(config.engine.sweep_interval_secs, 60);
    }
}
