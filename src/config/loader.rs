//! Configuration Loader
//!
//! Layers, from lowest to highest precedence:
//! 1. compiled defaults (`CoreConfig::default()`)
//! 2. an optional TOML file
//! 3. environment variables, `MAISON__SECTION__FIELD` (e.g. `MAISON__RETRY_QUEUE__CAPACITY=50`)

use super::error::{ConfigResult, ConfigurationError};
use super::CoreConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_PREFIX: &str = "MAISON";
pub const ENV_SEPARATOR: &str = "__";
/// Environment variable pointing at the configuration file when no path is given
pub const CONFIG_PATH_VAR: &str = "MAISON_CONFIG";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, using `path` or `$MAISON_CONFIG` when set
    pub fn load(path: Option<&Path>) -> ConfigResult<CoreConfig> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));

        if let Some(path) = &path {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound { path: path.clone() });
            }
        }

        Self::load_with_env(path.as_deref(), Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from a TOML string, without environment overrides
    pub fn from_toml_str(toml: &str) -> ConfigResult<CoreConfig> {
        let config = Config::builder()
            .add_source(Config::try_from(&CoreConfig::default())?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize::<CoreConfig>()?;
        config.validate()?;
        Ok(config)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> ConfigResult<CoreConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&CoreConfig::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config = builder
            .add_source(env.separator(ENV_SEPARATOR).try_parsing(true))
            .build()?
            .try_deserialize::<CoreConfig>()?;

        config.validate()?;

        debug!(
            history_capacity = config.event_bus.history_capacity,
            queue_capacity = config.retry_queue.capacity,
            max_attempts = config.retry_queue.default_max_attempts,
            persistence_path = %config.retry_queue.persistence_path.display(),
            "Configuration loaded"
        );

        Ok(config)
    }
}
