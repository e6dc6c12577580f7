use derive_more::derive::From;
use foundation_coordination::simulations::{CrossingConfig, RaceConfig, StationConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, From)]
pub enum ConfigError {
    IOError(std::io::Error),
    DeserializationFailed(toml::de::Error),
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings for every demo, one table per simulation.
///
/// ```toml
/// [station]
/// pumps = 3
///
/// [crossing]
/// trains = 5
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemosConfig {
    pub race: RaceConfig,
    pub station: StationConfig,
    pub crossing: CrossingConfig,
}

impl DemosConfig {
    /// Loads the file at `target`, or the defaults when no file is given.
    ///
    /// # Errors
    ///
    /// The file cannot be read or is not valid demo settings.
    pub fn load(target: Option<&std::path::PathBuf>) -> ConfigResult<Self> {
        match target {
            Some(path) => {
                tracing::debug!("Loading demo settings from {}", path.display());
                from_path(path)
            }
            None => Ok(Self::default()),
        }
    }
}

pub fn from_path<T, V>(target: V) -> ConfigResult<T>
where
    T: DeserializeOwned,
    V: Into<std::path::PathBuf>,
{
    let target_path = target.into();
    let config_content = std::fs::read_to_string(target_path)?;
    let config_obj: T = toml::from_str(&config_content)?;
    Ok(config_obj)
}
