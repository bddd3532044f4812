use crate::runtime::error::{ParamError, ParamResult};
use serde::Deserialize;
use std::{fs, path::Path};

/// Settings for one query-data object, usually read from the `[query_data]`
/// table of the engine configuration or from a standalone TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryDataConfig {
    /// Upper bound on arena bytes; unlimited when absent.
    pub memory_limit: Option<usize>,
    /// Seed for the random provider. When absent values come from the OS RNG.
    pub random_seed: Option<u64>,
    /// Strictness used by `QueryData::resolve_all`.
    pub strict_resolution: bool,
}

#[derive(Deserialize)]
struct ConfigFile {
    query_data: Option<QueryDataConfig>,
}

impl QueryDataConfig {
    pub fn from_toml_str(content: &str) -> ParamResult<Self> {
        let value: toml::Value = toml::from_str(content).map_err(config_error)?;
        if value.get("query_data").is_some() {
            let file: ConfigFile = value.try_into().map_err(config_error)?;
            return Ok(file.query_data.unwrap_or_default());
        }
        value.try_into().map_err(config_error)
    }

    pub fn load(path: &Path) -> ParamResult<Self> {
        let content = fs::read_to_string(path).map_err(|error| ParamError::Config {
            message: format!("failed to read {}: {error}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }
}

fn config_error(error: toml::de::Error) -> ParamError {
    ParamError::Config {
        message: error.to_string(),
    }
}
