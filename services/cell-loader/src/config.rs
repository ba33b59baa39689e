use anyhow::Result;
use cellkit::{ObservabilityConfig, StoreConfig};
use config::{Config, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellLoaderConfig {
    #[serde(default)]
    pub store: StoreConfig,
    pub loader: LoaderConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub table: String,
    /// Create the table in the bundled in-process store before loading.
    #[serde(default = "default_create_table")]
    pub create_table: bool,
}

fn default_create_table() -> bool {
    true
}

pub fn load_config(path: &str) -> Result<CellLoaderConfig> {
    let config = Config::builder()
        .add_source(File::with_name(path))
        .add_source(config::Environment::with_prefix("CELL_LOADER").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
