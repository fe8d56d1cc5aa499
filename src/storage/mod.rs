pub mod database;
pub mod medium;
pub mod models;
pub mod store;

pub use medium::{BlobMedium, JsonFileMedium, SqliteMedium};
pub use store::{MESSAGE_CAPACITY, Store};

use std::fs;

use crate::config::{AppConfig, StoreBackend};
use crate::error::Result;

/// Ensure data directory exists
pub fn ensure_data_dir(config: &AppConfig) -> std::io::Result<()> {
    fs::create_dir_all(&config.data_dir)?;
    Ok(())
}

/// Open the medium selected by the configuration.
pub fn open_medium(config: &AppConfig) -> Result<Box<dyn BlobMedium>> {
    let path = config.store_path();
    match config.store_backend {
        StoreBackend::Json => Ok(Box::new(JsonFileMedium::new(path))),
        StoreBackend::Sqlite => Ok(Box::new(SqliteMedium::open(path)?)),
    }
}
