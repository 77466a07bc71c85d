pub mod http_client;
mod push;

pub use http_client::ApiClient;
pub use push::{LocalFile, PushOptions, collect_files, run_push};

use std::fs;
use std::path::Path;

use crate::config::ServerConfig;
use crate::store::{SqliteStore, Store};

/// Creates the data directory, the database schema and the blob directory.
///
/// Safe to run again on an initialized directory.
pub fn run_init(data_dir: &Path) -> anyhow::Result<ServerConfig> {
    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };

    fs::create_dir_all(&config.data_dir)?;
    fs::create_dir_all(config.blob_dir())?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    Ok(config)
}

/// Opens the store in an initialized data directory.
pub fn init_store(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    let db_path = config.db_path();

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'snapvault init' first.",
            db_path.display()
        );
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(store)
}
