//! # Snapvault
//!
//! Version-controlled project storage: immutable snapshots of file sets,
//! content-addressed blobs and named branch heads, served over HTTP.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! snapvault = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use snapvault::blob::FsBlobStore;
//! use snapvault::config::ServerConfig;
//! use snapvault::server::{AppState, create_router};
//! use snapvault::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     Arc::new(FsBlobStore::new(&config.blob_dir())),
//!     config,
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the CLI module. Disable with `default-features = false`.

pub mod blob;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod types;
