//! # Formdesk
//!
//! A server for publishing survey form definitions, sharing them with other
//! users, and collecting and querying submissions. Usable both as a
//! standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use formdesk::config::ServerConfig;
//! use formdesk::server::{AppState, create_router};
//! use formdesk::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `formdesk` binary. Disable with `default-features = false`.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod media;
pub mod query;
pub mod server;
pub mod store;
pub mod types;
pub mod url_guard;
