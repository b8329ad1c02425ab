//! # Treestore
//!
//! Project tree store for a collaborative document editor: folders, docs and
//! binary files addressed by materialized paths, with sharing and access
//! tokens. Usable both as a standalone server and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! treestore = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use treestore::blob::FsBlobStore;
//! use treestore::notify::{BroadcastBus, DEFAULT_TIMEOUT, NoopContentSync, Notifier};
//! use treestore::server::{AppState, create_router};
//! use treestore::store::{SqliteStore, Store};
//! use treestore::tree::FileTree;
//!
//! let store = SqliteStore::new("./data/treestore.db")?;
//! store.initialize()?;
//!
//! let notifier = Notifier::new(
//!     Arc::new(BroadcastBus::default()),
//!     Arc::new(NoopContentSync),
//!     DEFAULT_TIMEOUT,
//! );
//! let tree = FileTree::new(
//!     Arc::new(store),
//!     Arc::new(FsBlobStore::new(Path::new("./data"))),
//!     notifier,
//! );
//! let router = create_router(Arc::new(AppState::new(tree)));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `treestore` binary. Disable with `default-features = false`.

pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod notify;
pub mod server;
pub mod store;
pub mod tree;
pub mod types;
