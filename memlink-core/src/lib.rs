//! # memlink-core
//!
//! Core library for memlink - capture chat conversations and sync them to a
//! memory backend.
//!
//! This library provides:
//! - Extraction of ordered user/assistant turns from a conversation page
//! - A message relay between the controller and page tabs
//! - An HTTP client for the memory backend with bearer-token auth
//! - Session persistence, configuration and logging
//!
//! ## Architecture
//!
//! A user action flows through three contexts:
//! - **Controller:** owns login state and the selected project
//! - **Relay:** stateless broker that finds the active tab and forwards requests
//! - **Content service:** runs inside a tab and extracts the transcript
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memlink_core::relay::{Relay, TabRegistry};
//! use memlink_core::{Config, Controller, Session, SyncClient};
//!
//! # async fn run() -> memlink_core::Result<()> {
//! let config = Config::load()?;
//! let session = Session::file(config.session.token_path());
//! let client = SyncClient::new(&config.backend, session.clone())?;
//! let (relay, _handle) = Relay::new(Arc::new(TabRegistry::new())).spawn();
//!
//! let mut controller = Controller::new(session, client, relay);
//! controller.startup().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use controller::Controller;
pub use error::{Error, Result};
pub use session::Session;
pub use sync::SyncClient;
pub use types::*;

// Public modules
pub mod config;
pub mod controller;
pub mod error;
pub mod extract;
pub mod logging;
pub mod relay;
pub mod session;
pub mod sync;
pub mod types;
