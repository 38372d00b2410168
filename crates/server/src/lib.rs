//! Susen Server
//!
//! HTTP edge of the puzzle service. It owns:
//! - Session identity and scheme-bound cookies ([`cookie`])
//! - The concurrent session store and idle eviction ([`store`])
//! - Per-session snapshot history ([`session`])
//! - The assignment protocol ([`assign`])
//! - Routing and error mapping ([`routes`])
//!
//! Puzzle rules live behind [`PuzzleEngine`]; this crate never inspects a
//! snapshot beyond asking whether a square is already assigned.

#![deny(unsafe_code)]

pub mod assign;
pub mod config;
pub mod cookie;
pub mod logging;
pub mod routes;
pub mod session;
pub mod store;

use std::sync::Arc;

use susen_puzzle::PuzzleEngine;

use config::{ConfigError, ServerConfig};
use cookie::CookieNegotiator;
use store::SessionStore;

pub use routes::router;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub negotiator: Arc<CookieNegotiator>,
    pub engine: Arc<dyn PuzzleEngine>,
    pub ui_path: Arc<str>,
}

impl AppState {
    /// Validate `config` and build the state. New sessions start on
    /// `config.default_puzzle`, which must exist in `engine`.
    pub fn new(config: &ServerConfig, engine: Arc<dyn PuzzleEngine>) -> Result<Self, ConfigError> {
        config.validate()?;
        let root = engine
            .initial_snapshot(&config.default_puzzle)
            .map_err(|err| ConfigError::Invalid {
                field: "default_puzzle",
                reason: err.to_string(),
            })?;
        let negotiator = CookieNegotiator::from_config(config)?;
        let store = SessionStore::new(root, config.session.idle_timeout());

        Ok(Self {
            store: Arc::new(store),
            negotiator: Arc::new(negotiator),
            engine,
            ui_path: Arc::from(config.ui_path.as_str()),
        })
    }
}
