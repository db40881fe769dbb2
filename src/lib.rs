pub mod api;
pub mod config;
pub mod event_bus;
pub mod state;
pub mod ws;

use thiserror::Error;

use crate::event_bus::StoreError;

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum EventHubError {
    #[error("Database error: {0}")]
    Database(#[from] conservator::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, EventHubError>;
