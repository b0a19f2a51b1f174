// Error taxonomy
pub mod error;

// File and environment configuration
pub mod config;

// Key-value store for states and credentials
pub mod store;

// Stored OAuth records
pub mod credentials;

// Provider adapters and OAuth grants
pub mod oauth;

// Provider descriptors and item normalization
pub mod integrations;

// Authorize / callback / access-token lifecycle
pub mod lifecycle;

// HTTP API
pub mod api;

pub use error::{BrokerError, Result};
pub use lifecycle::CredentialManager;
