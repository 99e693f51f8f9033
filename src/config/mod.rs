//! Configuration management for campus-market.
//!
//! This module handles loading configuration from `~/.campus-market/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{
    BackendConfig, Config, GeneralConfig, SyncConfig, API_KEY_ENV, BACKEND_URL_ENV,
};
