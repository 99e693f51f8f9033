//! campus-market - offline mutation queue for the Campus Market client
//!
//! Writes made while the backend is unreachable are persisted in order and
//! replayed against the backend REST API once connectivity returns.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::{DispatchError, MarketError};
pub use features::sync::{
    Mutation, QueueDrainer, QueueProducer, QueueStore, QueuedMutation, SyncService,
};
