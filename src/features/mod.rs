//! Feature implementations for campus-market.
//!
//! - Offline mutation queue and replay

pub mod sync;
