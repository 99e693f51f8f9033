//! Offline mutation queue.
//!
//! Writes made while the device may be offline are recorded as mutation
//! intents and replayed against the backend once connectivity returns.
//!
//! - [`QueueStore`]: durable ordered list, one JSON blob under a fixed key
//! - [`QueueProducer`]: `enqueue` for application code
//! - [`QueueDrainer`]: in-order replay, stop at first failure
//! - [`SyncService`]: reconnect and interval triggers with explicit teardown

pub mod connectivity;
pub mod dispatch;
pub mod drainer;
pub mod mutation;
pub mod producer;
pub mod service;
pub mod store;

pub use connectivity::{Connectivity, HttpProbe, NetworkStatus};
pub use dispatch::{Dispatcher, HttpDispatcher, RequestSpec};
pub use drainer::{DrainFailure, DrainOutcome, DrainReport, QueueDrainer};
pub use mutation::{
    AccommodationPatch, BookingPatch, BookingStatus, Change, ListingPatch, ListingStatus,
    MessagePatch, Mutation, NewAccommodation, NewBooking, NewListing, NewMessage, OperationKind,
    QueuedMutation, ResourceType,
};
pub use producer::QueueProducer;
pub use service::{ServiceOptions, SyncService};
pub use store::QueueStore;
