//! Realtime persistence-and-change-notification bridge for the stage
//! collaboration service.
//!
//! The bridge performs CRUD against nine named entity collections and watches
//! every collection's change feed, republishing each observed mutation as
//! exactly one strongly-typed domain event (`<Entity>Added`,
//! `<Entity>Changed`, `<Entity>Removed`) on an in-process event bus. The
//! transport and authentication layers consume the bridge through the
//! [`SyncBridge`] facade; they never talk to storage directly.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod events;
pub mod health;
pub mod metrics;
pub mod models;
pub mod store;
pub mod utils;
pub mod watch;

pub use bridge::SyncBridge;
pub use bus::{EventBus, SubscriptionId};
pub use config::Config;
pub use events::{Collection, EventKind, Transition};
pub use health::{HealthStatus, SystemHealth};
pub use metrics::Metrics;
pub use store::{
    ChangeRecord, EntityStore, MemoryBackend, ScyllaBackend, StorageBackend, StoreError,
    StreamFault,
};
pub use watch::WatcherFailure;
