//! Reactive data layer between `meterdeck-api` and UI consumers (the CLI).
//!
//! - **[`Controller`]**: explicit context object. [`connect()`](Controller::connect)
//!   loads system status and the meter list, then spawns the push channel
//!   and a listener that merges its events into the store. Actions never
//!   return errors; they record them in the store's last-error slot and
//!   hand back a sentinel (`None`, `false`, an empty list).
//!
//! - **[`MeterStore`]**: lock-free reactive storage. The meter snapshot is
//!   an `EntityCollection` (`DashMap` + `tokio::sync::watch`); every other
//!   slot is a `watch` channel. Bulk writes are guarded by fetch
//!   generations, incremental writes go through [`MeterUpdate`].
//!
//! - **[`view`]**: pure filter, search and pagination over a snapshot.

pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::BackendConfig;
pub use controller::{ConnectionState, Controller, MqttProbe, ScanResult};
pub use error::{ActionError, CoreError};
pub use store::{
    FetchSlot, Generation, LoadingKind, LoadingState, MergeOutcome, MeterStore, PushOutcome,
};
pub use stream::SlotStream;
pub use view::{MeterView, ViewState};

pub use model::{
    DailyReading, MacAddress, Meter, MeterStatus, MeterUpdate, PowerState, Reading, SystemStatus,
};
