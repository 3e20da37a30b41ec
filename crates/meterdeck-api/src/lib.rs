// meterdeck-api: Async Rust client for the meterdeck backend (REST + push channel)

pub mod client;
pub mod error;
pub mod meters;
pub mod models;
pub mod push;
pub mod system;
pub mod transport;

pub use client::MeterClient;
pub use error::Error;
pub use push::{PushChannel, PushEvent, ReconnectConfig};
pub use transport::TransportConfig;
