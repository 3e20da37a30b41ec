// ── Domain model ──
//
// Backend-agnostic types the store holds and the view builder reads.

mod identity;
mod meter;
mod update;

pub use identity::MacAddress;
pub use meter::{DailyReading, Meter, MeterStatus, PowerState, Reading, SystemStatus};
pub use update::MeterUpdate;
