// ── Reactive meter store ──
//
// Lock-free meter storage with push-based change notification, fetch
// generations, loading flags and push event merging.

mod collection;
mod data_store;
mod generation;
mod loading;
mod sync;

pub use data_store::{FetchSlot, MAX_READINGS, MergeOutcome, MeterStore};
pub use generation::Generation;
pub use loading::{LoadingGuard, LoadingKind, LoadingState};
pub use sync::{PushOutcome, TopicKind, parse_topic};
