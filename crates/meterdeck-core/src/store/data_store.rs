// ── Central reactive meter store ──
//
// Holds the canonical in-memory state of the dashboard: the meter
// snapshot, the selected meter with its readings, the view state, loading
// flags, the last error and system health. Every slot is a `watch`
// channel so readers never block writers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::collection::EntityCollection;
use super::generation::{Generation, GenerationCounter};
use super::loading::{LoadingGuard, LoadingKind, LoadingState};
use crate::error::{ActionError, CoreError};
use crate::model::{DailyReading, MacAddress, Meter, MeterUpdate, Reading, SystemStatus};
use crate::stream::SlotStream;
use crate::view::ViewState;

/// Most recent readings kept for the selected meter.
pub const MAX_READINGS: usize = 200;

/// Store slot a fetch result is committed to. Each slot has its own
/// generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchSlot {
    Meters,
    Details,
    Readings,
    Daily,
}

/// What an incremental merge did to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new meter was inserted (discovery only).
    Created,
    /// An existing meter changed.
    Updated,
    /// The meter exists and already had these values.
    Unchanged,
    /// The identity is unknown and the update may not create it.
    Dropped,
}

struct Generations {
    meters: GenerationCounter,
    details: GenerationCounter,
    readings: GenerationCounter,
    daily: GenerationCounter,
}

impl Generations {
    fn slot(&self, slot: FetchSlot) -> &GenerationCounter {
        match slot {
            FetchSlot::Meters => &self.meters,
            FetchSlot::Details => &self.details,
            FetchSlot::Readings => &self.readings,
            FetchSlot::Daily => &self.daily,
        }
    }
}

/// Reactive store for everything the dashboard shows.
///
/// Thread-safe and lock-free for readers. Bulk writes carry a
/// [`Generation`] so a fetch that lands after a newer one has committed
/// is discarded instead of rolling the slot back.
pub struct MeterStore {
    pub(crate) meters: EntityCollection<Meter>,
    selected: watch::Sender<Option<Arc<Meter>>>,
    readings: watch::Sender<Arc<Vec<Reading>>>,
    daily: watch::Sender<Arc<Vec<DailyReading>>>,
    view: watch::Sender<ViewState>,
    loading: watch::Sender<LoadingState>,
    last_error: watch::Sender<Option<Arc<ActionError>>>,
    system: watch::Sender<SystemStatus>,
    last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_push_event: watch::Sender<Option<DateTime<Utc>>>,
    generations: Generations,
}

impl MeterStore {
    pub fn new() -> Self {
        Self::with_view(ViewState::default())
    }

    /// A store whose view starts from `view` (e.g. a configured page size).
    pub fn with_view(view: ViewState) -> Self {
        let (selected, _) = watch::channel(None);
        let (readings, _) = watch::channel(Arc::new(Vec::new()));
        let (daily, _) = watch::channel(Arc::new(Vec::new()));
        let (view, _) = watch::channel(view);
        let (loading, _) = watch::channel(LoadingState::default());
        let (last_error, _) = watch::channel(None);
        let (system, _) = watch::channel(SystemStatus::default());
        let (last_full_refresh, _) = watch::channel(None);
        let (last_push_event, _) = watch::channel(None);

        Self {
            meters: EntityCollection::new(),
            selected,
            readings,
            daily,
            view,
            loading,
            last_error,
            system,
            last_full_refresh,
            last_push_event,
            generations: Generations {
                meters: GenerationCounter::new(),
                details: GenerationCounter::new(),
                readings: GenerationCounter::new(),
                daily: GenerationCounter::new(),
            },
        }
    }

    // ── Bulk writes ──────────────────────────────────────────────────

    /// Take a generation ticket before issuing a fetch for `slot`.
    pub fn begin_fetch(&self, slot: FetchSlot) -> Generation {
        self.generations.slot(slot).begin()
    }

    /// Replace the whole snapshot. Returns `false` if a newer generation
    /// already committed and `meters` was discarded.
    pub fn replace_meters(&self, generation: Generation, meters: Vec<Meter>) -> bool {
        let count = meters.len();
        let committed = self
            .generations
            .meters
            .commit_with(generation, || {
                let entries = meters
                    .into_iter()
                    .map(|m| (m.mac.as_str().to_owned(), m))
                    .collect();
                self.meters.replace_all(entries);
                self.last_full_refresh.send_replace(Some(Utc::now()));
            })
            .is_some();

        if committed {
            debug!(count, generation = generation.get(), "meter snapshot replaced");
        } else {
            debug!(generation = generation.get(), "stale meter list discarded");
        }
        committed
    }

    /// Remove one meter and clear the selection if it was selected.
    ///
    /// The removal is unconditional. It advances the meters and details
    /// generations so a list or details fetch that was already in flight
    /// cannot bring the meter back. When the meter was selected, readings
    /// and daily fetches for it are invalidated too.
    pub fn remove_meter(&self, mac: &MacAddress) -> bool {
        self.generations.details.advance_with(|| ());
        let (removed, was_selected) = self.generations.meters.advance_with(|| {
            let removed = self.meters.remove(mac.as_str()).is_some();
            let was_selected = self
                .selected
                .borrow()
                .as_ref()
                .is_some_and(|m| m.mac == *mac);
            if was_selected {
                self.selected.send_replace(None);
            }
            (removed, was_selected)
        });

        if was_selected {
            self.generations.readings.advance_with(|| {
                self.readings.send_replace(Arc::new(Vec::new()));
            });
            self.generations.daily.advance_with(|| {
                self.daily.send_replace(Arc::new(Vec::new()));
            });
        }
        debug!(%mac, removed, was_selected, "meter removed");
        removed
    }

    /// Set (or clear) the selected meter.
    pub fn set_selected(&self, generation: Generation, meter: Option<Meter>) -> bool {
        self.generations
            .details
            .commit_with(generation, || {
                self.selected.send_replace(meter.map(Arc::new));
            })
            .is_some()
    }

    /// Replace the readings list. Stored newest first, at most
    /// [`MAX_READINGS`] entries.
    pub fn set_readings(&self, generation: Generation, mut readings: Vec<Reading>) -> bool {
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings.truncate(MAX_READINGS);
        self.generations
            .readings
            .commit_with(generation, || {
                self.readings.send_replace(Arc::new(readings));
            })
            .is_some()
    }

    pub fn set_daily(&self, generation: Generation, daily: Vec<DailyReading>) -> bool {
        self.generations
            .daily
            .commit_with(generation, || {
                self.daily.send_replace(Arc::new(daily));
            })
            .is_some()
    }

    // ── Incremental merge ────────────────────────────────────────────

    /// Merge a partial update into one meter.
    ///
    /// Only [`MeterUpdate::Discovered`] may insert an unknown identity;
    /// anything else for an unknown meter is dropped. The selected meter
    /// receives the same update, and a reading for it is prepended to the
    /// readings list.
    pub fn merge(&self, mac: &MacAddress, update: &MeterUpdate) -> MergeOutcome {
        let key = mac.as_str();

        let outcome = if update.creates_entry() {
            let mut changed = false;
            let (_, is_new) = self.meters.upsert_with(
                key.to_owned(),
                || Meter::new(mac.clone()),
                |m| {
                    changed = m.apply(update);
                    changed
                },
            );
            if is_new {
                MergeOutcome::Created
            } else if changed {
                MergeOutcome::Updated
            } else {
                MergeOutcome::Unchanged
            }
        } else {
            match self.meters.update(key, |m| m.apply(update)) {
                Some((_, true)) => MergeOutcome::Updated,
                Some((_, false)) => MergeOutcome::Unchanged,
                None => MergeOutcome::Dropped,
            }
        };

        self.merge_into_selected(mac, update);
        trace!(%mac, kind = update.kind(), ?outcome, "merge");
        outcome
    }

    fn merge_into_selected(&self, mac: &MacAddress, update: &MeterUpdate) {
        let mut is_selected = false;
        self.selected.send_if_modified(|selected| {
            let Some(meter) = selected.as_mut().filter(|m| m.mac == *mac) else {
                return false;
            };
            is_selected = true;
            Arc::make_mut(meter).apply(update)
        });

        if let (true, MeterUpdate::Reading { value, at }) = (is_selected, update) {
            self.readings.send_modify(|readings| {
                let list = Arc::make_mut(readings);
                list.insert(
                    0,
                    Reading {
                        timestamp: *at,
                        value: *value,
                    },
                );
                list.truncate(MAX_READINGS);
            });
        }
    }

    // ── View state ───────────────────────────────────────────────────

    /// Change the search text and return to page 1.
    pub fn set_search(&self, search: impl Into<String>) {
        let search = search.into();
        self.view.send_modify(|v| v.set_search(search));
    }

    pub fn toggle_active_only(&self) {
        self.view.send_modify(ViewState::toggle_active_only);
    }

    pub fn set_active_only(&self, active_only: bool) {
        self.view.send_modify(|v| v.set_active_only(active_only));
    }

    pub fn set_page(&self, page: usize) {
        self.view.send_modify(|v| v.set_page(page));
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.view.send_modify(|v| v.set_page_size(page_size));
    }

    // ── Loading / error / health ─────────────────────────────────────

    /// Mark `kind` as loading until the returned guard is dropped.
    pub fn begin_loading(&self, kind: LoadingKind) -> LoadingGuard<'_> {
        LoadingGuard::enter(&self.loading, kind)
    }

    /// Overwrite the last-error slot.
    pub fn record_error(&self, message: impl Into<String>, cause: CoreError) {
        let error = ActionError {
            message: message.into(),
            cause,
        };
        debug!(error = %error, "action failed");
        self.last_error.send_replace(Some(Arc::new(error)));
    }

    pub fn clear_error(&self) {
        self.last_error.send_replace(None);
    }

    /// Replace the backend half of the system status, keeping the push flag.
    pub fn set_system_status(&self, status: SystemStatus) {
        self.system.send_modify(|s| {
            let push_connected = s.push_connected;
            *s = status;
            s.push_connected = push_connected;
        });
    }

    pub fn set_push_connected(&self, connected: bool) {
        self.system
            .send_if_modified(|s| std::mem::replace(&mut s.push_connected, connected) != connected);
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn meters_snapshot(&self) -> Arc<Vec<Arc<Meter>>> {
        self.meters.snapshot()
    }

    pub fn meter(&self, mac: &MacAddress) -> Option<Arc<Meter>> {
        self.meters.get_by_key(mac.as_str())
    }

    pub fn contains_meter(&self, mac: &MacAddress) -> bool {
        self.meters.contains_key(mac.as_str())
    }

    pub fn meter_count(&self) -> usize {
        self.meters.len()
    }

    /// Identities in backend order.
    pub fn meter_macs(&self) -> Vec<MacAddress> {
        self.meters.keys().into_iter().map(MacAddress::from).collect()
    }

    /// Bumped on every snapshot mutation.
    pub fn meters_version(&self) -> u64 {
        self.meters.version()
    }

    pub fn selected(&self) -> Option<Arc<Meter>> {
        self.selected.borrow().clone()
    }

    pub fn readings(&self) -> Arc<Vec<Reading>> {
        self.readings.borrow().clone()
    }

    pub fn daily_readings(&self) -> Arc<Vec<DailyReading>> {
        self.daily.borrow().clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn loading(&self) -> LoadingState {
        self.loading.borrow().clone()
    }

    pub fn is_loading(&self, kind: LoadingKind) -> bool {
        self.loading.borrow().is_loading(kind)
    }

    pub fn last_error(&self) -> Option<Arc<ActionError>> {
        self.last_error.borrow().clone()
    }

    pub fn system_status(&self) -> SystemStatus {
        *self.system.borrow()
    }

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    pub fn last_push_event(&self) -> Option<DateTime<Utc>> {
        *self.last_push_event.borrow()
    }

    /// How long ago the last full refresh occurred, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_full_refresh().map(|t| Utc::now() - t)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_meters(&self) -> SlotStream<Arc<Vec<Arc<Meter>>>> {
        SlotStream::new(self.meters.subscribe())
    }

    pub fn subscribe_selected(&self) -> SlotStream<Option<Arc<Meter>>> {
        SlotStream::new(self.selected.subscribe())
    }

    pub fn subscribe_readings(&self) -> SlotStream<Arc<Vec<Reading>>> {
        SlotStream::new(self.readings.subscribe())
    }

    pub fn subscribe_view(&self) -> SlotStream<ViewState> {
        SlotStream::new(self.view.subscribe())
    }

    pub fn subscribe_loading(&self) -> SlotStream<LoadingState> {
        SlotStream::new(self.loading.subscribe())
    }

    pub fn subscribe_errors(&self) -> SlotStream<Option<Arc<ActionError>>> {
        SlotStream::new(self.last_error.subscribe())
    }

    pub fn subscribe_system(&self) -> SlotStream<SystemStatus> {
        SlotStream::new(self.system.subscribe())
    }
}

impl Default for MeterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{MeterStatus, PowerState};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn named(mac: &str, name: &str) -> Meter {
        let mut m = Meter::new(MacAddress::new(mac));
        m.name = Some(name.into());
        m.status = MeterStatus::Online;
        m
    }

    fn seeded() -> MeterStore {
        let store = MeterStore::new();
        let generation = store.begin_fetch(FetchSlot::Meters);
        store.replace_meters(
            generation,
            vec![named("aa:01", "Kontor"), named("aa:02", "Køkken")],
        );
        store
    }

    #[test]
    fn replace_dedups_identities() {
        let store = MeterStore::new();
        let generation = store.begin_fetch(FetchSlot::Meters);
        assert!(store.replace_meters(
            generation,
            vec![named("AA:01", "a"), named("aa:02", "b"), named("aa:01", "c")],
        ));
        assert_eq!(store.meter_count(), 2);
        assert_eq!(
            store.meter(&MacAddress::new("aa:01")).unwrap().name.as_deref(),
            Some("c")
        );
        assert!(store.last_full_refresh().is_some());
    }

    #[test]
    fn late_fetch_is_discarded() {
        let store = MeterStore::new();
        let slow = store.begin_fetch(FetchSlot::Meters);
        let fast = store.begin_fetch(FetchSlot::Meters);

        assert!(store.replace_meters(fast, vec![named("aa:02", "new")]));
        assert!(!store.replace_meters(slow, vec![named("aa:01", "old")]));

        assert_eq!(store.meter_macs(), vec![MacAddress::new("aa:02")]);
    }

    #[test]
    fn status_for_unknown_meter_is_dropped() {
        let store = seeded();
        let version = store.meters_version();
        let outcome = store.merge(
            &MacAddress::new("ff:ff"),
            &MeterUpdate::Status {
                status: MeterStatus::Offline,
                seen_at: at(1),
            },
        );
        assert_eq!(outcome, MergeOutcome::Dropped);
        assert_eq!(store.meter_count(), 2);
        assert_eq!(store.meters_version(), version);
    }

    #[test]
    fn discovery_creates_then_updates() {
        let store = seeded();
        let update = MeterUpdate::Discovered {
            status: MeterStatus::Online,
            last_seen: Some(at(5)),
            last_reading: Some(1.5),
            days_with_data: None,
        };
        let mac = MacAddress::new("aa:03");
        assert_eq!(store.merge(&mac, &update), MergeOutcome::Created);
        assert_eq!(store.merge(&mac, &update), MergeOutcome::Unchanged);
        assert_eq!(store.meter_count(), 3);
        assert_eq!(store.meter_macs().last(), Some(&mac));
    }

    #[test]
    fn merge_reaches_selected_meter_and_readings() {
        let store = seeded();
        let mac = MacAddress::new("aa:01");
        let generation = store.begin_fetch(FetchSlot::Details);
        store.set_selected(generation, Some(named("aa:01", "Kontor")));

        store.merge(&mac, &MeterUpdate::Reading { value: 7.0, at: at(10) });
        store.merge(
            &mac,
            &MeterUpdate::Power {
                state: PowerState::Off,
                at: None,
            },
        );

        let selected = store.selected().unwrap();
        assert_eq!(selected.last_reading, Some(7.0));
        assert_eq!(selected.power, Some(PowerState::Off));
        assert_eq!(store.meter(&mac).unwrap().last_reading, Some(7.0));
        assert_eq!(
            *store.readings(),
            vec![Reading {
                timestamp: at(10),
                value: 7.0
            }]
        );
    }

    #[test]
    fn readings_are_capped_and_newest_first() {
        let store = MeterStore::new();
        let generation = store.begin_fetch(FetchSlot::Readings);
        let readings = (0..250)
            .map(|i| Reading {
                timestamp: at(i),
                value: i as f64,
            })
            .collect();
        store.set_readings(generation, readings);

        let stored = store.readings();
        assert_eq!(stored.len(), MAX_READINGS);
        assert_eq!(stored[0].timestamp, at(249));

        let details = store.begin_fetch(FetchSlot::Details);
        store.set_selected(details, Some(named("aa:01", "x")));
        store.merge(
            &MacAddress::new("aa:01"),
            &MeterUpdate::Reading {
                value: 1.0,
                at: at(1000),
            },
        );
        let stored = store.readings();
        assert_eq!(stored.len(), MAX_READINGS);
        assert_eq!(stored[0].timestamp, at(1000));
    }

    #[test]
    fn removing_selected_meter_clears_selection() {
        let store = seeded();
        let details = store.begin_fetch(FetchSlot::Details);
        store.set_selected(details, Some(named("aa:02", "Køkken")));

        assert!(store.remove_meter(&MacAddress::new("aa:02")));
        assert!(store.selected().is_none());
        assert_eq!(store.meter_count(), 1);
    }

    #[test]
    fn removing_other_meter_keeps_selection() {
        let store = seeded();
        let details = store.begin_fetch(FetchSlot::Details);
        store.set_selected(details, Some(named("aa:02", "Køkken")));

        store.remove_meter(&MacAddress::new("aa:01"));
        assert_eq!(store.selected().unwrap().mac.as_str(), "aa:02");
    }

    #[test]
    fn removal_outruns_fetches_started_before_it() {
        let store = seeded();
        let list = store.begin_fetch(FetchSlot::Meters);
        let details = store.begin_fetch(FetchSlot::Details);
        store.remove_meter(&MacAddress::new("aa:01"));

        assert!(!store.replace_meters(list, vec![named("aa:01", "Kontor")]));
        assert!(!store.set_selected(details, Some(named("aa:01", "Kontor"))));
        assert!(store.meter(&MacAddress::new("aa:01")).is_none());
        assert!(store.selected().is_none());
    }

    #[test]
    fn removal_wins_over_list_committed_while_delete_was_in_flight() {
        let store = seeded();
        let list = store.begin_fetch(FetchSlot::Meters);
        assert!(store.replace_meters(
            list,
            vec![named("aa:01", "Kontor"), named("aa:02", "Køkken")]
        ));

        assert!(store.remove_meter(&MacAddress::new("aa:01")));
        assert!(store.meter(&MacAddress::new("aa:01")).is_none());

        let next = store.begin_fetch(FetchSlot::Meters);
        assert!(store.replace_meters(next, vec![named("aa:02", "Køkken")]));
    }

    #[test]
    fn removing_selected_meter_drops_its_pending_readings() {
        let store = seeded();
        let details = store.begin_fetch(FetchSlot::Details);
        store.set_selected(details, Some(named("aa:01", "Kontor")));
        let readings = store.begin_fetch(FetchSlot::Readings);

        store.remove_meter(&MacAddress::new("aa:01"));
        assert!(!store.set_readings(
            readings,
            vec![Reading {
                value: 1.0,
                timestamp: at(10),
            }]
        ));
        assert!(store.readings().is_empty());
    }

    #[test]
    fn error_slot_is_overwritten_and_cleared() {
        let store = MeterStore::new();
        store.record_error("first", CoreError::Disconnected);
        store.record_error("second", CoreError::Internal("boom".into()));
        assert_eq!(store.last_error().unwrap().message, "second");
        store.clear_error();
        assert!(store.last_error().is_none());
    }

    #[test]
    fn system_status_keeps_push_flag() {
        let store = MeterStore::new();
        store.set_push_connected(true);
        store.set_system_status(SystemStatus {
            database_connected: true,
            mqtt_connected: false,
            push_connected: false,
        });
        let status = store.system_status();
        assert!(status.database_connected);
        assert!(status.push_connected);
    }

    #[test]
    fn view_setters_follow_page_policy() {
        let store = MeterStore::new();
        store.set_page(4);
        store.toggle_active_only();
        store.set_page_size(3);
        assert_eq!(store.view_state().page, 4);
        store.set_search("kon");
        assert_eq!(store.view_state().page, 1);
    }
}
