// ── Controller ──
//
// Explicit context object tying the API client, the push channel and the
// `MeterStore` together. Every action follows the same contract: raise a
// loading flag, call the backend, commit the result, and on failure write
// the last-error slot and return a sentinel instead of an error.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meterdeck_api::{MeterClient, PushChannel, PushEvent, ReconnectConfig, TransportConfig};

use crate::config::BackendConfig;
use crate::convert::{
    clean_name, daily_from_raw, discovery_update, meter_from_details, reading_from_raw,
    system_status,
};
use crate::error::CoreError;
use crate::model::{DailyReading, MacAddress, Meter, MeterUpdate, Reading, SystemStatus};
use crate::store::{FetchSlot, LoadingKind, MergeOutcome, MeterStore};
use crate::view::{self, MeterView, ViewState};

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── Action results ───────────────────────────────────────────────

/// Outcome of the push-backend connectivity probe. Never an error: a
/// failed probe comes back with `status = "error"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MqttProbe {
    pub status: String,
    pub connected: bool,
    pub broker: Option<String>,
    pub message: Option<String>,
    pub test_topic: Option<String>,
}

/// Outcome of a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Unnamed meters the backend reported.
    pub count: usize,
    pub message: Option<String>,
    pub discovered: Vec<MacAddress>,
    /// How many of those were new to the snapshot.
    pub created: usize,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Owns the backend
/// configuration, the store, the HTTP client and the background tasks.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: BackendConfig,
    store: Arc<MeterStore>,
    /// Swapped in by `connect()`, cleared by `disconnect()`.
    client: ArcSwapOption<MeterClient>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Child token for the current connection. Cancelled on disconnect,
    /// replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    push: Mutex<Option<PushChannel>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller. Does NOT connect; call
    /// [`connect()`](Self::connect) to load data and start the push channel.
    pub fn new(config: BackendConfig) -> Self {
        let view = ViewState {
            page_size: config.page_size.max(1),
            ..ViewState::default()
        };
        let store = Arc::new(MeterStore::with_view(view));
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                client: ArcSwapOption::empty(),
                connection_state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                push: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<MeterStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Build the HTTP client, load system status and meters, and spawn the
    /// push channel when enabled.
    ///
    /// Fails only when the backend cannot be reached at all. A failing
    /// meter list is recorded in the error slot like any other action.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        let config = &self.inner.config;
        let transport = TransportConfig {
            timeout: config.timeout,
            accept_invalid_certs: config.accept_invalid_certs,
        };

        let client = match MeterClient::new(config.url.clone(), &transport) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                self.inner.connection_state.send_replace(ConnectionState::Failed);
                return Err(e.into());
            }
        };
        self.inner.client.store(Some(Arc::clone(&client)));

        let health = match client.health().await {
            Ok(health) => health,
            Err(e) => {
                self.inner.client.store(None);
                self.inner.connection_state.send_replace(ConnectionState::Failed);
                return Err(e.into());
            }
        };
        let push_connected = self.inner.store.system_status().push_connected;
        self.inner
            .store
            .set_system_status(system_status(&health, push_connected));

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        if config.push_enabled {
            self.spawn_push(&child).await;
        }

        self.fetch_meters().await;

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connected);
        info!(url = %config.url, meters = self.inner.store.meter_count(), "connected to backend");
        Ok(())
    }

    async fn spawn_push(&self, cancel: &CancellationToken) {
        let reconnect = ReconnectConfig {
            delay: self.inner.config.reconnect_delay,
            max_attempts: self.inner.config.reconnect_attempts,
        };

        match PushChannel::spawn(&self.inner.config.url, reconnect, cancel.child_token()) {
            Ok(channel) => {
                let receiver = channel.subscribe();
                *self.inner.push.lock().await = Some(channel);
                self.attach_push(receiver).await;
                debug!("push channel spawned");
            }
            Err(e) => {
                warn!(error = %e, "push channel unavailable (non-fatal)");
            }
        }
    }

    /// Register a push listener that merges every received event into the
    /// store until the connection is torn down.
    pub async fn attach_push(&self, mut receiver: broadcast::Receiver<Arc<PushEvent>>) {
        let cancel = self.inner.cancel_child.lock().await.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = receiver.recv() => match result {
                        Ok(event) => {
                            controller.inner.store.apply_push_event(&event, Utc::now());
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "push listener lagged, reloading meters");
                            controller.fetch_meters().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("push listener stopped");
        });

        self.inner.task_handles.lock().await.push(handle);
    }

    /// Cancel background tasks and wait for them to finish.
    pub async fn disconnect(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Some(push) = self.inner.push.lock().await.take() {
            push.shutdown();
            push.join().await;
        }

        self.inner.client.store(None);
        self.inner.store.set_push_connected(false);
        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// One-shot: connect without push, run closure, disconnect.
    pub async fn oneshot<F, Fut, T>(config: BackendConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.push_enabled = false;

        let controller = Controller::new(cfg);
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    // ── Action plumbing ──────────────────────────────────────────

    fn client(&self) -> Result<Arc<MeterClient>, CoreError> {
        self.inner.client.load_full().ok_or(CoreError::Disconnected)
    }

    /// Run one backend call under the action contract. The loading flag
    /// clears on every exit path, including cancellation of this future.
    async fn run_action<T, F, Fut>(
        &self,
        kind: Option<LoadingKind>,
        failure: &str,
        op: F,
    ) -> Option<T>
    where
        F: FnOnce(Arc<MeterClient>) -> Fut,
        Fut: Future<Output = Result<T, meterdeck_api::Error>>,
    {
        let _loading = kind.map(|k| self.inner.store.begin_loading(k));

        let result = match self.client() {
            Ok(client) => op(client).await.map_err(CoreError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, action = failure, "backend action failed");
                self.inner.store.record_error(failure, e);
                None
            }
        }
    }

    // ── Read actions ─────────────────────────────────────────────

    /// Refresh backend health. `None` on failure.
    pub async fn fetch_system_status(&self) -> Option<SystemStatus> {
        let health = self
            .run_action(
                Some(LoadingKind::System),
                "Could not load system status",
                |client| async move { client.health().await },
            )
            .await?;

        let push_connected = self.inner.store.system_status().push_connected;
        let status = system_status(&health, push_connected);
        self.inner.store.set_system_status(status);
        Some(status)
    }

    /// Reload the whole meter list. Empty on failure.
    pub async fn fetch_meters(&self) -> Vec<Arc<Meter>> {
        let generation = self.inner.store.begin_fetch(FetchSlot::Meters);
        let Some(raw) = self
            .run_action(
                Some(LoadingKind::Meters),
                "Could not load meters",
                |client| async move { client.list_meters().await },
            )
            .await
        else {
            return Vec::new();
        };

        let meters: Vec<Meter> = raw.into_iter().map(Meter::from).collect();
        self.inner.store.replace_meters(generation, meters);
        self.inner.store.meters_snapshot().to_vec()
    }

    /// Load one meter's details and make it the selected meter.
    pub async fn fetch_meter(&self, mac: &str) -> Option<Meter> {
        let generation = self.inner.store.begin_fetch(FetchSlot::Details);
        let raw = self
            .run_action(
                Some(LoadingKind::Details),
                "Could not load meter details",
                |client| async move { client.get_meter(mac).await },
            )
            .await?;

        let known = self.inner.store.meter(&MacAddress::new(mac));
        let meter = meter_from_details(&raw, known.as_deref());
        self.inner.store.set_selected(generation, Some(meter.clone()));
        Some(meter)
    }

    /// Load recent readings (newest first). Empty on failure.
    pub async fn fetch_readings(&self, mac: &str, limit: u32) -> Vec<Reading> {
        let generation = self.inner.store.begin_fetch(FetchSlot::Readings);
        let Some(raw) = self
            .run_action(
                Some(LoadingKind::Readings),
                "Could not load meter readings",
                |client| async move { client.get_readings(mac, limit).await },
            )
            .await
        else {
            return Vec::new();
        };

        let readings: Vec<Reading> = raw.iter().filter_map(reading_from_raw).collect();
        self.inner.store.set_readings(generation, readings);
        self.inner.store.readings().to_vec()
    }

    /// Load daily aggregates. Empty on failure.
    pub async fn fetch_daily_readings(&self, mac: &str, days: u32) -> Vec<DailyReading> {
        let generation = self.inner.store.begin_fetch(FetchSlot::Daily);
        let Some(raw) = self
            .run_action(
                Some(LoadingKind::Daily),
                "Could not load daily readings",
                |client| async move { client.get_daily_readings(mac, days).await },
            )
            .await
        else {
            return Vec::new();
        };

        let daily: Vec<DailyReading> = raw.into_iter().filter_map(daily_from_raw).collect();
        self.inner.store.set_daily(generation, daily.clone());
        daily
    }

    // ── Write actions ────────────────────────────────────────────

    /// Name and number a meter through the upsert route, then echo the
    /// change into the store.
    pub async fn update_meter_name(&self, mac: &str, name: &str, number: u32) -> bool {
        let Some(response) = self
            .run_action(
                Some(LoadingKind::Details),
                "Could not update meter",
                |client| async move { client.upsert_meter(mac, name, number).await },
            )
            .await
        else {
            return false;
        };

        debug!(mac, message = ?response.message, "meter updated");
        self.echo_info(mac, name, number);
        true
    }

    /// Older rename route. Same local echo as [`update_meter_name`](Self::update_meter_name).
    pub async fn rename_meter_legacy(&self, mac: &str, name: &str, number: u32) -> bool {
        let renamed = self
            .run_action(
                Some(LoadingKind::Details),
                "Could not rename meter",
                |client| async move { client.rename_meter(mac, name, number).await },
            )
            .await
            .is_some();

        if renamed {
            self.echo_info(mac, name, number);
        }
        renamed
    }

    fn echo_info(&self, mac: &str, name: &str, number: u32) {
        let update = MeterUpdate::Info {
            name: clean_name(Some(name)),
            number: Some(number),
        };
        self.inner.store.merge(&MacAddress::new(mac), &update);
    }

    /// Delete a meter. The backend checks `code`; a wrong code leaves the
    /// snapshot untouched. Once the backend confirms, the meter is removed
    /// even if a list fetch committed while the delete was in flight.
    pub async fn delete_meter(&self, mac: &str, code: &str) -> bool {
        let deleted = self
            .run_action(
                Some(LoadingKind::Delete),
                "Could not delete meter",
                |client| async move { client.delete_meter(mac, code).await },
            )
            .await
            .is_some();

        if deleted {
            self.inner.store.remove_meter(&MacAddress::new(mac));
        }
        deleted
    }

    /// Switch a meter's relay on. No loading flag.
    pub async fn turn_on(&self, mac: &str) -> bool {
        self.run_action(None, "Could not turn meter on", |client| async move {
            client.power_on(mac).await
        })
        .await
        .is_some()
    }

    /// Switch a meter's relay off. No loading flag.
    pub async fn turn_off(&self, mac: &str) -> bool {
        self.run_action(None, "Could not turn meter off", |client| async move {
            client.power_off(mac).await
        })
        .await
        .is_some()
    }

    // ── Diagnostics ──────────────────────────────────────────────

    /// Ask the backend whether its MQTT broker answers.
    pub async fn test_mqtt_connection(&self) -> MqttProbe {
        let _loading = self.inner.store.begin_loading(LoadingKind::Mqtt);

        let result = match self.client() {
            Ok(client) => client.mqtt_test().await.map_err(CoreError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(probe) => MqttProbe {
                status: probe.status.unwrap_or_else(|| "ok".into()),
                connected: probe.connected,
                broker: probe.broker,
                message: probe.message,
                test_topic: probe.test_topic,
            },
            Err(e) => {
                let message = e.to_string();
                self.inner
                    .store
                    .record_error("Could not test MQTT connection", e);
                MqttProbe {
                    status: "error".into(),
                    connected: false,
                    broker: None,
                    message: Some(message),
                    test_topic: None,
                }
            }
        }
    }

    /// Trigger a discovery scan and upsert every meter it reports.
    pub async fn scan_for_meters(&self) -> Option<ScanResult> {
        let response = self
            .run_action(
                Some(LoadingKind::Scan),
                "Could not scan for new meters",
                |client| async move { client.scan().await },
            )
            .await?;

        let mut discovered = Vec::with_capacity(response.meters.len());
        let mut created = 0;
        for raw in &response.meters {
            let mac = MacAddress::new(&raw.mac);
            if self.inner.store.merge(&mac, &discovery_update(raw)) == MergeOutcome::Created {
                created += 1;
            }
            discovered.push(mac);
        }

        info!(count = response.count, created, "scan complete");
        Some(ScanResult {
            count: response.count,
            message: response.message,
            discovered,
            created,
        })
    }

    // ── Derived views ────────────────────────────────────────────

    /// Current page of the filtered meter list, with totals.
    pub fn view(&self) -> MeterView {
        let meters = self.inner.store.meters_snapshot();
        MeterView::build(&meters, &self.inner.store.view_state())
    }

    pub fn filtered_meters(&self) -> Vec<Arc<Meter>> {
        let meters = self.inner.store.meters_snapshot();
        view::filtered_meters(&meters, &self.inner.store.view_state())
    }

    pub fn active_meters(&self) -> Vec<Arc<Meter>> {
        view::active_meters(&self.inner.store.meters_snapshot())
    }

    pub fn inactive_meters(&self) -> Vec<Arc<Meter>> {
        view::inactive_meters(&self.inner.store.meters_snapshot())
    }
}
