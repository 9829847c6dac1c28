// ── In-process backend ──
//
// Simulated displays behind the same `BrightnessBackend` seam as the
// network transport. Each watch runs a polling watcher that publishes a
// snapshot on start and afterwards only when something observable changed
// (device set, names, brightness, or the handled command sequence).
//
// Tagged snapshots carry the lowest sequence the backend cannot yet vouch
// for: the oldest command still being processed, or one past the newest
// handled command when nothing is in progress.
// Drives `--demo` mode and the session tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{BrightnessBackend, PUSH_CHANNEL_CAPACITY, PushFrame, PushSender, PushSubscription};
use crate::error::Error;
use crate::scale::{NativeScale, SupportedLevels};
use crate::wire::{SetBrightnessRequest, WireDevice, WireSnapshot};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One simulated monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedDisplay {
    pub id: String,
    pub display_name: String,
    pub brightness: i32,
    /// Native scale of the panel. Non-negative writes are quantized
    /// through it; negative (dimming) values are stored as sent.
    pub scale: Option<PanelScale>,
}

/// How a simulated panel stores brightness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelScale {
    /// DDC/CI style register range.
    Register(NativeScale),
    /// Laptop style list of accepted levels.
    Levels(SupportedLevels),
}

impl SimulatedDisplay {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, brightness: i32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            brightness,
            scale: None,
        }
    }

    pub fn with_scale(mut self, scale: NativeScale) -> Self {
        self.scale = Some(PanelScale::Register(scale));
        self
    }

    /// Snap non-negative writes to the nearest of `levels`.
    pub fn with_levels(mut self, levels: SupportedLevels) -> Self {
        self.scale = Some(PanelScale::Levels(levels));
        self
    }

    fn apply(&mut self, value: i32) {
        self.brightness = match (&self.scale, u32::try_from(value)) {
            (Some(PanelScale::Register(scale)), Ok(percent)) => {
                let stored = scale.to_percent(scale.from_percent(percent));
                i32::try_from(stored).unwrap_or(value)
            }
            (Some(PanelScale::Levels(levels)), Ok(percent)) => {
                levels.nearest(percent).map_or(value, i32::from)
            }
            _ => value,
        };
    }

    fn to_wire(&self) -> WireDevice {
        WireDevice {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            brightness: i64::from(self.brightness),
        }
    }
}

/// In-process [`BrightnessBackend`].
///
/// Cheaply cloneable; clones share the same displays.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    poll_interval: Duration,
    tag_snapshots: bool,
    latency: Duration,
}

#[derive(Default)]
struct State {
    displays: Vec<SimulatedDisplay>,
    /// Highest command sequence handled so far, applied or rejected.
    handled_sequence: u64,
    /// Commands received but not yet handled.
    in_progress: BTreeSet<u64>,
    fail_next: u32,
    requests: Vec<SetBrightnessRequest>,
    watchers: Vec<Watcher>,
}

/// An open watch: the subscription's producer and the watcher task's stop.
#[derive(Clone)]
struct Watcher {
    tx: PushSender,
    stop: CancellationToken,
}

impl MemoryBackend {
    pub fn new(displays: Vec<SimulatedDisplay>) -> Self {
        Self::build(displays, DEFAULT_POLL_INTERVAL, true, Duration::ZERO)
    }

    /// Two displays with an asymmetric internal panel, as used by `--demo`.
    pub fn demo() -> Self {
        let internal = SimulatedDisplay::new("\\\\.\\DISPLAY1", "Built-in Display", 40)
            .with_levels(SupportedLevels::new((0..=100).step_by(5).collect()));
        let external = SimulatedDisplay::new("\\\\.\\DISPLAY2", "DELL U2720Q", 0)
            .with_scale(NativeScale { min: 0, max: 50 });
        Self::build(
            vec![internal, external],
            DEFAULT_POLL_INTERVAL,
            true,
            Duration::from_millis(120),
        )
    }

    fn build(
        displays: Vec<SimulatedDisplay>,
        poll_interval: Duration,
        tag_snapshots: bool,
        latency: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    displays,
                    ..State::default()
                }),
                poll_interval,
                tag_snapshots,
                latency,
            }),
        }
    }

    /// Rebuild with a different polling interval. Call before sharing.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        let displays = self.inner.lock().displays.clone();
        Self::build(displays, poll_interval, self.inner.tag_snapshots, self.inner.latency)
    }

    /// Publish bare arrays without a sequence marker, like a plain poller.
    pub fn untagged(self) -> Self {
        let displays = self.inner.lock().displays.clone();
        Self::build(displays, self.inner.poll_interval, false, self.inner.latency)
    }

    /// Delay every command by `latency` before applying it.
    pub fn with_latency(self, latency: Duration) -> Self {
        let displays = self.inner.lock().displays.clone();
        Self::build(displays, self.inner.poll_interval, self.inner.tag_snapshots, latency)
    }

    // ── Simulated outside world ─────────────────────────────────────

    /// Change a display as if its hardware buttons were pressed.
    pub fn set_external(&self, id: &str, brightness: i32) -> bool {
        let mut state = self.inner.lock();
        match state.displays.iter_mut().find(|d| d.id == id) {
            Some(display) => {
                display.brightness = brightness;
                true
            }
            None => false,
        }
    }

    pub fn rename(&self, id: &str, display_name: &str) -> bool {
        let mut state = self.inner.lock();
        match state.displays.iter_mut().find(|d| d.id == id) {
            Some(display) => {
                display.display_name = display_name.to_owned();
                true
            }
            None => false,
        }
    }

    pub fn attach(&self, display: SimulatedDisplay) {
        let mut state = self.inner.lock();
        state.displays.retain(|d| d.id != display.id);
        state.displays.push(display);
    }

    pub fn detach(&self, id: &str) -> bool {
        let mut state = self.inner.lock();
        let before = state.displays.len();
        state.displays.retain(|d| d.id != id);
        state.displays.len() != before
    }

    /// Fail the next `count` commands.
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().fail_next = count;
    }

    /// Send a raw frame to every open watch, bypassing the watcher.
    pub async fn inject_frame(&self, text: &str) {
        for watcher in self.open_watchers() {
            watcher.tx.send(PushFrame::Text(text.to_owned())).await;
        }
    }

    /// Terminate every open watch with a disconnect frame.
    pub async fn disconnect_all(&self, reason: &str) {
        let watchers = {
            let mut state = self.inner.lock();
            std::mem::take(&mut state.watchers)
        };
        for watcher in watchers {
            watcher.stop.cancel();
            watcher
                .tx
                .send(PushFrame::Disconnected {
                    reason: reason.to_owned(),
                })
                .await;
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn displays(&self) -> Vec<SimulatedDisplay> {
        self.inner.lock().displays.clone()
    }

    /// Every command accepted or rejected so far, in arrival order.
    pub fn requests(&self) -> Vec<SetBrightnessRequest> {
        self.inner.lock().requests.clone()
    }

    /// Watches whose subscriber has not released them.
    pub fn active_watches(&self) -> usize {
        self.open_watchers().len()
    }

    fn open_watchers(&self) -> Vec<Watcher> {
        let mut state = self.inner.lock();
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.clone()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current observable state and the snapshot that publishes it.
    fn observe(&self) -> (u64, WireSnapshot) {
        let state = self.lock();
        let devices: Vec<WireDevice> = state.displays.iter().map(SimulatedDisplay::to_wire).collect();
        let snapshot = if self.tag_snapshots {
            WireSnapshot::tagged(state.marker(), devices)
        } else {
            WireSnapshot::untagged(devices)
        };
        (state.handled_sequence, snapshot)
    }
}

impl State {
    fn marker(&self) -> u64 {
        let next = self.handled_sequence + 1;
        self.in_progress.first().map_or(next, |&oldest| oldest.min(next))
    }

    fn handle(&mut self, request: &SetBrightnessRequest) -> Result<(), Error> {
        self.requests.push(request.clone());

        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(Error::Rejected {
                status: 503,
                message: "simulated failure".into(),
            });
        }

        let Some(display) = self.displays.iter_mut().find(|d| d.id == request.id) else {
            return Err(Error::UnknownDevice {
                id: request.id.clone(),
            });
        };
        display.apply(request.value);
        Ok(())
    }
}

#[async_trait]
impl BrightnessBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn begin_watch(&self) -> Result<PushSubscription, Error> {
        let (tx, subscription) = PushSubscription::channel(PUSH_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        self.inner.lock().watchers.push(Watcher {
            tx: tx.clone(),
            stop: stop.clone(),
        });
        tokio::spawn(watch_loop(Arc::clone(&self.inner), tx, stop));
        debug!("memory backend watch started");
        Ok(subscription)
    }

    async fn set_brightness(&self, request: &SetBrightnessRequest) -> Result<(), Error> {
        if !self.inner.latency.is_zero() {
            self.inner.lock().in_progress.insert(request.sequence);
            tokio::time::sleep(self.inner.latency).await;
        }

        let mut state = self.inner.lock();
        state.in_progress.remove(&request.sequence);
        let result = state.handle(request);
        state.handled_sequence = state.handled_sequence.max(request.sequence);
        result
    }
}

/// Poll the display table and publish on change.
async fn watch_loop(inner: Arc<Inner>, tx: PushSender, stop: CancellationToken) {
    let mut interval = tokio::time::interval(inner.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<(u64, Vec<WireDevice>)> = None;

    loop {
        tokio::select! {
            biased;
            () = tx.closed() => break,
            () = stop.cancelled() => break,
            _ = interval.tick() => {}
        }

        let (applied, snapshot) = inner.observe();
        if last
            .as_ref()
            .is_some_and(|(seq, devices)| *seq == applied && *devices == snapshot.devices)
        {
            continue;
        }

        let text = match snapshot.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode simulated snapshot");
                continue;
            }
        };
        if !tx.send(PushFrame::Text(text)).await {
            break;
        }
        last = Some((applied, snapshot.devices));
    }

    debug!("memory watcher exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(vec![
            SimulatedDisplay::new("D1", "Main", 20),
            SimulatedDisplay::new("D2", "Side", -10),
        ])
        .with_poll_interval(Duration::from_millis(50))
    }

    async fn next_snapshot(sub: &mut PushSubscription) -> WireSnapshot {
        match sub.recv().await {
            Some(PushFrame::Text(text)) => WireSnapshot::from_json(&text).unwrap(),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn initial_snapshot_on_watch() {
        let backend = backend();
        let mut sub = backend.begin_watch().await.unwrap();

        let snap = next_snapshot(&mut sub).await;
        assert_eq!(snap.sequence, Some(1));
        assert_eq!(snap.devices.len(), 2);
        assert_eq!(snap.devices[0].brightness, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_only_on_change() {
        let backend = backend();
        let mut sub = backend.begin_watch().await.unwrap();
        next_snapshot(&mut sub).await;

        // Several idle polls produce nothing.
        tokio::time::sleep(Duration::from_millis(500)).await;
        backend.set_external("D1", 75);

        let snap = next_snapshot(&mut sub).await;
        assert_eq!(snap.devices[0].brightness, 75);
        assert_eq!(snap.sequence, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn applied_command_advances_sequence() {
        let backend = backend();
        let mut sub = backend.begin_watch().await.unwrap();
        next_snapshot(&mut sub).await;

        backend
            .set_brightness(&SetBrightnessRequest {
                id: "D2".into(),
                value: 30,
                sequence: 4,
            })
            .await
            .unwrap();

        let snap = next_snapshot(&mut sub).await;
        assert_eq!(snap.sequence, Some(5));
        assert_eq!(snap.devices[1].brightness, 30);
    }

    #[tokio::test]
    async fn unknown_device_is_rejected() {
        let backend = backend();
        let err = backend
            .set_brightness(&SetBrightnessRequest {
                id: "nope".into(),
                value: 1,
                sequence: 1,
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fail_next_rejects_then_recovers() {
        let backend = backend();
        backend.fail_next(1);
        let req = SetBrightnessRequest {
            id: "D1".into(),
            value: 50,
            sequence: 1,
        };

        assert!(backend.set_brightness(&req).await.is_err());
        assert_eq!(backend.displays()[0].brightness, 20);
        backend.set_brightness(&req).await.unwrap();
        assert_eq!(backend.displays()[0].brightness, 50);
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn scaled_panel_quantizes_writes() {
        let backend = MemoryBackend::new(vec![
            SimulatedDisplay::new("D1", "Coarse", 0).with_scale(NativeScale { min: 0, max: 10 }),
        ]);
        backend
            .set_brightness(&SetBrightnessRequest {
                id: "D1".into(),
                value: 33,
                sequence: 1,
            })
            .await
            .unwrap();
        assert_eq!(backend.displays()[0].brightness, 30);

        backend
            .set_brightness(&SetBrightnessRequest {
                id: "D1".into(),
                value: -33,
                sequence: 2,
            })
            .await
            .unwrap();
        assert_eq!(backend.displays()[0].brightness, -33);
    }

    #[tokio::test]
    async fn level_panel_snaps_to_nearest_level() {
        let backend = MemoryBackend::new(vec![
            SimulatedDisplay::new("D1", "Laptop", 0)
                .with_levels(SupportedLevels::new(vec![0, 25, 50, 75, 100])),
        ]);
        for (value, stored) in [(37, 25), (38, 50), (100, 100), (-20, -20)] {
            backend
                .set_brightness(&SetBrightnessRequest {
                    id: "D1".into(),
                    value,
                    sequence: 1,
                })
                .await
                .unwrap();
            assert_eq!(backend.displays()[0].brightness, stored, "write {value}");
        }
    }

    #[test]
    fn tag_waits_for_oldest_command_in_progress() {
        let backend = backend();
        let mut state = backend.inner.lock();

        // Sequence 2 handled while 1 is still sleeping out its latency.
        state.handled_sequence = 2;
        state.in_progress.insert(1);
        assert_eq!(state.marker(), 1);

        state.in_progress.remove(&1);
        assert_eq!(state.marker(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_during_slow_command_keeps_old_tag() {
        let backend = backend().with_latency(Duration::from_millis(100));
        let mut sub = backend.begin_watch().await.unwrap();
        assert_eq!(next_snapshot(&mut sub).await.sequence, Some(1));

        let pending = {
            let backend = backend.clone();
            tokio::spawn(async move {
                backend
                    .set_brightness(&SetBrightnessRequest {
                        id: "D1".into(),
                        value: 80,
                        sequence: 1,
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.set_external("D2", 5);

        let snap = next_snapshot(&mut sub).await;
        assert_eq!(snap.sequence, Some(1));
        assert_eq!(snap.devices[0].brightness, 20);

        pending.await.unwrap().unwrap();
        let snap = next_snapshot(&mut sub).await;
        assert_eq!(snap.sequence, Some(2));
        assert_eq!(snap.devices[0].brightness, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn released_watch_is_pruned() {
        let backend = backend();
        let sub = backend.begin_watch().await.unwrap();
        assert_eq!(backend.active_watches(), 1);

        drop(sub);
        assert_eq!(backend.active_watches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_terminal() {
        let backend = backend();
        let mut sub = backend.begin_watch().await.unwrap();
        next_snapshot(&mut sub).await;

        backend.disconnect_all("backend exited").await;
        backend.set_external("D1", 99);

        assert_eq!(
            sub.recv().await,
            Some(PushFrame::Disconnected {
                reason: "backend exited".into()
            })
        );
        assert_eq!(backend.active_watches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn untagged_backend_sends_bare_arrays() {
        let backend = backend().untagged();
        let mut sub = backend.begin_watch().await.unwrap();
        match sub.recv().await {
            Some(PushFrame::Text(text)) => assert!(text.starts_with('['), "{text}"),
            other => panic!("expected text, got {other:?}"),
        }
    }
}
