// ── Session ──
//
// One session owns one push subscription, one store and one dispatcher,
// all driven from a single task. Inputs (snapshots, gestures, command
// completions, coalescer deadlines) are processed strictly one at a time,
// so reconciliation never races with a local write.

use std::sync::Arc;
use std::time::Duration;

use brightline_api::BrightnessBackend;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::dispatch::{CommandDispatcher, Completion};
use crate::error::CoreError;
use crate::ingest::{EventIngestChannel, IngestEvent};
use crate::model::DeviceId;
use crate::stream::{DeviceStream, Views};
use crate::sync::SyncController;

const REPORT_CHANNEL_SIZE: usize = 64;
const OUTCOME_CHANNEL_SIZE: usize = 256;
/// How long teardown waits for requests already on the wire.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Push-channel lifecycle as seen by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// The push channel ended. Gestures are still accepted; the caller
    /// decides whether to start a new session.
    Disconnected,
    /// The initial watch could not be opened.
    Failed { reason: String },
}

/// Final result of one outbound brightness request.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub device: DeviceId,
    pub sequence: u64,
    pub value: i32,
    pub error: Option<Arc<CoreError>>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

// ── Gestures ─────────────────────────────────────────────────────────

#[derive(Debug)]
enum Gesture {
    /// Raw slider position in percent of the track.
    Drag { id: DeviceId, position: f64 },
    /// Double-click: return to the configured center.
    Reset { id: DeviceId },
    /// A typed value, already in device units.
    Set { id: DeviceId, value: i32 },
}

/// A gesture plus an optional reply channel. Fire-and-forget gestures
/// report failures on the report channel instead.
struct GestureEnvelope {
    gesture: Gesture,
    reply: Option<oneshot::Sender<Result<u64, CoreError>>>,
}

// ── Session ──────────────────────────────────────────────────────────

/// Owner of a running session. Dropping it stops the event loop;
/// [`shutdown`](Self::shutdown) also waits for it.
pub struct Session {
    handle: SessionHandle,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Cheaply cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    gesture_tx: mpsc::UnboundedSender<GestureEnvelope>,
    views: watch::Receiver<Views>,
    connection: watch::Receiver<ConnectionState>,
    snapshots: watch::Receiver<u64>,
    reports: broadcast::Receiver<Arc<CoreError>>,
    outcomes: broadcast::Receiver<CommandOutcome>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connection", &*self.inner.connection.borrow())
            .field("snapshots_applied", &self.snapshots_applied())
            .finish_non_exhaustive()
    }
}

/// Publishing side, owned by the event loop. Dropping it closes every
/// stream handed out by handles.
struct Publishers {
    views: watch::Sender<Views>,
    connection: watch::Sender<ConnectionState>,
    snapshots: watch::Sender<u64>,
    reports: broadcast::Sender<Arc<CoreError>>,
    outcomes: broadcast::Sender<CommandOutcome>,
}

impl Session {
    /// Spawn the event loop. Must be called within a tokio runtime.
    ///
    /// The watch is opened from inside the loop; progress is visible via
    /// [`SessionHandle::connection_state`].
    pub fn start(backend: Arc<dyn BrightnessBackend>, config: SessionConfig) -> Self {
        let (views_tx, views_rx) = watch::channel(Views::default());
        let (connection_tx, connection_rx) = watch::channel(ConnectionState::Connecting);
        let (snapshots_tx, snapshots_rx) = watch::channel(0_u64);
        let (reports_tx, reports_rx) = broadcast::channel(REPORT_CHANNEL_SIZE);
        let (outcomes_tx, outcomes_rx) = broadcast::channel(OUTCOME_CHANNEL_SIZE);
        let (gesture_tx, gesture_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let publishers = Publishers {
            views: views_tx,
            connection: connection_tx,
            snapshots: snapshots_tx,
            reports: reports_tx,
            outcomes: outcomes_tx,
        };
        let task = tokio::spawn(event_loop(
            backend,
            config,
            publishers,
            gesture_rx,
            cancel.clone(),
        ));

        Self {
            handle: SessionHandle {
                inner: Arc::new(HandleInner {
                    gesture_tx,
                    views: views_rx,
                    connection: connection_rx,
                    snapshots: snapshots_rx,
                    reports: reports_rx,
                    outcomes: outcomes_rx,
                }),
            },
            cancel,
            task: Some(task),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop the event loop and wait for it to release the subscription.
    ///
    /// Coalesced values still held are sent first, and requests in flight
    /// get up to five seconds to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
    }

    /// One-shot: start, run closure, shut down.
    ///
    /// The closure decides whether to wait for the first snapshot.
    pub async fn oneshot<F, Fut, T>(
        backend: Arc<dyn BrightnessBackend>,
        config: SessionConfig,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let session = Self::start(backend, config);
        let result = f(session.handle()).await;
        session.shutdown().await;
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::ops::Deref for Session {
    type Target = SessionHandle;

    fn deref(&self) -> &SessionHandle {
        &self.handle
    }
}

impl SessionHandle {
    // ── Gestures ─────────────────────────────────────────────────

    /// Slider drag to `position` percent of the track. Failures are
    /// published on [`reports`](Self::reports).
    pub fn on_drag(&self, id: &DeviceId, position: f64) -> Result<(), CoreError> {
        self.submit(
            Gesture::Drag {
                id: id.clone(),
                position,
            },
            None,
        )
    }

    /// Double-click reset to the device's center. Failures are published
    /// on [`reports`](Self::reports).
    pub fn on_reset_gesture(&self, id: &DeviceId) -> Result<(), CoreError> {
        self.submit(Gesture::Reset { id: id.clone() }, None)
    }

    /// Set a value in device units and wait until it has been applied
    /// optimistically. Returns the write's sequence.
    pub async fn set_brightness(&self, id: &DeviceId, value: i32) -> Result<u64, CoreError> {
        self.request(Gesture::Set {
            id: id.clone(),
            value,
        })
        .await
    }

    /// Reset to center and wait for the optimistic write.
    pub async fn reset(&self, id: &DeviceId) -> Result<u64, CoreError> {
        self.request(Gesture::Reset { id: id.clone() }).await
    }

    fn submit(
        &self,
        gesture: Gesture,
        reply: Option<oneshot::Sender<Result<u64, CoreError>>>,
    ) -> Result<(), CoreError> {
        self.inner
            .gesture_tx
            .send(GestureEnvelope { gesture, reply })
            .map_err(|_| CoreError::SessionClosed)
    }

    async fn request(&self, gesture: Gesture) -> Result<u64, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.submit(gesture, Some(tx))?;
        rx.await.map_err(|_| CoreError::SessionClosed)?
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn devices(&self) -> DeviceStream {
        DeviceStream::new(self.inner.views.clone())
    }

    pub fn devices_snapshot(&self) -> Views {
        self.inner.views.borrow().clone()
    }

    /// Non-fatal errors: rejected frames, failed commands, gesture errors.
    pub fn reports(&self) -> broadcast::Receiver<Arc<CoreError>> {
        self.inner.reports.resubscribe()
    }

    pub fn outcomes(&self) -> broadcast::Receiver<CommandOutcome> {
        self.inner.outcomes.resubscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.clone()
    }

    /// Number of snapshots applied so far.
    pub fn snapshots_applied(&self) -> u64 {
        *self.inner.snapshots.borrow()
    }

    /// Wait until at least one snapshot has been applied.
    pub async fn wait_for_snapshot(&self, timeout: Duration) -> Result<Views, CoreError> {
        let ready = wait_ready(self.inner.snapshots.clone(), self.inner.connection.clone());
        match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(())) => Ok(self.devices_snapshot()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

async fn wait_ready(
    mut snapshots: watch::Receiver<u64>,
    mut connection: watch::Receiver<ConnectionState>,
) -> Result<(), CoreError> {
    loop {
        if *snapshots.borrow_and_update() > 0 {
            return Ok(());
        }
        match &*connection.borrow_and_update() {
            ConnectionState::Failed { reason } => {
                return Err(CoreError::ConnectionFailed {
                    reason: reason.clone(),
                });
            }
            ConnectionState::Disconnected => {
                return Err(CoreError::Disconnected {
                    reason: "push channel ended before the first snapshot".into(),
                });
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }
        tokio::select! {
            changed = snapshots.changed() => changed.map_err(|_| CoreError::SessionClosed)?,
            changed = connection.changed() => changed.map_err(|_| CoreError::SessionClosed)?,
        }
    }
}

// ── Event loop ───────────────────────────────────────────────────────

struct SessionState {
    sync: SyncController,
    dispatcher: CommandDispatcher,
    publish: Publishers,
    snapshots: u64,
}

async fn event_loop(
    backend: Arc<dyn BrightnessBackend>,
    config: SessionConfig,
    publish: Publishers,
    mut gesture_rx: mpsc::UnboundedReceiver<GestureEnvelope>,
    cancel: CancellationToken,
) {
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
    let mut state = SessionState {
        sync: SyncController::new(config.ranges),
        dispatcher: CommandDispatcher::new(Arc::clone(&backend), config.coalesce, completion_tx),
        publish,
        snapshots: 0,
    };

    let mut ingest = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        opened = EventIngestChannel::open(backend.as_ref()) => match opened {
            Ok(channel) => {
                state.publish.connection.send_replace(ConnectionState::Connected);
                channel
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "failed to open push subscription");
                state.publish.connection.send_replace(ConnectionState::Failed {
                    reason: e.to_string(),
                });
                state.report(e);
                EventIngestChannel::closed()
            }
        },
    };

    loop {
        let deadline = state.dispatcher.next_deadline();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = ingest.next(), if ingest.is_open() => {
                if let Some(event) = event {
                    state.on_ingest(event);
                }
            }
            Some(envelope) = gesture_rx.recv() => state.on_gesture(envelope),
            Some(completion) = completion_rx.recv() => state.on_completion(completion),
            () = sleep_until_deadline(deadline), if deadline.is_some() => {
                let sent = state.dispatcher.flush_due(Instant::now());
                debug!(sent, "coalesced commands flushed");
            }
        }
    }

    // Gestures queued before the cancel still count, and held values are
    // the latest intent for their device.
    while let Ok(envelope) = gesture_rx.try_recv() {
        state.on_gesture(envelope);
    }
    let flushed = state.dispatcher.flush_all();
    if ingest.close() {
        info!(backend = backend.name(), "session closed, subscription released");
    }
    state.drain(flushed, &mut completion_rx).await;
    state
        .publish
        .connection
        .send_replace(ConnectionState::Disconnected);
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

impl SessionState {
    fn on_ingest(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Snapshot(snapshot) => {
                let outcome = self.sync.apply_snapshot(snapshot);
                for id in &outcome.removed {
                    self.dispatcher.forget(&mut self.sync, id);
                    debug!(device = %id, "device removed");
                }
                self.snapshots += 1;
                self.publish.snapshots.send_replace(self.snapshots);
                self.publish_views();
            }
            IngestEvent::Rejected(e) => self.report(e),
            IngestEvent::Disconnected(e) => {
                warn!(error = %e, "push channel disconnected");
                self.publish
                    .connection
                    .send_replace(ConnectionState::Disconnected);
                self.report(e);
            }
        }
    }

    fn on_gesture(&mut self, envelope: GestureEnvelope) {
        let now = Instant::now();
        let result = match envelope.gesture {
            Gesture::Drag { id, position } => {
                if self.sync.store().contains(&id) {
                    let value = self.sync.mapper_for(&id).from_position(position);
                    self.dispatcher
                        .send_brightness(&mut self.sync, &id, value, now)
                } else {
                    Err(CoreError::NotFound {
                        identifier: id.to_string(),
                    })
                }
            }
            Gesture::Reset { id } => self.dispatcher.reset_to_center(&mut self.sync, &id, now),
            Gesture::Set { id, value } => {
                self.dispatcher
                    .send_brightness(&mut self.sync, &id, value, now)
            }
        };

        if result.is_ok() {
            self.publish_views();
        }
        match envelope.reply {
            Some(reply) => {
                // Caller gave up waiting; the write stands regardless.
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    self.report(e);
                }
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        self.sync.complete(completion.sequence);
        self.dispatcher.finished(&completion);
        let failure = completion.failure().map(Arc::new);
        if let Some(e) = &failure {
            let _ = self.publish.reports.send(Arc::clone(e));
        }
        let _ = self.publish.outcomes.send(CommandOutcome {
            device: completion.id,
            sequence: completion.sequence,
            value: completion.value,
            error: failure,
        });
    }

    /// Wait out requests still in flight after the loop stopped.
    async fn drain(&mut self, flushed: usize, completion_rx: &mut mpsc::UnboundedReceiver<Completion>) {
        if flushed > 0 {
            debug!(flushed, "held commands sent on teardown");
        }
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.dispatcher.in_flight() > 0 {
            match tokio::time::timeout_at(deadline, completion_rx.recv()).await {
                // Results after teardown are logged only.
                Ok(Some(completion)) => self.dispatcher.finished(&completion),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        in_flight = self.dispatcher.in_flight(),
                        "gave up waiting for brightness commands"
                    );
                    break;
                }
            }
        }
    }

    fn report(&self, error: CoreError) {
        debug!(kind = error.kind(), error = %error, "reporting session error");
        // No subscribers is fine: reports are advisory.
        let _ = self.publish.reports.send(Arc::new(error));
    }

    fn publish_views(&self) {
        let views: Vec<_> = self.sync.views().into_iter().map(Arc::new).collect();
        self.publish.views.send_replace(Arc::new(views));
    }
}
