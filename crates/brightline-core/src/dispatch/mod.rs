// ── Command dispatch ──
//
// Every local brightness change flows through here: the optimistic write
// happens first (so the UI moves immediately), then the outbound request
// is sent, held by the coalescer, or flushed later. Requests run on their
// own tasks and report back on the completion channel; a failure is
// surfaced but never rolls the optimistic value back.

mod coalesce;

use std::sync::Arc;

use brightline_api::{BrightnessBackend, SetBrightnessRequest};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

pub use coalesce::{Coalescer, DueCommand, Offer};

use crate::config::CoalescePolicy;
use crate::error::CoreError;
use crate::model::DeviceId;
use crate::sync::SyncController;

/// Result of one outbound request.
#[derive(Debug)]
pub struct Completion {
    pub id: DeviceId,
    pub sequence: u64,
    pub value: i32,
    pub result: Result<(), CoreError>,
}

impl Completion {
    /// The report to publish for a failed request.
    pub fn failure(&self) -> Option<CoreError> {
        self.result.as_ref().err().map(|e| CoreError::Command {
            device: self.id.to_string(),
            sequence: self.sequence,
            message: e.to_string(),
        })
    }
}

pub struct CommandDispatcher {
    backend: Arc<dyn BrightnessBackend>,
    coalescer: Coalescer,
    completion_tx: mpsc::UnboundedSender<Completion>,
    in_flight: usize,
}

impl CommandDispatcher {
    pub fn new(
        backend: Arc<dyn BrightnessBackend>,
        policy: CoalescePolicy,
        completion_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            backend,
            coalescer: Coalescer::new(policy),
            completion_tx,
            in_flight: 0,
        }
    }

    /// Apply `value` optimistically and dispatch it. Returns the sequence
    /// assigned to the write.
    pub fn send_brightness(
        &mut self,
        sync: &mut SyncController,
        id: &DeviceId,
        value: i32,
        now: Instant,
    ) -> Result<u64, CoreError> {
        let sequence = sync.write_optimistic(id, value)?;
        match self.coalescer.offer(id, value, sequence, now) {
            Offer::SendNow => self.spawn_request(id.clone(), value, sequence),
            Offer::Held { replaced } => {
                trace!(device = %id, value, sequence, "command held");
                if let Some(replaced) = replaced {
                    sync.complete(replaced);
                }
            }
        }
        Ok(sequence)
    }

    /// Dispatch the device's configured center value.
    pub fn reset_to_center(
        &mut self,
        sync: &mut SyncController,
        id: &DeviceId,
        now: Instant,
    ) -> Result<u64, CoreError> {
        if !sync.store().contains(id) {
            return Err(CoreError::not_found(id.as_str()));
        }
        let center = sync.mapper_for(id).center();
        debug!(device = %id, center, "reset to center");
        self.send_brightness(sync, id, center, now)
    }

    /// Send every held command whose window has closed.
    pub fn flush_due(&mut self, now: Instant) -> usize {
        let due = self.coalescer.flush_due(now);
        let count = due.len();
        for command in due {
            self.spawn_request(command.id, command.value, command.sequence);
        }
        count
    }

    /// Send every held command now, window or not.
    pub fn flush_all(&mut self) -> usize {
        let held = self.coalescer.flush_all();
        let count = held.len();
        for command in held {
            self.spawn_request(command.id, command.value, command.sequence);
        }
        count
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.coalescer.next_deadline()
    }

    /// Drop held commands for a device that disappeared.
    pub fn forget(&mut self, sync: &mut SyncController, id: &DeviceId) {
        if let Some(sequence) = self.coalescer.forget(id) {
            trace!(device = %id, sequence, "held command dropped");
            sync.complete(sequence);
        }
    }

    /// Account for a completion received by the session loop.
    pub fn finished(&mut self, completion: &Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match &completion.result {
            Ok(()) => debug!(
                device = %completion.id,
                sequence = completion.sequence,
                value = completion.value,
                "brightness command applied"
            ),
            Err(e) => warn!(
                device = %completion.id,
                sequence = completion.sequence,
                error = %e,
                "brightness command failed"
            ),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn spawn_request(&mut self, id: DeviceId, value: i32, sequence: u64) {
        self.in_flight += 1;
        let backend = Arc::clone(&self.backend);
        let completion_tx = self.completion_tx.clone();
        trace!(device = %id, value, sequence, "command sent");

        tokio::spawn(async move {
            let request = SetBrightnessRequest {
                id: id.as_str().to_owned(),
                value,
                sequence,
            };
            let result = backend
                .set_brightness(&request)
                .await
                .map_err(CoreError::from);
            // Receiver gone means the session ended; nothing left to update.
            let _ = completion_tx.send(Completion {
                id,
                sequence,
                value,
                result,
            });
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use brightline_api::{MemoryBackend, SimulatedDisplay};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::RangeTable;
    use crate::model::{DeviceRecord, Snapshot};

    fn setup(policy: CoalescePolicy) -> (
        MemoryBackend,
        SyncController,
        CommandDispatcher,
        mpsc::UnboundedReceiver<Completion>,
    ) {
        let backend = MemoryBackend::new(vec![SimulatedDisplay::new("D1", "Main", 0)]);
        let mut sync = SyncController::new(RangeTable::default());
        sync.apply_snapshot(Snapshot {
            sequence: Some(1),
            devices: vec![DeviceRecord::external("D1", "Main", 0)],
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = CommandDispatcher::new(Arc::new(backend.clone()), policy, tx);
        (backend, sync, dispatcher, rx)
    }

    #[tokio::test]
    async fn optimistic_write_precedes_request() {
        let (backend, mut sync, mut dispatcher, mut rx) = setup(CoalescePolicy::DISABLED);

        let seq = dispatcher
            .send_brightness(&mut sync, &"D1".into(), 55, Instant::now())
            .unwrap();
        assert_eq!(seq, 1);
        assert_eq!(sync.store().get(&"D1".into()).unwrap().brightness, 55);

        let completion = rx.recv().await.unwrap();
        assert!(completion.result.is_ok());
        assert_eq!(backend.requests()[0].value, 55);
        assert_eq!(backend.requests()[0].sequence, 1);
    }

    #[tokio::test]
    async fn failed_request_keeps_optimistic_value() {
        let (backend, mut sync, mut dispatcher, mut rx) = setup(CoalescePolicy::DISABLED);
        backend.fail_next(1);

        dispatcher
            .send_brightness(&mut sync, &"D1".into(), 70, Instant::now())
            .unwrap();
        let completion = rx.recv().await.unwrap();

        let report = completion.failure().unwrap();
        assert!(matches!(report, CoreError::Command { sequence: 1, .. }));
        assert_eq!(sync.store().get(&"D1".into()).unwrap().brightness, 70);
    }

    #[tokio::test]
    async fn unknown_device_sends_nothing() {
        let (backend, mut sync, mut dispatcher, _rx) = setup(CoalescePolicy::DISABLED);
        let err = dispatcher
            .send_brightness(&mut sync, &"D9".into(), 1, Instant::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn superseded_hold_does_not_block_watermark() {
        let (_backend, mut sync, mut dispatcher, mut rx) = setup(CoalescePolicy::default());
        let id = DeviceId::from("D1");
        let t0 = Instant::now();

        for value in [10, 20, 30] {
            dispatcher.send_brightness(&mut sync, &id, value, t0).unwrap();
        }
        let first = rx.recv().await.unwrap();
        sync.complete(first.sequence);
        // 1 sent and done, 2 superseded by the held 3.
        assert_eq!(sync.settled(), 2);

        assert_eq!(dispatcher.flush_all(), 1);
        let last = rx.recv().await.unwrap();
        assert_eq!((last.sequence, last.value), (3, 30));
        sync.complete(last.sequence);
        assert_eq!(sync.settled(), 3);
    }

    #[tokio::test]
    async fn forgotten_hold_counts_as_settled() {
        let (_backend, mut sync, mut dispatcher, mut rx) = setup(CoalescePolicy::default());
        let id = DeviceId::from("D1");
        let t0 = Instant::now();

        dispatcher.send_brightness(&mut sync, &id, 10, t0).unwrap();
        dispatcher.send_brightness(&mut sync, &id, 20, t0).unwrap();
        sync.complete(rx.recv().await.unwrap().sequence);
        assert_eq!(sync.settled(), 1);

        dispatcher.forget(&mut sync, &id);
        assert_eq!(sync.settled(), 2);
        assert_eq!(dispatcher.flush_all(), 0);
    }

    #[tokio::test]
    async fn reset_sends_center() {
        let (_backend, mut sync, mut dispatcher, mut rx) = setup(CoalescePolicy::DISABLED);
        dispatcher
            .send_brightness(&mut sync, &"D1".into(), 80, Instant::now())
            .unwrap();
        dispatcher
            .reset_to_center(&mut sync, &"D1".into(), Instant::now())
            .unwrap();

        assert_eq!(sync.store().get(&"D1".into()).unwrap().brightness, 0);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
    }
}
