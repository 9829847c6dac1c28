// ── Backend boundary ──
//
// The hardware-owning process is reached through one trait regardless of
// transport. A watch yields a `PushSubscription`: a receiver of raw push
// frames plus the token that stops whatever task is feeding it.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::wire::SetBrightnessRequest;

/// Default capacity of a subscription's frame buffer.
pub const PUSH_CHANNEL_CAPACITY: usize = 64;

/// One item delivered on a push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// A text message expected to hold one snapshot.
    Text(String),
    /// The transport went away. Terminal: no frame follows.
    Disconnected { reason: String },
}

/// Backend collaborator: owns hardware access and pushes snapshots.
#[async_trait]
pub trait BrightnessBackend: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Ask the backend to start pushing snapshots for this session.
    ///
    /// Called once per session. There is no matching end call: dropping or
    /// closing the returned subscription ends it locally.
    async fn begin_watch(&self) -> Result<PushSubscription, Error>;

    /// Request a brightness change. Failure is opaque to the caller.
    async fn set_brightness(&self, request: &SetBrightnessRequest) -> Result<(), Error>;
}

/// Receiving end of a push subscription.
///
/// Released exactly once: either through [`close`](Self::close) or on drop,
/// whichever comes first. After release `recv` yields `None` even if frames
/// are still buffered.
#[derive(Debug)]
pub struct PushSubscription {
    rx: mpsc::Receiver<PushFrame>,
    cancel: CancellationToken,
}

/// Producer half handed to the task feeding a subscription.
#[derive(Debug, Clone)]
pub struct PushSender {
    tx: mpsc::Sender<PushFrame>,
    cancel: CancellationToken,
}

impl PushSubscription {
    /// Create a linked sender/subscription pair.
    pub fn channel(capacity: usize) -> (PushSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        (
            PushSender {
                tx,
                cancel: cancel.clone(),
            },
            Self { rx, cancel },
        )
    }

    /// Wait for the next frame. `None` once released or once every sender
    /// is gone.
    pub async fn recv(&mut self) -> Option<PushFrame> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            frame = self.rx.recv() => frame,
        }
    }

    /// Release the subscription. Idempotent; returns `true` on the call
    /// that actually released it.
    pub fn close(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        self.rx.close();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl PushSender {
    /// Deliver a frame. Returns `false` once the subscription is released.
    pub async fn send(&self, frame: PushFrame) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(frame).await.is_ok()
    }

    /// Resolves when the subscriber releases the subscription.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (tx, mut sub) = PushSubscription::channel(4);
        assert!(tx.send(PushFrame::Text("a".into())).await);
        assert!(tx.send(PushFrame::Text("b".into())).await);

        assert_eq!(sub.recv().await, Some(PushFrame::Text("a".into())));
        assert_eq!(sub.recv().await, Some(PushFrame::Text("b".into())));
    }

    #[tokio::test]
    async fn close_drops_buffered_frames() {
        let (tx, mut sub) = PushSubscription::channel(4);
        assert!(tx.send(PushFrame::Text("late".into())).await);

        assert!(sub.close());
        assert!(sub.recv().await.is_none());
        assert!(!tx.send(PushFrame::Text("after".into())).await);
    }

    #[tokio::test]
    async fn close_releases_once() {
        let (tx, mut sub) = PushSubscription::channel(1);
        assert!(sub.close());
        assert!(!sub.close());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn drop_signals_producer() {
        let (tx, sub) = PushSubscription::channel(1);
        drop(sub);
        tokio::time::timeout(std::time::Duration::from_secs(1), tx.closed())
            .await
            .unwrap();
    }
}
