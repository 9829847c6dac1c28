// ── Reactive device views ──
//
// Subscription type for consuming reconciled device views from a session.

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::DeviceView;

/// The full view list as published after each state change.
pub type Views = Arc<Vec<Arc<DeviceView>>>;

/// A subscription to the session's device views.
///
/// Provides both point-in-time access and change notification via
/// `changed()`.
pub struct DeviceStream {
    current: Views,
    receiver: watch::Receiver<Views>,
}

impl DeviceStream {
    pub(crate) fn new(mut receiver: watch::Receiver<Views>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Views captured at creation time or at the last `changed()`.
    pub fn current(&self) -> &Views {
        &self.current
    }

    /// Latest published views.
    pub fn latest(&self) -> Views {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publication. `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<Views> {
        self.receiver.changed().await.ok()?;
        let views = self.receiver.borrow_and_update().clone();
        self.current = views.clone();
        Some(views)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceRecord, Snapshot};
    use crate::sync::SyncController;

    fn published(brightness: i32) -> Views {
        let mut sync = SyncController::default();
        sync.apply_snapshot(Snapshot {
            sequence: None,
            devices: vec![DeviceRecord::external("D1", "Main", brightness)],
        });
        Arc::new(sync.views().into_iter().map(Arc::new).collect())
    }

    #[tokio::test]
    async fn changed_tracks_publications() {
        let (tx, rx) = watch::channel(published(10));
        let mut stream = DeviceStream::new(rx);
        assert_eq!(stream.current()[0].brightness, 10);

        tx.send_replace(published(20));
        let views = stream.changed().await.unwrap();
        assert_eq!(views[0].brightness, 20);
        assert_eq!(stream.current()[0].brightness, 20);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }
}
