//! Data bridge: runs sessions against the backend and forwards their
//! streams to the TUI as [`Action`]s.
//!
//! A lost push channel restarts the session after a backoff delay. When
//! retries are disabled or exhausted the last session stays up, so slider
//! edits keep reaching the backend even without fresh snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use brightline_core::{
    Backoff, BrightnessBackend, ConnectionState, CoreError, ReconnectConfig, Session,
    SessionConfig,
};

use crate::action::{Action, LinkStatus, Notification};

pub async fn spawn_data_bridge(
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    reconnect: Option<ReconnectConfig>,
    action_tx: mpsc::UnboundedSender<Action>,
    cancel: CancellationToken,
) {
    let mut backoff = reconnect.map(Backoff::new);

    loop {
        let _ = action_tx.send(Action::Link(LinkStatus::Connecting));
        let session = Session::start(Arc::clone(&backend), session_config.clone());
        let _ = action_tx.send(Action::SessionStarted(session.handle()));

        let restart = forward(&session, &action_tx, &cancel, backoff.as_mut()).await;
        session.shutdown().await;

        let Some(delay) = restart else {
            break;
        };
        let attempt = backoff.as_ref().map_or(0, Backoff::attempt);
        info!(attempt, delay_ms = delay.as_millis(), "restarting session");
        let _ = action_tx.send(Action::Link(LinkStatus::Reconnecting { attempt, delay }));

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!("data bridge exiting");
}

/// Forward one session's streams until cancelled, returning the restart
/// delay if the push channel is lost and a retry is allowed.
async fn forward(
    session: &Session,
    action_tx: &mpsc::UnboundedSender<Action>,
    cancel: &CancellationToken,
    mut backoff: Option<&mut Backoff>,
) -> Option<Duration> {
    let mut devices = session.devices();
    let mut connection = session.connection_state();
    let mut reports = session.reports();

    let _ = action_tx.send(Action::DevicesUpdated(devices.latest()));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => return None,

            Some(views) = devices.changed() => {
                if session.snapshots_applied() > 0 {
                    if let Some(b) = backoff.as_deref_mut() {
                        b.reset();
                    }
                }
                let _ = action_tx.send(Action::DevicesUpdated(views));
            }

            Ok(()) = connection.changed() => {
                let state = connection.borrow_and_update().clone();
                let reason = match state {
                    ConnectionState::Connected => {
                        let _ = action_tx.send(Action::Link(LinkStatus::Connected));
                        continue;
                    }
                    ConnectionState::Connecting => continue,
                    ConnectionState::Disconnected => "push channel ended".to_owned(),
                    ConnectionState::Failed { reason } => reason,
                };
                warn!(%reason, "session lost its push channel");
                if let Some(delay) = backoff.as_deref_mut().and_then(Backoff::next_delay) {
                    return Some(delay);
                }
                let _ = action_tx.send(Action::Link(LinkStatus::Disconnected(reason)));
            }

            report = reports.recv() => match report {
                Ok(err) => {
                    let _ = action_tx.send(Action::Notify(notification_for(&err)));
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "report stream lagged"),
                Err(RecvError::Closed) => {
                    cancel.cancelled().await;
                    return None;
                }
            },
        }
    }
}

fn notification_for(err: &CoreError) -> Notification {
    match err {
        CoreError::Decode { .. } => Notification::warning(err.to_string()),
        _ => Notification::error(err.to_string()),
    }
}
