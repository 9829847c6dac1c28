//! Device command handlers: list, watch, set, reset.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use brightline_core::{
    Backoff, BrightnessBackend, CommandOutcome, ConnectionState, CoreError, DeviceId, DeviceView,
    Session, SessionConfig, SessionHandle, Views,
};

use crate::cli::{GlobalOpts, OutputFormat, ResetArgs, SetArgs, WatchArgs};
use crate::config::Config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Brightness")]
    brightness: String,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Center")]
    center: i32,
    #[tabled(rename = "State")]
    state: String,
}

impl DeviceRow {
    fn new(view: &DeviceView, color: bool) -> Self {
        Self {
            id: view.id.to_string(),
            name: view.display_name.clone(),
            brightness: view.label.clone(),
            range: view.range.to_string(),
            center: view.center,
            state: output::state_label(view.is_pending(), color),
        }
    }
}

// ── Command result ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Applied {
    id: DeviceId,
    display_name: String,
    value: i32,
    sequence: u64,
    /// Backend acknowledged the request; always false with --no-wait.
    accepted: bool,
}

fn applied_detail(a: &Applied) -> String {
    let status = if a.accepted { "accepted" } else { "sent" };
    format!(
        "{} ({}) -> {}  [command #{}, {status}]",
        a.display_name, a.id, a.value, a.sequence
    )
}

enum Target {
    Value(i32),
    Center,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let wait = Duration::from_secs(global.wait);
    let views = Session::oneshot(backend, session_config, |session| async move {
        session.wait_for_snapshot(wait).await
    })
    .await?;

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        views.as_slice(),
        |v| DeviceRow::new(v, color),
        |v| v.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn set(
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    args: &SetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = DeviceId::from(args.id.as_str());
    let target = Target::Value(args.value);
    run_command(backend, session_config, &id, target, args.no_wait, global).await
}

pub async fn reset(
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    args: &ResetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = DeviceId::from(args.id.as_str());
    run_command(backend, session_config, &id, Target::Center, args.no_wait, global).await
}

async fn run_command(
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    id: &DeviceId,
    target: Target,
    no_wait: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let wait = Duration::from_secs(global.wait);
    let session = Session::start(backend, session_config);
    let result = apply(&session, id, target, no_wait, wait).await;
    session.shutdown().await;
    let applied = result?;

    let out = output::render_single(&global.output, &applied, applied_detail, |a| {
        a.sequence.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn apply(
    session: &SessionHandle,
    id: &DeviceId,
    target: Target,
    no_wait: bool,
    wait: Duration,
) -> Result<Applied, CliError> {
    let views = session.wait_for_snapshot(wait).await?;
    let view = find(&views, id)?;

    if let Target::Value(value) = target {
        if !view.range.contains(value) {
            return Err(CliError::Validation {
                field: "value".into(),
                reason: format!("{value} is outside {} for '{id}'", view.range),
            });
        }
    }

    // Subscribe before sending so the outcome cannot be missed
    let mut outcomes = session.outcomes();
    let (sequence, value) = match target {
        Target::Value(value) => (session.set_brightness(id, value).await?, value),
        Target::Center => (session.reset(id).await?, view.center),
    };
    debug!(device = %id, sequence, value, "brightness command issued");

    // Session shutdown still waits for the request to land
    let accepted = if no_wait {
        false
    } else {
        let outcome = await_outcome(&mut outcomes, sequence, wait).await?;
        if let Some(err) = &outcome.error {
            return Err(command_failed(id, sequence, err));
        }
        outcome.succeeded()
    };

    Ok(Applied {
        id: id.clone(),
        display_name: view.display_name.clone(),
        value,
        sequence,
        accepted,
    })
}

fn find(views: &Views, id: &DeviceId) -> Result<Arc<DeviceView>, CliError> {
    views
        .iter()
        .find(|v| &v.id == id)
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            identifier: id.to_string(),
        })
}

async fn await_outcome(
    outcomes: &mut broadcast::Receiver<CommandOutcome>,
    sequence: u64,
    wait: Duration,
) -> Result<CommandOutcome, CliError> {
    let matching = async {
        loop {
            match outcomes.recv().await {
                Ok(outcome) if outcome.sequence == sequence => return Ok(outcome),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "outcome stream lagged");
                }
                Err(RecvError::Closed) => return Err(CoreError::SessionClosed),
            }
        }
    };
    tokio::time::timeout(wait, matching)
        .await
        .map_err(|_| CliError::Timeout {
            seconds: wait.as_secs(),
        })?
        .map_err(CliError::from)
}

fn command_failed(id: &DeviceId, sequence: u64, err: &CoreError) -> CliError {
    match err {
        CoreError::Command {
            device,
            sequence,
            message,
        } => CliError::CommandFailed {
            device: device.clone(),
            sequence: *sequence,
            message: message.clone(),
        },
        other => CliError::CommandFailed {
            device: id.to_string(),
            sequence,
            message: other.to_string(),
        },
    }
}

// ── Watch ───────────────────────────────────────────────────────────

enum WatchEnd {
    Interrupted,
    Lost(CoreError),
}

/// Print device changes until Ctrl-C, restarting the session with
/// backoff when the push channel is lost.
pub async fn watch(
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    cfg: &Config,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut backoff = if args.no_reconnect {
        None
    } else {
        cfg.reconnect_config().map(Backoff::new)
    };
    let mut printer = ChangePrinter::new(global);

    loop {
        let session = Session::start(Arc::clone(&backend), session_config.clone());
        let ended = follow(&session, &mut printer, backoff.as_mut()).await;
        session.shutdown().await;

        let err = match ended {
            WatchEnd::Interrupted => return Ok(()),
            WatchEnd::Lost(err) => err,
        };
        let Some(delay) = backoff.as_mut().and_then(Backoff::next_delay) else {
            return Err(err.into());
        };
        warn!(
            error = %err,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "push channel lost, restarting session"
        );
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn follow(
    session: &SessionHandle,
    printer: &mut ChangePrinter,
    mut backoff: Option<&mut Backoff>,
) -> WatchEnd {
    let mut devices = session.devices();
    let mut connection = session.connection_state();
    let mut reports = session.reports();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        if let Some(err) = lost(&connection.borrow_and_update()) {
            return WatchEnd::Lost(err);
        }

        tokio::select! {
            _ = &mut interrupt => return WatchEnd::Interrupted,
            views = devices.changed() => {
                let Some(views) = views else {
                    return WatchEnd::Lost(CoreError::SessionClosed);
                };
                if let Some(b) = backoff.as_deref_mut() {
                    b.reset();
                }
                printer.print(&views);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    return WatchEnd::Lost(CoreError::SessionClosed);
                }
            }
            report = reports.recv() => match report {
                Ok(err) => warn!(error = %err, "session report"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "report stream lagged"),
                Err(RecvError::Closed) => return WatchEnd::Lost(CoreError::SessionClosed),
            },
        }
    }
}

fn lost(state: &ConnectionState) -> Option<CoreError> {
    match state {
        ConnectionState::Failed { reason } => Some(CoreError::ConnectionFailed {
            reason: reason.clone(),
        }),
        ConnectionState::Disconnected => Some(CoreError::Disconnected {
            reason: "push channel ended".into(),
        }),
        ConnectionState::Connecting | ConnectionState::Connected => None,
    }
}

/// Prints only devices whose view differs from the last one printed.
struct ChangePrinter {
    format: OutputFormat,
    color: bool,
    quiet: bool,
    last: HashMap<DeviceId, Arc<DeviceView>>,
}

impl ChangePrinter {
    fn new(global: &GlobalOpts) -> Self {
        Self {
            format: global.output.clone(),
            color: output::should_color(&global.color),
            quiet: global.quiet,
            last: HashMap::new(),
        }
    }

    fn print(&mut self, views: &Views) {
        let changed: Vec<&Arc<DeviceView>> = views
            .iter()
            .filter(|v| self.last.get(&v.id).is_none_or(|prev| prev != *v))
            .collect();
        let removed: Vec<DeviceId> = self
            .last
            .keys()
            .filter(|id| !views.iter().any(|v| &v.id == *id))
            .cloned()
            .collect();

        for view in &changed {
            self.emit_view(view);
        }
        for id in &removed {
            output::print_output(&format!("{id}  removed"), self.quiet);
        }

        self.last = views.iter().map(|v| (v.id.clone(), Arc::clone(v))).collect();
    }

    fn emit_view(&self, view: &DeviceView) {
        let line = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact => {
                serde_json::to_string(view).unwrap_or_default()
            }
            OutputFormat::Yaml => serde_yaml::to_string(view)
                .map(|y| format!("---\n{}", y.trim_end()))
                .unwrap_or_default(),
            OutputFormat::Plain => format!("{}\t{}", view.id, view.brightness),
            OutputFormat::Table => format!(
                "{}  {}  {}  {}",
                view.id,
                view.display_name,
                view.label,
                output::state_label(view.is_pending(), self.color)
            ),
        };
        output::print_output(&line, self.quiet);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use brightline_core::{MemoryBackend, SimulatedDisplay};

    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(vec![SimulatedDisplay::new("D1", "Main", 0)])
            .with_latency(Duration::from_millis(120))
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_is_delivered_by_shutdown() {
        let backend = backend();
        let session = Session::start(Arc::new(backend.clone()), SessionConfig::default());

        let applied = apply(
            &session,
            &DeviceId::from("D1"),
            Target::Value(30),
            true,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(!applied.accepted);

        session.shutdown().await;
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].value, 30);
        assert_eq!(backend.displays()[0].brightness, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn waited_reset_reports_acceptance() {
        let backend = backend();
        backend.set_external("D1", 70);
        let session = Session::start(Arc::new(backend.clone()), SessionConfig::default());

        let applied = apply(
            &session,
            &DeviceId::from("D1"),
            Target::Center,
            false,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        session.shutdown().await;

        assert!(applied.accepted);
        assert_eq!(applied.value, 0);
        assert_eq!(backend.displays()[0].brightness, 0);
    }
}
