//! Application core: event loop, action dispatch, gesture routing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use brightline_core::{BrightnessBackend, CoreError, ReconnectConfig, SessionConfig, SessionHandle};

use crate::action::{Action, LinkStatus, Notification, NotificationLevel};
use crate::component::Component;
use crate::event::{Event, EventReader};
use crate::screens::displays::DisplaysScreen;
use crate::theme;
use crate::tui::Tui;

const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

pub struct App {
    running: bool,
    link: LinkStatus,
    screen: Box<dyn Component>,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    reconnect: Option<ReconnectConfig>,
    /// Handle of the bridge's current session; replaced on every restart.
    session: Option<SessionHandle>,
    data_cancel: CancellationToken,
    notification: Option<(Notification, Instant)>,
}

impl App {
    pub fn new(
        backend: Arc<dyn BrightnessBackend>,
        session_config: SessionConfig,
        reconnect: Option<ReconnectConfig>,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let mut screen: Box<dyn Component> = Box::new(DisplaysScreen::new());
        screen.set_focused(true);

        Self {
            running: true,
            link: LinkStatus::default(),
            screen,
            action_tx,
            action_rx,
            backend,
            session_config,
            reconnect,
            session: None,
            data_cancel: CancellationToken::new(),
            notification: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;
        let (width, height) = tui.size().unwrap_or((80, 24));
        debug!(width, height, "terminal ready");

        let bridge = tokio::spawn(crate::data_bridge::spawn_data_bridge(
            Arc::clone(&self.backend),
            self.session_config.clone(),
            self.reconnect.clone(),
            self.action_tx.clone(),
            self.data_cancel.clone(),
        ));

        let mut events = EventReader::new(Duration::from_millis(250), Duration::from_millis(33));
        info!("TUI event loop started");

        while self.running {
            let Some(event) = events.next().await else {
                break;
            };

            match event {
                Event::Key(key) => {
                    if let Some(action) = self.handle_key_event(key)? {
                        self.action_tx.send(action)?;
                    }
                }
                Event::Mouse(mouse) => {
                    if let Some(action) = self.screen.handle_mouse_event(mouse)? {
                        self.action_tx.send(action)?;
                    }
                }
                Event::Resize(w, h) => self.action_tx.send(Action::Resize(w, h))?,
                Event::Tick => self.action_tx.send(Action::Tick)?,
                Event::Render => self.action_tx.send(Action::Render)?,
            }

            while let Ok(action) = self.action_rx.try_recv() {
                self.process_action(&action)?;
                if let Action::Render = action {
                    tui.draw(|frame| self.render(frame))?;
                }
            }
        }

        self.data_cancel.cancel();
        events.stop();
        tui.exit();
        info!("TUI event loop ended");

        // The bridge's session sends any value still held mid-drag
        if let Err(e) = bridge.await {
            warn!(error = %e, "data bridge ended abnormally");
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(Some(Action::Quit)),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(Some(Action::Quit));
            }
            _ => {}
        }
        self.screen.handle_key_event(key)
    }

    fn process_action(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Quit => self.running = false,
            Action::Tick => {
                if self
                    .notification
                    .as_ref()
                    .is_some_and(|(_, shown)| shown.elapsed() >= NOTIFICATION_TTL)
                {
                    self.notification = None;
                }
            }
            Action::Render | Action::Resize(..) => {}

            Action::SessionStarted(handle) => self.session = Some(handle.clone()),
            Action::Link(status) => {
                if *status == LinkStatus::Connected
                    && matches!(self.link, LinkStatus::Reconnecting { .. })
                {
                    self.notify(Notification::info("Reconnected"));
                }
                self.link = status.clone();
            }
            Action::Notify(notification) => self.notify(notification.clone()),

            Action::Drag { id, position } => {
                let result = self.with_session(|s| s.on_drag(id, *position));
                self.report(result);
            }
            Action::ResetDevice(id) => {
                let result = self.with_session(|s| s.on_reset_gesture(id));
                self.report(result);
            }
            Action::Nudge { id, value } => self.nudge(id.clone(), *value),

            Action::DevicesUpdated(_) | Action::SelectNext | Action::SelectPrev => {}
        }

        if let Some(follow_up) = self.screen.update(action)? {
            self.action_tx.send(follow_up)?;
        }
        Ok(())
    }

    fn with_session(
        &self,
        f: impl FnOnce(&SessionHandle) -> Result<(), CoreError>,
    ) -> Result<(), CoreError> {
        match &self.session {
            Some(session) => f(session),
            None => Err(CoreError::SessionClosed),
        }
    }

    fn report(&mut self, result: Result<(), CoreError>) {
        if let Err(e) = result {
            self.notify(Notification::error(e.to_string()));
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notification = Some((notification, Instant::now()));
    }

    /// Typed set through the session; the reply arrives asynchronously.
    fn nudge(&mut self, id: brightline_core::DeviceId, value: i32) {
        let Some(session) = self.session.clone() else {
            self.notify(Notification::error(CoreError::SessionClosed.to_string()));
            return;
        };
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = session.set_brightness(&id, value).await {
                let _ = tx.send(Action::Notify(Notification::error(e.to_string())));
            }
        });
    }

    // ── Rendering ───────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let [header, body, footer, status] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        frame.render_widget(
            Paragraph::new(Line::styled(" brightline", theme::title_style())),
            header,
        );
        self.screen.render(frame, body);
        self.render_footer(frame, footer);
        self.render_status_bar(frame, status);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let line = match &self.notification {
            Some((notification, _)) => {
                let (color, icon) = match notification.level {
                    NotificationLevel::Error => (theme::ERROR_RED, "✗"),
                    NotificationLevel::Warning => (theme::ELECTRIC_YELLOW, "!"),
                    NotificationLevel::Info => (theme::NEON_CYAN, "·"),
                };
                Line::from(Span::styled(
                    format!(" {icon} {}", notification.message),
                    Style::default().fg(color),
                ))
            }
            None => Line::from(Span::styled(
                " ↑↓ select  ←→ adjust  r reset  drag / double-click on a slider  q quit",
                theme::key_hint(),
            )),
        };
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let (icon, color) = match &self.link {
            LinkStatus::Connected => ("●", theme::SUCCESS_GREEN),
            LinkStatus::Connecting | LinkStatus::Reconnecting { .. } => {
                ("◐", theme::ELECTRIC_YELLOW)
            }
            LinkStatus::Disconnected(_) => ("○", theme::ERROR_RED),
        };
        let line = Line::from(vec![
            Span::raw(" "),
            Span::styled(format!("{icon} {}", self.link), Style::default().fg(color)),
            Span::styled(format!(" │ {}", self.backend.name()), theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}
