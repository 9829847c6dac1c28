//! Displays screen: one center-anchored slider per device.
//!
//! Mouse: press or drag on a track to set the value, double-click to reset.
//! Keys: ↑/↓ select, ←/→ step (Shift for single units), Home/End for the
//! range ends, `r` to reset.

use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
};

use brightline_core::{DeviceId, DeviceView, Views};

use crate::action::Action;
use crate::component::Component;
use crate::theme;
use crate::widgets::slider::{SliderBar, position_at};

const ROW_HEIGHT: u16 = 3;
const DOUBLE_CLICK: Duration = Duration::from_millis(400);

/// Screen rows belonging to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    header: Rect,
    track: Rect,
}

/// Stack device slots top to bottom inside `inner`; devices that do not
/// fit are left out.
fn slots(inner: Rect, count: usize) -> Vec<Slot> {
    let track_x = inner.x.saturating_add(1);
    let track_width = inner.width.saturating_sub(2);
    (0..count)
        .map_while(|i| {
            let offset = u16::try_from(i).ok()?.checked_mul(ROW_HEIGHT)?;
            let header_y = inner.y.checked_add(offset)?;
            let track_y = header_y.checked_add(1)?;
            (track_y < inner.bottom()).then_some(Slot {
                header: Rect::new(track_x, header_y, track_width, 1),
                track: Rect::new(track_x, track_y, track_width, 1),
            })
        })
        .collect()
}

pub struct DisplaysScreen {
    views: Views,
    selected: usize,
    focused: bool,
    /// Inner area from the last render, for mouse hit-testing.
    inner: Cell<Rect>,
    dragging: Option<DeviceId>,
    last_click: Option<(DeviceId, Instant)>,
}

impl DisplaysScreen {
    pub fn new() -> Self {
        Self {
            views: Arc::default(),
            selected: 0,
            focused: false,
            inner: Cell::new(Rect::default()),
            dragging: None,
            last_click: None,
        }
    }

    fn selected_view(&self) -> Option<&Arc<DeviceView>> {
        self.views.get(self.selected)
    }

    fn slots(&self) -> Vec<Slot> {
        slots(self.inner.get(), self.views.len())
    }

    /// Device index and track under the pointer.
    fn hit(&self, column: u16, row: u16) -> Option<(usize, Rect)> {
        self.slots().into_iter().enumerate().find_map(|(index, slot)| {
            let on_row = row == slot.header.y || row == slot.track.y;
            let on_column = column >= slot.track.left() && column < slot.track.right();
            (on_row && on_column).then_some((index, slot.track))
        })
    }

    fn track_of(&self, id: &DeviceId) -> Option<Rect> {
        let index = self.views.iter().position(|v| &v.id == id)?;
        self.slots().get(index).map(|slot| slot.track)
    }

    fn nudge(&self, delta: i32) -> Option<Action> {
        let view = self.selected_view()?;
        Some(Action::Nudge {
            id: view.id.clone(),
            value: view.range.clamp(view.brightness.saturating_add(delta)),
        })
    }

    fn press(&mut self, column: u16, row: u16) -> Option<Action> {
        let (index, track) = self.hit(column, row)?;
        let id = self.views.get(index)?.id.clone();
        self.selected = index;

        let now = Instant::now();
        let double = self
            .last_click
            .as_ref()
            .is_some_and(|(last, at)| *last == id && now.duration_since(*at) <= DOUBLE_CLICK);
        if double {
            self.last_click = None;
            self.dragging = None;
            return Some(Action::ResetDevice(id));
        }

        self.last_click = Some((id.clone(), now));
        self.dragging = Some(id.clone());
        Some(Action::Drag {
            id,
            position: position_at(column, track),
        })
    }

    fn render_slot(&self, frame: &mut Frame, slot: Slot, view: &DeviceView, selected: bool) {
        let pending = view.is_pending();
        let badge = if pending { "◐ pending" } else { "● synced" };
        let header = Line::from(vec![
            Span::styled(view.display_name.as_str(), theme::device_name(selected)),
            Span::raw("  "),
            Span::styled(view.label.as_str(), theme::title_style()),
            Span::raw("  "),
            Span::styled(badge, theme::sync_badge(pending)),
            Span::styled(format!("  {}", view.range), theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(header), slot.header);
        frame.render_widget(SliderBar::new(view).selected(selected), slot.track);
    }
}

/// Step for ←/→: a twentieth of the range, at least one unit.
fn coarse_step(view: &DeviceView) -> i32 {
    let span = view.range.max().saturating_sub(view.range.min());
    (span / 20).max(1)
}

impl Component for DisplaysScreen {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let fine = key.modifiers.contains(KeyModifiers::SHIFT);
        let action = match key.code {
            KeyCode::Up | KeyCode::Char('k') => Some(Action::SelectPrev),
            KeyCode::Down | KeyCode::Char('j') => Some(Action::SelectNext),
            KeyCode::Left | KeyCode::Char('h') => {
                let step = self.selected_view().map_or(1, |v| coarse_step(v));
                self.nudge(if fine { -1 } else { -step })
            }
            KeyCode::Right | KeyCode::Char('l') => {
                let step = self.selected_view().map_or(1, |v| coarse_step(v));
                self.nudge(if fine { 1 } else { step })
            }
            KeyCode::Home => self.selected_view().map(|v| Action::Nudge {
                id: v.id.clone(),
                value: v.range.min(),
            }),
            KeyCode::End => self.selected_view().map(|v| Action::Nudge {
                id: v.id.clone(),
                value: v.range.max(),
            }),
            KeyCode::Char('r') => self
                .selected_view()
                .map(|v| Action::ResetDevice(v.id.clone())),
            _ => None,
        };
        Ok(action)
    }

    fn handle_mouse_event(&mut self, mouse: MouseEvent) -> Result<Option<Action>> {
        let action = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.press(mouse.column, mouse.row),
            MouseEventKind::Drag(MouseButton::Left) => {
                let id = self.dragging.clone();
                id.and_then(|id| {
                    let track = self.track_of(&id)?;
                    Some(Action::Drag {
                        id,
                        position: position_at(mouse.column, track),
                    })
                })
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.dragging = None;
                None
            }
            _ => None,
        };
        Ok(action)
    }

    fn update(&mut self, action: &Action) -> Result<Option<Action>> {
        match action {
            Action::DevicesUpdated(views) => {
                self.views = Arc::clone(views);
                self.selected = self.selected.min(self.views.len().saturating_sub(1));
                if let Some(id) = &self.dragging {
                    if !self.views.iter().any(|v| &v.id == id) {
                        self.dragging = None;
                    }
                }
            }
            Action::SelectNext if !self.views.is_empty() => {
                self.selected = (self.selected + 1) % self.views.len();
            }
            Action::SelectPrev if !self.views.is_empty() => {
                self.selected = self
                    .selected
                    .checked_sub(1)
                    .unwrap_or(self.views.len() - 1);
            }
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(Line::styled(" Displays ", theme::title_style()))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(if self.focused {
                theme::border_focused()
            } else {
                theme::border_default()
            });
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.inner.set(inner);

        if self.views.is_empty() {
            let waiting = Paragraph::new(Line::styled(
                " Waiting for the first snapshot...",
                theme::key_hint(),
            ));
            frame.render_widget(waiting, inner);
            return;
        }

        for (index, (slot, view)) in self.slots().into_iter().zip(self.views.iter()).enumerate() {
            self.render_slot(frame, slot, view, index == self.selected);
        }
    }

    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }
}
