//! Center-anchored slider track.
//!
//! The fill runs from the device's center value to its current value, so a
//! `-100..100` panel at `-30` fills leftward from the middle. Geometry comes
//! precomputed on the [`DeviceView`]; this module only maps percentages to
//! terminal cells and back.

use brightline_core::DeviceView;
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

use crate::theme;

const TRACK: &str = "─";
const FILL: &str = "━";
const CENTER: &str = "┼";
const THUMB: &str = "●";

pub struct SliderBar<'a> {
    view: &'a DeviceView,
    selected: bool,
}

impl<'a> SliderBar<'a> {
    pub fn new(view: &'a DeviceView) -> Self {
        Self {
            view,
            selected: false,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }
}

impl Widget for SliderBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let y = area.y;
        let geometry = &self.view.geometry;
        let pending = self.view.is_pending();

        for x in area.left()..area.right() {
            buf[(x, y)].set_symbol(TRACK).set_style(theme::track());
        }

        let center_pct = center_percent(self.view);
        buf[(area.x + cell_at(center_pct, area.width), y)]
            .set_symbol(CENTER)
            .set_style(theme::track());

        if geometry.fill_width_percent > 0.0 {
            let from = cell_at(geometry.fill_start_percent, area.width);
            let to = cell_at(
                geometry.fill_start_percent + geometry.fill_width_percent,
                area.width,
            );
            for offset in from..=to {
                buf[(area.x + offset, y)]
                    .set_symbol(FILL)
                    .set_style(theme::fill(pending));
            }
        }

        buf[(area.x + cell_at(geometry.position_percent, area.width), y)]
            .set_symbol(THUMB)
            .set_style(theme::thumb(self.selected));
    }
}

/// Cell offset within a track of `width` cells for `percent` of its length.
pub fn cell_at(percent: f64, width: u16) -> u16 {
    if width <= 1 {
        return 0;
    }
    let last = f64::from(width - 1);
    let cell = (percent.clamp(0.0, 100.0) / 100.0 * last).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    let cell = cell as u16;
    cell.min(width - 1)
}

/// Track position in percent for a pointer at `column`, clamped to the track.
pub fn position_at(column: u16, track: Rect) -> f64 {
    if track.width <= 1 {
        return 0.0;
    }
    let offset = column.clamp(track.left(), track.right() - 1) - track.left();
    f64::from(offset) / f64::from(track.width - 1) * 100.0
}

fn center_percent(view: &DeviceView) -> f64 {
    let min = f64::from(view.range.min());
    let span = f64::from(view.range.max()) - min;
    (f64::from(view.center) - min) / span * 100.0
}
