//! Palette and semantic styles.

use ratatui::style::{Color, Modifier, Style};

pub const ACCENT: Color = Color::Rgb(255, 184, 76); // #ffb84c
pub const NEON_CYAN: Color = Color::Rgb(128, 255, 234); // #80ffea
pub const ELECTRIC_YELLOW: Color = Color::Rgb(241, 250, 140); // #f1fa8c
pub const SUCCESS_GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const ERROR_RED: Color = Color::Rgb(255, 99, 99); // #ff6363
pub const DIM_WHITE: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const BORDER_GRAY: Color = Color::Rgb(98, 114, 164); // #6272a4

pub fn title_style() -> Style {
    Style::default().fg(NEON_CYAN).add_modifier(Modifier::BOLD)
}

pub fn border_focused() -> Style {
    Style::default().fg(ACCENT)
}

pub fn border_default() -> Style {
    Style::default().fg(BORDER_GRAY)
}

pub fn device_name(selected: bool) -> Style {
    if selected {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DIM_WHITE)
    }
}

/// Untouched part of a slider track.
pub fn track() -> Style {
    Style::default().fg(BORDER_GRAY)
}

/// Segment between the center and the value.
pub fn fill(pending: bool) -> Style {
    if pending {
        Style::default().fg(ELECTRIC_YELLOW)
    } else {
        Style::default().fg(ACCENT)
    }
}

pub fn thumb(selected: bool) -> Style {
    let style = Style::default().fg(Color::White);
    if selected {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

/// Sync badge next to a device name.
pub fn sync_badge(pending: bool) -> Style {
    if pending {
        Style::default().fg(ELECTRIC_YELLOW)
    } else {
        Style::default().fg(SUCCESS_GREEN)
    }
}

pub fn key_hint() -> Style {
    Style::default().fg(BORDER_GRAY)
}
