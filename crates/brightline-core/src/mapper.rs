// ── Slider value mapping ──
//
// Pure conversions between a device brightness value and the slider's
// normalized representation. The fill bar grows outward from a center
// anchor, which need not be the midpoint of the range (e.g. center 0 on
// -80..100).

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;

/// Thumb width assumed for offset corrections, in CSS pixels.
pub const THUMB_WIDTH: f64 = 16.0;

// ── Free functions ───────────────────────────────────────────────────

/// `(value - min) / (max - min) * 100`.
pub fn to_percent(value: i32, min: i32, max: i32) -> Result<f64, CoreError> {
    let span = checked_span(min, max)?;
    Ok((f64::from(value) - f64::from(min)) / span * 100.0)
}

/// Fill segment between `value` and `center`, as percentages.
pub fn compute_fill(value: i32, center: i32, min: i32, max: i32) -> Result<Fill, CoreError> {
    let value_pct = to_percent(value, min, max)?;
    let center_pct = to_percent(center, min, max)?;
    Ok(Fill::between(value_pct, center_pct))
}

/// Inverse of [`to_percent`], rounded to the nearest integer unit.
///
/// Positions outside `[0, 100]` are clamped; NaN maps to `min`.
pub fn from_position(position_percent: f64, min: i32, max: i32) -> Result<i32, CoreError> {
    let span = checked_span(min, max)?;
    let position = if position_percent.is_nan() {
        0.0
    } else {
        position_percent.clamp(0.0, 100.0)
    };
    let value = f64::from(min) + position / 100.0 * span;
    Ok(round_to_i32(value).clamp(min, max))
}

fn checked_span(min: i32, max: i32) -> Result<f64, CoreError> {
    if max <= min {
        return Err(CoreError::domain(format!(
            "max ({max}) must be greater than min ({min})"
        )));
    }
    Ok(f64::from(max) - f64::from(min))
}

fn round_to_i32(value: f64) -> i32 {
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let out = value.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
    out
}

// ── Fill ─────────────────────────────────────────────────────────────

/// A horizontal segment of the track, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fill {
    pub start: f64,
    pub width: f64,
}

impl Fill {
    fn between(value_pct: f64, center_pct: f64) -> Self {
        if value_pct >= center_pct {
            Self {
                start: center_pct,
                width: value_pct - center_pct,
            }
        } else {
            Self {
                start: value_pct,
                width: center_pct - value_pct,
            }
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.width
    }
}

// ── BrightnessRange ──────────────────────────────────────────────────

/// A validated `min < max` integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrightnessRange {
    min: i32,
    max: i32,
}

impl BrightnessRange {
    pub fn new(min: i32, max: i32) -> Result<Self, CoreError> {
        checked_span(min, max)?;
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    /// `(min + max) / 2`, halves rounded away from zero.
    pub fn midpoint(&self) -> i32 {
        round_to_i32((f64::from(self.min) + f64::from(self.max)) / 2.0)
    }
}

impl Default for BrightnessRange {
    fn default() -> Self {
        Self { min: -100, max: 100 }
    }
}

impl fmt::Display for BrightnessRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

// ── Center ───────────────────────────────────────────────────────────

/// Where the fill anchors and where the reset gesture lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Center {
    /// The range midpoint.
    #[default]
    Midpoint,
    /// A fixed value inside the range.
    Value(i32),
}

impl Center {
    pub fn resolve(self, range: BrightnessRange) -> i32 {
        match self {
            Self::Midpoint => range.midpoint(),
            Self::Value(v) => v,
        }
    }
}

impl fmt::Display for Center {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Midpoint => f.write_str("midpoint"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

// ── SliderGeometry ───────────────────────────────────────────────────

/// Everything a renderer needs to draw one slider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliderGeometry {
    pub position_percent: f64,
    pub fill_start_percent: f64,
    pub fill_width_percent: f64,
    /// Pixel correction for `left: calc(p% + offset)` thumb placement.
    pub thumb_offset: f64,
    pub tooltip_offset: f64,
}

// ── ValueMapper ──────────────────────────────────────────────────────

/// A range with its resolved center; all conversions are infallible once
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueMapper {
    range: BrightnessRange,
    center: i32,
}

impl ValueMapper {
    pub fn new(range: BrightnessRange, center: Center) -> Result<Self, CoreError> {
        let center = center.resolve(range);
        if !range.contains(center) {
            return Err(CoreError::domain(format!(
                "center {center} lies outside {range}"
            )));
        }
        Ok(Self {
            range,
            center,
        })
    }

    /// Shorthand for `ValueMapper::new(BrightnessRange::new(min, max)?, center)`.
    pub fn from_bounds(min: i32, max: i32, center: Center) -> Result<Self, CoreError> {
        Self::new(BrightnessRange::new(min, max)?, center)
    }

    pub fn range(&self) -> BrightnessRange {
        self.range
    }

    pub fn center(&self) -> i32 {
        self.center
    }

    pub fn to_percent(&self, value: i32) -> f64 {
        (f64::from(value) - f64::from(self.range.min)) / self.span() * 100.0
    }

    pub fn compute_fill(&self, value: i32) -> Fill {
        Fill::between(self.to_percent(value), self.to_percent(self.center))
    }

    pub fn from_position(&self, position_percent: f64) -> i32 {
        let position = if position_percent.is_nan() {
            0.0
        } else {
            position_percent.clamp(0.0, 100.0)
        };
        let value = f64::from(self.range.min) + position / 100.0 * self.span();
        self.range.clamp(round_to_i32(value))
    }

    /// Geometry for `value`, clamped to the range first.
    pub fn geometry(&self, value: i32) -> SliderGeometry {
        let value = self.range.clamp(value);
        let position = self.to_percent(value);
        let fill = self.compute_fill(value);
        let offset = THUMB_WIDTH / 2.0 - position / 100.0 * THUMB_WIDTH;
        SliderGeometry {
            position_percent: position,
            fill_start_percent: fill.start,
            fill_width_percent: fill.width,
            thumb_offset: offset,
            tooltip_offset: offset,
        }
    }

    pub fn label(&self, value: i32) -> String {
        format!("{value}%")
    }

    fn span(&self) -> f64 {
        f64::from(self.range.max) - f64::from(self.range.min)
    }
}

impl Default for ValueMapper {
    fn default() -> Self {
        Self {
            range: BrightnessRange::default(),
            center: 0,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RANGES: [(i32, i32); 4] = [(-100, 100), (-80, 100), (0, 100), (-3, 7)];

    #[test]
    fn round_trip_holds_for_every_integer() {
        for (min, max) in RANGES {
            for v in min..=max {
                let pct = to_percent(v, min, max).unwrap();
                assert_eq!(from_position(pct, min, max).unwrap(), v, "range {min}..{max}");
            }
        }
    }

    #[test]
    fn mapper_round_trip_matches_free_functions() {
        let mapper = ValueMapper::from_bounds(-80, 100, Center::Value(0)).unwrap();
        for v in -80..=100 {
            assert_eq!(mapper.from_position(mapper.to_percent(v)), v);
        }
    }

    #[test]
    fn empty_or_inverted_range_is_domain_error() {
        assert!(matches!(to_percent(0, 5, 5), Err(CoreError::Domain { .. })));
        assert!(matches!(from_position(50.0, 10, -10), Err(CoreError::Domain { .. })));
        assert!(matches!(BrightnessRange::new(1, 0), Err(CoreError::Domain { .. })));
    }

    #[test]
    fn fill_grows_outward_from_center() {
        for (min, max) in RANGES {
            let center = Center::Midpoint.resolve(BrightnessRange::new(min, max).unwrap());
            let center_pct = to_percent(center, min, max).unwrap();
            for v in min..=max {
                let fill = compute_fill(v, center, min, max).unwrap();
                let v_pct = to_percent(v, min, max).unwrap();
                assert!(fill.width >= 0.0);
                if v >= center {
                    assert!((fill.start - center_pct).abs() < 1e-9);
                    assert!((fill.end() - v_pct).abs() < 1e-9);
                } else {
                    assert!((fill.start - v_pct).abs() < 1e-9);
                    assert!((fill.end() - center_pct).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn fill_at_center_is_empty() {
        let fill = compute_fill(0, 0, -80, 100).unwrap();
        assert!(fill.width.abs() < f64::EPSILON);
        assert!((fill.start - 80.0 / 180.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        assert_eq!(BrightnessRange::new(-80, 100).unwrap().midpoint(), 10);
        assert_eq!(BrightnessRange::new(0, 5).unwrap().midpoint(), 3);
        assert_eq!(BrightnessRange::new(-5, 0).unwrap().midpoint(), -3);
    }

    #[test]
    fn explicit_center_overrides_midpoint() {
        let mapper = ValueMapper::from_bounds(-80, 100, Center::Value(0)).unwrap();
        assert_eq!(mapper.center(), 0);
        let midpoint = ValueMapper::from_bounds(-80, 100, Center::Midpoint).unwrap();
        assert_eq!(midpoint.center(), 10);
    }

    #[test]
    fn center_outside_range_is_rejected() {
        let err = ValueMapper::from_bounds(0, 100, Center::Value(-1)).unwrap_err();
        assert!(err.to_string().contains("outside 0..100"), "{err}");
    }

    #[test]
    fn positions_outside_track_clamp() {
        let mapper = ValueMapper::default();
        assert_eq!(mapper.from_position(-20.0), -100);
        assert_eq!(mapper.from_position(140.0), 100);
        assert_eq!(mapper.from_position(f64::NAN), -100);
        assert_eq!(mapper.from_position(75.0), 50);
    }

    #[test]
    fn geometry_offsets_keep_thumb_on_track() {
        let mapper = ValueMapper::default();

        let left = mapper.geometry(-100);
        assert!((left.position_percent).abs() < f64::EPSILON);
        assert!((left.thumb_offset - 8.0).abs() < 1e-9);

        let middle = mapper.geometry(0);
        assert!((middle.position_percent - 50.0).abs() < 1e-9);
        assert!(middle.thumb_offset.abs() < 1e-9);
        assert!(middle.fill_width_percent.abs() < 1e-9);

        let right = mapper.geometry(100);
        assert!((right.thumb_offset + 8.0).abs() < 1e-9);
        assert!((right.tooltip_offset - right.thumb_offset).abs() < f64::EPSILON);
    }

    #[test]
    fn geometry_clamps_out_of_range_values() {
        let mapper = ValueMapper::from_bounds(-80, 100, Center::Value(0)).unwrap();
        let geo = mapper.geometry(250);
        assert!((geo.position_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn label_shows_signed_percent() {
        let mapper = ValueMapper::default();
        assert_eq!(mapper.label(-30), "-30%");
        assert_eq!(mapper.label(45), "45%");
    }
}
