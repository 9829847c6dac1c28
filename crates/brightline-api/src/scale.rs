// Native brightness scales.
//
// Monitors report brightness in their own units: DDC/CI panels as a
// `[min, max]` register range, laptop panels as a list of supported
// levels. Backends translate those into percentages before publishing.

/// A contiguous native range, e.g. a DDC/CI `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeScale {
    pub min: u32,
    pub max: u32,
}

impl NativeScale {
    pub fn new(min: u32, max: u32) -> Option<Self> {
        (max > min).then_some(Self { min, max })
    }

    /// Native reading to a rounded percentage in `0..=100`.
    pub fn to_percent(self, native: u32) -> u32 {
        let clamped = native.clamp(self.min, self.max);
        let span = f64::from(self.max - self.min);
        let pct = (f64::from(clamped - self.min) / span * 100.0).round();
        round_to_u32(pct)
    }

    /// Percentage to the nearest native register value.
    pub fn from_percent(self, percent: u32) -> u32 {
        let span = f64::from(self.max - self.min);
        let fraction = f64::from(percent.min(100)) / 100.0;
        self.min + round_to_u32((fraction * span).round())
    }
}

/// Discrete levels a panel accepts, as reported by the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedLevels(Vec<u8>);

impl SupportedLevels {
    pub fn new(mut levels: Vec<u8>) -> Self {
        levels.sort_unstable();
        levels.dedup();
        Self(levels)
    }

    /// The supported level closest to `percent`; ties go to the lower one.
    pub fn nearest(&self, percent: u32) -> Option<u8> {
        self.0
            .iter()
            .copied()
            .min_by_key(|&level| (i64::from(level) - i64::from(percent)).abs())
    }
}

fn round_to_u32(value: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    let out = value.clamp(0.0, f64::from(u32::MAX)) as u32;
    out
}
