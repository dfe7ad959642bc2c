//! Distance filter for raw ultrasonic readings.
//!
//! Rejects readings outside the ranger's range and sudden jumps, then
//! smooths what is left with a single-pole exponential filter. The filter
//! is a pure function: the caller threads the previous estimate through,
//! there is no hidden state.

use crate::defaults::{MAX_JUMP_CM, MAX_VALID_DISTANCE_CM, SMOOTHING_WEIGHT};

/// Filter tuning. Defaults come from `defaults.rs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    /// Readings `>=` this are invalid (cm)
    pub max_valid_cm: f32,
    /// Readings further than this from the estimate are rejected (cm)
    pub max_jump_cm: f32,
    /// Weight of the new reading when smoothing (0..=1)
    pub smoothing_weight: f32,
}

impl FilterConfig {
    pub const fn new() -> Self {
        Self {
            max_valid_cm: MAX_VALID_DISTANCE_CM,
            max_jump_cm: MAX_JUMP_CM,
            smoothing_weight: SMOOTHING_WEIGHT,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the filter did with a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Reading outside (0, max_valid); estimate kept
    OutOfRange,
    /// Reading too far from the estimate; estimate kept
    SpuriousJump,
    /// No prior estimate; reading taken as-is
    Seeded,
    /// Reading blended into the estimate
    Smoothed,
}

impl Verdict {
    /// Whether the reading contributed to the output
    pub fn accepted(self) -> bool {
        matches!(self, Verdict::Seeded | Verdict::Smoothed)
    }
}

/// Output of one filter step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filtered {
    pub distance: f32,
    pub verdict: Verdict,
}

/// Filter one raw reading against the previous estimate.
///
/// `previous == 0.0` means "no estimate yet". A negative `raw` (the sensor's
/// failure sentinel) is just another out-of-range reading.
pub fn filter_distance(raw: f32, previous: f32, config: &FilterConfig) -> Filtered {
    if raw <= 0.0 || raw >= config.max_valid_cm || raw.is_nan() {
        return Filtered {
            distance: previous,
            verdict: Verdict::OutOfRange,
        };
    }

    if previous > 0.0 && (raw - previous).abs() > config.max_jump_cm {
        return Filtered {
            distance: previous,
            verdict: Verdict::SpuriousJump,
        };
    }

    if previous == 0.0 {
        return Filtered {
            distance: raw,
            verdict: Verdict::Seeded,
        };
    }

    let w = config.smoothing_weight;
    Filtered {
        distance: previous * (1.0 - w) + raw * w,
        verdict: Verdict::Smoothed,
    }
}
