//! Alarm evaluation and the states derived from it.
//!
//! The evaluator classifies a filtered distance into three severities with
//! plain thresholds. There is no hysteresis band: a target sitting right on
//! a threshold can flip the level every sample.

use serde::Serialize;

use crate::defaults::{
    DANGER_DISTANCE_CM, MAX_VALID_DISTANCE_CM, WARNING_BLINK_MS, WARNING_DISTANCE_CM,
};

/// Proximity alarm severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    #[default]
    Safe,
    Warning,
    Danger,
}

/// Overall radar state, as reported to telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    #[default]
    Scanning,
    Stopped,
    Alarm,
}

impl SystemState {
    /// Derive the system state from the alarm level and the scan gate.
    ///
    /// `Alarm` iff `Danger`; otherwise `Scanning`/`Stopped` by the gate.
    pub fn derive(alarm: AlarmState, scan_enabled: bool) -> Self {
        match (alarm, scan_enabled) {
            (AlarmState::Danger, _) => SystemState::Alarm,
            (_, true) => SystemState::Scanning,
            (_, false) => SystemState::Stopped,
        }
    }

    /// Telemetry wire code (0 = scanning, 1 = stopped, 2 = alarm)
    pub fn code(self) -> u8 {
        match self {
            SystemState::Scanning => 0,
            SystemState::Stopped => 1,
            SystemState::Alarm => 2,
        }
    }
}

/// Distance thresholds for the evaluator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmThresholds {
    /// At or inside → Danger (cm)
    pub danger_cm: f32,
    /// At or inside → Warning (cm)
    pub warning_cm: f32,
    /// Beyond this there is no target (cm)
    pub max_range_cm: f32,
}

impl AlarmThresholds {
    pub const fn new() -> Self {
        Self {
            danger_cm: DANGER_DISTANCE_CM,
            warning_cm: WARNING_DISTANCE_CM,
            max_range_cm: MAX_VALID_DISTANCE_CM,
        }
    }
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a filtered distance.
pub fn evaluate(distance: f32, thresholds: &AlarmThresholds) -> AlarmState {
    // NaN falls through every comparison; treat it as no target
    if !(distance > 0.0 && distance <= thresholds.max_range_cm) {
        return AlarmState::Safe;
    }
    if distance <= thresholds.danger_cm {
        AlarmState::Danger
    } else if distance <= thresholds.warning_cm {
        AlarmState::Warning
    } else {
        AlarmState::Safe
    }
}

/// LED and buzzer levels for one annunciator update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Indicator {
    pub led: bool,
    pub buzzer: bool,
}

/// Indicator policy for the local annunciator.
///
/// Safe: everything off. Warning: buzzer off, LED toggling every
/// `period_ms`. Danger: LED and buzzer on.
/// Driven by a millisecond clock supplied by the caller.
#[derive(Debug, Clone)]
pub struct Blinker {
    period_ms: u64,
    last_toggle_ms: u64,
    led: bool,
}

impl Blinker {
    pub const fn new() -> Self {
        Self::with_period(WARNING_BLINK_MS)
    }

    pub const fn with_period(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_toggle_ms: 0,
            led: false,
        }
    }

    /// Compute the indicator levels for `alarm` at time `now_ms`.
    pub fn update(&mut self, alarm: AlarmState, now_ms: u64) -> Indicator {
        match alarm {
            AlarmState::Safe => {
                self.led = false;
                Indicator {
                    led: false,
                    buzzer: false,
                }
            }
            AlarmState::Warning => {
                if now_ms.wrapping_sub(self.last_toggle_ms) >= self.period_ms {
                    self.led = !self.led;
                    self.last_toggle_ms = now_ms;
                }
                Indicator {
                    led: self.led,
                    buzzer: false,
                }
            }
            AlarmState::Danger => {
                self.led = true;
                Indicator {
                    led: true,
                    buzzer: true,
                }
            }
        }
    }
}

impl Default for Blinker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: AlarmThresholds = AlarmThresholds::new();

    #[test]
    fn threshold_boundaries() {
        assert_eq!(evaluate(10.0, &T), AlarmState::Danger);
        assert_eq!(evaluate(10.01, &T), AlarmState::Warning);
        assert_eq!(evaluate(30.0, &T), AlarmState::Warning);
        assert_eq!(evaluate(30.01, &T), AlarmState::Safe);
    }

    #[test]
    fn no_target_is_safe() {
        assert_eq!(evaluate(0.0, &T), AlarmState::Safe);
        assert_eq!(evaluate(-3.0, &T), AlarmState::Safe);
        assert_eq!(evaluate(500.0, &T), AlarmState::Safe);
        assert_eq!(evaluate(f32::NAN, &T), AlarmState::Safe);
    }

    #[test]
    fn very_close_is_danger() {
        assert_eq!(evaluate(0.5, &T), AlarmState::Danger);
    }

    #[test]
    fn max_range_is_still_in_range() {
        assert_eq!(evaluate(400.0, &T), AlarmState::Safe);
    }

    #[test]
    fn no_hysteresis_at_boundary() {
        let levels: Vec<_> = [29.9, 30.1, 29.9, 30.1]
            .iter()
            .map(|&d| evaluate(d, &T))
            .collect();
        assert_eq!(
            levels,
            [
                AlarmState::Warning,
                AlarmState::Safe,
                AlarmState::Warning,
                AlarmState::Safe,
            ]
        );
    }

    #[test]
    fn system_state_follows_alarm_and_gate() {
        assert_eq!(
            SystemState::derive(AlarmState::Danger, true),
            SystemState::Alarm
        );
        assert_eq!(
            SystemState::derive(AlarmState::Danger, false),
            SystemState::Alarm
        );
        assert_eq!(
            SystemState::derive(AlarmState::Warning, true),
            SystemState::Scanning
        );
        assert_eq!(
            SystemState::derive(AlarmState::Safe, false),
            SystemState::Stopped
        );
    }

    #[test]
    fn system_state_codes() {
        assert_eq!(SystemState::Scanning.code(), 0);
        assert_eq!(SystemState::Stopped.code(), 1);
        assert_eq!(SystemState::Alarm.code(), 2);
    }

    #[test]
    fn blinker_safe_is_dark() {
        let mut b = Blinker::new();
        assert_eq!(b.update(AlarmState::Safe, 0), Indicator::default());
    }

    #[test]
    fn blinker_danger_is_steady() {
        let mut b = Blinker::new();
        for t in [0, 10, 60, 500] {
            assert_eq!(
                b.update(AlarmState::Danger, t),
                Indicator {
                    led: true,
                    buzzer: true
                }
            );
        }
    }

    #[test]
    fn blinker_warning_toggles_at_period() {
        let mut b = Blinker::new();
        let first = b.update(AlarmState::Warning, 100);
        assert!(first.led);
        assert!(!first.buzzer);

        // Within the period: unchanged
        assert!(b.update(AlarmState::Warning, 120).led);
        assert!(b.update(AlarmState::Warning, 149).led);

        // Period elapsed: toggled
        assert!(!b.update(AlarmState::Warning, 150).led);
        assert!(b.update(AlarmState::Warning, 200).led);
    }

    #[test]
    fn blinker_danger_to_warning_continues_from_lit() {
        let mut b = Blinker::new();
        b.update(AlarmState::Danger, 1000);
        // LED was on; first warning update past the period turns it off
        assert!(!b.update(AlarmState::Warning, 1000).led);
    }
}
