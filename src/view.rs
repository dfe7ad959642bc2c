//! Display model: what the radar screen shows, independent of the panel.
//!
//! The display task drains the sample queue, folds each sample into a
//! [`RadarView`] and redraws. When no sample arrives in time it falls back
//! to a slow refresh of the status label from a bounded snapshot.

use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;

use crate::alarm::{AlarmState, SystemState};
use crate::defaults::{SCAN_END_ANGLE, SCAN_STEP_ANGLE, STALE_REFRESH_MS};
use crate::queue::SampleQueue;
use crate::state::RadarSample;

/// One slot per sweep step, 0..=180 in 5° steps
pub const HISTORY_LEN: usize = (SCAN_END_ANGLE / SCAN_STEP_ANGLE) as usize + 1;

/// Distance at the edge of the plot (cm). Targets at or beyond it are not plotted.
pub const PLOT_RANGE_CM: f32 = 100.0;

/// Radius of the plot (px)
pub const PLOT_RADIUS_PX: u32 = 45;

/// A target to plot, in polar screen coordinates around the sweep origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blip {
    pub angle: u16,
    pub radius_px: u32,
}

/// Last sample plus a per-angle trail of recent targets.
#[derive(Debug, Clone)]
pub struct RadarView {
    /// Whole cm per angle slot; 0 = nothing plotted
    history: [u8; HISTORY_LEN],
    latest: Option<RadarSample>,
}

impl RadarView {
    pub const fn new() -> Self {
        Self {
            history: [0; HISTORY_LEN],
            latest: None,
        }
    }

    pub fn update(&mut self, sample: RadarSample) {
        let slot = (sample.angle / SCAN_STEP_ANGLE) as usize;
        if let Some(cell) = self.history.get_mut(slot) {
            *cell = if sample.distance > 0.0 && sample.distance < PLOT_RANGE_CM {
                sample.distance as u8
            } else {
                0
            };
        }
        self.latest = Some(sample);
    }

    pub fn latest(&self) -> Option<&RadarSample> {
        self.latest.as_ref()
    }

    pub fn history(&self) -> &[u8; HISTORY_LEN] {
        &self.history
    }

    pub fn blips(&self) -> impl Iterator<Item = Blip> + '_ {
        self.history
            .iter()
            .enumerate()
            .filter(|&(_, &cm)| cm > 0)
            .map(|(slot, &cm)| Blip {
                angle: slot as u16 * SCAN_STEP_ANGLE,
                radius_px: plot_radius(cm as f32),
            })
    }
}

impl Default for RadarView {
    fn default() -> Self {
        Self::new()
    }
}

/// Screen radius for a distance, clamped to the plot.
pub fn plot_radius(distance_cm: f32) -> u32 {
    if !(distance_cm > 0.0) {
        return 0;
    }
    let r = (distance_cm / PLOT_RANGE_CM * PLOT_RADIUS_PX as f32) as u32;
    r.min(PLOT_RADIUS_PX)
}

/// Five-character status label. The alarm level takes precedence.
pub fn status_label(alarm: AlarmState, system: SystemState) -> &'static str {
    match (alarm, system) {
        (AlarmState::Danger, _) => "ALARM",
        (AlarmState::Warning, _) => "WARN ",
        (_, SystemState::Scanning) => "SCAN ",
        _ => "STOP ",
    }
}

/// Label shown by the stale refresh, which only knows the scan gate.
pub fn idle_label(scan_enabled: bool) -> &'static str {
    if scan_enabled {
        "SCAN "
    } else {
        "STOP "
    }
}

pub type Readout = heapless::String<16>;

/// Angle and whole-cm distance, e.g. `"45 ^103cm"`.
pub fn readout(sample: &RadarSample) -> Readout {
    let mut s = Readout::new();
    // Fits: at most "180^" plus a 5-digit distance and "cm"
    let _ = write!(s, "{:<3}^{:<3.0}cm", sample.angle, sample.distance);
    s
}

/// Fires at most once per period while no fresh data arrives.
#[derive(Debug, Clone)]
pub struct StaleRefresh {
    period_ms: u64,
    last_ms: u64,
}

impl StaleRefresh {
    pub const fn new() -> Self {
        Self::with_period(STALE_REFRESH_MS)
    }

    pub const fn with_period(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: 0,
        }
    }

    pub fn due(&mut self, now_ms: u64) -> bool {
        if now_ms.wrapping_sub(self.last_ms) > self.period_ms {
            self.last_ms = now_ms;
            true
        } else {
            false
        }
    }
}

impl Default for StaleRefresh {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest sample for the next frame, waiting up to `wait` if none is
/// pending. `None` means the caller should fall back to a stale refresh.
pub async fn next_frame<M: RawMutex>(
    queue: &SampleQueue<M>,
    wait: Duration,
) -> Option<RadarSample> {
    queue.drain_latest(wait).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    fn sample(angle: u16, distance: f32, alarm: AlarmState) -> RadarSample {
        RadarSample {
            angle,
            distance,
            alarm,
            system: SystemState::derive(alarm, true),
        }
    }

    #[test]
    fn history_covers_sweep() {
        assert_eq!(HISTORY_LEN, 37);
    }

    #[test]
    fn history_keeps_close_targets_only() {
        let mut view = RadarView::new();
        view.update(sample(0, 42.7, AlarmState::Safe));
        view.update(sample(90, 150.0, AlarmState::Safe));
        view.update(sample(180, 99.9, AlarmState::Safe));
        assert_eq!(view.history()[0], 42);
        assert_eq!(view.history()[18], 0);
        assert_eq!(view.history()[36], 99);
    }

    #[test]
    fn far_reading_clears_slot() {
        let mut view = RadarView::new();
        view.update(sample(45, 20.0, AlarmState::Warning));
        view.update(sample(45, 300.0, AlarmState::Safe));
        assert_eq!(view.blips().count(), 0);
        assert_eq!(view.latest().map(|s| s.distance), Some(300.0));
    }

    #[test]
    fn blips_scale_to_plot() {
        let mut view = RadarView::new();
        view.update(sample(30, 50.0, AlarmState::Safe));
        view.update(sample(150, 10.0, AlarmState::Danger));
        let blips: Vec<_> = view.blips().collect();
        assert_eq!(
            blips,
            [
                Blip {
                    angle: 30,
                    radius_px: 22
                },
                Blip {
                    angle: 150,
                    radius_px: 4
                },
            ]
        );
    }

    #[test]
    fn plot_radius_clamps() {
        assert_eq!(plot_radius(0.0), 0);
        assert_eq!(plot_radius(-5.0), 0);
        assert_eq!(plot_radius(100.0), PLOT_RADIUS_PX);
        assert_eq!(plot_radius(350.0), PLOT_RADIUS_PX);
    }

    #[test]
    fn labels() {
        assert_eq!(
            status_label(AlarmState::Danger, SystemState::Alarm),
            "ALARM"
        );
        assert_eq!(
            status_label(AlarmState::Warning, SystemState::Scanning),
            "WARN "
        );
        assert_eq!(
            status_label(AlarmState::Safe, SystemState::Scanning),
            "SCAN "
        );
        assert_eq!(
            status_label(AlarmState::Safe, SystemState::Stopped),
            "STOP "
        );
        assert_eq!(idle_label(false), "STOP ");
    }

    #[test]
    fn readout_format() {
        assert_eq!(
            readout(&sample(45, 103.0, AlarmState::Safe)).as_str(),
            "45 ^103cm"
        );
        assert_eq!(
            readout(&sample(5, 7.6, AlarmState::Danger)).as_str(),
            "5  ^8  cm"
        );
    }

    #[test]
    fn stale_refresh_period() {
        let mut r = StaleRefresh::new();
        assert!(r.due(1001));
        assert!(!r.due(1500));
        assert!(!r.due(2001));
        assert!(r.due(2002));
    }

    #[test]
    fn next_frame_takes_newest() {
        let q = SampleQueue::<CriticalSectionRawMutex>::new();
        q.publish(sample(10, 80.0, AlarmState::Safe));
        q.publish(sample(15, 81.0, AlarmState::Safe));
        let got = block_on(next_frame(&q, Duration::from_millis(20)));
        assert_eq!(got.map(|s| s.angle), Some(15));
        assert_eq!(block_on(next_frame(&q, Duration::from_millis(20))), None);
    }
}
