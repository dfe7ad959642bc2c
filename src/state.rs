//! Shared radar state.
//!
//! The one place the current angle, filtered distance, alarm level, system
//! state and scan gate live. Every field sits behind a single async mutex;
//! the operations below each hold it for the whole read or write, so a
//! reader never sees half of one scan step and half of another.
//!
//! The scan task locks without a deadline. Everything else (remote
//! commands, display, telemetry) uses the `*_within` variants and skips
//! its work for the cycle when the lock is not free in time.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration};

use crate::alarm::{AlarmState, SystemState};
use crate::defaults::HOME_ANGLE;
use crate::error::{Error, Result};
use crate::queue::SampleQueue;

/// One fused radar sample: filtered distance at an angle with the alarm
/// and system state derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarSample {
    /// Sweep angle (degrees, 0..=180)
    pub angle: u16,
    /// Filtered distance (cm)
    pub distance: f32,
    pub alarm: AlarmState,
    pub system: SystemState,
}

/// A consistent copy of the shared state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarStatus {
    pub angle: u16,
    /// Filtered, not raw (cm). 0 until the first valid reading.
    pub distance: f32,
    pub alarm: AlarmState,
    pub system: SystemState,
    pub scan_enabled: bool,
}

impl RadarStatus {
    pub const fn new() -> Self {
        Self {
            angle: HOME_ANGLE,
            distance: 0.0,
            alarm: AlarmState::Safe,
            system: SystemState::Scanning,
            scan_enabled: true,
        }
    }

    pub fn sample(&self) -> RadarSample {
        RadarSample {
            angle: self.angle,
            distance: self.distance,
            alarm: self.alarm,
            system: self.system,
        }
    }
}

impl Default for RadarStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of the scan task's per-step write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recorded {
    /// Scanning was disabled while the step was in flight; nothing written
    Preempted,
    /// Angle written, distance and alarm retained; carries the alarm held
    Angle(AlarmState),
    /// Full sample written and published
    Sample(RadarSample),
}

pub struct SharedRadarState<M: RawMutex> {
    inner: Mutex<M, RadarStatus>,
    /// Mirror of `scan_enabled`, written only under the lock
    scan_gate: AtomicBool,
    /// Head should be parked at the home angle
    recenter: AtomicBool,
}

impl<M: RawMutex> SharedRadarState<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RadarStatus::new()),
            scan_gate: AtomicBool::new(true),
            recenter: AtomicBool::new(false),
        }
    }

    /// Coarse, unlocked check of the scan gate.
    ///
    /// Only good enough to decide whether to bother starting a step; the
    /// authoritative check is repeated under the lock.
    pub fn is_scan_enabled(&self) -> bool {
        self.scan_gate.load(Ordering::Acquire)
    }

    /// Consume a pending "park the head" request.
    pub fn take_recenter_request(&self) -> bool {
        self.recenter.swap(false, Ordering::AcqRel)
    }

    pub async fn snapshot(&self) -> RadarStatus {
        *self.inner.lock().await
    }

    pub async fn snapshot_within(&self, timeout: Duration) -> Result<RadarStatus> {
        let guard = with_timeout(timeout, self.inner.lock())
            .await
            .map_err(|_| Error::LockTimeout(timeout.as_millis()))?;
        Ok(*guard)
    }

    /// Open or close the scan gate, waiting as long as it takes.
    ///
    /// Closing it also clears the alarm (nothing is being sensed any more)
    /// and asks the scan task to park the head.
    pub async fn set_scan_enabled(&self, enabled: bool) -> RadarStatus {
        let mut status = self.inner.lock().await;
        self.apply_scan_enabled(&mut status, enabled);
        *status
    }

    /// As [`set_scan_enabled`](Self::set_scan_enabled), giving up after `timeout`.
    pub async fn set_scan_enabled_within(
        &self,
        enabled: bool,
        timeout: Duration,
    ) -> Result<RadarStatus> {
        let mut status = with_timeout(timeout, self.inner.lock())
            .await
            .map_err(|_| Error::LockTimeout(timeout.as_millis()))?;
        self.apply_scan_enabled(&mut status, enabled);
        Ok(*status)
    }

    fn apply_scan_enabled(&self, status: &mut RadarStatus, enabled: bool) {
        let changed = status.scan_enabled != enabled;
        status.scan_enabled = enabled;
        if !enabled {
            status.alarm = AlarmState::Safe;
            self.recenter.store(true, Ordering::Release);
        }
        status.system = SystemState::derive(status.alarm, enabled);
        self.scan_gate.store(enabled, Ordering::Release);

        if changed {
            log::info!("Scanning {}", if enabled { "started" } else { "stopped" });
        }
    }

    /// Write one scan step.
    ///
    /// `fused` is `Some((distance, alarm))` on sampling steps. The sample is
    /// published to `queue` before the lock is released, so the queue never
    /// holds a sample older than the state.
    pub async fn record_step<Q: RawMutex>(
        &self,
        angle: u16,
        fused: Option<(f32, AlarmState)>,
        queue: &SampleQueue<Q>,
    ) -> Recorded {
        let mut status = self.inner.lock().await;

        if !status.scan_enabled {
            return Recorded::Preempted;
        }

        status.angle = angle;

        let Some((distance, alarm)) = fused else {
            return Recorded::Angle(status.alarm);
        };

        if alarm != status.alarm {
            log::info!("Alarm {:?} -> {:?} at {}°", status.alarm, alarm, angle);
        }
        status.distance = distance;
        status.alarm = alarm;
        status.system = SystemState::derive(alarm, true);

        let sample = status.sample();
        queue.publish(sample);
        Recorded::Sample(sample)
    }

    /// Hold the lock; lets tests simulate a slow lock holder.
    #[cfg(test)]
    pub(crate) async fn lock(&self) -> embassy_sync::mutex::MutexGuard<'_, M, RadarStatus> {
        self.inner.lock().await
    }
}

impl<M: RawMutex> Default for SharedRadarState<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type State = SharedRadarState<CriticalSectionRawMutex>;
    type Queue = SampleQueue<CriticalSectionRawMutex>;

    fn assert_invariant(s: &RadarStatus) {
        let expected = SystemState::derive(s.alarm, s.scan_enabled);
        assert_eq!(s.system, expected, "inconsistent status {s:?}");
    }

    #[test]
    fn starts_scanning_at_home() {
        let state = State::new();
        let s = block_on(state.snapshot());
        assert_eq!(s, RadarStatus::new());
        assert_eq!(s.angle, 90);
        assert!(state.is_scan_enabled());
        assert!(!state.take_recenter_request());
    }

    #[test]
    fn sample_step_writes_all_fields_and_publishes() {
        let state = State::new();
        let queue = Queue::new();
        let rec = block_on(state.record_step(35, Some((8.0, AlarmState::Danger)), &queue));

        let expected = RadarSample {
            angle: 35,
            distance: 8.0,
            alarm: AlarmState::Danger,
            system: SystemState::Alarm,
        };
        assert_eq!(rec, Recorded::Sample(expected));
        assert_eq!(queue.try_drain(), Some(expected));

        let s = block_on(state.snapshot());
        assert_eq!(s.sample(), expected);
        assert_invariant(&s);
    }

    #[test]
    fn angle_step_retains_distance() {
        let state = State::new();
        let queue = Queue::new();
        block_on(state.record_step(40, Some((55.0, AlarmState::Safe)), &queue));
        queue.try_drain();

        let rec = block_on(state.record_step(45, None, &queue));
        assert_eq!(rec, Recorded::Angle(AlarmState::Safe));
        assert!(!queue.has_pending());

        let s = block_on(state.snapshot());
        assert_eq!(s.angle, 45);
        assert_eq!(s.distance, 55.0);
    }

    #[test]
    fn angle_step_reports_alarm_cleared_by_restart() {
        let state = State::new();
        let queue = Queue::new();
        block_on(state.record_step(30, Some((5.0, AlarmState::Danger)), &queue));
        block_on(state.set_scan_enabled(false));
        block_on(state.set_scan_enabled(true));

        let rec = block_on(state.record_step(35, None, &queue));
        assert_eq!(rec, Recorded::Angle(AlarmState::Safe));
    }

    #[test]
    fn step_after_stop_is_preempted() {
        let state = State::new();
        let queue = Queue::new();
        block_on(state.set_scan_enabled(false));

        let rec = block_on(state.record_step(50, Some((20.0, AlarmState::Warning)), &queue));
        assert_eq!(rec, Recorded::Preempted);
        assert!(!queue.has_pending());
        let s = block_on(state.snapshot());
        assert_eq!(s.angle, 90);
        assert_eq!(s.system, SystemState::Stopped);
    }

    #[test]
    fn stop_clears_danger_and_requests_recenter() {
        let state = State::new();
        let queue = Queue::new();
        block_on(state.record_step(60, Some((5.0, AlarmState::Danger)), &queue));

        let s = block_on(state.set_scan_enabled(false));
        assert!(!s.scan_enabled);
        assert_eq!(s.alarm, AlarmState::Safe);
        assert_eq!(s.system, SystemState::Stopped);
        assert_invariant(&s);
        assert!(!state.is_scan_enabled());
        assert!(state.take_recenter_request());
        assert!(!state.take_recenter_request());
    }

    #[test]
    fn start_while_in_danger_keeps_alarm() {
        let state = State::new();
        let queue = Queue::new();
        block_on(state.record_step(60, Some((5.0, AlarmState::Danger)), &queue));

        let s = block_on(state.set_scan_enabled(true));
        assert_eq!(s.system, SystemState::Alarm);
        assert_invariant(&s);
    }

    #[test]
    fn restart_resumes_scanning() {
        let state = State::new();
        block_on(state.set_scan_enabled(false));
        let s = block_on(state.set_scan_enabled(true));
        assert!(s.scan_enabled);
        assert_eq!(s.system, SystemState::Scanning);
        assert!(state.is_scan_enabled());
    }

    #[test]
    fn bounded_write_times_out_while_locked() {
        let state = State::new();
        let result = block_on(async {
            let _held = state.lock().await;
            state
                .set_scan_enabled_within(false, Duration::from_millis(20))
                .await
        });
        assert_eq!(result, Err(Error::LockTimeout(20)));

        // Dropped, not deferred
        let s = block_on(state.snapshot());
        assert!(s.scan_enabled);
        assert!(state.is_scan_enabled());
        assert!(!state.take_recenter_request());
    }

    #[test]
    fn bounded_snapshot_times_out_while_locked() {
        let state = State::new();
        let result = block_on(async {
            let _held = state.lock().await;
            state.snapshot_within(Duration::from_millis(20)).await
        });
        assert_eq!(result, Err(Error::LockTimeout(20)));
    }

    #[test]
    fn bounded_operations_succeed_when_free() {
        let state = State::new();
        let s = block_on(state.set_scan_enabled_within(false, Duration::from_millis(100)))
            .unwrap();
        assert_eq!(s.system, SystemState::Stopped);
        let snap = block_on(state.snapshot_within(Duration::from_millis(100))).unwrap();
        assert_eq!(snap, s);
    }

    #[test]
    fn concurrent_writers_never_tear_snapshot() {
        static STATE: State = State::new();
        static QUEUE: Queue = Queue::new();

        let writer = std::thread::spawn(|| {
            for i in 0..2000u32 {
                // Angle and distance always move together: distance = angle * 2
                let angle = (i % 37) as u16 * 5;
                block_on(STATE.record_step(
                    angle,
                    Some((angle as f32 * 2.0, AlarmState::Safe)),
                    &QUEUE,
                ));
            }
        });

        let toggler = std::thread::spawn(|| {
            for i in 0..200 {
                block_on(STATE.set_scan_enabled(i % 2 == 1));
            }
        });

        for _ in 0..2000 {
            let s = block_on(STATE.snapshot());
            assert_invariant(&s);
            if s.distance != 0.0 {
                assert_eq!(s.distance, s.angle as f32 * 2.0, "torn read {s:?}");
            }
        }

        writer.join().unwrap();
        toggler.join().unwrap();
    }
}
