//! Sweep scanning engine.
//!
//! The scan task owns the servo, the ranger and the annunciator. Each step
//! it points the head, samples the distance every few steps, runs the
//! filter and the alarm evaluator, and writes the result into the shared
//! state, which also publishes it to the sample queue.
//!
//! Hardware is reached through three small traits so the controller runs
//! unchanged against the ESP32 drivers or test doubles.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};

use crate::alarm::{evaluate, AlarmState, AlarmThresholds};
use crate::defaults::{
    HOME_ANGLE, IDLE_POLL_MS, PREEMPT_BACKOFF_MS, SAMPLE_EVERY, SCAN_END_ANGLE,
    SCAN_START_ANGLE, SCAN_STEP_ANGLE, SERVO_SETTLE_MS, STARTUP_SETTLE_MS, STEP_DELAY_MS,
};
use crate::filter::{filter_distance, FilterConfig, Verdict};
use crate::queue::SampleQueue;
use crate::state::{RadarSample, Recorded, SharedRadarState};

/// Ultrasonic ranger.
pub trait DistanceSensor {
    /// Blocking, bounded read in cm. Returns a negative value on failure
    /// (no echo, timeout); the filter discards it.
    fn read_distance(&mut self) -> f32;
}

/// Servo that points the ranger. Fire-and-forget.
pub trait Actuator {
    fn set_angle(&mut self, angle: u16);
}

/// Local LED/buzzer. Called every active step with the current level.
pub trait Annunciator {
    fn set_indicator(&mut self, severity: AlarmState);
}

/// Sweep geometry and sampling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub start_angle: u16,
    pub end_angle: u16,
    pub step: u16,
    pub home_angle: u16,
    /// One sensor read per this many active steps
    pub sample_every: u8,
}

impl SweepConfig {
    pub const fn new() -> Self {
        Self {
            start_angle: SCAN_START_ANGLE,
            end_angle: SCAN_END_ANGLE,
            step: SCAN_STEP_ANGLE,
            home_angle: HOME_ANGLE,
            sample_every: SAMPLE_EVERY,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Delays between the scan task's suspension points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub startup_settle: Duration,
    pub servo_settle: Duration,
    pub step_delay: Duration,
    pub idle_poll: Duration,
    pub preempt_backoff: Duration,
}

impl ScanTiming {
    pub const fn new() -> Self {
        Self {
            startup_settle: Duration::from_millis(STARTUP_SETTLE_MS),
            servo_settle: Duration::from_millis(SERVO_SETTLE_MS),
            step_delay: Duration::from_millis(STEP_DELAY_MS),
            idle_poll: Duration::from_millis(IDLE_POLL_MS),
            preempt_backoff: Duration::from_millis(PREEMPT_BACKOFF_MS),
        }
    }
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Sweep position, owned by the scan task alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    angle: u16,
    direction: i8,
    sample_accumulator: u8,
}

impl ScanCursor {
    /// Start at `angle`, heading towards the upper end.
    pub const fn new(angle: u16) -> Self {
        Self {
            angle,
            direction: 1,
            sample_accumulator: 0,
        }
    }

    pub fn angle(&self) -> u16 {
        self.angle
    }

    /// +1 towards the upper end, -1 towards the lower end
    pub fn direction(&self) -> i8 {
        self.direction
    }

    /// Whether the step about to run completes a sampling cycle.
    pub fn sample_due(&self, every: u8) -> bool {
        self.sample_accumulator.saturating_add(1) >= every.max(1)
    }

    /// Account for a completed (not preempted) step.
    pub fn complete_step(&mut self, sampled: bool) {
        self.sample_accumulator = if sampled {
            0
        } else {
            self.sample_accumulator.saturating_add(1)
        };
    }

    /// Move one step, reflecting at the ends of the arc.
    pub fn advance(&mut self, sweep: &SweepConfig) {
        let next = self.angle as i32 + self.direction as i32 * sweep.step as i32;
        if self.direction > 0 && next >= sweep.end_angle as i32 {
            self.angle = sweep.end_angle;
            self.direction = -1;
        } else if self.direction < 0 && next <= sweep.start_angle as i32 {
            self.angle = sweep.start_angle;
            self.direction = 1;
        } else {
            self.angle = next as u16;
        }
    }
}

/// What one call to [`ScanController::step`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Scanning disabled; nothing sensed
    Idle,
    /// Scanning was disabled mid-step; nothing written, cursor held
    Preempted,
    /// Head moved, no sample this step
    Swept(u16),
    /// Head moved and a fused sample was published
    Sampled(RadarSample),
}

pub struct ScanController<S, A, N> {
    sensor: S,
    actuator: A,
    annunciator: N,
    cursor: ScanCursor,
    sweep: SweepConfig,
    timing: ScanTiming,
    filter: FilterConfig,
    thresholds: AlarmThresholds,
    /// Last filtered distance written to the shared state
    distance: f32,
    alarm: AlarmState,
}

impl<S, A, N> ScanController<S, A, N>
where
    S: DistanceSensor,
    A: Actuator,
    N: Annunciator,
{
    pub fn new(sensor: S, actuator: A, annunciator: N) -> Self {
        let sweep = SweepConfig::new();
        Self {
            sensor,
            actuator,
            annunciator,
            cursor: ScanCursor::new(sweep.home_angle),
            sweep,
            timing: ScanTiming::new(),
            filter: FilterConfig::new(),
            thresholds: AlarmThresholds::new(),
            distance: 0.0,
            alarm: AlarmState::Safe,
        }
    }

    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.cursor = ScanCursor::new(sweep.home_angle);
        self.sweep = sweep;
        self
    }

    pub fn with_timing(mut self, timing: ScanTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_thresholds(mut self, thresholds: AlarmThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn cursor(&self) -> &ScanCursor {
        &self.cursor
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn annunciator(&self) -> &N {
        &self.annunciator
    }

    /// Run forever: park the head, then step.
    pub async fn run<M: RawMutex, Q: RawMutex>(
        &mut self,
        state: &SharedRadarState<M>,
        queue: &SampleQueue<Q>,
    ) -> ! {
        self.actuator.set_angle(self.cursor.angle());
        Timer::after(self.timing.startup_settle).await;
        log::info!(
            "Sweep {}°..{}° step {}°, sampling every {} steps",
            self.sweep.start_angle,
            self.sweep.end_angle,
            self.sweep.step,
            self.sweep.sample_every,
        );

        loop {
            self.step(state, queue).await;
        }
    }

    /// One scan step.
    pub async fn step<M: RawMutex, Q: RawMutex>(
        &mut self,
        state: &SharedRadarState<M>,
        queue: &SampleQueue<Q>,
    ) -> StepOutcome {
        if !state.is_scan_enabled() {
            if state.take_recenter_request() {
                self.actuator.set_angle(self.sweep.home_angle);
                log::debug!("Head parked at {}°", self.sweep.home_angle);
            }
            // Stopping cleared the alarm in the shared state
            self.alarm = AlarmState::Safe;
            self.annunciator.set_indicator(AlarmState::Safe);
            Timer::after(self.timing.idle_poll).await;
            return StepOutcome::Idle;
        }

        // A stop/start pair landed between two steps: honour the park
        if state.take_recenter_request() {
            self.actuator.set_angle(self.sweep.home_angle);
            log::debug!("Head parked at {}° before resuming", self.sweep.home_angle);
        }

        let angle = self.cursor.angle();
        self.actuator.set_angle(angle);
        Timer::after(self.timing.servo_settle).await;

        let sampling = self.cursor.sample_due(self.sweep.sample_every);
        let fused = if sampling {
            let raw = self.sensor.read_distance();
            let filtered = filter_distance(raw, self.distance, &self.filter);
            match filtered.verdict {
                Verdict::OutOfRange => log::trace!("Discarded reading {raw} cm at {angle}°"),
                Verdict::SpuriousJump => log::debug!(
                    "Rejected jump {raw} cm (estimate {} cm) at {angle}°",
                    self.distance
                ),
                Verdict::Seeded | Verdict::Smoothed => {}
            }
            Some((
                filtered.distance,
                evaluate(filtered.distance, &self.thresholds),
            ))
        } else {
            None
        };

        let outcome = match state.record_step(angle, fused, queue).await {
            Recorded::Preempted => {
                Timer::after(self.timing.preempt_backoff).await;
                return StepOutcome::Preempted;
            }
            Recorded::Angle(alarm) => {
                self.alarm = alarm;
                StepOutcome::Swept(angle)
            }
            Recorded::Sample(sample) => {
                self.distance = sample.distance;
                self.alarm = sample.alarm;
                StepOutcome::Sampled(sample)
            }
        };

        self.cursor.complete_step(sampling);
        self.annunciator.set_indicator(self.alarm);
        self.cursor.advance(&self.sweep);
        Timer::after(self.timing.step_delay).await;

        outcome
    }
}
