//! Compile-time defaults for the radar engine.
//!
//! Every runtime config struct (`FilterConfig`, `AlarmThresholds`,
//! `SweepConfig`, `ScanTiming`) starts from these values in its `const fn
//! new()`, so the firmware can hold them in statics.

// ── Sweep ────────────────────────────────────────────────────────────

/// Lower end of the sweep arc (degrees)
pub const SCAN_START_ANGLE: u16 = 0;

/// Upper end of the sweep arc (degrees)
pub const SCAN_END_ANGLE: u16 = 180;

/// Servo step per scan cycle (degrees)
pub const SCAN_STEP_ANGLE: u16 = 5;

/// Rest position: where the sweep starts and where STOP parks the head
pub const HOME_ANGLE: u16 = 90;

/// One raw sensor read every this many active scan steps.
/// At 5° per step that is one sample per 50° of travel.
pub const SAMPLE_EVERY: u8 = 10;

// ── Distance filter ──────────────────────────────────────────────────

/// Readings at or above this are outside the ranger's useful range (cm)
pub const MAX_VALID_DISTANCE_CM: f32 = 400.0;

/// A reading further than this from the current estimate is a spurious jump (cm)
pub const MAX_JUMP_CM: f32 = 50.0;

/// Weight of the new reading in the exponential smoothing step
pub const SMOOTHING_WEIGHT: f32 = 0.3;

// ── Alarm thresholds ─────────────────────────────────────────────────

/// Target at or inside this distance is Danger (cm)
pub const DANGER_DISTANCE_CM: f32 = 10.0;

/// Target at or inside this distance is Warning (cm)
pub const WARNING_DISTANCE_CM: f32 = 30.0;

/// Warning LED toggle period (ms)
pub const WARNING_BLINK_MS: u64 = 50;

// ── Task timing ──────────────────────────────────────────────────────

/// Servo settle time after each position command (ms)
pub const SERVO_SETTLE_MS: u64 = 20;

/// Pause between sweep steps (ms)
pub const STEP_DELAY_MS: u64 = 10;

/// Poll period of the scan task while scanning is disabled (ms)
pub const IDLE_POLL_MS: u64 = 50;

/// Back-off after a stop was observed under the lock (ms)
pub const PREEMPT_BACKOFF_MS: u64 = 10;

/// Servo settle time before the first sweep step (ms)
pub const STARTUP_SETTLE_MS: u64 = 200;

/// Lock timeout for the non-critical paths: remote commands, display, telemetry (ms)
pub const LOCK_TIMEOUT_MS: u64 = 100;

/// Bounded wait of a consumer on the sample queue (ms)
pub const QUEUE_WAIT_MS: u64 = 100;

/// Display redraw period when no fresh sample arrives (ms)
pub const STALE_REFRESH_MS: u64 = 1000;

/// Telemetry publish period while scanning (ms)
pub const TELEMETRY_PERIOD_MS: u64 = 1000;

/// Minimum gap between two accepted button presses (ms)
pub const BUTTON_DEBOUNCE_MS: u64 = 300;

/// Button poll period (ms)
pub const BUTTON_POLL_MS: u64 = 10;
