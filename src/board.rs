/// Hardware constants for supported boards.
///
/// Per-board properties are selected at compile time via feature flags;
/// GPIO wiring lives with the firmware's peripheral split. The servo and
/// ranger conversions below are shared by every board.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const LED_ACTIVE_LOW: bool = true;
    pub const HAS_DISPLAY: bool = false;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    pub const LED_ACTIVE_LOW: bool = false;
    pub const HAS_DISPLAY: bool = true;
    pub const DISPLAY_WIDTH: u16 = 135;
    pub const DISPLAY_HEIGHT: u16 = 240;
    pub const DISPLAY_SPI_FREQ_MHZ: u32 = 40;
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

// ── Servo ───────────────────────────────────────────────────────────────

/// Hobby servo frame rate
pub const SERVO_FREQ_HZ: u32 = 50;

/// Pulse width at 0° (µs)
pub const SERVO_MIN_PULSE_US: u32 = 500;

/// Pulse width at 180° (µs)
pub const SERVO_MAX_PULSE_US: u32 = 2500;

/// PWM resolution used for the servo channel
pub const SERVO_DUTY_BITS: u32 = 14;

/// Pulse width for an angle, clamped to 0..=180.
pub fn servo_pulse_us(angle: u16) -> u32 {
    let angle = angle.min(180) as u32;
    SERVO_MIN_PULSE_US + angle * (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) / 180
}

/// Raw duty value for an angle at `bits` of PWM resolution.
pub fn servo_duty(angle: u16, bits: u32) -> u32 {
    let period_us = 1_000_000 / SERVO_FREQ_HZ;
    let full_scale = 1u32 << bits;
    // u64: 2500 µs × 2^20 would overflow u32
    (servo_pulse_us(angle) as u64 * full_scale as u64 / period_us as u64) as u32
}

// ── Ultrasonic ranger (HC-SR04) ─────────────────────────────────────────

/// Trigger pulse width (µs)
pub const SONAR_TRIGGER_US: u32 = 10;

/// Give up waiting for an echo edge after this long (µs)
pub const SONAR_TIMEOUT_US: u64 = 30_000;

/// Round-trip time per cm at room temperature (µs)
pub const SONAR_US_PER_CM: f32 = 58.0;

/// Returned by the ranger when no echo was measured
pub const SONAR_NO_ECHO: f32 = -1.0;

/// Convert an echo pulse width into a distance.
pub fn echo_to_cm(echo_us: u64) -> f32 {
    if echo_us == 0 || echo_us >= SONAR_TIMEOUT_US {
        SONAR_NO_ECHO
    } else {
        echo_us as f32 / SONAR_US_PER_CM
    }
}

// ── Buzzer ──────────────────────────────────────────────────────────────

/// Buzzer tone
pub const BUZZER_FREQ_HZ: u32 = 4000;
