/// Messages sent from the radar to the companion.
///
/// Telemetry goes out on the data channel as a bare object,
/// `{"angle":<int>,"dist":<one-decimal>,"state":<0|1|2>}`. Device reports
/// (status) are tagged with `"type"` so a companion can tell them apart.
/// Uses `heapless` buffers for no_std/no-alloc operation.
use heapless::Vec;
use serde::Serialize;

use crate::alarm::AlarmState;
use crate::state::RadarStatus;

/// Telemetry payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Telemetry {
    /// Sweep angle (degrees)
    pub angle: u16,
    /// Filtered distance, rounded to 0.1 cm
    pub dist: f32,
    /// System state code (0 = scanning, 1 = stopped, 2 = alarm)
    pub state: u8,
}

impl Telemetry {
    pub fn from_status(status: &RadarStatus) -> Self {
        Self {
            angle: status.angle,
            dist: round_tenths(status.distance),
            state: status.system.code(),
        }
    }
}

/// Round to one decimal place, half away from zero.
///
/// The float formatter prints the shortest representation, so a value
/// rounded here always comes out with exactly one decimal.
pub fn round_tenths(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let scaled = value * 10.0;
    let tenths = if scaled >= 0.0 {
        (scaled + 0.5) as i32
    } else {
        (scaled - 0.5) as i32
    };
    tenths as f32 / 10.0
}

/// Device reports
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage {
    /// Boot and periodic status report
    #[serde(rename = "status")]
    Status {
        scanning: bool,
        alarm: AlarmState,
        /// Uptime in seconds
        uptime: u32,
        /// Number of connected BLE clients
        ble_clients: u8,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 160;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
