//! Control of the scan gate: remote commands and the local buttons.
//!
//! Remote payloads are matched loosely: a payload *containing* `STOP` stops
//! the radar, one containing `START` starts it. `STOP` wins when both are
//! present. Anything else is ignored.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;

use crate::defaults::BUTTON_DEBOUNCE_MS;
use crate::error::Result;
use crate::state::{RadarStatus, SharedRadarState};

/// Command received on the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Start,
    Stop,
}

impl RemoteCommand {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if contains(payload, b"STOP") {
            Some(RemoteCommand::Stop)
        } else if contains(payload, b"START") {
            Some(RemoteCommand::Start)
        } else {
            None
        }
    }

    pub fn enables_scan(self) -> bool {
        matches!(self, RemoteCommand::Start)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Whether a topic is a control channel. Payloads on any other topic
/// (telemetry echoes, status) are never interpreted as commands.
pub fn is_control_topic(topic: &str) -> bool {
    topic.contains("control")
}

/// Apply a remote command, giving up if the state lock is not free within
/// `timeout`. A dropped command is not retried.
pub async fn apply_remote<M: RawMutex>(
    state: &SharedRadarState<M>,
    cmd: RemoteCommand,
    timeout: Duration,
) -> Result<RadarStatus> {
    state
        .set_scan_enabled_within(cmd.enables_scan(), timeout)
        .await
        .inspect_err(|e| log::warn!("Dropped {:?} command: {}", cmd, e))
}

/// Handle one inbound payload.
///
/// `Ok(None)` when the payload was not a command for us.
pub async fn ingest<M: RawMutex>(
    topic: &str,
    payload: &[u8],
    state: &SharedRadarState<M>,
    timeout: Duration,
) -> Result<Option<RadarStatus>> {
    if !is_control_topic(topic) {
        return Ok(None);
    }
    let Some(cmd) = RemoteCommand::parse(payload) else {
        log::debug!("Ignoring {} byte payload on {}", payload.len(), topic);
        return Ok(None);
    };
    log::info!("Remote {:?} on {}", cmd, topic);
    apply_remote(state, cmd, timeout).await.map(Some)
}

// ── Local buttons ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPress {
    /// Start scanning
    A,
    /// Stop scanning and park the head
    B,
}

impl ButtonPress {
    pub fn enables_scan(self) -> bool {
        matches!(self, ButtonPress::A)
    }
}

/// Apply a button press. Waits for the lock without a deadline.
pub async fn apply_button<M: RawMutex>(
    state: &SharedRadarState<M>,
    press: ButtonPress,
) -> RadarStatus {
    log::info!("Button {:?}", press);
    state.set_scan_enabled(press.enables_scan()).await
}

/// Drops presses that follow the previously accepted one too closely.
#[derive(Debug, Clone)]
pub struct Debouncer {
    min_gap_ms: u64,
    last_accepted_ms: Option<u64>,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self::with_gap(BUTTON_DEBOUNCE_MS)
    }

    pub const fn with_gap(min_gap_ms: u64) -> Self {
        Self {
            min_gap_ms,
            last_accepted_ms: None,
        }
    }

    /// Whether a press at `now_ms` counts.
    pub fn accept(&mut self, now_ms: u64) -> bool {
        match self.last_accepted_ms {
            Some(last) if now_ms.wrapping_sub(last) < self.min_gap_ms => false,
            _ => {
                self.last_accepted_ms = Some(now_ms);
                true
            }
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}
