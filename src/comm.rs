/// Communication layer: NDJSON framing and transport constants.
///
/// The radar publishes telemetry on a data channel and takes commands on a
/// control channel. On the ESP32 the data channel is the BLE TX
/// characteristic (notify) plus the serial log, and the control channel is
/// the BLE RX characteristic (write). Every message is one line of JSON.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::protocol::{MsgBuffer, Telemetry, MAX_MSG_LEN};
use crate::state::SharedRadarState;

/// Telemetry publish channel
pub const DATA_TOPIC: &str = "radar/data";

/// Command channel
pub const CONTROL_TOPIC: &str = "radar/control";

/// BLE GATT service UUIDs for EchoRadar.
///
/// The `#[gatt_service]` and `#[characteristic]` attributes in the firmware
/// need string literals, so they repeat these values.
#[allow(dead_code)]
pub mod ble_uuids {
    /// EchoRadar primary service UUID
    pub const SERVICE: &str = "6e520001-8f1c-4b7d-9a3e-2c5d7f0b1a64";
    /// TX characteristic: telemetry, notify
    pub const TX_CHAR: &str = "6e520002-8f1c-4b7d-9a3e-2c5d7f0b1a64";
    /// RX characteristic: commands, write
    pub const RX_CHAR: &str = "6e520003-8f1c-4b7d-9a3e-2c5d7f0b1a64";
}

/// BLE advertising name
pub const BLE_ADV_NAME: &str = "EchoRadar";

/// Maximum BLE notification payload (MTU-3)
pub const BLE_MAX_NOTIFY: usize = 20;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a message as one NDJSON line into `buf`.
/// Returns the number of bytes written, newline included.
pub fn serialize_message<T: Serialize>(msg: &T, buf: &mut [u8]) -> Result<usize> {
    let len = serde_json_core::to_slice(msg, buf).map_err(|_| Error::Serialize)?;
    // No room for the delimiter means the receiver could never frame it
    let newline = buf.get_mut(len).ok_or(Error::Serialize)?;
    *newline = b'\n';
    Ok(len + 1)
}

/// Serialize a message into an owned, right-sized frame.
pub fn frame<T: Serialize>(msg: &T) -> Result<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN)
        .map_err(|_| Error::Serialize)?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Ok(buf)
}

/// Build this period's telemetry frame.
///
/// `Ok(None)` while scanning is stopped: nothing is published then.
pub async fn telemetry_frame<M: RawMutex>(
    state: &SharedRadarState<M>,
    timeout: Duration,
) -> Result<Option<MsgBuffer>> {
    let status = state.snapshot_within(timeout).await?;
    if !status.scan_enabled {
        return Ok(None);
    }
    frame(&Telemetry::from_status(&status)).map(Some)
}

// ── NDJSON line reader ─────────────────────────────────────────────────

/// Accumulates bytes until a newline is found, then yields the line.
/// BLE writes arrive in 20-byte pieces, so a command may span several.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without
    /// newline) when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        match byte {
            b'\n' | b'\r' => {
                let len = core::mem::take(&mut self.pos);
                if core::mem::take(&mut self.overflowed) || len == 0 {
                    None
                } else {
                    Some(&self.buf[..len])
                }
            }
            _ if self.overflowed => None,
            _ if self.pos < self.buf.len() => {
                self.buf[self.pos] = byte;
                self.pos += 1;
                None
            }
            _ => {
                // Too long: drop the whole line, not just its head
                log::warn!("Discarding over-long line");
                self.overflowed = true;
                self.pos = 0;
                None
            }
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmState;
    use crate::protocol::DeviceMessage;
    use crate::queue::SampleQueue;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type State = SharedRadarState<CriticalSectionRawMutex>;

    const WAIT: Duration = Duration::from_millis(100);

    fn feed_all(reader: &mut LineReader, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &b in bytes {
            if let Some(line) = reader.feed(b) {
                lines.push(line.to_vec());
            }
        }
        lines
    }

    #[test]
    fn serialize_appends_newline() {
        let t = Telemetry {
            angle: 90,
            dist: 12.5,
            state: 0,
        };
        let mut buf = [0u8; 64];
        let len = serialize_message(&t, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"{\"angle\":90,\"dist\":12.5,\"state\":0}\n");
    }

    #[test]
    fn serialize_fails_without_room() {
        let t = Telemetry {
            angle: 90,
            dist: 12.5,
            state: 0,
        };
        let mut buf = [0u8; 10];
        assert_eq!(serialize_message(&t, &mut buf), Err(Error::Serialize));

        // Exactly the JSON, no room for the newline
        let mut buf = [0u8; 34];
        assert_eq!(serialize_message(&t, &mut buf), Err(Error::Serialize));
    }

    #[test]
    fn frame_status_message() {
        let msg = DeviceMessage::Status {
            scanning: true,
            alarm: AlarmState::Warning,
            uptime: 5,
            ble_clients: 0,
            board: "xiao",
            version: "0.1.0",
        };
        let buf = frame(&msg).unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
        assert!(buf.starts_with(br#"{"type":"status","scanning":true"#));
    }

    #[test]
    fn telemetry_frame_while_scanning() {
        let state = State::new();
        let queue = SampleQueue::<CriticalSectionRawMutex>::new();
        block_on(state.record_step(35, Some((103.0, AlarmState::Safe)), &queue));

        let buf = block_on(telemetry_frame(&state, WAIT)).unwrap().unwrap();
        assert_eq!(&buf[..], b"{\"angle\":35,\"dist\":103.0,\"state\":0}\n");
    }

    #[test]
    fn no_telemetry_while_stopped() {
        let state = State::new();
        block_on(state.set_scan_enabled(false));
        assert_eq!(block_on(telemetry_frame(&state, WAIT)), Ok(None));
    }

    #[test]
    fn telemetry_skipped_when_lock_busy() {
        let state = State::new();
        let got = block_on(async {
            let _held = state.lock().await;
            telemetry_frame(&state, Duration::from_millis(20)).await
        });
        assert_eq!(got, Err(Error::LockTimeout(20)));
    }

    #[test]
    fn line_reader_splits_lines() {
        let mut r = LineReader::new();
        let lines = feed_all(&mut r, b"START\nSTOP\r\n\nxyz");
        assert_eq!(lines, [b"START".to_vec(), b"STOP".to_vec()]);
        // Partial line is kept for the next feed
        assert_eq!(feed_all(&mut r, b"\n"), [b"xyz".to_vec()]);
    }

    #[test]
    fn line_reader_reassembles_chunks() {
        let mut r = LineReader::new();
        let payload = b"{\"cmd\":\"STOP\",\"from\":\"dashboard\"}\n";
        let mut lines = Vec::new();
        for chunk in payload.chunks(BLE_MAX_NOTIFY) {
            lines.extend(feed_all(&mut r, chunk));
        }
        assert_eq!(lines, [payload[..payload.len() - 1].to_vec()]);
    }

    #[test]
    fn line_reader_drops_overlong_line() {
        let mut r = LineReader::new();
        let mut input = vec![b'A'; MAX_MSG_LEN + 10];
        input.extend_from_slice(b"STOP\nSTART\n");
        let lines = feed_all(&mut r, &input);
        assert_eq!(lines, [b"START".to_vec()]);
    }
}
