//! EchoRadar: ultrasonic sweep radar with proximity alarm.
//!
//! A servo sweeps an HC-SR04 ranger across 180°. Filtered samples feed the
//! local LED/buzzer, the optional display, and a once-per-second telemetry
//! stream sent as NDJSON over BLE GATT notifications and serial. START and
//! STOP commands arrive on the BLE RX characteristic; buttons A and B do
//! the same locally.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

// Hardware-specific modules (binary crate only)
mod annunciator;
#[cfg(feature = "m5stickc")]
mod display;
mod servo;
mod sonar;

// Re-export library modules so binary submodules can use crate::*
pub(crate) use echoradar::{alarm, board, comm, control, defaults, protocol, scanner, state, view};

use core::sync::atomic::{AtomicU8, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::{
    AnyPin, DriveMode, Input, InputConfig, Level, Output, OutputConfig, Pin, Pull,
};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::ledc::channel::{self as ledc_channel, ChannelIFace};
use esp_hal::ledc::timer::{self as ledc_timer, config::Duty, TimerIFace};
#[cfg(not(feature = "esp32"))]
use esp_hal::ledc::LSGlobalClkSource;
use esp_hal::ledc::{Ledc, LowSpeed};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use comm::LineReader;
use control::{ButtonPress, Debouncer};
use defaults::{BUTTON_POLL_MS, LOCK_TIMEOUT_MS, TELEMETRY_PERIOD_MS};
use echoradar::queue::SampleQueue;
use protocol::{DeviceMessage, MsgBuffer, VERSION};
use scanner::ScanController;
use state::SharedRadarState;

// ── BLE GATT server definition ──────────────────────────────────────
//
// Proc macros need string literals; comm::ble_uuids holds the same values.

#[gatt_service(uuid = "6e520001-8f1c-4b7d-9a3e-2c5d7f0b1a64")]
struct RadarGattService {
    /// TX: telemetry and status, notify-only.
    /// Messages are chunked into BLE_MAX_NOTIFY-sized pieces.
    /// The companion accumulates until it sees '\n' (NDJSON delimiter).
    #[characteristic(uuid = "6e520002-8f1c-4b7d-9a3e-2c5d7f0b1a64", notify)]
    tx: [u8; 20],

    /// RX: START/STOP commands, write-only, newline terminated.
    #[characteristic(uuid = "6e520003-8f1c-4b7d-9a3e-2c5d7f0b1a64", write)]
    rx: [u8; 20],
}

#[gatt_server]
struct RadarServer {
    radar_service: RadarGattService,
}

// ── Shared state and channels ────────────────────────────────────────

type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
type BleOutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 4>;

/// Angle, filtered distance, alarm and scan gate
pub(crate) static RADAR_STATE: SharedRadarState<CriticalSectionRawMutex> = SharedRadarState::new();

/// Latest fused sample, for the display
pub(crate) static SAMPLE_QUEUE: SampleQueue<CriticalSectionRawMutex> = SampleQueue::new();

/// Serialized messages for serial (and, cloned, BLE)
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Messages waiting to be notified to the BLE client
static BLE_OUTPUT_CHANNEL: BleOutputChannel = Channel::new();

/// Number of connected BLE clients
static BLE_CLIENTS: AtomicU8 = AtomicU8::new(0);

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // BLE controller heap
    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("EchoRadar v{} starting on {}", VERSION, board::BOARD_NAME);

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "m5stickc")]
    let _power_hold = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());

    // Board wiring, the one place GPIO numbers are named
    #[cfg(feature = "xiao")]
    let (servo_pin, trig_pin, echo_pin, buzzer_pin, led_pin, button_a, button_b) = (
        peripherals.GPIO1.degrade(),  // D0
        peripherals.GPIO2.degrade(),  // D1
        peripherals.GPIO3.degrade(),  // D2
        peripherals.GPIO4.degrade(),  // D3, external passive buzzer
        peripherals.GPIO21.degrade(), // User LED, active low
        peripherals.GPIO5.degrade(),  // D4
        peripherals.GPIO6.degrade(),  // D5
    );
    #[cfg(feature = "m5stickc")]
    let (servo_pin, trig_pin, echo_pin, buzzer_pin, led_pin, button_a, button_b) = (
        peripherals.GPIO26.degrade(), // Header G26
        peripherals.GPIO32.degrade(), // Grove G32
        peripherals.GPIO33.degrade(), // Grove G33
        peripherals.GPIO2.degrade(),  // Built-in passive buzzer
        peripherals.GPIO19.degrade(), // Built-in red LED
        peripherals.GPIO37.degrade(), // Button A
        peripherals.GPIO39.degrade(), // Button B
    );

    spawner
        .spawn(scan_task(peripherals.LEDC, servo_pin, trig_pin, echo_pin, buzzer_pin, led_pin))
        .unwrap();
    spawner.spawn(button_task(button_a, button_b)).unwrap();
    spawner.spawn(telemetry_task()).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();

    #[cfg(feature = "m5stickc")]
    {
        spawner
            .spawn(display::display_task(
                peripherals.SPI2,
                peripherals.GPIO15,
                peripherals.GPIO13,
                peripherals.GPIO5,
                peripherals.GPIO14,
                peripherals.GPIO12,
                peripherals.GPIO27,
            ))
            .unwrap();
        log::info!("Display task spawned");
    }

    // ── BLE radio initialization ───────────────────────────────────────

    let connector =
        esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
            .expect("BLE connector init failed");

    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let address = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xac]);

    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let server = RadarServer::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name: comm::BLE_ADV_NAME,
        appearance: &appearance::UNKNOWN,
    }))
    .expect("GATT server init failed");

    log::info!("BLE radio initialized");

    // ── BLE orchestration: stack runner + GATT server ─────────────────

    let _ = embassy_futures::join::join(
        async {
            loop {
                if let Err(e) = runner.run().await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        async {
            loop {
                let mut adv_data = [0u8; 31];
                let adv_len = match AdStructure::encode_slice(
                    &[
                        AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                        AdStructure::CompleteLocalName(comm::BLE_ADV_NAME.as_bytes()),
                    ],
                    &mut adv_data[..],
                ) {
                    Ok(len) => len,
                    Err(e) => {
                        log::error!("Ad encode error: {:?}", e);
                        Timer::after(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let advertiser = match peripheral
                    .advertise(
                        &Default::default(),
                        Advertisement::ConnectableScannableUndirected {
                            adv_data: &adv_data[..adv_len],
                            scan_data: &[],
                        },
                    )
                    .await
                {
                    Ok(adv) => adv,
                    Err(e) => {
                        log::error!("BLE advertise error: {:?}", e);
                        Timer::after(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                log::info!("BLE advertising as '{}'", comm::BLE_ADV_NAME);

                let conn = match advertiser.accept().await {
                    Ok(c) => c,
                    Err(e) => {
                        log::error!("BLE accept error: {:?}", e);
                        continue;
                    }
                };

                let gatt_conn = match conn.with_attribute_server(&server) {
                    Ok(gc) => gc,
                    Err(e) => {
                        log::error!("GATT setup error: {:?}", e);
                        continue;
                    }
                };

                log::info!("BLE client connected");
                BLE_CLIENTS.fetch_add(1, Ordering::Relaxed);

                handle_gatt_connection(&gatt_conn, &server).await;

                BLE_CLIENTS.fetch_sub(1, Ordering::Relaxed);
                log::info!("BLE client disconnected, re-advertising");
            }
        },
    )
    .await;
}

/// Forward output messages as notifications and feed RX writes to the
/// control path.
async fn handle_gatt_connection<'s, P: PacketPool>(
    conn: &GattConnection<'_, 's, P>,
    server: &'s RadarServer<'_>,
) {
    let ble_rx = BLE_OUTPUT_CHANNEL.receiver();
    let mut line_reader = LineReader::new();

    loop {
        match embassy_futures::select::select(ble_rx.receive(), conn.next()).await {
            embassy_futures::select::Either::First(msg) => {
                // Pad with newlines so the companion NDJSON parser sees
                // harmless empty lines instead of null bytes.
                for chunk in msg.chunks(comm::BLE_MAX_NOTIFY) {
                    let mut padded = [b'\n'; comm::BLE_MAX_NOTIFY];
                    padded[..chunk.len()].copy_from_slice(chunk);
                    if server.radar_service.tx.notify(conn, &padded).await.is_err() {
                        return;
                    }
                }
            }
            embassy_futures::select::Either::Second(event) => match event {
                GattConnectionEvent::Disconnected { .. } => return,
                GattConnectionEvent::Gatt { event } => {
                    if let GattEvent::Write(ref write_event) = event {
                        if write_event.handle() == server.radar_service.rx.handle {
                            for &byte in write_event.data() {
                                if let Some(line) = line_reader.feed(byte) {
                                    // Errors are logged by the control path
                                    let _ = control::ingest(
                                        comm::CONTROL_TOPIC,
                                        line,
                                        &RADAR_STATE,
                                        Duration::from_millis(LOCK_TIMEOUT_MS),
                                    )
                                    .await;
                                }
                            }
                        }
                    }
                    // Must accept/reply to all GATT events
                    if let Ok(reply) = event.accept() {
                        reply.send().await;
                    }
                }
                _ => {}
            },
        }
    }
}

/// Sweep, sense, filter, alarm. Owns the servo, ranger, LED and buzzer.
#[embassy_executor::task]
async fn scan_task(
    ledc_peripheral: esp_hal::peripherals::LEDC<'static>,
    servo_pin: AnyPin<'static>,
    trig_pin: AnyPin<'static>,
    echo_pin: AnyPin<'static>,
    buzzer_pin: AnyPin<'static>,
    led_pin: AnyPin<'static>,
) {
    log::info!(
        "Servo on GPIO{}, ranger on GPIO{}/{}, buzzer on GPIO{}, LED on GPIO{}",
        servo_pin.number(),
        trig_pin.number(),
        echo_pin.number(),
        buzzer_pin.number(),
        led_pin.number(),
    );

    #[cfg_attr(feature = "esp32", allow(unused_mut))]
    let mut ledc = Ledc::new(ledc_peripheral);
    #[cfg(not(feature = "esp32"))]
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    let mut servo_timer = ledc.timer::<LowSpeed>(ledc_timer::Number::Timer0);
    let mut buzzer_timer = ledc.timer::<LowSpeed>(ledc_timer::Number::Timer1);
    let timers = servo_timer
        .configure(ledc_timer::config::Config {
            duty: Duty::Duty14Bit,
            clock_source: ledc_timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(board::SERVO_FREQ_HZ),
        })
        .and_then(|()| {
            buzzer_timer.configure(ledc_timer::config::Config {
                duty: Duty::Duty8Bit,
                clock_source: ledc_timer::LSClockSource::APBClk,
                frequency: Rate::from_hz(board::BUZZER_FREQ_HZ),
            })
        });
    if let Err(e) = timers {
        log::error!("LEDC timer config error: {:?}", e);
        return;
    }

    let mut servo_channel = ledc.channel(ledc_channel::Number::Channel0, servo_pin);
    let mut buzzer_channel = ledc.channel(ledc_channel::Number::Channel1, buzzer_pin);
    let channels = servo_channel
        .configure(ledc_channel::config::Config {
            timer: &servo_timer,
            duty_pct: 0,
            drive_mode: DriveMode::PushPull,
        })
        .and_then(|()| {
            buzzer_channel.configure(ledc_channel::config::Config {
                timer: &buzzer_timer,
                duty_pct: 0,
                drive_mode: DriveMode::PushPull,
            })
        });
    if let Err(e) = channels {
        log::error!("LEDC channel config error: {:?}", e);
        return;
    }

    let trig = Output::new(trig_pin, Level::Low, OutputConfig::default());
    let echo = Input::new(echo_pin, InputConfig::default().with_pull(Pull::None));
    let led = Output::new(led_pin, Level::Low, OutputConfig::default());

    let mut controller = ScanController::new(
        sonar::Sonar::new(trig, echo),
        servo::Servo::new(servo_channel),
        annunciator::LedBuzzer::new(led, buzzer_channel),
    );
    controller.run(&RADAR_STATE, &SAMPLE_QUEUE).await
}

/// Poll the two buttons; A starts scanning, B stops it.
#[embassy_executor::task]
async fn button_task(a_pin: AnyPin<'static>, b_pin: AnyPin<'static>) {
    let config = InputConfig::default().with_pull(Pull::Up);
    let buttons = [
        (Input::new(a_pin, config), ButtonPress::A),
        (Input::new(b_pin, config), ButtonPress::B),
    ];
    let mut was_pressed = [false; 2];
    let mut debouncer = Debouncer::new();

    loop {
        for (i, (input, press)) in buttons.iter().enumerate() {
            let pressed = input.is_low();
            if pressed && !was_pressed[i] && debouncer.accept(Instant::now().as_millis()) {
                control::apply_button(&RADAR_STATE, *press).await;
            }
            was_pressed[i] = pressed;
        }
        Timer::after(Duration::from_millis(BUTTON_POLL_MS)).await;
    }
}

/// Publish the current state once per period while scanning.
#[embassy_executor::task]
async fn telemetry_task() {
    let output_tx = OUTPUT_CHANNEL.sender();
    loop {
        Timer::after(Duration::from_millis(TELEMETRY_PERIOD_MS)).await;

        match comm::telemetry_frame(&RADAR_STATE, Duration::from_millis(LOCK_TIMEOUT_MS)).await {
            Ok(Some(frame)) => {
                let _ = output_tx.try_send(frame);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Telemetry skipped: {}", e),
        }
    }
}

/// Serial output task: logs each message and forwards a clone to BLE.
#[embassy_executor::task]
async fn output_serial_task() {
    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;

        // Drops if full or no client
        if BLE_CLIENTS.load(Ordering::Relaxed) > 0 {
            let _ = BLE_OUTPUT_CHANNEL.try_send(msg.clone());
        }

        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("[{}] {}", comm::DATA_TOPIC, s.trim_end());
        }
    }
}

/// Status report at boot and every 30 seconds.
#[embassy_executor::task]
async fn status_task() {
    loop {
        match RADAR_STATE
            .snapshot_within(Duration::from_millis(LOCK_TIMEOUT_MS))
            .await
        {
            Ok(status) => {
                let msg = DeviceMessage::Status {
                    scanning: status.scan_enabled,
                    alarm: status.alarm,
                    uptime: (Instant::now().as_millis() / 1000) as u32,
                    ble_clients: BLE_CLIENTS.load(Ordering::Relaxed),
                    board: board::BOARD_NAME,
                    version: VERSION,
                };
                match comm::frame(&msg) {
                    Ok(buf) => {
                        let _ = OUTPUT_CHANNEL.try_send(buf);
                    }
                    Err(e) => log::warn!("Status message: {}", e),
                }
            }
            Err(e) => log::warn!("Status skipped: {}", e),
        }

        Timer::after(Duration::from_secs(30)).await;
    }
}
