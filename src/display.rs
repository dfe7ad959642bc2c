/// Radar screen for M5StickC Plus2 (ST7789V2, 135x240, SPI).
///
/// Draws a half-disc plot with the sweep line and a trail of recent
/// targets, plus a header with the status label and readout. Direct SPI
/// writes, no framebuffer (64KB would exceed the ESP32's heap).
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Arc, PrimitiveStyle, Rectangle, Sector};
use embedded_graphics::text::Text;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use mipidsi::interface::SpiInterface;
use mipidsi::models::ST7789;
use mipidsi::options::{ColorInversion, ColorOrder, Orientation, Rotation};
use mipidsi::Builder;

use embassy_time::{Duration, Instant, Timer};

use crate::alarm::AlarmState;
use crate::board;
use crate::defaults::{LOCK_TIMEOUT_MS, QUEUE_WAIT_MS};
use crate::state::RadarSample;
use crate::view::{self, RadarView, StaleRefresh, PLOT_RADIUS_PX};

/// Landscape width after 90-degree rotation
const W: i32 = 240;

/// Top of the plot area, below the header
const PLOT_TOP: i32 = 24;

/// Plot pixels per model pixel
const SCALE: u32 = 2;

/// Sweep origin: bottom centre
const ORIGIN: Point = Point::new(W / 2, 134);

/// Redraw pause between frames
const FRAME_PAUSE_MS: u64 = 10;

/// Colors
const BG: Rgb565 = Rgb565::BLACK;
const GRID: Rgb565 = Rgb565::new(0, 16, 0);
const SWEEP: Rgb565 = Rgb565::GREEN;
const BLIP: Rgb565 = Rgb565::YELLOW;
const TEXT: Rgb565 = Rgb565::WHITE;

#[embassy_executor::task]
pub async fn display_task(
    spi2: esp_hal::peripherals::SPI2<'static>,
    mosi: esp_hal::peripherals::GPIO15<'static>,
    clk: esp_hal::peripherals::GPIO13<'static>,
    cs_pin: esp_hal::peripherals::GPIO5<'static>,
    dc_pin: esp_hal::peripherals::GPIO14<'static>,
    rst_pin: esp_hal::peripherals::GPIO12<'static>,
    bl_pin: esp_hal::peripherals::GPIO27<'static>,
) {
    let _bl = Output::new(bl_pin, Level::High, OutputConfig::default());

    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_mhz(board::DISPLAY_SPI_FREQ_MHZ))
        .with_mode(Mode::_0);
    let spi = match Spi::new(spi2, spi_config) {
        Ok(spi) => spi.with_sck(clk).with_mosi(mosi),
        Err(e) => {
            log::error!("Display SPI config error: {:?}", e);
            return;
        }
    };

    let cs = Output::new(cs_pin, Level::High, OutputConfig::default());
    let Ok(spi_device) = ExclusiveDevice::new_no_delay(spi, cs) else {
        log::error!("Display SPI device error");
        return;
    };

    let dc = Output::new(dc_pin, Level::Low, OutputConfig::default());
    let mut buffer = [0u8; 512];
    let di = SpiInterface::new(spi_device, dc, &mut buffer);

    let rst = Output::new(rst_pin, Level::High, OutputConfig::default());
    let mut delay = Delay::new();
    let mut display = match Builder::new(ST7789, di)
        .display_size(board::DISPLAY_WIDTH, board::DISPLAY_HEIGHT)
        .display_offset(52, 40)
        .invert_colors(ColorInversion::Inverted)
        .color_order(ColorOrder::Bgr)
        .orientation(Orientation::new().rotate(Rotation::Deg90))
        .reset_pin(rst)
        .init(&mut delay)
    {
        Ok(d) => d,
        Err(e) => {
            log::error!("Display init error: {:?}", e);
            return;
        }
    };

    log::info!("Display initialized (240x135 landscape)");
    let _ = display.clear(BG);
    draw_label(&mut display, view::idle_label(true));

    let mut radar = RadarView::new();
    let mut stale = StaleRefresh::new();

    loop {
        match view::next_frame(&crate::SAMPLE_QUEUE, Duration::from_millis(QUEUE_WAIT_MS)).await {
            Some(sample) => {
                radar.update(sample);
                draw_radar(&mut display, &radar, &sample);
            }
            None if stale.due(Instant::now().as_millis()) => {
                match crate::RADAR_STATE
                    .snapshot_within(Duration::from_millis(LOCK_TIMEOUT_MS))
                    .await
                {
                    Ok(status) => draw_label(&mut display, view::idle_label(status.scan_enabled)),
                    Err(e) => log::warn!("Display refresh skipped: {}", e),
                }
            }
            None => {}
        }
        Timer::after(Duration::from_millis(FRAME_PAUSE_MS)).await;
    }
}

/// Screen angle for a sweep angle. embedded-graphics measures angles
/// clockwise from 3 o'clock, the sweep runs counter-clockwise.
fn screen_angle(sweep_deg: u16) -> Angle {
    Angle::from_degrees(-(sweep_deg as f32))
}

fn draw_label(display: &mut impl DrawTarget<Color = Rgb565>, label: &str) {
    let _ = Rectangle::new(Point::zero(), Size::new(60, PLOT_TOP as u32))
        .into_styled(PrimitiveStyle::with_fill(BG))
        .draw(display);
    let _ = Text::new(label, Point::new(2, 18), MonoTextStyle::new(&FONT_10X20, TEXT))
        .draw(display);
}

fn draw_radar(
    display: &mut impl DrawTarget<Color = Rgb565>,
    radar: &RadarView,
    sample: &RadarSample,
) {
    let _ = display.clear(BG);

    // ── Header ──────────────────────────────────────────────────────────
    let label_color = match sample.alarm {
        AlarmState::Danger => Rgb565::RED,
        AlarmState::Warning => Rgb565::YELLOW,
        AlarmState::Safe => TEXT,
    };
    let _ = Text::new(
        view::status_label(sample.alarm, sample.system),
        Point::new(2, 18),
        MonoTextStyle::new(&FONT_10X20, label_color),
    )
    .draw(display);
    let readout = view::readout(sample);
    let _ = Text::new(&readout, Point::new(70, 18), MonoTextStyle::new(&FONT_10X20, TEXT))
        .draw(display);

    // ── Range rings ─────────────────────────────────────────────────────
    let outer = PLOT_RADIUS_PX * SCALE;
    for diameter in [outer, outer * 2] {
        let _ = Arc::with_center(
            ORIGIN,
            diameter,
            Angle::from_degrees(-180.0),
            Angle::from_degrees(180.0),
        )
        .into_styled(PrimitiveStyle::with_stroke(GRID, 1))
        .draw(display);
    }

    // ── Sweep line: a one-degree sector ─────────────────────────────────
    let _ = Sector::with_center(
        ORIGIN,
        outer * 2,
        screen_angle(sample.angle) - Angle::from_degrees(0.5),
        Angle::from_degrees(1.0),
    )
    .into_styled(PrimitiveStyle::with_fill(SWEEP))
    .draw(display);

    // ── Target trail: short thick arcs at each blip's range ─────────────
    for blip in radar.blips() {
        let diameter = (blip.radius_px * SCALE * 2).max(2);
        let _ = Arc::with_center(
            ORIGIN,
            diameter,
            screen_angle(blip.angle) - Angle::from_degrees(2.0),
            Angle::from_degrees(4.0),
        )
        .into_styled(PrimitiveStyle::with_stroke(BLIP, 3))
        .draw(display);
    }
}
