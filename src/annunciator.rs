/// Local alarm annunciator: status LED plus a passive buzzer on LEDC.
///
/// Levels come from [`Blinker`]; the LEDC duty is only rewritten when the
/// buzzer actually changes state.
use embassy_time::Instant;
use esp_hal::gpio::{Level, Output};
use esp_hal::ledc::channel::{Channel, ChannelIFace};
use esp_hal::ledc::LowSpeed;

use crate::alarm::{AlarmState, Blinker};
use crate::board;
use crate::scanner::Annunciator;

/// 50% duty is loudest for a passive buzzer
const BUZZER_ON_PCT: u8 = 50;

pub struct LedBuzzer<'d> {
    led: Output<'d>,
    buzzer: Channel<'d, LowSpeed>,
    blinker: Blinker,
    buzzing: bool,
}

impl<'d> LedBuzzer<'d> {
    pub fn new(led: Output<'d>, buzzer: Channel<'d, LowSpeed>) -> Self {
        let mut this = Self {
            led,
            buzzer,
            blinker: Blinker::new(),
            buzzing: false,
        };
        this.set_led(false);
        this
    }

    fn set_led(&mut self, on: bool) {
        self.led.set_level(Level::from(on != board::LED_ACTIVE_LOW));
    }
}

impl Annunciator for LedBuzzer<'_> {
    fn set_indicator(&mut self, severity: AlarmState) {
        let levels = self.blinker.update(severity, Instant::now().as_millis());
        self.set_led(levels.led);

        if levels.buzzer != self.buzzing {
            let duty = if levels.buzzer { BUZZER_ON_PCT } else { 0 };
            match self.buzzer.set_duty(duty) {
                Ok(()) => self.buzzing = levels.buzzer,
                Err(e) => log::warn!("Buzzer duty error: {:?}", e),
            }
        }
    }
}
