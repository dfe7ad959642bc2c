/// HC-SR04 ultrasonic ranger on two GPIOs.
///
/// A read blocks for at most two echo timeouts (about 60 ms) and is only
/// taken on sampling steps.
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, Output};
use esp_hal::time::Instant;

use crate::board;
use crate::scanner::DistanceSensor;

pub struct Sonar<'d> {
    trig: Output<'d>,
    echo: Input<'d>,
    delay: Delay,
}

impl<'d> Sonar<'d> {
    pub fn new(trig: Output<'d>, echo: Input<'d>) -> Self {
        Self {
            trig,
            echo,
            delay: Delay::new(),
        }
    }

    /// Busy-wait until the echo line reaches `high`. Returns when it did,
    /// or `None` on timeout.
    fn wait_for(&self, high: bool, since: Instant) -> Option<Instant> {
        loop {
            if self.echo.is_high() == high {
                return Some(Instant::now());
            }
            if since.elapsed().as_micros() >= board::SONAR_TIMEOUT_US {
                return None;
            }
        }
    }
}

impl DistanceSensor for Sonar<'_> {
    fn read_distance(&mut self) -> f32 {
        self.trig.set_low();
        self.delay.delay_micros(2);
        self.trig.set_high();
        self.delay.delay_micros(board::SONAR_TRIGGER_US);
        self.trig.set_low();

        let Some(rise) = self.wait_for(true, Instant::now()) else {
            return board::SONAR_NO_ECHO;
        };
        let Some(fall) = self.wait_for(false, rise) else {
            return board::SONAR_NO_ECHO;
        };
        board::echo_to_cm((fall - rise).as_micros())
    }
}
