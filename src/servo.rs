/// Hobby servo on an LEDC channel (50 Hz, 14-bit).
use esp_hal::ledc::channel::{Channel, ChannelHW};
use esp_hal::ledc::LowSpeed;

use crate::board;
use crate::scanner::Actuator;

pub struct Servo<'d> {
    channel: Channel<'d, LowSpeed>,
}

impl<'d> Servo<'d> {
    /// `channel` must run on a timer configured for
    /// [`board::SERVO_FREQ_HZ`] at [`board::SERVO_DUTY_BITS`].
    pub fn new(channel: Channel<'d, LowSpeed>) -> Self {
        Self { channel }
    }
}

impl Actuator for Servo<'_> {
    fn set_angle(&mut self, angle: u16) {
        self.channel
            .set_duty_hw(board::servo_duty(angle, board::SERVO_DUTY_BITS));
    }
}
