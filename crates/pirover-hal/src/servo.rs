//! `ServoChannel` trait for continuous-rotation wheel servos driven by a PWM
//! duty cycle.
//!
//! Drivers implement this trait and are handed to a
//! [`DriveTrain`][crate::drive::DriveTrain]. Nothing above the HAL ever sees a
//! raw duty cycle.

use pirover_types::RoverError;

/// One PWM channel feeding a continuous-rotation servo.
///
/// The duty cycle is expressed in percent of the PWM period. `7.5` is the
/// neutral (stopped) position on the servos the rover uses.
pub trait ServoChannel: Send {
    /// Stable identifier, e.g. `"left_wheel"`.
    fn id(&self) -> &str;

    /// Write a new duty cycle.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the PWM write fails.
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), RoverError>;

    /// Last duty cycle written to the channel.
    fn duty_cycle(&self) -> f64;
}
