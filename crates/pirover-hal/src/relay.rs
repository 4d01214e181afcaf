//! `Relay` trait for discrete on/off outputs such as the front LED.

use pirover_types::RoverError;

pub trait Relay: Send {
    /// Stable identifier, e.g. `"front_led"`.
    fn id(&self) -> &str;

    /// Switch the output on (`true`) or off.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the GPIO write fails.
    fn set_state(&mut self, on: bool) -> Result<(), RoverError>;

    fn state(&self) -> bool;

    /// Flip the output and return the new state.
    fn toggle(&mut self) -> Result<bool, RoverError> {
        let next = !self.state();
        self.set_state(next)?;
        Ok(next)
    }
}
