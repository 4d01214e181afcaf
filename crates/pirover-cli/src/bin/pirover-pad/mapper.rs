//! [`StickMapper`] – turns raw controller input into drive intents.
//!
//! Axes and triggers report `0..=255`; sticks rest at [`STICK_CENTER`]. The
//! Y axis grows downwards, so it is inverted before use.

use pirover_types::{Direction, DriveIntent};

pub const STICK_CENTER: i32 = 127;
pub const DEFAULT_DEADZONE: i32 = 20;
/// Trigger movement (in raw units) needed to change the speed.
pub const TRIGGER_STEP: i32 = 10;
pub const DPAD_SPEED: u8 = 80;
pub const DEFAULT_SPEED: u8 = 70;

/// Stateful mapper: remembers the last intent sent so repeats are dropped.
#[derive(Debug, Clone)]
pub struct StickMapper {
    deadzone: i32,
    speed: u8,
    last_trigger: i32,
    last_sent: Option<DriveIntent>,
}

impl Default for StickMapper {
    fn default() -> Self {
        Self::new(DEFAULT_DEADZONE)
    }
}

impl StickMapper {
    pub fn new(deadzone: i32) -> Self {
        Self {
            deadzone,
            speed: DEFAULT_SPEED,
            last_trigger: 0,
            last_sent: None,
        }
    }

    /// Speed used by [`button`](Self::button) presses.
    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: u8) {
        self.speed = speed.min(100);
    }

    /// Map a stick position.
    ///
    /// Inside the deadzone on both axes the stick means `stop`. Otherwise the
    /// dominant axis picks the direction and the deflection magnitude the
    /// speed. Returns `None` when the result repeats the last intent or the
    /// dominant axis sits exactly on the deadzone edge.
    pub fn stick(&mut self, x: u8, y: u8) -> Option<DriveIntent> {
        let dx = i32::from(x) - STICK_CENTER;
        let dy = -(i32::from(y) - STICK_CENTER);

        if dx.abs() < self.deadzone && dy.abs() < self.deadzone {
            return self.send(Direction::Stop, self.speed);
        }

        let magnitude = f64::from(dx * dx + dy * dy).sqrt();
        let speed = ((magnitude / f64::from(STICK_CENTER)) * 100.0).min(100.0) as u8;

        let direction = if dy.abs() > dx.abs() {
            match dy {
                d if d > self.deadzone => Direction::Forward,
                d if d < -self.deadzone => Direction::Backward,
                _ => return None,
            }
        } else {
            match dx {
                d if d > self.deadzone => Direction::Right,
                d if d < -self.deadzone => Direction::Left,
                _ => return None,
            }
        };
        self.send(direction, speed)
    }

    /// Map a trigger position to a new button speed.
    ///
    /// Returns the new speed when the trigger moved by more than
    /// [`TRIGGER_STEP`] since the last accepted value.
    pub fn trigger(&mut self, value: u8) -> Option<u8> {
        let value = i32::from(value);
        if (value - self.last_trigger).abs() <= TRIGGER_STEP {
            return None;
        }
        self.last_trigger = value;
        self.speed = (value * 100 / 255) as u8;
        Some(self.speed)
    }

    /// D-pad press: fixed speed.
    pub fn dpad(&mut self, direction: Direction) -> Option<DriveIntent> {
        self.send(direction, DPAD_SPEED)
    }

    /// Keyboard or face-button press at the current speed.
    pub fn button(&mut self, direction: Direction) -> Option<DriveIntent> {
        self.send(direction, self.speed)
    }

    /// Forget the last intent so the next one is always sent.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }

    fn send(&mut self, direction: Direction, speed: u8) -> Option<DriveIntent> {
        let intent = DriveIntent::new(direction, i64::from(speed)).ok()?;
        if self.last_sent == Some(intent) {
            return None;
        }
        self.last_sent = Some(intent);
        Some(intent)
    }
}
