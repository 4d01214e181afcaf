//! [`DriveActuator`] and the servo-backed [`DriveTrain`].
//!
//! # Differential-drive mapping
//!
//! The rover has one continuous-rotation servo per side, mounted mirrored,
//! so "forward" means the left servo spins above neutral and the right one
//! below it. With `s = speed / 100`:
//!
//! | direction | left | right |
//! |---|---|---|
//! | forward | 7.5 + 2.5·s | 7.5 − 2.5·s |
//! | backward | 7.5 − 2.5·s | 7.5 + 2.5·s |
//! | left | 7.5 − 2.5·s | 7.5 − 2.5·s |
//! | right | 7.5 + 2.5·s | 7.5 + 2.5·s |
//! | stop | 7.5 | 7.5 |

use pirover_types::{Direction, DriveIntent, RoverError};
use tracing::{debug, warn};

use crate::servo::ServoChannel;

/// Duty cycle (percent) at which the servos hold still.
pub const NEUTRAL_DUTY: f64 = 7.5;
/// Duty cycle offset from neutral at full speed.
pub const DUTY_SPAN: f64 = 2.5;

/// Anything that can turn a [`DriveIntent`] into wheel motion.
///
/// Fire-and-forget: implementations do not report back what the wheels
/// actually did.
pub trait DriveActuator: Send {
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when an output cannot be written.
    fn drive(&mut self, intent: &DriveIntent) -> Result<(), RoverError>;
}

/// Left/right duty cycles for one intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelLevels {
    pub left: f64,
    pub right: f64,
}

impl WheelLevels {
    pub const NEUTRAL: WheelLevels = WheelLevels {
        left: NEUTRAL_DUTY,
        right: NEUTRAL_DUTY,
    };
}

/// Compute the duty cycles for `direction` at `speed_percent`.
///
/// Speeds above 100 are clamped rather than rejected; validation belongs to
/// the command boundary.
pub fn wheel_levels(direction: Direction, speed_percent: u8) -> WheelLevels {
    let delta = DUTY_SPAN * f64::from(speed_percent.min(100)) / 100.0;
    let (left, right) = match direction {
        Direction::Forward => (NEUTRAL_DUTY + delta, NEUTRAL_DUTY - delta),
        Direction::Backward => (NEUTRAL_DUTY - delta, NEUTRAL_DUTY + delta),
        Direction::Left => (NEUTRAL_DUTY - delta, NEUTRAL_DUTY - delta),
        Direction::Right => (NEUTRAL_DUTY + delta, NEUTRAL_DUTY + delta),
        Direction::Stop => (NEUTRAL_DUTY, NEUTRAL_DUTY),
    };
    WheelLevels { left, right }
}

/// Two-servo differential drive.
pub struct DriveTrain {
    left: Box<dyn ServoChannel>,
    right: Box<dyn ServoChannel>,
}

impl DriveTrain {
    pub fn new(left: Box<dyn ServoChannel>, right: Box<dyn ServoChannel>) -> Self {
        Self { left, right }
    }

    /// Duty cycles currently applied to the two servos.
    pub fn levels(&self) -> WheelLevels {
        WheelLevels {
            left: self.left.duty_cycle(),
            right: self.right.duty_cycle(),
        }
    }
}

impl DriveActuator for DriveTrain {
    fn drive(&mut self, intent: &DriveIntent) -> Result<(), RoverError> {
        let levels = wheel_levels(intent.direction, intent.speed_percent);
        debug!(
            direction = %intent.direction,
            speed = intent.speed_percent,
            left = levels.left,
            right = levels.right,
            "drive"
        );
        self.left.set_duty_cycle(levels.left)?;
        if let Err(e) = self.right.set_duty_cycle(levels.right) {
            // Never leave one wheel spinning on its own.
            if let Err(back) = self.left.set_duty_cycle(NEUTRAL_DUTY) {
                warn!(error = %back, "left wheel could not be returned to neutral");
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimServo;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn train() -> DriveTrain {
        DriveTrain::new(
            Box::new(SimServo::new("left_wheel")),
            Box::new(SimServo::new("right_wheel")),
        )
    }

    #[test]
    fn full_forward_hits_span_limits() {
        let l = wheel_levels(Direction::Forward, 100);
        assert!(approx(l.left, 10.0));
        assert!(approx(l.right, 5.0));
    }

    #[test]
    fn forward_and_backward_mirror_around_neutral() {
        for speed in [0u8, 1, 35, 70, 100] {
            let f = wheel_levels(Direction::Forward, speed);
            let b = wheel_levels(Direction::Backward, speed);
            assert!(approx(f.left - NEUTRAL_DUTY, NEUTRAL_DUTY - b.left));
            assert!(approx(f.right - NEUTRAL_DUTY, NEUTRAL_DUTY - b.right));
        }
    }

    #[test]
    fn turns_spin_both_wheels_the_same_way() {
        let l = wheel_levels(Direction::Left, 60);
        assert!(approx(l.left, 6.0));
        assert!(approx(l.right, 6.0));
        let r = wheel_levels(Direction::Right, 60);
        assert!(approx(r.left, 9.0));
        assert!(approx(r.right, 9.0));
    }

    #[test]
    fn speed_above_hundred_is_clamped() {
        assert_eq!(
            wheel_levels(Direction::Forward, 250),
            wheel_levels(Direction::Forward, 100)
        );
    }

    #[test]
    fn stop_is_neutral_after_any_prior_state() {
        let mut drive = train();
        drive
            .drive(&DriveIntent::new(Direction::Right, 90).unwrap())
            .unwrap();
        assert_ne!(drive.levels(), WheelLevels::NEUTRAL);

        drive.drive(&DriveIntent::stop()).unwrap();
        assert_eq!(drive.levels(), WheelLevels::NEUTRAL);
    }

    #[test]
    fn faulty_servo_surfaces_hardware_fault() {
        let mut drive = DriveTrain::new(
            Box::new(SimServo::new("left_wheel")),
            Box::new(SimServo::faulty("right_wheel")),
        );
        let err = drive
            .drive(&DriveIntent::new(Direction::Forward, 50).unwrap())
            .unwrap_err();
        assert!(matches!(err, RoverError::HardwareFault { ref component, .. } if component == "right_wheel"));
        assert!(approx(drive.levels().left, NEUTRAL_DUTY), "left wheel must not keep spinning");
    }
}
