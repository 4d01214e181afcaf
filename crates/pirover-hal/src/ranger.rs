//! Ultrasonic range finding (HC-SR04 style trigger/echo sensors).
//!
//! A sample is one trigger pulse followed by timing how long the echo pin
//! stays high. The round trip is converted to centimetres with the speed of
//! sound and halved. A sample that does not complete within the timeout is
//! "no reading", which is not an error.

use std::time::{Duration, Instant};

use pirover_types::RoverError;

/// Speed of sound at room temperature, cm/s.
pub const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RANGE_CM: f64 = 400.0;

/// A source of obstacle distances.
///
/// `Ok(None)` is a missed reading (timeout, malformed echo); `Err` is a
/// fault talking to the device. Both are retried by the caller.
pub trait RangeSensor: Send {
    fn sample(&mut self) -> Result<Option<f64>, RoverError>;
}

/// The two GPIO lines of a trigger/echo sensor.
pub trait EchoPins: Send {
    /// Emit the ~10 µs trigger pulse.
    fn trigger(&mut self) -> Result<(), RoverError>;

    /// Current level of the echo line.
    fn echo_high(&mut self) -> Result<bool, RoverError>;
}

/// Convert an echo round-trip time into a distance in centimetres.
///
/// Returns `None` when the round trip exceeds `timeout`. Distances beyond
/// `max_range_cm` are clamped.
pub fn distance_from_echo(round_trip: Duration, timeout: Duration, max_range_cm: f64) -> Option<f64> {
    if round_trip > timeout {
        return None;
    }
    let cm = round_trip.as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0;
    Some(cm.min(max_range_cm))
}

/// Blocking ranger over a pair of [`EchoPins`].
///
/// `sample` busy-waits on the echo line for up to the timeout, so callers in
/// async code must run it on the blocking pool.
pub struct UltrasonicRanger<P> {
    pins: P,
    timeout: Duration,
    max_range_cm: f64,
}

impl<P: EchoPins> UltrasonicRanger<P> {
    pub fn new(pins: P) -> Self {
        Self {
            pins,
            timeout: DEFAULT_ECHO_TIMEOUT,
            max_range_cm: DEFAULT_MAX_RANGE_CM,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_range(mut self, max_range_cm: f64) -> Self {
        self.max_range_cm = max_range_cm;
        self
    }

    /// Spin until the echo line reaches `level` or `deadline` passes.
    fn wait_for(&mut self, level: bool, deadline: Instant) -> Result<Option<Instant>, RoverError> {
        loop {
            if self.pins.echo_high()? == level {
                return Ok(Some(Instant::now()));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::hint::spin_loop();
        }
    }
}

impl<P: EchoPins> RangeSensor for UltrasonicRanger<P> {
    fn sample(&mut self) -> Result<Option<f64>, RoverError> {
        self.pins.trigger()?;
        let deadline = Instant::now() + self.timeout;

        let Some(rise) = self.wait_for(true, deadline)? else {
            return Ok(None);
        };
        let Some(fall) = self.wait_for(false, deadline)? else {
            return Ok(None);
        };
        Ok(distance_from_echo(
            fall.saturating_duration_since(rise),
            self.timeout,
            self.max_range_cm,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echo pins that replay a fixed sequence of levels, then hold the last.
    struct ScriptedPins {
        levels: Vec<bool>,
        cursor: usize,
        triggers: usize,
    }

    impl ScriptedPins {
        fn new(levels: Vec<bool>) -> Self {
            Self {
                levels,
                cursor: 0,
                triggers: 0,
            }
        }
    }

    impl EchoPins for ScriptedPins {
        fn trigger(&mut self) -> Result<(), RoverError> {
            self.triggers += 1;
            Ok(())
        }

        fn echo_high(&mut self) -> Result<bool, RoverError> {
            let level = self
                .levels
                .get(self.cursor)
                .or_else(|| self.levels.last())
                .copied()
                .unwrap_or(false);
            self.cursor += 1;
            Ok(level)
        }
    }

    #[test]
    fn one_millisecond_round_trip_is_seventeen_cm() {
        let d = distance_from_echo(Duration::from_millis(1), DEFAULT_ECHO_TIMEOUT, 400.0).unwrap();
        assert!((d - 17.15).abs() < 1e-9);
    }

    #[test]
    fn long_echo_is_clamped_to_max_range() {
        let d = distance_from_echo(Duration::from_millis(50), DEFAULT_ECHO_TIMEOUT, 400.0).unwrap();
        assert!((d - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn echo_past_timeout_is_no_reading() {
        assert!(distance_from_echo(Duration::from_millis(101), DEFAULT_ECHO_TIMEOUT, 400.0).is_none());
    }

    #[test]
    fn silent_echo_line_times_out() {
        let mut ranger =
            UltrasonicRanger::new(ScriptedPins::new(vec![false])).with_timeout(Duration::from_millis(5));
        assert_eq!(ranger.sample().unwrap(), None);
        assert_eq!(ranger.pins.triggers, 1);
    }

    #[test]
    fn stuck_high_echo_times_out() {
        let mut ranger =
            UltrasonicRanger::new(ScriptedPins::new(vec![true])).with_timeout(Duration::from_millis(5));
        assert_eq!(ranger.sample().unwrap(), None);
    }

    #[test]
    fn short_pulse_yields_small_distance() {
        let mut ranger = UltrasonicRanger::new(ScriptedPins::new(vec![false, true, true, false]));
        let d = ranger.sample().unwrap().expect("pulse completes well inside the timeout");
        assert!((0.0..5.0).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn configured_max_range_clamps_readings() {
        let mut ranger = UltrasonicRanger::new(ScriptedPins::new(vec![false, true, true, false]))
            .with_max_range(0.0);
        assert_eq!(ranger.sample().unwrap(), Some(0.0));
    }
}
