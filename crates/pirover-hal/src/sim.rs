//! In-process simulated drivers for tests and bench runs without a Pi.
//!
//! Every simulated driver that a test needs to steer or observe from outside
//! hands out a cheap cloneable handle sharing its state:
//!
//! | Driver | Handle | Used for |
//! |---|---|---|
//! | [`SimDrive`] | [`DriveLog`] | asserting which intents reached the wheels |
//! | [`SimRangeSensor`] | [`SimRangeHandle`] | placing or removing an obstacle |
//! | [`SimPositionSource`] | [`SimGpsHandle`] | moving the rover, losing the fix |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pirover_types::{DriveIntent, GpsFix, RoverError};

use crate::drive::{DriveActuator, WheelLevels, wheel_levels};
use crate::gps::PositionSource;
use crate::ranger::RangeSensor;
use crate::relay::Relay;
use crate::servo::ServoChannel;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Servo / relay
// ────────────────────────────────────────────────────────────────────────────

/// A PWM channel that remembers the last duty cycle.
pub struct SimServo {
    id: String,
    duty: f64,
    faulty: bool,
}

impl SimServo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            duty: crate::drive::NEUTRAL_DUTY,
            faulty: false,
        }
    }

    /// A channel whose every write fails.
    pub fn faulty(id: impl Into<String>) -> Self {
        Self {
            faulty: true,
            ..Self::new(id)
        }
    }
}

impl ServoChannel for SimServo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), RoverError> {
        if self.faulty {
            return Err(RoverError::HardwareFault {
                component: self.id.clone(),
                details: "simulated PWM failure".to_string(),
            });
        }
        self.duty = percent;
        Ok(())
    }

    fn duty_cycle(&self) -> f64 {
        self.duty
    }
}

/// An on/off output whose state can be read back through a shared flag.
pub struct SimRelay {
    id: String,
    state: Arc<AtomicBool>,
}

impl SimRelay {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared view of the output level.
    pub fn probe(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.state)
    }
}

impl Relay for SimRelay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_state(&mut self, on: bool) -> Result<(), RoverError> {
        self.state.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Drive
// ────────────────────────────────────────────────────────────────────────────

/// Shared record of every intent that reached a [`SimDrive`].
#[derive(Clone, Default)]
pub struct DriveLog {
    intents: Arc<Mutex<Vec<DriveIntent>>>,
}

impl DriveLog {
    pub fn all(&self) -> Vec<DriveIntent> {
        lock(&self.intents).clone()
    }

    pub fn last(&self) -> Option<DriveIntent> {
        lock(&self.intents).last().copied()
    }

    pub fn len(&self) -> usize {
        lock(&self.intents).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wheel levels the last actuation produced, neutral if none.
    pub fn levels(&self) -> WheelLevels {
        self.last()
            .map(|i| wheel_levels(i.direction, i.speed_percent))
            .unwrap_or(WheelLevels::NEUTRAL)
    }
}

/// A drive actuator that records instead of moving.
#[derive(Default)]
pub struct SimDrive {
    log: DriveLog,
    faulty: bool,
}

impl SimDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// A drive whose every actuation fails with a hardware fault.
    pub fn faulty() -> Self {
        Self {
            faulty: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> DriveLog {
        self.log.clone()
    }
}

impl DriveActuator for SimDrive {
    fn drive(&mut self, intent: &DriveIntent) -> Result<(), RoverError> {
        if self.faulty {
            return Err(RoverError::HardwareFault {
                component: "sim_drive".to_string(),
                details: "simulated actuator failure".to_string(),
            });
        }
        lock(&self.log.intents).push(*intent);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Range sensor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum RangeReading {
    Distance(Option<f64>),
    Fault,
}

/// Steers what a [`SimRangeSensor`] reports.
#[derive(Clone)]
pub struct SimRangeHandle {
    reading: Arc<Mutex<RangeReading>>,
}

impl SimRangeHandle {
    /// Report `cm` on every following sample.
    pub fn set_distance(&self, cm: f64) {
        *lock(&self.reading) = RangeReading::Distance(Some(cm));
    }

    /// Make every following sample a missed reading.
    pub fn set_no_echo(&self) {
        *lock(&self.reading) = RangeReading::Distance(None);
    }

    /// Make every following sample fail with a hardware fault.
    pub fn set_fault(&self) {
        *lock(&self.reading) = RangeReading::Fault;
    }
}

pub struct SimRangeSensor {
    reading: Arc<Mutex<RangeReading>>,
}

impl SimRangeSensor {
    pub fn new(initial_cm: f64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(RangeReading::Distance(Some(initial_cm)))),
        }
    }

    pub fn handle(&self) -> SimRangeHandle {
        SimRangeHandle {
            reading: Arc::clone(&self.reading),
        }
    }
}

impl RangeSensor for SimRangeSensor {
    fn sample(&mut self) -> Result<Option<f64>, RoverError> {
        match *lock(&self.reading) {
            RangeReading::Distance(d) => Ok(d),
            RangeReading::Fault => Err(RoverError::HardwareFault {
                component: "sim_ranger".to_string(),
                details: "simulated echo pin failure".to_string(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Position source
// ────────────────────────────────────────────────────────────────────────────

/// Steers what a [`SimPositionSource`] reports.
#[derive(Clone)]
pub struct SimGpsHandle {
    fix: Arc<Mutex<Option<(f64, f64)>>>,
}

impl SimGpsHandle {
    pub fn set_position(&self, latitude: f64, longitude: f64) {
        *lock(&self.fix) = Some((latitude, longitude));
    }

    pub fn lose_fix(&self) {
        *lock(&self.fix) = None;
    }
}

/// A receiver that reports a settable position once per `interval`.
pub struct SimPositionSource {
    fix: Arc<Mutex<Option<(f64, f64)>>>,
    interval: Duration,
    satellites: u8,
}

impl SimPositionSource {
    /// A source with a fix at (`latitude`, `longitude`).
    pub fn fixed(latitude: f64, longitude: f64) -> Self {
        Self {
            fix: Arc::new(Mutex::new(Some((latitude, longitude)))),
            interval: Duration::from_secs(1),
            satellites: 8,
        }
    }

    /// A source that has not acquired a fix yet.
    pub fn without_fix() -> Self {
        Self {
            fix: Arc::new(Mutex::new(None)),
            interval: Duration::from_secs(1),
            satellites: 8,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn handle(&self) -> SimGpsHandle {
        SimGpsHandle {
            fix: Arc::clone(&self.fix),
        }
    }
}

#[async_trait]
impl PositionSource for SimPositionSource {
    async fn next_fix(&mut self) -> Result<Option<GpsFix>, RoverError> {
        tokio::time::sleep(self.interval).await;
        let current = *lock(&self.fix);
        Ok(current.map(|(latitude, longitude)| GpsFix {
            latitude,
            longitude,
            altitude_m: None,
            speed_kmh: Some(0.0),
            satellites: self.satellites,
            timestamp: Utc::now(),
        }))
    }
}
