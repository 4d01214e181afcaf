//! [`Interlocks`] – ordered safety rules for drive intents.
//!
//! Every registered [`Interlock`] is evaluated in insertion order; the first
//! one that objects decides the [`RejectReason`] and the intent never reaches
//! the drive.
//!
//! The standard chain is:
//!
//! 1. [`NavigationInterlock`] – manual input is refused while a return-to-home
//!    session owns the wheels.
//! 2. [`ObstacleInterlock`] – forward motion is refused while the obstacle
//!    warning is up and avoidance is enabled.

use pirover_types::{CommandSource, Direction, DriveIntent, RejectReason};
use tracing::debug;

use crate::rover_state::RoverState;

pub trait Interlock: Send + Sync {
    fn name(&self) -> &str;

    fn check(
        &self,
        intent: &DriveIntent,
        source: CommandSource,
        state: &RoverState,
    ) -> Result<(), RejectReason>;
}

#[derive(Default)]
pub struct Interlocks {
    rules: Vec<Box<dyn Interlock>>,
}

impl Interlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigation first, then obstacle.
    pub fn standard() -> Self {
        let mut interlocks = Self::new();
        interlocks.add(Box::new(NavigationInterlock));
        interlocks.add(Box::new(ObstacleInterlock));
        interlocks
    }

    pub fn add(&mut self, rule: Box<dyn Interlock>) {
        self.rules.push(rule);
    }

    pub fn verify(
        &self,
        intent: &DriveIntent,
        source: CommandSource,
        state: &RoverState,
    ) -> Result<(), RejectReason> {
        for rule in &self.rules {
            if let Err(reason) = rule.check(intent, source, state) {
                debug!(rule = rule.name(), %reason, direction = %intent.direction, ?source, "interlock tripped");
                return Err(reason);
            }
        }
        Ok(())
    }
}

pub struct NavigationInterlock;

impl Interlock for NavigationInterlock {
    fn name(&self) -> &str {
        "navigation"
    }

    fn check(
        &self,
        _intent: &DriveIntent,
        source: CommandSource,
        state: &RoverState,
    ) -> Result<(), RejectReason> {
        if source == CommandSource::Manual && state.navigation_active() {
            return Err(RejectReason::NavigationInProgress);
        }
        Ok(())
    }
}

pub struct ObstacleInterlock;

impl Interlock for ObstacleInterlock {
    fn name(&self) -> &str {
        "obstacle"
    }

    fn check(
        &self,
        intent: &DriveIntent,
        _source: CommandSource,
        state: &RoverState,
    ) -> Result<(), RejectReason> {
        if intent.direction == Direction::Forward
            && state.avoidance_enabled()
            && state.obstacle().warning_active
        {
            return Err(RejectReason::ObstacleBlocked);
        }
        Ok(())
    }
}
