//! [`CommandArbiter`] – the single path from drive requests to the wheels.
//!
//! Manual input from the command channel and autonomous input from the home
//! navigator both go through [`CommandArbiter::submit`]. The arbiter runs the
//! [`Interlocks`] chain, drops identical consecutive intents, and only then
//! touches the [`DriveActuator`]. A rejected intent never reaches the drive.
//!
//! [`CommandArbiter::halt`] is the unconditional stop used by the safety paths
//! (obstacle edge, navigator exit, shutdown); it skips the interlocks.

use std::sync::{Arc, Mutex, MutexGuard};

use pirover_hal::DriveActuator;
use pirover_middleware::NotificationBus;
use pirover_types::{CommandSource, DriveIntent, Notification, RejectReason, RoverError};
use tracing::{debug, warn};

use crate::interlock::Interlocks;
use crate::rover_state::{RangeUpdate, RoverState};

const SOURCE: &str = "pirover-kernel::arbiter";

/// What happened to an accepted intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Forwarded to the drive.
    Actuated,
    /// Same as the last intent; the drive already has it.
    Suppressed,
}

struct DriveSlot {
    actuator: Box<dyn DriveActuator>,
    last: Option<DriveIntent>,
}

pub struct CommandArbiter {
    state: Arc<RoverState>,
    interlocks: Interlocks,
    bus: NotificationBus,
    slot: Mutex<DriveSlot>,
    dedup: bool,
}

impl CommandArbiter {
    /// Build an arbiter with the standard interlock chain.
    pub fn new(
        state: Arc<RoverState>,
        actuator: Box<dyn DriveActuator>,
        bus: NotificationBus,
    ) -> Self {
        Self::with_interlocks(state, actuator, bus, Interlocks::standard())
    }

    pub fn with_interlocks(
        state: Arc<RoverState>,
        actuator: Box<dyn DriveActuator>,
        bus: NotificationBus,
        interlocks: Interlocks,
    ) -> Self {
        Self {
            state,
            interlocks,
            bus,
            slot: Mutex::new(DriveSlot {
                actuator,
                last: None,
            }),
            dedup: true,
        }
    }

    /// Turn suppression of identical consecutive intents on or off.
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn state(&self) -> &Arc<RoverState> {
        &self.state
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    fn slot(&self) -> MutexGuard<'_, DriveSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Evaluate `intent` from `source` and forward it to the drive if allowed.
    ///
    /// # Errors
    ///
    /// - [`RoverError::Rejected`] when an interlock refuses the intent. An
    ///   obstacle rejection also emits `blocked` on the bus.
    /// - [`RoverError::HardwareFault`] when the drive write fails.
    pub fn submit(&self, intent: DriveIntent, source: CommandSource) -> Result<Dispatch, RoverError> {
        // Verify under the slot: the state the interlocks saw is the state the
        // drive acts in.
        let mut slot = self.slot();
        if let Err(reason) = self.interlocks.verify(&intent, source, &self.state) {
            drop(slot);
            if reason == RejectReason::ObstacleBlocked {
                self.bus.emit(SOURCE, Notification::Blocked { reason });
            }
            return Err(RoverError::Rejected(reason));
        }

        if self.dedup && !intent.is_stop() && slot.last == Some(intent) {
            return Ok(Dispatch::Suppressed);
        }
        if let Err(e) = slot.actuator.drive(&intent) {
            // Unknown wheel state: make sure the next intent is written.
            slot.last = None;
            warn!(error = %e, direction = %intent.direction, "drive actuation failed");
            return Err(e);
        }
        slot.last = Some(intent);
        debug!(
            direction = %intent.direction,
            speed = intent.speed_percent,
            ?source,
            "drive intent dispatched"
        );
        Ok(Dispatch::Actuated)
    }

    /// Raise the navigation flag. `false` when a session already holds it.
    ///
    /// Serialised with [`submit`](Self::submit), so no manual intent verified
    /// before the flag went up can reach the drive after it.
    pub fn begin_navigation(&self) -> bool {
        let _slot = self.slot();
        self.state.try_begin_navigation()
    }

    /// Store a range reading, serialised with [`submit`](Self::submit).
    pub fn record_distance(&self, distance_cm: f64) -> RangeUpdate {
        let _slot = self.slot();
        self.state.record_distance(distance_cm)
    }

    /// Stop the wheels unconditionally.
    ///
    /// # Errors
    ///
    /// [`RoverError::HardwareFault`] when the drive write fails.
    pub fn halt(&self) -> Result<(), RoverError> {
        let mut slot = self.slot();
        let result = slot.actuator.drive(&DriveIntent::STOP);
        slot.last = result.is_ok().then_some(DriveIntent::STOP);
        if let Err(e) = &result {
            warn!(error = %e, "halt failed");
        }
        result
    }

    /// The last intent that reached the drive.
    pub fn last_dispatched(&self) -> Option<DriveIntent> {
        self.slot().last
    }
}
