//! [`Rover`] – wires the kernel, the navigator and the sensor tasks together
//! and answers the command channel.
//!
//! Inbound requests arrive as [`RoverCommand`]s in any order; each is handled
//! synchronously against the shared state and either acknowledged, answered
//! with a status snapshot, or rejected with a [`RoverError`]. The periodic
//! work (range monitor, position feed) runs as background tasks started with
//! [`Rover::start_sensors`] and stopped by [`Rover::shutdown`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pirover_hal::{DriveActuator, PositionSource, RangeSensor, Relay};
use pirover_kernel::{CommandArbiter, RoverState};
use pirover_middleware::NotificationBus;
use pirover_types::{
    CommandSource, DriveIntent, NavigationError, Notification, RoverError, StatusSnapshot,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::navigator::{HomeNavigator, NavigatorConfig};
use crate::position_feed::{PositionFeed, PositionFeedConfig};
use crate::range_monitor::{RangeMonitor, RangeMonitorConfig};

const SOURCE: &str = "pirover-runtime::rover";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RoverConfig {
    pub warning_threshold_cm: f64,
    /// Initial state of the avoidance flag.
    pub avoidance_enabled: bool,
    /// Suppress identical consecutive drive intents.
    pub dedup: bool,
    pub range: RangeMonitorConfig,
    pub position: PositionFeedConfig,
    pub navigator: NavigatorConfig,
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            warning_threshold_cm: 20.0,
            avoidance_enabled: false,
            dedup: true,
            range: RangeMonitorConfig::default(),
            position: PositionFeedConfig::default(),
            navigator: NavigatorConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Every request the command channel can make.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoverCommand {
    Drive(DriveIntent),
    SetAvoidance(bool),
    ToggleLights,
    SetHome,
    ClearHome,
    ReturnHome,
    CancelReturn,
    StartRecording,
    StopRecording,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Ack,
    Status(StatusSnapshot),
}

// ─────────────────────────────────────────────────────────────────────────────
// Rover
// ─────────────────────────────────────────────────────────────────────────────

pub struct Rover {
    arbiter: Arc<CommandArbiter>,
    navigator: HomeNavigator,
    lights: Mutex<Box<dyn Relay>>,
    config: RoverConfig,
    shutdown: CancelToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Rover {
    pub fn new(
        config: RoverConfig,
        drive: Box<dyn DriveActuator>,
        lights: Box<dyn Relay>,
        bus: NotificationBus,
    ) -> Self {
        let state = Arc::new(RoverState::new(
            config.warning_threshold_cm,
            config.avoidance_enabled,
        ));
        let arbiter = Arc::new(CommandArbiter::new(state, drive, bus).with_dedup(config.dedup));
        let navigator = HomeNavigator::new(Arc::clone(&arbiter), config.navigator);
        Self {
            arbiter,
            navigator,
            lights: Mutex::new(lights),
            config,
            shutdown: CancelToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &Arc<RoverState> {
        self.arbiter.state()
    }

    pub fn bus(&self) -> &NotificationBus {
        self.arbiter.bus()
    }

    pub fn navigator(&self) -> &HomeNavigator {
        &self.navigator
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the range monitor and the position feed.
    pub fn start_sensors(&self, ranger: Box<dyn RangeSensor>, gps: Box<dyn PositionSource>) {
        let monitor = RangeMonitor::new(ranger, Arc::clone(&self.arbiter), self.config.range);
        let feed = PositionFeed::new(gps, Arc::clone(self.state()), self.config.position);
        let mut tasks = self.tasks();
        tasks.push(tokio::spawn(monitor.run(self.shutdown.clone())));
        tasks.push(tokio::spawn(feed.run(self.shutdown.clone())));
    }

    /// Handle one inbound request.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation rejects with: invalid or refused
    /// drive intents, navigation preconditions, hardware faults.
    pub fn handle(&self, command: RoverCommand) -> Result<CommandReply, RoverError> {
        let state = self.state();
        match command {
            RoverCommand::Drive(intent) => {
                self.arbiter.submit(intent, CommandSource::Manual)?;
            }
            RoverCommand::SetAvoidance(enabled) => {
                state.set_avoidance(enabled);
                info!(enabled, "obstacle avoidance toggled");
                self.emit(Notification::AvoidanceChanged { enabled });
            }
            RoverCommand::ToggleLights => {
                let on = self
                    .lights
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .toggle()?;
                state.set_lights(on);
                self.emit(Notification::LightsChanged { on });
            }
            RoverCommand::SetHome => {
                let mark = state
                    .set_home_from_current(self.config.navigator.max_fix_age)
                    .inspect_err(|_| self.report_missing_fix("cannot set home"))?;
                info!(lat = mark.latitude, lon = mark.longitude, "home position set");
                self.emit(Notification::HomeSet { position: mark });
            }
            RoverCommand::ClearHome => {
                if state.clear_home()?.is_some() {
                    self.emit(Notification::HomeCleared);
                }
            }
            RoverCommand::ReturnHome => {
                self.navigator.start().inspect_err(|e| {
                    if *e == RoverError::Navigation(NavigationError::NoHomeOrNoFix) {
                        self.report_missing_fix("cannot return home");
                    }
                })?;
            }
            RoverCommand::CancelReturn => {
                self.navigator.cancel();
            }
            RoverCommand::StartRecording | RoverCommand::StopRecording => {
                let recording = command == RoverCommand::StartRecording;
                state.set_recording(recording);
                self.emit(Notification::RecordingChanged { recording });
            }
            RoverCommand::Status => return Ok(CommandReply::Status(state.snapshot())),
        }
        Ok(CommandReply::Ack)
    }

    /// Stop every task, end any navigation session and leave the wheels at
    /// neutral.
    pub async fn shutdown(&self) {
        info!("rover shutting down");
        self.shutdown.cancel();
        if self.navigator.cancel() {
            self.navigator.wait().await;
        }
        let tasks: Vec<_> = self.tasks().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
                warn!("background task did not stop in time");
            }
        }
        if let Err(e) = self.arbiter.halt() {
            warn!(error = %e, "final stop failed");
        }
    }

    fn emit(&self, notification: Notification) {
        self.bus().emit(SOURCE, notification);
    }

    fn report_missing_fix(&self, context: &str) {
        if self
            .state()
            .current_fix(self.config.navigator.max_fix_age)
            .is_none()
        {
            self.emit(Notification::GpsError {
                message: format!("{context}: no GPS fix"),
            });
        }
    }
}
