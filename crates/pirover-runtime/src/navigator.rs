//! [`HomeNavigator`] – autonomous return-to-home.
//!
//! # State machine
//!
//! ```text
//!   Idle ──start──▶ Navigating ──┬─▶ Arrived   ─┐
//!    ▲                           ├─▶ Cancelled ─┤
//!    │                           └─▶ Aborted   ─┤
//!    └──────────────────────────────────────────┘
//! ```
//!
//! Each tick of a session, in order:
//!
//! 1. Check the cancel token.
//! 2. Read the current fix and the home mark; emit `navigation_update` with
//!    the distance and bearing from here to home.
//! 3. Inside the arrival radius: stop, Arrived.
//! 4. Obstacle warning with avoidance enabled: stop, pause, turn right, drive
//!    forward (an open-loop escape).
//! 5. Otherwise: drive as the [`HeadingStrategy`] says.
//! 6. Sleep one period.
//!
//! Without a current fix a tick stops the wheels and emits `gps_error`; after
//! `gps_loss_timeout` without a fix the session is Aborted.
//!
//! Every wait races the cancel token, and every exit path halts the drive and
//! clears the navigation flag before the terminal notification goes out.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pirover_kernel::CommandArbiter;
use pirover_types::{
    CommandSource, Direction, DriveIntent, GpsFix, HomeMark, NavigationError, Notification,
    RoverError,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::geo::{self, Course};

const SOURCE: &str = "pirover-runtime::navigator";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct NavigatorConfig {
    pub tick: Duration,
    pub arrival_radius_m: f64,
    pub cruise_speed: u8,
    pub escape_pause: Duration,
    pub escape_turn_speed: u8,
    pub escape_turn: Duration,
    pub escape_forward_speed: u8,
    pub escape_forward: Duration,
    /// How long the fix may stay missing before the session is aborted.
    pub gps_loss_timeout: Duration,
    /// A stored fix older than this counts as missing.
    pub max_fix_age: Duration,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            arrival_radius_m: 3.0,
            cruise_speed: 50,
            escape_pause: Duration::from_millis(500),
            escape_turn_speed: 60,
            escape_turn: Duration::from_secs(1),
            escape_forward_speed: 50,
            escape_forward: Duration::from_secs(1),
            gps_loss_timeout: Duration::from_secs(10),
            max_fix_age: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Arrived,
    Cancelled,
    Aborted(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Heading strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Decides how to drive toward home when nothing is in the way.
///
/// The rover carries no compass, so the bearing alone cannot tell which way
/// it is facing. Implementations with an orientation source can plug in here.
pub trait HeadingStrategy: Send + Sync {
    fn steer(&self, course: &Course, fix: &GpsFix) -> DriveIntent;
}

/// Always drive forward at a fixed speed.
pub struct DriveStraight {
    pub speed: u8,
}

impl HeadingStrategy for DriveStraight {
    fn steer(&self, _course: &Course, _fix: &GpsFix) -> DriveIntent {
        DriveIntent {
            direction: Direction::Forward,
            speed_percent: self.speed.min(100),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HomeNavigator
// ─────────────────────────────────────────────────────────────────────────────

struct Session {
    cancel: CancelToken,
    handle: Option<JoinHandle<NavigationOutcome>>,
}

pub struct HomeNavigator {
    arbiter: Arc<CommandArbiter>,
    strategy: Arc<dyn HeadingStrategy>,
    config: NavigatorConfig,
    session: Mutex<Option<Session>>,
}

impl HomeNavigator {
    /// Navigator with the [`DriveStraight`] strategy at cruise speed.
    pub fn new(arbiter: Arc<CommandArbiter>, config: NavigatorConfig) -> Self {
        let strategy = Arc::new(DriveStraight {
            speed: config.cruise_speed,
        });
        Self::with_strategy(arbiter, config, strategy)
    }

    pub fn with_strategy(
        arbiter: Arc<CommandArbiter>,
        config: NavigatorConfig,
        strategy: Arc<dyn HeadingStrategy>,
    ) -> Self {
        Self {
            arbiter,
            strategy,
            config,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.arbiter.state().navigation_active()
    }

    /// Start a return-to-home session.
    ///
    /// # Errors
    ///
    /// - [`NavigationError::AlreadyNavigating`] while a session runs; the
    ///   running session is left alone.
    /// - [`NavigationError::NoHomeOrNoFix`] without a home mark or a current
    ///   fix.
    pub fn start(&self) -> Result<HomeMark, RoverError> {
        // Held until the session is stored, so a concurrent `cancel` always
        // finds the session it raced with.
        let mut session = self.session();
        let state = self.arbiter.state();
        if state.navigation_active() {
            return Err(RoverError::Navigation(NavigationError::AlreadyNavigating));
        }
        let (Some(home), Some(_)) = (state.home(), state.current_fix(self.config.max_fix_age)) else {
            return Err(RoverError::Navigation(NavigationError::NoHomeOrNoFix));
        };
        if !self.arbiter.begin_navigation() {
            return Err(RoverError::Navigation(NavigationError::AlreadyNavigating));
        }

        info!(lat = home.latitude, lon = home.longitude, "return to home started");
        self.arbiter
            .bus()
            .emit(SOURCE, Notification::NavigationStarted { home });

        let cancel = CancelToken::new();
        let task = SessionTask {
            arbiter: Arc::clone(&self.arbiter),
            strategy: Arc::clone(&self.strategy),
            config: self.config,
            cancel: cancel.clone(),
        };
        *session = Some(Session {
            cancel,
            handle: Some(tokio::spawn(task.run())),
        });
        Ok(home)
    }

    /// Ask the running session to stop. Returns `false` when idle.
    pub fn cancel(&self) -> bool {
        let session = self.session();
        if !self.is_active() {
            return false;
        }
        match session.as_ref() {
            Some(session) => {
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the most recent session to finish.
    ///
    /// Returns `None` when no session was started or its outcome was already
    /// collected.
    pub async fn wait(&self) -> Option<NavigationOutcome> {
        let handle = self.session().as_mut().and_then(|s| s.handle.take())?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "navigation task failed");
                // The task died before its cleanup ran.
                self.arbiter.state().end_navigation();
                Some(NavigationOutcome::Aborted(e.to_string()))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session loop
// ─────────────────────────────────────────────────────────────────────────────

struct SessionTask {
    arbiter: Arc<CommandArbiter>,
    strategy: Arc<dyn HeadingStrategy>,
    config: NavigatorConfig,
    cancel: CancelToken,
}

impl SessionTask {
    async fn run(self) -> NavigationOutcome {
        let outcome = self.navigate().await;

        if let Err(e) = self.arbiter.halt() {
            warn!(error = %e, "stop after navigation failed");
        }
        self.arbiter.state().end_navigation();

        let notification = match &outcome {
            NavigationOutcome::Arrived => Notification::NavigationComplete,
            NavigationOutcome::Cancelled => Notification::NavigationCancelled,
            NavigationOutcome::Aborted(reason) => Notification::NavigationAborted {
                reason: reason.clone(),
            },
        };
        info!(?outcome, "return to home finished");
        self.arbiter.bus().emit(SOURCE, notification);
        outcome
    }

    async fn navigate(&self) -> NavigationOutcome {
        let state = self.arbiter.state();
        let mut fix_lost_at: Option<Instant> = None;

        loop {
            if self.cancel.is_cancelled() {
                return NavigationOutcome::Cancelled;
            }
            let Some(home) = state.home() else {
                return NavigationOutcome::Aborted("home position cleared".to_string());
            };

            match state.current_fix(self.config.max_fix_age) {
                None => {
                    self.halt();
                    let lost_at = *fix_lost_at.get_or_insert_with(Instant::now);
                    self.arbiter.bus().emit(
                        SOURCE,
                        Notification::GpsError {
                            message: "GPS fix lost during navigation".to_string(),
                        },
                    );
                    if lost_at.elapsed() > self.config.gps_loss_timeout {
                        return NavigationOutcome::Aborted(format!(
                            "no GPS fix for more than {}s",
                            self.config.gps_loss_timeout.as_secs()
                        ));
                    }
                }
                Some(fix) => {
                    fix_lost_at = None;
                    let course = geo::course((fix.latitude, fix.longitude), (home.latitude, home.longitude));
                    debug!(distance_m = course.distance_m, bearing = course.bearing_deg, "navigation tick");
                    self.arbiter.bus().emit(
                        SOURCE,
                        Notification::NavigationUpdate {
                            distance: course.distance_m,
                            bearing: course.bearing_deg,
                        },
                    );

                    if course.distance_m < self.config.arrival_radius_m {
                        return NavigationOutcome::Arrived;
                    }

                    let obstacle = state.obstacle();
                    if obstacle.warning_active && state.avoidance_enabled() {
                        info!(distance_cm = obstacle.distance_cm, "obstacle on the way home, escaping");
                        if !self.escape().await {
                            return NavigationOutcome::Cancelled;
                        }
                    } else {
                        self.submit(self.strategy.steer(&course, &fix));
                    }
                }
            }

            if !self.cancel.sleep(self.config.tick).await {
                return NavigationOutcome::Cancelled;
            }
        }
    }

    /// Stop, pause, turn right, push forward. `false` if cancelled midway.
    async fn escape(&self) -> bool {
        self.halt();
        if !self.cancel.sleep(self.config.escape_pause).await {
            return false;
        }
        self.submit(DriveIntent {
            direction: Direction::Right,
            speed_percent: self.config.escape_turn_speed,
        });
        if !self.cancel.sleep(self.config.escape_turn).await {
            return false;
        }
        self.submit(DriveIntent {
            direction: Direction::Forward,
            speed_percent: self.config.escape_forward_speed,
        });
        self.cancel.sleep(self.config.escape_forward).await
    }

    fn submit(&self, intent: DriveIntent) {
        if let Err(e) = self.arbiter.submit(intent, CommandSource::Autonomous) {
            debug!(error = %e, direction = %intent.direction, "autonomous intent not applied");
        }
    }

    fn halt(&self) {
        if let Err(e) = self.arbiter.halt() {
            warn!(error = %e, "navigator stop failed");
        }
    }
}
