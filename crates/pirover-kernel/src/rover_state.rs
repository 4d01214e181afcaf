//! [`RoverState`] – the shared record every task reads and writes.
//!
//! Each record has its own lock (or atomic), so a writer on one record never
//! blocks a reader of another. There is no cross-record atomicity: a snapshot
//! may mix a distance from one sensor cycle with a position from another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use pirover_types::{
    GpsFix, HomeMark, NavigationError, ObstacleState, RejectReason, RoverError, StatusSnapshot,
};
use tracing::debug;

/// Obstacle distance below which the warning flag is raised, in cm.
pub const DEFAULT_WARNING_THRESHOLD_CM: f64 = 20.0;

/// Result of feeding one range reading into the state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeUpdate {
    pub state: ObstacleState,
    /// `true` only on the false→true edge of the warning flag.
    pub warning_raised: bool,
}

pub struct RoverState {
    obstacle: Mutex<ObstacleState>,
    position: Mutex<Option<GpsFix>>,
    home: Mutex<Option<HomeMark>>,
    navigation_active: AtomicBool,
    avoidance_enabled: AtomicBool,
    lights_on: AtomicBool,
    recording: AtomicBool,
    warning_threshold_cm: f64,
}

// A panicking writer cannot leave a half-written record behind: every update
// is computed first and stored with a single assignment.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RoverState {
    pub fn new(warning_threshold_cm: f64, avoidance_enabled: bool) -> Self {
        Self {
            obstacle: Mutex::new(ObstacleState {
                distance_cm: 0.0,
                warning_active: false,
            }),
            position: Mutex::new(None),
            home: Mutex::new(None),
            navigation_active: AtomicBool::new(false),
            avoidance_enabled: AtomicBool::new(avoidance_enabled),
            lights_on: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            warning_threshold_cm,
        }
    }

    // -----------------------------------------------------------------------
    // Obstacle
    // -----------------------------------------------------------------------

    /// Store a successful range reading and derive the warning flag.
    pub fn record_distance(&self, distance_cm: f64) -> RangeUpdate {
        let next = ObstacleState {
            distance_cm,
            warning_active: distance_cm < self.warning_threshold_cm,
        };
        let previous = std::mem::replace(&mut *lock(&self.obstacle), next);
        RangeUpdate {
            state: next,
            warning_raised: next.warning_active && !previous.warning_active,
        }
    }

    pub fn obstacle(&self) -> ObstacleState {
        *lock(&self.obstacle)
    }

    pub fn warning_threshold_cm(&self) -> f64 {
        self.warning_threshold_cm
    }

    // -----------------------------------------------------------------------
    // Position and home
    // -----------------------------------------------------------------------

    pub fn set_position(&self, fix: Option<GpsFix>) {
        *lock(&self.position) = fix.filter(GpsFix::is_valid);
    }

    /// Last stored position, however old.
    pub fn position(&self) -> Option<GpsFix> {
        *lock(&self.position)
    }

    /// The stored position if it is no older than `max_age`.
    pub fn current_fix(&self, max_age: Duration) -> Option<GpsFix> {
        let fix = self.position()?;
        let age = Utc::now().signed_duration_since(fix.timestamp);
        match age.to_std() {
            Ok(age) if age > max_age => None,
            // Negative age means the receiver clock runs ahead; still fresh.
            _ => Some(fix),
        }
    }

    /// Mark the current position as home, replacing any previous mark.
    ///
    /// # Errors
    ///
    /// [`NavigationError::NoHomeOrNoFix`] when there is no current fix.
    pub fn set_home_from_current(&self, max_age: Duration) -> Result<HomeMark, RoverError> {
        let fix = self
            .current_fix(max_age)
            .ok_or(RoverError::Navigation(NavigationError::NoHomeOrNoFix))?;
        let mark = HomeMark::from_fix(&fix);
        *lock(&self.home) = Some(mark);
        debug!(lat = mark.latitude, lon = mark.longitude, "home set");
        Ok(mark)
    }

    pub fn home(&self) -> Option<HomeMark> {
        *lock(&self.home)
    }

    /// Forget the home mark. Returns the mark that was removed, if any.
    ///
    /// # Errors
    ///
    /// Rejected with [`RejectReason::NavigationInProgress`] while a
    /// return-to-home session is running.
    pub fn clear_home(&self) -> Result<Option<HomeMark>, RoverError> {
        if self.navigation_active() {
            return Err(RoverError::Rejected(RejectReason::NavigationInProgress));
        }
        Ok(lock(&self.home).take())
    }

    // -----------------------------------------------------------------------
    // Flags
    // -----------------------------------------------------------------------

    /// Claim the navigation flag. `false` if a session already holds it.
    pub fn try_begin_navigation(&self) -> bool {
        self.navigation_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_navigation(&self) {
        self.navigation_active.store(false, Ordering::SeqCst);
    }

    pub fn navigation_active(&self) -> bool {
        self.navigation_active.load(Ordering::SeqCst)
    }

    pub fn set_avoidance(&self, enabled: bool) {
        self.avoidance_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn avoidance_enabled(&self) -> bool {
        self.avoidance_enabled.load(Ordering::SeqCst)
    }

    pub fn set_lights(&self, on: bool) {
        self.lights_on.store(on, Ordering::SeqCst);
    }

    pub fn lights_on(&self) -> bool {
        self.lights_on.load(Ordering::SeqCst)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Read-only view of every record. No side effects.
    pub fn snapshot(&self) -> StatusSnapshot {
        let obstacle = self.obstacle();
        StatusSnapshot {
            distance: obstacle.distance_cm,
            obstacle_warning: obstacle.warning_active,
            lights_on: self.lights_on(),
            avoidance_enabled: self.avoidance_enabled(),
            is_recording: self.recording(),
            position: self.position(),
            has_home: self.home().is_some(),
            navigation_active: self.navigation_active(),
        }
    }
}

impl Default for RoverState {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_THRESHOLD_CM, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESH: Duration = Duration::from_secs(5);

    fn fix(lat: f64, lon: f64) -> GpsFix {
        GpsFix {
            latitude: lat,
            longitude: lon,
            altitude_m: None,
            speed_kmh: None,
            satellites: 6,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn warning_edge_is_reported_once() {
        let state = RoverState::default();
        assert!(!state.record_distance(50.0).warning_raised);

        let update = state.record_distance(12.0);
        assert!(update.warning_raised);
        assert!(update.state.warning_active);

        // Still close: flag stays up but no new edge.
        assert!(!state.record_distance(10.0).warning_raised);
        assert!(state.obstacle().warning_active);

        assert!(!state.record_distance(30.0).state.warning_active);
        assert!(state.record_distance(5.0).warning_raised);
    }

    #[test]
    fn threshold_is_strict() {
        let state = RoverState::new(20.0, true);
        assert!(!state.record_distance(20.0).state.warning_active);
        assert!(state.record_distance(19.99).state.warning_active);
    }

    #[test]
    fn zero_satellite_fix_is_not_stored() {
        let state = RoverState::default();
        let mut bad = fix(1.0, 1.0);
        bad.satellites = 0;
        state.set_position(Some(bad));
        assert!(state.position().is_none());
    }

    #[test]
    fn stale_fix_is_not_current() {
        let state = RoverState::default();
        let mut old = fix(1.0, 1.0);
        old.timestamp = Utc::now() - chrono::Duration::seconds(30);
        state.set_position(Some(old));
        assert!(state.position().is_some());
        assert!(state.current_fix(FRESH).is_none());
    }

    #[test]
    fn set_home_requires_fix_and_overwrites() {
        let state = RoverState::default();
        let err = state.set_home_from_current(FRESH).unwrap_err();
        assert_eq!(err, RoverError::Navigation(NavigationError::NoHomeOrNoFix));
        assert!(state.home().is_none());

        state.set_position(Some(fix(10.0, 20.0)));
        state.set_home_from_current(FRESH).unwrap();
        state.set_home_from_current(FRESH).unwrap();
        state.set_position(Some(fix(11.0, 21.0)));
        let mark = state.set_home_from_current(FRESH).unwrap();
        assert_eq!(state.home().unwrap().latitude, mark.latitude);
        assert!((mark.latitude - 11.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clear_home_rejected_while_navigating() {
        let state = RoverState::default();
        state.set_position(Some(fix(10.0, 20.0)));
        state.set_home_from_current(FRESH).unwrap();

        assert!(state.try_begin_navigation());
        assert_eq!(
            state.clear_home().unwrap_err(),
            RoverError::Rejected(RejectReason::NavigationInProgress)
        );
        state.end_navigation();
        assert!(state.clear_home().unwrap().is_some());
        assert!(state.clear_home().unwrap().is_none());
    }

    #[test]
    fn navigation_flag_is_exclusive() {
        let state = RoverState::default();
        assert!(state.try_begin_navigation());
        assert!(!state.try_begin_navigation());
        state.end_navigation();
        assert!(state.try_begin_navigation());
    }

    #[test]
    fn snapshot_reflects_every_record() {
        let state = RoverState::new(20.0, true);
        state.record_distance(15.0);
        state.set_lights(true);
        state.set_recording(true);
        state.set_position(Some(fix(0.0, 0.0)));

        let snap = state.snapshot();
        assert!((snap.distance - 15.0).abs() < f64::EPSILON);
        assert!(snap.obstacle_warning);
        assert!(snap.lights_on);
        assert!(snap.avoidance_enabled);
        assert!(snap.is_recording);
        assert!(snap.position.is_some());
        assert!(!snap.has_home);
        assert!(!snap.navigation_active);

        // Reading twice changes nothing.
        assert_eq!(snap, state.snapshot());
    }
}
