use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The five drive directions the command channel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "stop" => Ok(Direction::Stop),
            other => Err(RoverError::InvalidCommand(format!(
                "unknown direction '{other}'"
            ))),
        }
    }
}

/// A single drive request: where to go and how hard to push the wheels.
///
/// Only exists for the duration of one dispatch through the command arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveIntent {
    pub direction: Direction,
    /// Wheel effort in percent, `0..=100`.
    pub speed_percent: u8,
}

impl DriveIntent {
    /// Neutral output on both wheels.
    pub const STOP: DriveIntent = DriveIntent {
        direction: Direction::Stop,
        speed_percent: 0,
    };

    /// Validate `speed_percent` and build an intent.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::InvalidCommand`] when the speed lies outside
    /// `0..=100`.
    pub fn new(direction: Direction, speed_percent: i64) -> Result<Self, RoverError> {
        if !(0..=100).contains(&speed_percent) {
            return Err(RoverError::InvalidCommand(format!(
                "speed {speed_percent} outside 0..=100"
            )));
        }
        Ok(Self {
            direction,
            speed_percent: speed_percent as u8,
        })
    }

    pub fn stop() -> Self {
        Self::STOP
    }

    pub fn is_stop(&self) -> bool {
        self.direction == Direction::Stop
    }
}

/// Who is asking for a drive command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    /// Operator input arriving over the command channel.
    Manual,
    /// The home navigator.
    Autonomous,
}

/// A GPS position report.
///
/// "No fix" is modelled as the absence of a `GpsFix`; a report with zero
/// satellites is never a fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub satellites: u8,
    pub timestamp: DateTime<Utc>,
}

impl GpsFix {
    /// `true` when the report carries usable coordinates.
    pub fn is_valid(&self) -> bool {
        self.satellites > 0 && self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// The saved return-to-home target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomeMark {
    pub latitude: f64,
    pub longitude: f64,
    pub set_at: DateTime<Utc>,
}

impl HomeMark {
    pub fn from_fix(fix: &GpsFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            set_at: Utc::now(),
        }
    }
}

/// Latest successful range reading and the derived warning flag.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObstacleState {
    pub distance_cm: f64,
    pub warning_active: bool,
}

/// Why the command arbiter refused a drive intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Manual input while a return-to-home session owns the wheels.
    NavigationInProgress,
    /// Forward motion into an obstacle while avoidance is enabled.
    ObstacleBlocked,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NavigationInProgress => f.write_str("navigation in progress"),
            RejectReason::ObstacleBlocked => f.write_str("obstacle blocked"),
        }
    }
}

/// Reasons a return-to-home session could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationError {
    NoHomeOrNoFix,
    AlreadyNavigating,
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationError::NoHomeOrNoFix => f.write_str("no home position or no GPS fix"),
            NavigationError::AlreadyNavigating => f.write_str("already navigating"),
        }
    }
}

/// Outbound notifications, serialised as `{"event": .., "data": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    ObstacleDetected {
        distance: f64,
    },
    Blocked {
        reason: RejectReason,
    },
    NavigationStarted {
        home: HomeMark,
    },
    NavigationUpdate {
        /// Metres to the home mark.
        distance: f64,
        /// Degrees clockwise from north, `0..360`.
        bearing: f64,
    },
    NavigationComplete,
    NavigationCancelled,
    NavigationAborted {
        reason: String,
    },
    HomeSet {
        position: HomeMark,
    },
    HomeCleared,
    GpsError {
        message: String,
    },
    LightsChanged {
        on: bool,
    },
    AvoidanceChanged {
        enabled: bool,
    },
    RecordingChanged {
        recording: bool,
    },
}

/// Envelope routed over the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"pirover-kernel::arbiter"`
    pub source: String,
    pub payload: Notification,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Read-only view of the whole shared state, returned by the status query.
///
/// Serialised with camelCase keys (`obstacleWarning`, `hasHome`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub distance: f64,
    pub obstacle_warning: bool,
    pub lights_on: bool,
    pub avoidance_enabled: bool,
    pub is_recording: bool,
    pub position: Option<GpsFix>,
    pub has_home: bool,
    pub navigation_active: bool,
}

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Invalid Command: {0}")]
    InvalidCommand(String),

    #[error("Rejected: {0}")]
    Rejected(RejectReason),

    #[error("Navigation Error: {0}")]
    Navigation(NavigationError),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Config Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64, satellites: u8) -> GpsFix {
        GpsFix {
            latitude: lat,
            longitude: lon,
            altitude_m: None,
            speed_kmh: None,
            satellites,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("Forward".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!(" stop ".parse::<Direction>().unwrap(), Direction::Stop);
    }

    #[test]
    fn unknown_direction_is_invalid_command() {
        let err = "sideways".parse::<Direction>().unwrap_err();
        assert!(matches!(err, RoverError::InvalidCommand(ref m) if m.contains("sideways")));
    }

    #[test]
    fn drive_intent_rejects_out_of_range_speed() {
        assert!(DriveIntent::new(Direction::Forward, 101).is_err());
        assert!(DriveIntent::new(Direction::Forward, -1).is_err());
        let ok = DriveIntent::new(Direction::Left, 100).unwrap();
        assert_eq!(ok.speed_percent, 100);
    }

    #[test]
    fn zero_satellite_report_is_not_a_fix() {
        assert!(!fix(52.0, 13.0, 0).is_valid());
        // A fix at the null island is still a fix.
        assert!(fix(0.0, 0.0, 4).is_valid());
    }

    #[test]
    fn notification_wire_format_is_event_and_data() {
        let json = serde_json::to_value(Notification::ObstacleDetected { distance: 12.5 }).unwrap();
        assert_eq!(json["event"], "obstacle_detected");
        assert_eq!(json["data"]["distance"], 12.5);

        let json = serde_json::to_value(Notification::Blocked {
            reason: RejectReason::ObstacleBlocked,
        })
        .unwrap();
        assert_eq!(json["data"]["reason"], "obstacle_blocked");

        let json = serde_json::to_value(Notification::NavigationComplete).unwrap();
        assert_eq!(json["event"], "navigation_complete");
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "pirover-runtime::navigator",
            Notification::NavigationUpdate {
                distance: 42.0,
                bearing: 90.0,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn rover_error_display() {
        let err = RoverError::Navigation(NavigationError::NoHomeOrNoFix);
        assert!(err.to_string().contains("no home position"));

        let err = RoverError::HardwareFault {
            component: "left_wheel".to_string(),
            details: "pwm write failed".to_string(),
        };
        assert!(err.to_string().contains("left_wheel"));
    }
}
