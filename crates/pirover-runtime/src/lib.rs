//! `pirover-runtime` – the rover's periodic tasks and autonomous behaviour.
//!
//! # Modules
//!
//! - [`geo`] – haversine distance and forward-azimuth bearing.
//! - [`cancel`] – [`CancelToken`][cancel::CancelToken]: cooperative
//!   cancellation raced against every wait.
//! - [`range_monitor`] – [`RangeMonitor`][range_monitor::RangeMonitor]:
//!   samples the ultrasonic ranger and stops the rover on a new obstacle.
//! - [`position_feed`] – [`PositionFeed`][position_feed::PositionFeed]:
//!   copies GPS fixes into the shared state.
//! - [`navigator`] – [`HomeNavigator`][navigator::HomeNavigator]: the
//!   return-to-home state machine.
//! - [`rover`] – [`Rover`][rover::Rover]: owns all of the above and handles
//!   command-channel requests.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: subscriber
//!   setup with optional OTLP export.

pub mod cancel;
pub mod geo;
pub mod navigator;
pub mod position_feed;
pub mod range_monitor;
pub mod rover;
pub mod telemetry;

pub use cancel::CancelToken;
pub use navigator::{DriveStraight, HeadingStrategy, HomeNavigator, NavigationOutcome, NavigatorConfig};
pub use position_feed::{PositionFeed, PositionFeedConfig};
pub use range_monitor::{RangeMonitor, RangeMonitorConfig};
pub use rover::{CommandReply, Rover, RoverCommand, RoverConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
