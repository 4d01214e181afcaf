//! `pirover-kernel` – shared state and drive arbitration.
//!
//! # Modules
//!
//! - [`rover_state`] – [`RoverState`][rover_state::RoverState]: the one shared
//!   record of obstacle distance, position, home mark and mode flags that
//!   every task reads and writes.
//! - [`interlock`] – [`Interlocks`][interlock::Interlocks]: ordered safety
//!   rules a drive intent must satisfy.
//! - [`arbiter`] – [`CommandArbiter`][arbiter::CommandArbiter]: the single
//!   path from manual and autonomous drive requests to the drive actuator.

pub mod arbiter;
pub mod interlock;
pub mod rover_state;

pub use arbiter::{CommandArbiter, Dispatch};
pub use interlock::{Interlock, Interlocks, NavigationInterlock, ObstacleInterlock};
pub use rover_state::{RangeUpdate, RoverState};
