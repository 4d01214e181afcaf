//! Hardware abstraction for the rover: wheel servos, the front light relay,
//! the ultrasonic ranger and GPS position sources, plus in-process simulated
//! drivers for tests and bench runs.

pub mod drive;
pub mod gps;
pub mod ranger;
pub mod relay;
pub mod servo;
pub mod sim;

pub use drive::{DriveActuator, DriveTrain, WheelLevels, wheel_levels};
pub use gps::{GpsdSource, PositionSource};
pub use ranger::{EchoPins, RangeSensor, UltrasonicRanger};
pub use relay::Relay;
pub use servo::ServoChannel;
