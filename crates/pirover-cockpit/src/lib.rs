//! `pirover-cockpit` – the rover's command channel.
//!
//! A single TCP port (default `5000`) answers two kinds of request:
//!
//! 1. **WebSocket upgrades** become a bidirectional bridge. Inbound JSON
//!    frames `{"event": name, "data": {...}}` are decoded by
//!    [`parse_command`] and handed to [`Rover::handle`]; every notification on
//!    the bus is streamed back to the client.
//! 2. **`GET /status`** returns the current [`StatusSnapshot`] as JSON.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pirover_cockpit::CommandServer;
//! # async fn boot(rover: Arc<pirover_runtime::Rover>) {
//! CommandServer::new(rover).with_port(5000).run().await.ok();
//! # }
//! ```
//!
//! [`Rover::handle`]: pirover_runtime::Rover::handle
//! [`StatusSnapshot`]: pirover_types::StatusSnapshot

pub mod protocol;
pub mod server;

pub use protocol::{DEFAULT_SPEED, notification_frame, parse_command, reply_frame};
pub use server::{CommandServer, DEFAULT_PORT};
