//! JSON framing for the command channel.
//!
//! Every frame in either direction has the shape
//! `{"event": name, "data": {...}}`; `data` may be omitted for commands that
//! take no arguments.
//!
//! | Inbound event | `data` | Command |
//! |---|---|---|
//! | `command` | `{command, speed?}` | [`RoverCommand::Drive`] (speed defaults to 70) |
//! | `auto_avoid` | `{enabled}` | [`RoverCommand::SetAvoidance`] |
//! | `lights` | – | [`RoverCommand::ToggleLights`] |
//! | `set_home` | – | [`RoverCommand::SetHome`] |
//! | `clear_home` | – | [`RoverCommand::ClearHome`] |
//! | `return_home` | – | [`RoverCommand::ReturnHome`] |
//! | `cancel_return` | – | [`RoverCommand::CancelReturn`] |
//! | `start_recording` / `stop_recording` | – | recording flag |
//! | `status` | – | [`RoverCommand::Status`] |

use pirover_runtime::{CommandReply, RoverCommand};
use pirover_types::{Direction, DriveIntent, Event, RoverError};
use serde_json::{Value, json};

/// Speed used when a `command` frame carries none.
pub const DEFAULT_SPEED: i64 = 70;

/// Decode one inbound text frame.
///
/// # Errors
///
/// [`RoverError::InvalidCommand`] for malformed JSON, unknown events, unknown
/// directions, or a speed outside `0..=100`.
pub fn parse_command(text: &str) -> Result<RoverCommand, RoverError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| RoverError::InvalidCommand(format!("malformed frame: {e}")))?;
    let event = frame
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| RoverError::InvalidCommand("frame has no 'event'".to_string()))?;
    let data = frame.get("data").unwrap_or(&Value::Null);

    let command = match event {
        "command" => RoverCommand::Drive(parse_drive(data)?),
        "auto_avoid" => {
            let enabled = data.get("enabled").and_then(Value::as_bool).ok_or_else(|| {
                RoverError::InvalidCommand("auto_avoid needs a boolean 'enabled'".to_string())
            })?;
            RoverCommand::SetAvoidance(enabled)
        }
        "lights" => RoverCommand::ToggleLights,
        "set_home" => RoverCommand::SetHome,
        "clear_home" => RoverCommand::ClearHome,
        "return_home" => RoverCommand::ReturnHome,
        "cancel_return" => RoverCommand::CancelReturn,
        "start_recording" => RoverCommand::StartRecording,
        "stop_recording" => RoverCommand::StopRecording,
        "status" => RoverCommand::Status,
        other => {
            return Err(RoverError::InvalidCommand(format!("unknown event '{other}'")));
        }
    };
    Ok(command)
}

fn parse_drive(data: &Value) -> Result<DriveIntent, RoverError> {
    let direction: Direction = data
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| RoverError::InvalidCommand("command needs a 'command' string".to_string()))?
        .parse()?;

    let speed = match data.get("speed") {
        None | Some(Value::Null) => DEFAULT_SPEED,
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .ok_or_else(|| RoverError::InvalidCommand(format!("speed must be a number, got {v}")))?,
    };
    DriveIntent::new(direction, speed)
}

/// Encode the answer to one inbound frame.
pub fn reply_frame(reply: &Result<CommandReply, RoverError>) -> Value {
    match reply {
        Ok(CommandReply::Ack) => json!({ "event": "ack" }),
        Ok(CommandReply::Status(snapshot)) => json!({ "event": "status", "data": snapshot }),
        Err(e) => json!({ "event": "error", "data": { "reason": e.to_string() } }),
    }
}

/// Encode a bus event: the notification's own `event`/`data` plus the
/// envelope's `timestamp`.
pub fn notification_frame(event: &Event) -> Result<Value, serde_json::Error> {
    let mut frame = serde_json::to_value(&event.payload)?;
    if let Value::Object(map) = &mut frame {
        map.insert("timestamp".to_string(), serde_json::to_value(event.timestamp)?);
    }
    Ok(frame)
}
