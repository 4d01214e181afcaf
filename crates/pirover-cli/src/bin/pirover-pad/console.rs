//! Console vocabulary of the teleop client.
//!
//! Each input line becomes at most one outbound frame. Drive keys go through
//! the [`StickMapper`], so repeating a key that would produce the same intent
//! sends nothing.

use colored::Colorize;
use pirover_types::{Direction, DriveIntent};
use serde_json::{Value, json};

use crate::mapper::StickMapper;

pub const HELP: &str = "\
  w a s d x          forward / left / backward / right / stop
  stick <x> <y>      right stick, 0-255 per axis (127 = centre)
  trigger <0-255>    R2 trigger, sets the drive speed
  dpad <direction>   fixed-speed drive (up/down/left/right)
  speed <0-100>      set the drive speed
  lights             toggle the front lights
  avoid              toggle obstacle avoidance
  home set|go|cancel|clear
  record start|stop
  status             ask for a status snapshot
  quit               stop the rover and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(Value),
    /// Handled locally; the string is shown to the operator.
    Local(String),
    Quit,
}

/// Client-side state that survives between lines.
#[derive(Debug, Default)]
pub struct Console {
    pub mapper: StickMapper,
    pub avoidance: bool,
}

impl Console {
    /// Interpret one line.
    ///
    /// # Errors
    ///
    /// A human-readable message for unknown commands or bad arguments.
    pub fn interpret(&mut self, line: &str) -> Result<Action, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(Action::Local(String::new()));
        };
        let args: Vec<&str> = words.collect();

        let action = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("w", []) => self.drive(|m| m.button(Direction::Forward)),
            ("a", []) => self.drive(|m| m.button(Direction::Left)),
            ("s", []) => self.drive(|m| m.button(Direction::Backward)),
            ("d", []) => self.drive(|m| m.button(Direction::Right)),
            ("x", []) => {
                // Emergency stop is always sent.
                self.mapper.reset();
                self.drive(|m| m.button(Direction::Stop))
            }
            ("stick", [x, y]) => {
                let (x, y) = (parse_axis(x)?, parse_axis(y)?);
                self.drive(|m| m.stick(x, y))
            }
            ("trigger", [v]) => match self.mapper.trigger(parse_axis(v)?) {
                Some(speed) => Action::Local(format!("speed {speed}%")),
                None => Action::Local(String::new()),
            },
            ("dpad", [d]) => {
                let direction = match d.to_ascii_lowercase().as_str() {
                    "up" => Direction::Forward,
                    "down" => Direction::Backward,
                    "left" => Direction::Left,
                    "right" => Direction::Right,
                    other => return Err(format!("unknown d-pad direction '{other}'")),
                };
                self.drive(|m| m.dpad(direction))
            }
            ("speed", [n]) => {
                let speed: u8 = n
                    .parse()
                    .ok()
                    .filter(|s| *s <= 100)
                    .ok_or_else(|| format!("speed must be 0-100, got '{n}'"))?;
                self.mapper.set_speed(speed);
                Action::Local(format!("speed {speed}%"))
            }
            ("lights", []) => Action::Send(json!({ "event": "lights" })),
            ("avoid", []) => {
                self.avoidance = !self.avoidance;
                Action::Send(json!({ "event": "auto_avoid", "data": { "enabled": self.avoidance } }))
            }
            ("home", [sub]) => match *sub {
                "set" => Action::Send(json!({ "event": "set_home" })),
                "go" => Action::Send(json!({ "event": "return_home" })),
                "cancel" => Action::Send(json!({ "event": "cancel_return" })),
                "clear" => Action::Send(json!({ "event": "clear_home" })),
                other => return Err(format!("unknown home action '{other}'")),
            },
            ("record", [sub]) => match *sub {
                "start" => Action::Send(json!({ "event": "start_recording" })),
                "stop" => Action::Send(json!({ "event": "stop_recording" })),
                other => return Err(format!("unknown record action '{other}'")),
            },
            ("status", []) => Action::Send(json!({ "event": "status" })),
            ("help" | "?", []) => Action::Local(HELP.to_string()),
            ("quit" | "exit" | "q", []) => Action::Quit,
            _ => return Err(format!("unknown command '{}'", line.trim())),
        };
        Ok(action)
    }

    fn drive(&mut self, map: impl FnOnce(&mut StickMapper) -> Option<DriveIntent>) -> Action {
        match map(&mut self.mapper) {
            Some(intent) => Action::Send(drive_frame(&intent)),
            None => Action::Local(String::new()),
        }
    }
}

pub fn drive_frame(intent: &DriveIntent) -> Value {
    json!({
        "event": "command",
        "data": { "command": intent.direction.as_str(), "speed": intent.speed_percent },
    })
}

fn parse_axis(raw: &str) -> Result<u8, String> {
    raw.parse()
        .map_err(|_| format!("axis values are 0-255, got '{raw}'"))
}

/// One line describing a frame received from the rover.
pub fn describe(frame: &Value) -> String {
    let event = frame.get("event").and_then(Value::as_str).unwrap_or("?");
    let data = frame.get("data").unwrap_or(&Value::Null);
    match event {
        "ack" => "ok".dimmed().to_string(),
        "error" => format!(
            "{} {}",
            "✗".red().bold(),
            data.get("reason").and_then(Value::as_str).unwrap_or("unknown error")
        ),
        "obstacle_detected" => format!("{} obstacle at {} cm", "⚠".yellow().bold(), data["distance"]),
        "blocked" => format!("{} blocked: {}", "⚠".yellow().bold(), data["reason"]),
        "gps_error" => format!("{} {}", "GPS".red(), data["message"].as_str().unwrap_or_default()),
        "navigation_update" => format!(
            "home: {:.1} m at {:.0}°",
            data["distance"].as_f64().unwrap_or_default(),
            data["bearing"].as_f64().unwrap_or_default()
        ),
        "status" => format!("{} {}", "status".cyan().bold(), data),
        other if data.is_null() => other.cyan().to_string(),
        other => format!("{} {}", other.cyan(), data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(action: Result<Action, String>) -> Value {
        match action {
            Ok(Action::Send(frame)) => frame,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn keys_map_to_drive_frames_at_current_speed() {
        let mut c = Console::default();
        let frame = sent(c.interpret("w"));
        assert_eq!(frame["event"], "command");
        assert_eq!(frame["data"]["command"], "forward");
        assert_eq!(frame["data"]["speed"], 70);

        c.interpret("speed 40").unwrap();
        assert_eq!(sent(c.interpret("d"))["data"]["speed"], 40);
    }

    #[test]
    fn repeated_key_sends_nothing_but_stop_always_goes_out() {
        let mut c = Console::default();
        sent(c.interpret("x"));
        sent(c.interpret("x"));
        sent(c.interpret("s"));
        assert_eq!(c.interpret("s"), Ok(Action::Local(String::new())));
    }

    #[test]
    fn stick_and_trigger() {
        let mut c = Console::default();
        assert_eq!(sent(c.interpret("stick 127 0"))["data"]["command"], "forward");
        assert_eq!(c.interpret("trigger 255"), Ok(Action::Local("speed 100%".into())));
        assert!(c.interpret("stick 300 0").is_err());
    }

    #[test]
    fn avoid_toggles_flag() {
        let mut c = Console::default();
        assert_eq!(sent(c.interpret("avoid"))["data"]["enabled"], true);
        assert_eq!(sent(c.interpret("avoid"))["data"]["enabled"], false);
    }

    #[test]
    fn home_and_record_subcommands() {
        let mut c = Console::default();
        assert_eq!(sent(c.interpret("home go"))["event"], "return_home");
        assert_eq!(sent(c.interpret("home clear"))["event"], "clear_home");
        assert_eq!(sent(c.interpret("record start"))["event"], "start_recording");
        assert!(c.interpret("home away").is_err());
    }

    #[test]
    fn quit_and_garbage() {
        let mut c = Console::default();
        assert_eq!(c.interpret("quit"), Ok(Action::Quit));
        assert!(c.interpret("fly").is_err());
        assert!(c.interpret("speed 101").is_err());
        assert_eq!(c.interpret("   "), Ok(Action::Local(String::new())));
    }

    #[test]
    fn describe_error_and_update() {
        colored::control::set_override(false);
        assert_eq!(
            describe(&json!({"event": "error", "data": {"reason": "Rejected: obstacle blocked"}})),
            "✗ Rejected: obstacle blocked"
        );
        assert_eq!(
            describe(&json!({"event": "navigation_update", "data": {"distance": 12.34, "bearing": 91.6}})),
            "home: 12.3 m at 92°"
        );
        assert_eq!(describe(&json!({"event": "navigation_complete"})), "navigation_complete");
    }
}
