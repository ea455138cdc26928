//! Commands accepted by the interpreter.

use crate::config::ConfigPatch;
use crate::types::{Dimensions, ErrorEvent};
use crate::Error;
use serde_json::Value;

/// A single call on the public command surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Merge configuration. `None` is an empty payload, which is ignored.
    Config(Option<ConfigPatch>),
    /// Emit a named event.
    Track {
        event_name: String,
        overrides: Dimensions,
    },
    /// Report an error, subject to the error throttle.
    CaptureError {
        event: ErrorEvent,
        overrides: Dimensions,
    },
    /// Anything else. Logged and ignored.
    Unknown(String),
}

impl Command {
    pub fn config(patch: ConfigPatch) -> Self {
        Command::Config(Some(patch))
    }

    pub fn track(event_name: impl Into<String>) -> Self {
        Self::track_with(event_name, Dimensions::new())
    }

    pub fn track_with(event_name: impl Into<String>, overrides: Dimensions) -> Self {
        Command::Track {
            event_name: event_name.into(),
            overrides,
        }
    }

    pub fn capture_error(event: ErrorEvent) -> Self {
        Self::capture_error_with(event, Dimensions::new())
    }

    pub fn capture_error_with(event: ErrorEvent, overrides: Dimensions) -> Self {
        Command::CaptureError { event, overrides }
    }

    /// The command name as written on the command surface.
    pub fn name(&self) -> &str {
        match self {
            Command::Config(_) => "config",
            Command::Track { .. } => "track",
            Command::CaptureError { .. } => "captureError",
            Command::Unknown(name) => name,
        }
    }

    /// Parse a raw positional argument list such as `["track", "Signup", {"plan": "pro"}]`.
    pub fn from_args(args: &[Value]) -> Result<Command, Error> {
        let name = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidCommand("missing command name".into()))?;
        let value = args.get(1).unwrap_or(&Value::Null);
        let overrides = || Dimensions::from_json(args.get(2).unwrap_or(&Value::Null));

        match name {
            "config" => {
                if is_falsy(value) {
                    return Ok(Command::Config(None));
                }
                let patch = serde_json::from_value(value.clone())
                    .map_err(|e| Error::InvalidCommand(format!("config: {}", e)))?;
                Ok(Command::Config(Some(patch)))
            }
            "track" => {
                let event_name = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => {
                        return Err(Error::InvalidCommand("track: missing event name".into()))
                    }
                    other => other.to_string(),
                };
                Ok(Command::track_with(event_name, overrides()?))
            }
            "captureError" => {
                let event = serde_json::from_value(value.clone())
                    .map_err(|e| Error::InvalidCommand(format!("captureError: {}", e)))?;
                Ok(Command::capture_error_with(event, overrides()?))
            }
            other => Ok(Command::Unknown(other.to_string())),
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f == 0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}
