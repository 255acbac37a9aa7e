//! Response and notification lines sent to clients.

use crate::command::CommandError;
use blescan_core::{AdvertisementEvent, RadioState};
use std::fmt;

/// One outgoing line. Rendered through `Display`, without terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The handler completed and had nothing to report.
    Ok,
    /// `status <state>`
    Status(RadioState),
    /// `stored-devices <base64(JSON)>`
    StoredDevices(String),
    /// `new-device <address> <rssi> <payload-hex>`
    NewDevice {
        address: String,
        rssi: i32,
        payload_hex: String,
    },
    /// `Command not found: "<name>"`
    CommandNotFound(String),
    /// `error <message>`
    Error(String),
}

impl Response {
    /// Notification for one scan result.
    pub fn new_device(event: &AdvertisementEvent) -> Self {
        Response::NewDevice {
            address: event.address.to_string(),
            rssi: event.rssi as i32,
            payload_hex: event.payload_hex(),
        }
    }

    pub fn error(err: impl fmt::Display) -> Self {
        Response::Error(err.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_) | Response::CommandNotFound(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("ok"),
            Response::Status(state) => write!(f, "status {state}"),
            Response::StoredDevices(blob) => write!(f, "stored-devices {blob}"),
            Response::NewDevice {
                address,
                rssi,
                payload_hex,
            } => write!(f, "new-device {address} {rssi} {payload_hex}"),
            Response::CommandNotFound(name) => write!(f, "Command not found: \"{name}\""),
            Response::Error(message) => write!(f, "error {message}"),
        }
    }
}

impl From<CommandError> for Response {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotFound(name) => Response::CommandNotFound(name),
            other => Response::error(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blescan_core::{AdvData, BdAddr};

    #[test]
    fn test_render_lines() {
        assert_eq!(Response::Ok.to_string(), "ok");
        assert_eq!(Response::Status(RadioState::Idle).to_string(), "status idle");
        assert_eq!(
            Response::StoredDevices("W10=".to_string()).to_string(),
            "stored-devices W10="
        );
        assert_eq!(
            Response::CommandNotFound("foo".to_string()).to_string(),
            "Command not found: \"foo\""
        );
        assert_eq!(
            Response::error("Invalid payload: odd length").to_string(),
            "error Invalid payload: odd length"
        );
    }

    #[test]
    fn test_new_device_line() {
        let event = AdvertisementEvent {
            address_type: 0,
            address: BdAddr::new([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]),
            connectable: true,
            rssi: -67,
            payload: AdvData::from_slice(&[0x02, 0x01, 0x06]).unwrap(),
        };
        assert_eq!(
            Response::new_device(&event).to_string(),
            "new-device de:ad:be:ef:00:01 -67 020106"
        );
    }

    #[test]
    fn test_from_command_error() {
        assert_eq!(
            Response::from(CommandError::NotFound("x".to_string())),
            Response::CommandNotFound("x".to_string())
        );
        let response = Response::from(CommandError::MissingArgument {
            command: "simulate",
            argument: "payload",
        });
        assert_eq!(
            response.to_string(),
            "error simulate: missing argument <payload>"
        );
        assert!(response.is_error());
    }
}
