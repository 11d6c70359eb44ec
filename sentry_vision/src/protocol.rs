// THEORY:
// The `protocol` module defines the message schema shared by the command
// dispatcher and the broadcast server. Every message on the wire is one flat
// JSON object carrying a `type` tag, one object per WebSocket text frame.
//
// The schema is modelled as two closed enums, one per direction:
// - `ServerMessage`: everything the server pushes to an actuator (absolute
//   and directional moves, cancels, stops, status requests, handshake replies).
// - `ClientMessage`: everything an actuator reports back (handshake, ACK,
//   STATUS).
//
// Field validation happens at decode time: unknown fields are rejected and
// servo angles outside 0..=180 never make it past the decoder. Inbound text
// that fails to decode is not an error for the server; `decode_inbound`
// downgrades it to `Inbound::Raw` so it can be forwarded as plain text.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Upper bound of the servo range, in degrees.
pub const SERVO_MAX_DEGREES: u8 = 180;

static COMMAND_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch, saturating to zero on a skewed clock.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Correlation id carried by every command and echoed by ACK/STATUS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh id: hex millisecond timestamp plus a process-wide sequence number.
    /// The sequence alone guarantees uniqueness within a process; the timestamp
    /// keeps ids from different runs apart.
    pub fn generate() -> Self {
        let sequence = COMMAND_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}", unix_millis(), sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PanDir {
    Left,
    Right,
    #[default]
    None,
}

impl PanDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TiltDir {
    Up,
    Down,
    #[default]
    None,
}

impl TiltDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::None => "NONE",
        }
    }
}

/// The direction the actuator should move on each axis for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MotionIntent {
    pub pan: PanDir,
    pub tilt: TiltDir,
}

impl MotionIntent {
    pub const IDLE: Self = Self {
        pan: PanDir::None,
        tilt: TiltDir::None,
    };

    pub fn pan_only(pan: PanDir) -> Self {
        Self {
            pan,
            tilt: TiltDir::None,
        }
    }

    pub fn tilt_only(tilt: TiltDir) -> Self {
        Self {
            pan: PanDir::None,
            tilt,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::IDLE
    }
}

impl fmt::Display for MotionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pan: {} | Tilt: {}", self.pan.as_str(), self.tilt.as_str())
    }
}

/// An absolute servo position, validated to 0..=180 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ServoAngle(u8);

impl ServoAngle {
    pub fn degrees(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ServoAngle {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=SERVO_MAX_DEGREES as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ProtocolError::AngleOutOfRange(value))
        }
    }
}

impl From<ServoAngle> for i64 {
    fn from(angle: ServoAngle) -> Self {
        angle.0 as i64
    }
}

/// Messages pushed from the server to actuator clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum ServerMessage {
    HelloAck,
    Move {
        id: CommandId,
        pan: ServoAngle,
        tilt: ServoAngle,
    },
    MoveDir {
        id: CommandId,
        pan_dir: PanDir,
        tilt_dir: TiltDir,
        speed: u8,
    },
    Cancel {
        id: CommandId,
    },
    Stop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CommandId>,
    },
    StatusReq,
}

impl ServerMessage {
    pub fn id(&self) -> Option<&CommandId> {
        match self {
            Self::Move { id, .. } | Self::MoveDir { id, .. } | Self::Cancel { id } => Some(id),
            Self::Stop { id } => id.as_ref(),
            Self::HelloAck | Self::StatusReq => None,
        }
    }

    /// The wire `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HelloAck => "HELLO_ACK",
            Self::Move { .. } => "MOVE",
            Self::MoveDir { .. } => "MOVE_DIR",
            Self::Cancel { .. } => "CANCEL",
            Self::Stop { .. } => "STOP",
            Self::StatusReq => "STATUS_REQ",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A status report sent by an actuator, usually in response to a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusReport {
    pub id: CommandId,
    pub state: String,
    pub pan: i32,
    pub tilt: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_id: Option<CommandId>,
}

/// Messages reported by actuator clients to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum ClientMessage {
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<String>,
    },
    Ack {
        id: CommandId,
    },
    Status(StatusReport),
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// An inbound payload after decoding. Anything that is not a valid
/// `ClientMessage` is kept as raw text along with the decode failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ClientMessage),
    Raw { text: String, reason: String },
}

pub fn decode_inbound(text: &str) -> Inbound {
    match ClientMessage::decode(text) {
        Ok(message) => Inbound::Message(message),
        Err(err) => Inbound::Raw {
            text: text.to_string(),
            reason: err.to_string(),
        },
    }
}

/// An outbound command together with the wall-clock time it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionCommand {
    pub issued_at_ms: u64,
    pub message: ServerMessage,
}

impl MotionCommand {
    pub fn new(message: ServerMessage) -> Self {
        Self {
            issued_at_ms: unix_millis(),
            message,
        }
    }

    /// A `MOVE_DIR` command with a freshly generated id.
    pub fn directional(intent: MotionIntent, speed: u8) -> Self {
        Self::new(ServerMessage::MoveDir {
            id: CommandId::generate(),
            pan_dir: intent.pan,
            tilt_dir: intent.tilt,
            speed,
        })
    }

    /// A `MOVE` command to an absolute servo position.
    pub fn absolute(pan: i64, tilt: i64) -> Result<Self, ProtocolError> {
        Ok(Self::new(ServerMessage::Move {
            id: CommandId::generate(),
            pan: ServoAngle::try_from(pan)?,
            tilt: ServoAngle::try_from(tilt)?,
        }))
    }

    pub fn cancel(id: CommandId) -> Self {
        Self::new(ServerMessage::Cancel { id })
    }

    pub fn stop(id: Option<CommandId>) -> Self {
        Self::new(ServerMessage::Stop { id })
    }

    pub fn status_request() -> Self {
        Self::new(ServerMessage::StatusReq)
    }

    pub fn id(&self) -> Option<&CommandId> {
        self.message.id()
    }

    pub fn kind(&self) -> &'static str {
        self.message.kind()
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        self.message.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn move_dir_round_trip_keeps_every_field() {
        let command = MotionCommand::directional(MotionIntent::pan_only(PanDir::Left), 2);
        let text = command.encode().expect("encode");
        let decoded = ServerMessage::decode(&text).expect("decode");

        assert_eq!(decoded, command.message);
        match decoded {
            ServerMessage::MoveDir {
                id,
                pan_dir,
                tilt_dir,
                speed,
            } => {
                assert_eq!(Some(&id), command.id());
                assert_eq!(pan_dir, PanDir::Left);
                assert_eq!(tilt_dir, TiltDir::None);
                assert_eq!(speed, 2);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn move_dir_uses_wire_names() {
        let message = ServerMessage::MoveDir {
            id: CommandId::new("abc123"),
            pan_dir: PanDir::Right,
            tilt_dir: TiltDir::Up,
            speed: 3,
        };
        let value: serde_json::Value =
            serde_json::from_str(&message.encode().expect("encode")).expect("json");

        assert_eq!(value["type"], "MOVE_DIR");
        assert_eq!(value["id"], "abc123");
        assert_eq!(value["pan_dir"], "RIGHT");
        assert_eq!(value["tilt_dir"], "UP");
        assert_eq!(value["speed"], 3);
    }

    #[test]
    fn hello_ack_is_a_bare_type_tag() {
        assert_eq!(
            ServerMessage::HelloAck.encode().expect("encode"),
            r#"{"type":"HELLO_ACK"}"#
        );
    }

    #[test]
    fn hello_decodes_with_and_without_node() {
        assert_eq!(
            decode_inbound(r#"{"type":"HELLO"}"#),
            Inbound::Message(ClientMessage::Hello { node: None })
        );
        assert_eq!(
            decode_inbound(r#"{"type":"HELLO","node":"esp32_sentry"}"#),
            Inbound::Message(ClientMessage::Hello {
                node: Some("esp32_sentry".to_string())
            })
        );
    }

    #[test]
    fn status_report_decodes_optional_fields() {
        let inbound = decode_inbound(
            r#"{"type":"STATUS","id":"42","state":"ERROR","pan":90,"tilt":45,"error":"not_active"}"#,
        );
        let Inbound::Message(ClientMessage::Status(report)) = inbound else {
            panic!("expected a status report, got {inbound:?}");
        };
        assert_eq!(report.id, CommandId::new("42"));
        assert_eq!(report.state, "ERROR");
        assert_eq!(report.pan, 90);
        assert_eq!(report.tilt, 45);
        assert_eq!(report.error.as_deref(), Some("not_active"));
        assert_eq!(report.cmd_id, None);
    }

    #[test]
    fn malformed_and_unknown_payloads_become_raw() {
        for text in [
            "not json at all",
            r#"{"type":"FIRE","id":"1"}"#,
            r#"{"type":"ACK"}"#,
            r#"{"type":"ACK","id":"1","extra":true}"#,
        ] {
            match decode_inbound(text) {
                Inbound::Raw { text: raw, reason } => {
                    assert_eq!(raw, text);
                    assert!(!reason.is_empty());
                }
                other => panic!("{text} should be raw, got {other:?}"),
            }
        }
    }

    #[test]
    fn absolute_moves_reject_out_of_range_angles() {
        assert!(MotionCommand::absolute(90, 45).is_ok());
        assert!(matches!(
            MotionCommand::absolute(181, 45),
            Err(ProtocolError::AngleOutOfRange(181))
        ));
        assert!(matches!(
            MotionCommand::absolute(90, -1),
            Err(ProtocolError::AngleOutOfRange(-1))
        ));
        assert!(ServerMessage::decode(r#"{"type":"MOVE","id":"x","pan":200,"tilt":10}"#).is_err());
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<CommandId> = (0..1000).map(|_| CommandId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn stop_without_id_omits_the_field() {
        let text = MotionCommand::stop(None).encode().expect("encode");
        assert_eq!(text, r#"{"type":"STOP"}"#);
        assert_eq!(
            ServerMessage::decode(&text).expect("decode"),
            ServerMessage::Stop { id: None }
        );
    }
}
