//! Datagram protocol
//!
//! Clients speak UTF-8 JSON, one object per datagram, dispatched on the
//! `action` field. Everything is validated here at the boundary; the rest
//! of the server only ever sees typed values. Outbound traffic splits into
//! `Response` (unicast, tagged by `status`) and `Broadcast` (session-wide,
//! tagged by `action`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::game::{TankId, TankState};
use crate::session::PlayerId;
use crate::util::Position;

/// A decoded inbound datagram: who sent it and what they want
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub player_id: PlayerId,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    JoinGame,
    Move { position: Position },
    Shoot,
    LeaveGame,
    /// Unrecognized action, kept for logging
    Unknown(String),
}

/// Command delivered by the external queue rather than a datagram
#[derive(Debug, Clone, Deserialize)]
pub struct QueuedCommand {
    pub player_id: PlayerId,
    pub command: String,
    #[serde(default)]
    pub details: CommandDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandDetails {
    #[serde(default)]
    pub new_position: Option<Position>,
}

/// The one matchmaking event type that drives any action
pub const NEW_MATCH_CREATED: &str = "new_match_created";

/// One line from the matchmaking feed. `match_details` is carried opaquely
/// for the log; the server only reacts to the event type.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchmakingEvent {
    pub event_type: String,
    #[serde(default)]
    pub match_details: serde_json::Value,
}

/// Unicast replies. The wire tag is the `status` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Joined {
        session_id: Uuid,
        tank_id: TankId,
        initial_state: TankState,
    },
    AlreadyInSession {
        session_id: Uuid,
    },
    JoinFailed {
        reason: String,
    },
    LeftGame {
        message: String,
    },
    NotInGame {
        message: String,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

/// Session-wide notifications. The wire tag is the `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Broadcast {
    GameUpdate {
        tanks: Vec<TankState>,
    },
    PlayerShot {
        player_id: PlayerId,
        tank_id: TankId,
    },
}

#[derive(Debug, Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(message).map_err(|e| EncodeError(e.to_string()))
}

/// Why an inbound datagram could not become a `Request`. The first three
/// render as the exact error message owed to the sender; the rest are
/// logged and the datagram dropped without a reply.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Invalid character encoding. UTF-8 expected.")]
    Encoding,
    #[error("Empty JSON message")]
    EmptyPayload,
    #[error("Invalid JSON format")]
    MalformedJson,
    #[error("Message carries no player_id")]
    MissingPlayerId,
    #[error("Move from {player_id} carries no usable position")]
    MissingPosition { player_id: String },
}

impl DecodeError {
    /// The reply owed to the sender, if this failure warrants one
    pub fn response(&self) -> Option<Response> {
        match self {
            DecodeError::Encoding | DecodeError::EmptyPayload | DecodeError::MalformedJson => {
                Some(Response::error(self.to_string()))
            }
            DecodeError::MissingPlayerId | DecodeError::MissingPosition { .. } => None,
        }
    }
}

/// Validate and type a raw datagram.
///
/// Stages: UTF-8, NUL/whitespace stripping, emptiness, JSON syntax, object
/// shape, `player_id`, then per-action payload fields.
pub fn decode_request(payload: &[u8]) -> Result<Request, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Encoding)?;
    let cleaned = text.replace('\0', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    let value: Value = serde_json::from_str(cleaned).map_err(|_| DecodeError::MalformedJson)?;
    let message = value.as_object().ok_or(DecodeError::MalformedJson)?;

    let player_id = message
        .get("player_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingPlayerId)?
        .to_string();

    let action = message
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let command = match action {
        "join_game" => Command::JoinGame,
        "move" => {
            let position = message
                .get("position")
                .and_then(parse_position)
                .ok_or_else(|| DecodeError::MissingPosition {
                    player_id: player_id.clone(),
                })?;
            Command::Move { position }
        }
        "shoot" => Command::Shoot,
        "leave_game" => Command::LeaveGame,
        other => Command::Unknown(other.to_string()),
    };

    Ok(Request { player_id, command })
}

fn parse_position(value: &Value) -> Option<Position> {
    let parts = value.as_array()?;
    if parts.len() != 2 {
        return None;
    }
    let x = i32::try_from(parts[0].as_i64()?).ok()?;
    let y = i32::try_from(parts[1].as_i64()?).ok()?;
    Some(Position::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_join() {
        let request = decode_request(br#"{"action": "join_game", "player_id": "p1"}"#).unwrap();
        assert_eq!(request.player_id, "p1");
        assert_eq!(request.command, Command::JoinGame);
    }

    #[test]
    fn test_decode_move() {
        let request =
            decode_request(br#"{"action": "move", "player_id": "p1", "position": [5, 7]}"#)
                .unwrap();
        assert_eq!(
            request.command,
            Command::Move {
                position: Position::new(5, 7)
            }
        );
    }

    #[test]
    fn test_decode_shoot_and_leave() {
        let shoot = decode_request(br#"{"action": "shoot", "player_id": "p1"}"#).unwrap();
        assert_eq!(shoot.command, Command::Shoot);

        let leave = decode_request(br#"{"action": "leave_game", "player_id": "p1"}"#).unwrap();
        assert_eq!(leave.command, Command::LeaveGame);
    }

    #[test]
    fn test_decode_unknown_action() {
        let request = decode_request(br#"{"action": "dance", "player_id": "p1"}"#).unwrap();
        assert_eq!(request.command, Command::Unknown("dance".to_string()));
    }

    #[test]
    fn test_decode_missing_action_is_unknown() {
        let request = decode_request(br#"{"player_id": "p1"}"#).unwrap();
        assert_eq!(request.command, Command::Unknown(String::new()));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = decode_request(&[0xff, 0xfe, 0x01]).unwrap_err();
        assert_eq!(err, DecodeError::Encoding);
        assert_eq!(
            err.response(),
            Some(Response::error(
                "Invalid character encoding. UTF-8 expected."
            ))
        );
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(decode_request(b"").unwrap_err(), DecodeError::EmptyPayload);
        assert_eq!(
            decode_request(b"  \n ").unwrap_err(),
            DecodeError::EmptyPayload
        );
        // NUL padding alone is an empty message too
        assert_eq!(
            decode_request(b"\0\0\0").unwrap_err(),
            DecodeError::EmptyPayload
        );
    }

    #[test]
    fn test_decode_malformed_json_wire_reply() {
        let err = decode_request(b"{not json").unwrap_err();
        assert_eq!(err, DecodeError::MalformedJson);

        let response = err.response().unwrap();
        let wire: Value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            wire,
            json!({"status": "error", "message": "Invalid JSON format"})
        );
    }

    #[test]
    fn test_decode_non_object_json() {
        assert_eq!(
            decode_request(b"[1, 2, 3]").unwrap_err(),
            DecodeError::MalformedJson
        );
    }

    #[test]
    fn test_decode_missing_player_id_has_no_reply() {
        let err = decode_request(br#"{"action": "join_game"}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingPlayerId);
        assert!(err.response().is_none());

        // Empty string counts as missing
        let err = decode_request(br#"{"action": "join_game", "player_id": ""}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingPlayerId);
    }

    #[test]
    fn test_decode_move_without_position_has_no_reply() {
        let err = decode_request(br#"{"action": "move", "player_id": "p1"}"#).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingPosition {
                player_id: "p1".to_string()
            }
        );
        assert!(err.response().is_none());
    }

    #[test]
    fn test_decode_unusable_position_shapes() {
        for payload in [
            br#"{"action": "move", "player_id": "p1", "position": [1]}"#.as_slice(),
            br#"{"action": "move", "player_id": "p1", "position": [1, 2, 3]}"#.as_slice(),
            br#"{"action": "move", "player_id": "p1", "position": "north"}"#.as_slice(),
            br#"{"action": "move", "player_id": "p1", "position": [1.5, 2]}"#.as_slice(),
        ] {
            assert!(matches!(
                decode_request(payload).unwrap_err(),
                DecodeError::MissingPosition { .. }
            ));
        }
    }

    #[test]
    fn test_joined_response_wire_shape() {
        let response = Response::Joined {
            session_id: Uuid::nil(),
            tank_id: "tank_0".to_string(),
            initial_state: TankState {
                id: "tank_0".to_string(),
                position: Position::ORIGIN,
                health: 100,
            },
        };
        let wire: Value = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["status"], "joined");
        assert_eq!(wire["tank_id"], "tank_0");
        assert_eq!(wire["initial_state"]["position"], json!([0, 0]));
        assert_eq!(wire["initial_state"]["health"], 100);
    }

    #[test]
    fn test_broadcast_wire_shapes() {
        let update = Broadcast::GameUpdate {
            tanks: vec![TankState {
                id: "tank_0".to_string(),
                position: Position::new(5, 7),
                health: 100,
            }],
        };
        let wire: Value = serde_json::to_value(&update).unwrap();
        assert_eq!(wire["action"], "game_update");
        assert_eq!(wire["tanks"][0]["position"], json!([5, 7]));

        let shot = Broadcast::PlayerShot {
            player_id: "p1".to_string(),
            tank_id: "tank_0".to_string(),
        };
        let wire: Value = serde_json::to_value(&shot).unwrap();
        assert_eq!(wire["action"], "player_shot");
        assert_eq!(wire["player_id"], "p1");
    }

    #[test]
    fn test_encode_round_trips_response() {
        let bytes = encode(&Response::error("Unknown action")).unwrap();
        let back: Response = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, Response::error("Unknown action"));
    }

    #[test]
    fn test_queued_command_parses() {
        let line = r#"{"player_id": "p1", "command": "move", "details": {"new_position": [3, 9]}}"#;
        let command: QueuedCommand = serde_json::from_str(line).unwrap();
        assert_eq!(command.player_id, "p1");
        assert_eq!(command.command, "move");
        assert_eq!(command.details.new_position, Some(Position::new(3, 9)));

        let bare = r#"{"player_id": "p1", "command": "shoot"}"#;
        let command: QueuedCommand = serde_json::from_str(bare).unwrap();
        assert_eq!(command.command, "shoot");
        assert!(command.details.new_position.is_none());
    }

    #[test]
    fn test_matchmaking_event_parses() {
        let line =
            r#"{"event_type": "new_match_created", "match_details": {"map_id": "map_desert", "max_players": 4}}"#;
        let event: MatchmakingEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.event_type, NEW_MATCH_CREATED);
        assert_eq!(event.match_details["map_id"], "map_desert");

        let bare: MatchmakingEvent =
            serde_json::from_str(r#"{"event_type": "match_update"}"#).unwrap();
        assert_ne!(bare.event_type, NEW_MATCH_CREATED);
        assert!(bare.match_details.is_null());
    }
}
