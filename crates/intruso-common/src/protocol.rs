use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::lobby::{RoomCode, RoomSnapshot};
use crate::player::{ConnectionId, PlayerRef, PlayerStats, ProfileUpdate, UserId, UserProfile};
use crate::settings::SettingsChange;

// -- Framing --

pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_framed(stream)
}

// -- Client -> Server Messages --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientMessage {
    // Handshake
    Hello {
        /// Known user id of a returning client.
        #[serde(default)]
        user_id: Option<UserId>,
        /// Set by clients re-establishing a dropped socket; suppresses
        /// `UserRestored`.
        #[serde(default)]
        reconnect: bool,
        version: String,
    },

    // Identity
    Authenticate {
        profile: UserProfile,
    },
    UpdateProfile {
        update: ProfileUpdate,
    },

    // Lobby
    ListRooms,
    CreateRoom,
    JoinRoom {
        code: RoomCode,
    },
    LeaveRoom,
    UpdateSettings {
        change: SettingsChange,
    },
    StartGame,

    // Gameplay
    PlayerReady,
    NextTurn,
    CastVote {
        target: UserId,
    },
    HostAction {
        action: HostAction,
    },
    SendReaction {
        emoji: String,
    },

    // Connection
    Ping,
    Disconnect,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HostAction {
    Restart,
    Delete,
}

// -- Server -> Client Messages --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        connection_id: ConnectionId,
        server_version: String,
    },
    HandshakeError {
        reason: String,
    },

    // Identity
    AuthSuccess {
        profile: UserProfile,
        stats: PlayerStats,
    },
    UserRestored {
        profile: UserProfile,
        stats: PlayerStats,
    },
    ProfileUpdated {
        profile: UserProfile,
    },
    SessionRestored {
        room: RoomSnapshot,
        player: PlayerRef,
    },

    // Rooms
    RoomJoined {
        room: RoomSnapshot,
    },
    RoomSnapshot {
        room: RoomSnapshot,
    },
    RoomLeft,
    RoomsList {
        rooms: Vec<RoomSnapshot>,
    },
    ForcedRoomTeardown {
        code: RoomCode,
    },
    /// Relayed to the sender's room only.
    ReactionReceived {
        user_id: UserId,
        emoji: String,
    },

    // Presence
    OnlineUsers {
        users: Vec<UserProfile>,
    },

    // Errors
    Error {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    RoomNotFound,
    MatchInProgress,
    RoomFull,
    NameTaken,
    InvalidSettings,
    NotHost,
    UnknownCommand,
    NotLoggedIn,
    NotInRoom,
    WrongPhase,
    NotYourTurn,
    InvalidVote,
    NotEnoughPlayers,
    NoWordsAvailable,
    ProfileFailure,
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Difficulty;
    use uuid::Uuid;

    #[test]
    fn test_hello_defaults_optional_fields() {
        let msg: ClientMessage =
            deserialize_message(br#"{"Hello":{"version":"0.1.0"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Hello {
                user_id: None,
                reconnect: false,
                version: "0.1.0".into(),
            }
        );
    }

    #[test]
    fn test_unit_commands_are_plain_strings() {
        let bytes = serialize_message(&ClientMessage::PlayerReady).unwrap();
        assert_eq!(&bytes[..], br#""PlayerReady""#);

        let msg: ClientMessage = deserialize_message(br#""NextTurn""#).unwrap();
        assert_eq!(msg, ClientMessage::NextTurn);
    }

    #[test]
    fn test_settings_change_wire_shape() {
        let msg: ClientMessage = deserialize_message(
            br#"{"UpdateSettings":{"change":{"Difficulty":"Hard"}}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::UpdateSettings {
                change: SettingsChange::Difficulty(Difficulty::Hard),
            }
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = deserialize_message::<ClientMessage>(br#"{"BuyHotel":{}}"#);
        assert!(result.is_err());
        // Still valid JSON, which is how the server tells it apart from garbage.
        assert!(serde_json::from_slice::<serde_json::Value>(br#"{"BuyHotel":{}}"#).is_ok());
    }

    #[test]
    fn test_reaction_wire_shape() {
        let msg: ClientMessage = deserialize_message(r#"{"SendReaction":{"emoji":"🔥"}}"#.as_bytes()).unwrap();
        assert_eq!(msg, ClientMessage::SendReaction { emoji: "🔥".into() });
    }

    #[test]
    fn test_server_message_serialization() {
        let id = Uuid::new_v4();
        let msg = ServerMessage::Welcome {
            connection_id: id,
            server_version: "0.1.0".into(),
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ServerMessage = deserialize_message(&bytes).unwrap();
        assert_eq!(deserialized, msg);
    }

    #[test]
    fn test_error_message_carries_code() {
        let msg = ServerMessage::Error {
            code: ErrorCode::RoomFull,
            message: "room is full".into(),
        };
        let value: serde_json::Value =
            serde_json::from_slice(&serialize_message(&msg).unwrap()).unwrap();
        assert_eq!(value["Error"]["code"], "RoomFull");
    }
}
