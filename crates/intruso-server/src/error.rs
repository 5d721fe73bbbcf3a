use intruso_common::game::MatchError;
use intruso_common::protocol::{ErrorCode, ServerMessage};
use intruso_common::settings::SettingsError;

use crate::profiles::ProfileError;

/// Why a client command was refused. Reported only to the issuing connection.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("room not found")]
    RoomNotFound,
    #[error("room is closing")]
    RoomClosing,
    #[error("a match is already in progress")]
    MatchInProgress,
    #[error("no match in progress")]
    NoMatchInProgress,
    #[error("room is full")]
    RoomFull,
    #[error("name is already taken")]
    NameTaken,
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),
    #[error("only the host can do that")]
    NotHost,
    #[error("unknown command")]
    UnknownCommand,
    #[error("log in first")]
    NotLoggedIn,
    #[error("not in a room")]
    NotInRoom,
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
}

impl CommandError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::RoomNotFound | CommandError::RoomClosing => ErrorCode::RoomNotFound,
            CommandError::MatchInProgress => ErrorCode::MatchInProgress,
            CommandError::NoMatchInProgress => ErrorCode::WrongPhase,
            CommandError::RoomFull => ErrorCode::RoomFull,
            CommandError::NameTaken => ErrorCode::NameTaken,
            CommandError::InvalidSettings(_) => ErrorCode::InvalidSettings,
            CommandError::NotHost => ErrorCode::NotHost,
            CommandError::UnknownCommand => ErrorCode::UnknownCommand,
            CommandError::NotLoggedIn => ErrorCode::NotLoggedIn,
            CommandError::NotInRoom => ErrorCode::NotInRoom,
            CommandError::Match(e) => match e {
                MatchError::NotEnoughPlayers => ErrorCode::NotEnoughPlayers,
                MatchError::NoWordsAvailable => ErrorCode::NoWordsAvailable,
                MatchError::WrongPhase(_) => ErrorCode::WrongPhase,
                MatchError::NotYourTurn => ErrorCode::NotYourTurn,
                MatchError::NotAParticipant => ErrorCode::NotInRoom,
                MatchError::InvalidTarget | MatchError::ImpostorInRunoff => ErrorCode::InvalidVote,
            },
            CommandError::Profile(_) => ErrorCode::ProfileFailure,
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intruso_common::game::MatchPhase;

    #[test]
    fn test_match_errors_map_to_protocol_codes() {
        assert_eq!(
            CommandError::from(MatchError::WrongPhase(MatchPhase::Vote)).code(),
            ErrorCode::WrongPhase
        );
        assert_eq!(
            CommandError::from(MatchError::ImpostorInRunoff).code(),
            ErrorCode::InvalidVote
        );
        assert_eq!(CommandError::RoomClosing.code(), ErrorCode::RoomNotFound);
    }

    #[test]
    fn test_settings_error_message() {
        let err = CommandError::from(SettingsError::NoCategories);
        match err.to_message() {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, ErrorCode::InvalidSettings);
                assert_eq!(message, "invalid settings: at least one category is required");
            }
            _ => panic!("wrong variant"),
        }
    }
}
