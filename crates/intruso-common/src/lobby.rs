use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::MatchState;
use crate::player::{PlayerRef, UserId};
use crate::settings::RoomSettings;
use crate::vote::MatchOutcome;

/// Six-digit join code, also the room's key.
pub type RoomCode = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomStatus {
    Lobby,
    Playing,
    Aborted,
}

/// Match data as sent to clients: the stored state plus the outcome, which is
/// only present once the match reached its result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchView {
    #[serde(flatten)]
    pub state: MatchState,
    #[serde(default)]
    pub outcome: Option<MatchOutcome>,
}

impl From<&MatchState> for MatchView {
    fn from(state: &MatchState) -> Self {
        Self {
            state: state.clone(),
            outcome: state.outcome(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub id: RoomCode,
    pub code: RoomCode,
    pub name: String,
    pub host_id: UserId,
    pub players: Vec<PlayerRef>,
    pub settings: RoomSettings,
    pub status: RoomStatus,
    pub game_state: Option<MatchView>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

