use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type ConnectionId = Uuid;

/// Public profile of a user as known to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_seed: Option<String>,
    #[serde(default)]
    pub avatar_type: Option<String>,
    #[serde(default)]
    pub avatar_image: Option<String>,
    #[serde(default)]
    pub accessory: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
}

impl UserProfile {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar_seed: None,
            avatar_type: None,
            avatar_image: None,
            accessory: None,
            is_guest: true,
        }
    }

    /// Copy the client-editable fields of `other` onto this profile.
    pub fn merge_public_fields(&mut self, other: &UserProfile) {
        self.name = other.name.clone();
        self.avatar_seed = other.avatar_seed.clone();
        self.avatar_type = other.avatar_type.clone();
        self.avatar_image = other.avatar_image.clone();
        self.accessory = other.accessory.clone();
    }

    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(seed) = &update.avatar_seed {
            self.avatar_seed = Some(seed.clone());
        }
        if let Some(kind) = &update.avatar_type {
            self.avatar_type = Some(kind.clone());
        }
        if let Some(image) = &update.avatar_image {
            self.avatar_image = Some(image.clone());
        }
        if let Some(accessory) = &update.accessory {
            self.accessory = Some(accessory.clone());
        }
    }
}

/// Partial profile change. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub avatar_seed: Option<String>,
    #[serde(default)]
    pub avatar_type: Option<String>,
    #[serde(default)]
    pub avatar_image: Option<String>,
    #[serde(default)]
    pub accessory: Option<String>,
}

/// A user's membership record inside one room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: UserId,
    pub name: String,
    pub avatar_seed: Option<String>,
    pub avatar_type: Option<String>,
    pub avatar_image: Option<String>,
    pub accessory: Option<String>,
    pub connection_id: ConnectionId,
    /// Cleared while the slot is held for a player whose connection dropped.
    #[serde(default = "connected_default")]
    pub connected: bool,
}

fn connected_default() -> bool {
    true
}

impl PlayerRef {
    pub fn new(profile: &UserProfile, connection_id: ConnectionId) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            avatar_seed: profile.avatar_seed.clone(),
            avatar_type: profile.avatar_type.clone(),
            avatar_image: profile.avatar_image.clone(),
            accessory: profile.accessory.clone(),
            connection_id,
            connected: true,
        }
    }

    /// Re-denormalize the public fields from a newer profile, keeping the connection.
    pub fn refresh(&mut self, profile: &UserProfile) {
        let (connection_id, connected) = (self.connection_id, self.connected);
        *self = Self::new(profile, connection_id);
        self.connected = connected;
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            avatar_seed: self.avatar_seed.clone(),
            avatar_type: self.avatar_type.clone(),
            avatar_image: self.avatar_image.clone(),
            accessory: self.accessory.clone(),
            is_guest: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Faction {
    Impostor,
    Citizen,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub total_games: u32,
    pub wins_impostor: u32,
    pub wins_citizen: u32,
    pub games_as_impostor: u32,
    pub games_as_citizen: u32,
    /// Game ids already counted, so a finished match is recorded once.
    #[serde(default)]
    pub recorded_games: Vec<String>,
}

impl PlayerStats {
    /// Count one finished game. Returns false if `game_id` was already recorded.
    pub fn record(&mut self, game_id: &str, faction: Faction, won: bool) -> bool {
        if self.recorded_games.iter().any(|g| g == game_id) {
            return false;
        }
        self.recorded_games.push(game_id.to_string());
        self.total_games += 1;
        match faction {
            Faction::Impostor => {
                self.games_as_impostor += 1;
                if won {
                    self.wins_impostor += 1;
                }
            }
            Faction::Citizen => {
                self.games_as_citizen += 1;
                if won {
                    self.wins_citizen += 1;
                }
            }
        }
        true
    }

    pub fn total_wins(&self) -> u32 {
        self.wins_impostor + self.wins_citizen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_is_idempotent_per_game() {
        let mut stats = PlayerStats::default();
        assert!(stats.record("g1", Faction::Impostor, true));
        assert!(!stats.record("g1", Faction::Impostor, true));
        assert!(stats.record("g2", Faction::Citizen, false));

        assert_eq!(stats.total_games, 2);
        assert_eq!(stats.wins_impostor, 1);
        assert_eq!(stats.wins_citizen, 0);
        assert_eq!(stats.games_as_citizen, 1);
        assert_eq!(stats.total_wins(), 1);
    }

    #[test]
    fn test_profile_update_only_touches_given_fields() {
        let mut profile = UserProfile::new(Uuid::new_v4(), "Ana");
        profile.avatar_seed = Some("old".into());
        profile.apply(&ProfileUpdate {
            accessory: Some("hat".into()),
            ..Default::default()
        });
        assert_eq!(profile.avatar_seed.as_deref(), Some("old"));
        assert_eq!(profile.accessory.as_deref(), Some("hat"));
    }

    #[test]
    fn test_player_ref_refresh_keeps_connection() {
        let conn = Uuid::new_v4();
        let mut profile = UserProfile::new(Uuid::new_v4(), "Rui");
        let mut player = PlayerRef::new(&profile, conn);

        profile.avatar_image = Some("img".into());
        player.refresh(&profile);

        assert_eq!(player.connection_id, conn);
        assert_eq!(player.avatar_image.as_deref(), Some("img"));
    }
}
