use serde::{Deserialize, Serialize};

use crate::words::WordSource;

pub const MIN_PLAYERS: u8 = 3;
pub const MAX_PLAYERS: u8 = 9;
pub const MAX_ROUNDS: u8 = 10;
pub const MAX_ROOM_NAME_LEN: usize = 40;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Whether a word tagged `word` may be drawn at this room difficulty.
    ///
    /// Easy draws only easy words, Medium draws easy and medium, Hard draws
    /// medium and hard.
    pub fn admits(self, word: Difficulty) -> bool {
        match self {
            Difficulty::Easy => word == Difficulty::Easy,
            Difficulty::Medium => word != Difficulty::Hard,
            Difficulty::Hard => word != Difficulty::Easy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSettings {
    pub max_players: u8,
    pub impostor_count: u8,
    pub rounds: u8,
    pub categories: Vec<String>,
    pub difficulty: Difficulty,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 4,
            impostor_count: 1,
            rounds: 2,
            categories: vec!["General".into()],
            difficulty: Difficulty::Medium,
        }
    }
}

/// One host-issued change to a lobby. `Name` and `Private` target the room
/// itself rather than [`RoomSettings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettingsChange {
    MaxPlayers(u8),
    ImpostorCount(u8),
    Rounds(u8),
    Categories(Vec<String>),
    Difficulty(Difficulty),
    Name(String),
    Private(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("max players must be between {} and {}", MIN_PLAYERS, MAX_PLAYERS)]
    MaxPlayersOutOfRange(u8),
    #[error("the room already has {0} players")]
    BelowPlayerCount(usize),
    #[error("impostor count must be at least 1 and below max players")]
    ImpostorCountOutOfRange(u8),
    #[error("rounds must be between 1 and {}", MAX_ROUNDS)]
    RoundsOutOfRange(u8),
    #[error("at least one category is required")]
    NoCategories,
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("room name must be between 1 and {} characters", MAX_ROOM_NAME_LEN)]
    InvalidName,
}

impl RoomSettings {
    /// Validate `change` against the current settings and room population.
    pub fn check(
        &self,
        change: &SettingsChange,
        player_count: usize,
        words: &dyn WordSource,
    ) -> Result<(), SettingsError> {
        match change {
            SettingsChange::MaxPlayers(max) => {
                if !(MIN_PLAYERS..=MAX_PLAYERS).contains(max) {
                    return Err(SettingsError::MaxPlayersOutOfRange(*max));
                }
                if (*max as usize) < player_count {
                    return Err(SettingsError::BelowPlayerCount(player_count));
                }
                if *max <= self.impostor_count {
                    return Err(SettingsError::ImpostorCountOutOfRange(self.impostor_count));
                }
            }
            SettingsChange::ImpostorCount(count) => {
                if *count < 1 || *count >= self.max_players {
                    return Err(SettingsError::ImpostorCountOutOfRange(*count));
                }
            }
            SettingsChange::Rounds(rounds) => {
                if !(1..=MAX_ROUNDS).contains(rounds) {
                    return Err(SettingsError::RoundsOutOfRange(*rounds));
                }
            }
            SettingsChange::Categories(categories) => {
                if categories.is_empty() {
                    return Err(SettingsError::NoCategories);
                }
                if let Some(unknown) = categories.iter().find(|c| !words.has_category(c)) {
                    return Err(SettingsError::UnknownCategory(unknown.clone()));
                }
            }
            SettingsChange::Name(name) => {
                let len = name.trim().chars().count();
                if len == 0 || len > MAX_ROOM_NAME_LEN {
                    return Err(SettingsError::InvalidName);
                }
            }
            SettingsChange::Difficulty(_) | SettingsChange::Private(_) => {}
        }
        Ok(())
    }

    /// Apply a change that has passed [`RoomSettings::check`]. Room-level
    /// variants are ignored here.
    pub fn apply(&mut self, change: SettingsChange) {
        match change {
            SettingsChange::MaxPlayers(max) => self.max_players = max,
            SettingsChange::ImpostorCount(count) => self.impostor_count = count,
            SettingsChange::Rounds(rounds) => self.rounds = rounds,
            SettingsChange::Categories(categories) => {
                let mut unique: Vec<String> = Vec::with_capacity(categories.len());
                for category in categories {
                    if !unique.contains(&category) {
                        unique.push(category);
                    }
                }
                self.categories = unique;
            }
            SettingsChange::Difficulty(difficulty) => self.difficulty = difficulty,
            SettingsChange::Name(_) | SettingsChange::Private(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words::WordBank;

    #[test]
    fn test_difficulty_pools() {
        assert!(Difficulty::Easy.admits(Difficulty::Easy));
        assert!(!Difficulty::Easy.admits(Difficulty::Medium));
        assert!(Difficulty::Medium.admits(Difficulty::Easy));
        assert!(!Difficulty::Medium.admits(Difficulty::Hard));
        assert!(Difficulty::Hard.admits(Difficulty::Medium));
        assert!(!Difficulty::Hard.admits(Difficulty::Easy));
    }

    #[test]
    fn test_counter_ranges() {
        let words = WordBank::builtin();
        let settings = RoomSettings::default();

        assert!(settings.check(&SettingsChange::MaxPlayers(2), 1, &words).is_err());
        assert!(settings.check(&SettingsChange::MaxPlayers(10), 1, &words).is_err());
        assert!(settings.check(&SettingsChange::MaxPlayers(9), 1, &words).is_ok());
        assert_eq!(
            settings.check(&SettingsChange::MaxPlayers(3), 4, &words),
            Err(SettingsError::BelowPlayerCount(4))
        );

        assert!(settings.check(&SettingsChange::ImpostorCount(0), 1, &words).is_err());
        assert!(settings.check(&SettingsChange::ImpostorCount(4), 1, &words).is_err());
        assert!(settings.check(&SettingsChange::ImpostorCount(3), 1, &words).is_ok());

        assert!(settings.check(&SettingsChange::Rounds(0), 1, &words).is_err());
        assert!(settings.check(&SettingsChange::Rounds(11), 1, &words).is_err());
    }

    #[test]
    fn test_max_players_cannot_drop_to_impostor_count() {
        let words = WordBank::builtin();
        let settings = RoomSettings {
            max_players: 6,
            impostor_count: 3,
            ..Default::default()
        };
        assert!(settings.check(&SettingsChange::MaxPlayers(3), 1, &words).is_err());
        assert!(settings.check(&SettingsChange::MaxPlayers(4), 1, &words).is_ok());
    }

    #[test]
    fn test_categories_must_be_known_and_non_empty() {
        let words = WordBank::builtin();
        let settings = RoomSettings::default();

        assert_eq!(
            settings.check(&SettingsChange::Categories(vec![]), 1, &words),
            Err(SettingsError::NoCategories)
        );
        assert_eq!(
            settings.check(&SettingsChange::Categories(vec!["Nope".into()]), 1, &words),
            Err(SettingsError::UnknownCategory("Nope".into()))
        );
    }

    #[test]
    fn test_apply_collapses_duplicate_categories() {
        let mut settings = RoomSettings::default();
        settings.apply(SettingsChange::Categories(vec![
            "Food".into(),
            "Animals".into(),
            "Food".into(),
        ]));
        assert_eq!(settings.categories, vec!["Food".to_string(), "Animals".to_string()]);
    }
}
