use chrono::{DateTime, Utc};
use rand::Rng;

use intruso_common::game::{MatchError, MatchPhase, MatchState};
use intruso_common::lobby::{MatchView, RoomCode, RoomSnapshot, RoomStatus};
use intruso_common::player::{ConnectionId, Faction, PlayerRef, UserId, UserProfile};
use intruso_common::settings::{RoomSettings, SettingsChange, MIN_PLAYERS};
use intruso_common::vote::{Ballot, VoteProgress};
use intruso_common::words::{pick_word, WordSource};

use crate::error::CommandError;

/// Per-player result of a match that reached its result phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedMatch {
    pub game_id: String,
    pub results: Vec<PlayerResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerResult {
    pub user_id: UserId,
    pub faction: Faction,
    pub won: bool,
}

pub struct Room {
    pub code: RoomCode,
    pub name: String,
    pub host_id: UserId,
    pub players: Vec<PlayerRef>,
    pub settings: RoomSettings,
    pub status: RoomStatus,
    pub game: Option<MatchState>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    /// Creation order, breaks ties between equal timestamps.
    pub sequence: u64,
    closed: bool,
}

impl Room {
    pub fn new(code: RoomCode, sequence: u64, host: &UserProfile, connection_id: ConnectionId) -> Self {
        Self {
            code,
            name: format!("{}'s room", host.name),
            host_id: host.id,
            players: vec![PlayerRef::new(host, connection_id)],
            settings: RoomSettings::default(),
            status: RoomStatus::Lobby,
            game: None,
            is_private: false,
            created_at: Utc::now(),
            sequence,
            closed: false,
        }
    }

    /// A closed room has left the registry (or is about to) and accepts nothing.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_host(&self, user_id: UserId) -> bool {
        self.host_id == user_id
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.players.iter().any(|p| p.id == user_id)
    }

    pub fn player(&self, user_id: UserId) -> Option<&PlayerRef> {
        self.players.iter().find(|p| p.id == user_id)
    }

    pub fn player_ids(&self) -> Vec<UserId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Visible in the public room list.
    pub fn is_listed(&self) -> bool {
        self.status == RoomStatus::Lobby && !self.is_private && !self.closed
    }

    /// Add a player, or move an existing member to a new connection.
    /// Returns true for the latter.
    pub fn add_player(&mut self, profile: &UserProfile, connection_id: ConnectionId) -> Result<bool, CommandError> {
        if self.status != RoomStatus::Lobby {
            return Err(CommandError::MatchInProgress);
        }
        if self.reconnect(profile.id, connection_id).is_some() {
            return Ok(true);
        }
        if self.players.len() >= self.settings.max_players as usize {
            return Err(CommandError::RoomFull);
        }
        if self.players.iter().any(|p| p.name == profile.name) {
            return Err(CommandError::NameTaken);
        }
        self.players.push(PlayerRef::new(profile, connection_id));
        Ok(false)
    }

    /// Point an existing member at a new connection.
    pub fn reconnect(&mut self, user_id: UserId, connection_id: ConnectionId) -> Option<&PlayerRef> {
        let player = self.players.iter_mut().find(|p| p.id == user_id)?;
        player.connection_id = connection_id;
        player.connected = true;
        Some(&*player)
    }

    /// Hold the slot of a member whose connection dropped. Ignored if the
    /// slot already moved to another connection.
    pub fn mark_disconnected(&mut self, user_id: UserId, connection_id: ConnectionId) -> bool {
        match self
            .players
            .iter_mut()
            .find(|p| p.id == user_id && p.connection_id == connection_id)
        {
            Some(player) => {
                player.connected = false;
                true
            }
            None => false,
        }
    }

    /// Remove a member, migrating the host and reconciling a running match.
    /// Returns the finished match if this departure settled the vote.
    pub fn remove_player(&mut self, user_id: UserId) -> Result<Option<FinishedMatch>, CommandError> {
        let Some(index) = self.players.iter().position(|p| p.id == user_id) else {
            return Err(CommandError::NotInRoom);
        };
        self.players.remove(index);

        if self.host_id == user_id {
            if let Some(first) = self.players.first() {
                self.host_id = first.id;
            }
        }

        let present = self.player_ids();
        let settled = match self.game.as_mut() {
            Some(game) if !present.is_empty() => {
                let was_result = game.phase == MatchPhase::Result;
                game.player_left(user_id, &present);
                !was_result && game.phase == MatchPhase::Result
            }
            _ => false,
        };
        Ok(if settled { self.finished_match() } else { None })
    }

    /// Patch the profile copy of a member, keeping their connection.
    pub fn refresh_player(&mut self, profile: &UserProfile) -> bool {
        match self.players.iter_mut().find(|p| p.id == profile.id) {
            Some(player) => {
                player.refresh(profile);
                true
            }
            None => false,
        }
    }

    fn require_host(&self, user_id: UserId) -> Result<(), CommandError> {
        if !self.is_host(user_id) {
            return Err(CommandError::NotHost);
        }
        Ok(())
    }

    pub fn update_settings(
        &mut self,
        issuer: UserId,
        change: SettingsChange,
        words: &dyn WordSource,
    ) -> Result<(), CommandError> {
        self.require_host(issuer)?;
        if self.status != RoomStatus::Lobby {
            return Err(CommandError::MatchInProgress);
        }
        self.settings.check(&change, self.players.len(), words)?;

        match change {
            SettingsChange::Name(name) => self.name = name.trim().to_string(),
            SettingsChange::Private(private) => self.is_private = private,
            other => self.settings.apply(other),
        }
        Ok(())
    }

    pub fn start_match(
        &mut self,
        issuer: UserId,
        words: &dyn WordSource,
        rng: &mut impl Rng,
    ) -> Result<(), CommandError> {
        self.require_host(issuer)?;
        if self.status != RoomStatus::Lobby {
            return Err(CommandError::MatchInProgress);
        }
        if self.players.len() < MIN_PLAYERS as usize {
            return Err(MatchError::NotEnoughPlayers.into());
        }

        let word = pick_word(words, &self.settings.categories, self.settings.difficulty, rng)
            .ok_or(MatchError::NoWordsAvailable)?;
        let game = MatchState::start(
            &self.player_ids(),
            self.settings.impostor_count,
            self.settings.rounds,
            word,
            rng,
        )?;

        self.game = Some(game);
        self.set_status(RoomStatus::Playing);
        Ok(())
    }

    fn match_mut(&mut self) -> Result<&mut MatchState, CommandError> {
        if self.status == RoomStatus::Aborted {
            return Err(CommandError::RoomClosing);
        }
        self.game.as_mut().ok_or(CommandError::NoMatchInProgress)
    }

    pub fn mark_ready(&mut self, user_id: UserId) -> Result<bool, CommandError> {
        let present = self.player_ids();
        Ok(self.match_mut()?.mark_ready(user_id, &present)?)
    }

    pub fn next_turn(&mut self, issuer: UserId) -> Result<(), CommandError> {
        let is_host = self.is_host(issuer);
        Ok(self.match_mut()?.next_turn(issuer, is_host)?)
    }

    /// Record a ballot. Returns the finished match when the vote settled.
    pub fn cast_vote(&mut self, voter: UserId, target: UserId) -> Result<Option<FinishedMatch>, CommandError> {
        let present = self.player_ids();
        let progress = self.match_mut()?.cast_vote(Ballot { voter, target }, &present)?;
        match progress {
            VoteProgress::Waiting { cast, required } => {
                tracing::debug!(room = %self.code, cast, required, "Ballot recorded");
                Ok(None)
            }
            VoteProgress::Runoff(candidates) => {
                tracing::info!(room = %self.code, candidates = candidates.len(), "Vote tied, runoff");
                Ok(None)
            }
            VoteProgress::Finalized => Ok(self.finished_match()),
        }
    }

    /// Host-only return to the lobby from a running match. Slots held for
    /// disconnected players are released, returning their ids.
    pub fn restart(&mut self, issuer: UserId) -> Result<Vec<UserId>, CommandError> {
        self.require_host(issuer)?;
        match self.status {
            RoomStatus::Aborted => return Err(CommandError::RoomClosing),
            RoomStatus::Lobby => return Err(CommandError::NoMatchInProgress),
            RoomStatus::Playing => self.set_status(RoomStatus::Lobby),
        }

        let gone: Vec<UserId> = self
            .players
            .iter()
            .filter(|p| !p.connected)
            .map(|p| p.id)
            .collect();
        for &user_id in &gone {
            self.remove_player(user_id)?;
        }
        Ok(gone)
    }

    /// Host-only teardown mark. Returns false if the room was already aborted.
    pub fn abort(&mut self, issuer: UserId) -> Result<bool, CommandError> {
        self.require_host(issuer)?;
        if self.status == RoomStatus::Aborted {
            return Ok(false);
        }
        self.set_status(RoomStatus::Aborted);
        Ok(true)
    }

    /// Returning to the lobby discards the match.
    pub fn set_status(&mut self, status: RoomStatus) {
        self.status = status;
        if status == RoomStatus::Lobby {
            self.game = None;
        }
    }

    pub fn finished_match(&self) -> Option<FinishedMatch> {
        let game = self.game.as_ref()?;
        let outcome = game.outcome()?;
        let game_id = game.game_id.clone()?;
        let results = game
            .turn_order
            .iter()
            .map(|&user_id| {
                let faction = game.faction(user_id);
                PlayerResult {
                    user_id,
                    faction,
                    won: outcome.is_winner(faction),
                }
            })
            .collect();
        Some(FinishedMatch { game_id, results })
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.code.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
            host_id: self.host_id,
            players: self.players.clone(),
            settings: self.settings.clone(),
            status: self.status,
            game_state: self.game.as_ref().map(MatchView::from),
            is_private: self.is_private,
            created_at: self.created_at,
        }
    }
}
