use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::{Faction, UserId};
use crate::settings::MIN_PLAYERS;
use crate::words::SecretWord;

// -- Match State Machine --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchPhase {
    Reveal,
    Round,
    Vote,
    Result,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchState {
    pub phase: MatchPhase,
    pub secret_word: String,
    pub category: String,
    pub impostor_ids: Vec<UserId>,
    /// Frozen at start: players who leave keep their slot.
    pub turn_order: Vec<UserId>,
    pub current_turn_index: usize,
    pub round: u8,
    pub total_rounds: u8,
    /// Frozen like `turn_order`: acknowledgements survive a departure.
    pub ready_players: Vec<UserId>,
    pub votes: BTreeMap<UserId, UserId>,
    pub is_runoff: bool,
    pub runoff_candidates: Vec<UserId>,
    pub game_id: Option<String>,
}

/// Impostor count actually used for `player_count` players: at least one,
/// and always leaving one citizen.
pub fn effective_impostor_count(requested: u8, player_count: usize) -> usize {
    (requested as usize).clamp(1, player_count.saturating_sub(1).max(1))
}

impl MatchState {
    pub fn start(
        players: &[UserId],
        impostor_count: u8,
        total_rounds: u8,
        word: SecretWord,
        rng: &mut impl Rng,
    ) -> Result<Self, MatchError> {
        if players.len() < MIN_PLAYERS as usize {
            return Err(MatchError::NotEnoughPlayers);
        }

        let k = effective_impostor_count(impostor_count, players.len());
        let impostor_ids: Vec<UserId> = players.choose_multiple(rng, k).copied().collect();

        let mut turn_order = players.to_vec();
        turn_order.shuffle(rng);

        Ok(Self {
            phase: MatchPhase::Reveal,
            secret_word: word.word,
            category: word.category,
            impostor_ids,
            turn_order,
            current_turn_index: 0,
            round: 1,
            total_rounds: total_rounds.max(1),
            ready_players: Vec::new(),
            votes: BTreeMap::new(),
            is_runoff: false,
            runoff_candidates: Vec::new(),
            game_id: None,
        })
    }

    pub fn is_impostor(&self, user_id: UserId) -> bool {
        self.impostor_ids.contains(&user_id)
    }

    pub fn faction(&self, user_id: UserId) -> Faction {
        if self.is_impostor(user_id) {
            Faction::Impostor
        } else {
            Faction::Citizen
        }
    }

    /// Player holding the turn during [`MatchPhase::Round`].
    pub fn current_turn(&self) -> Option<UserId> {
        if self.phase != MatchPhase::Round {
            return None;
        }
        self.turn_order.get(self.current_turn_index).copied()
    }

    fn expect_phase(&self, phase: MatchPhase) -> Result<(), MatchError> {
        if self.phase != phase {
            return Err(MatchError::WrongPhase(self.phase));
        }
        Ok(())
    }

    /// Acknowledge the role reveal. `present` is the room's current player
    /// list. Returns true if this acknowledgement completed the reveal.
    pub fn mark_ready(&mut self, user_id: UserId, present: &[UserId]) -> Result<bool, MatchError> {
        self.expect_phase(MatchPhase::Reveal)?;
        if !present.contains(&user_id) {
            return Err(MatchError::NotAParticipant);
        }
        if !self.ready_players.contains(&user_id) {
            self.ready_players.push(user_id);
        }
        Ok(self.check_ready(present.len()))
    }

    /// Advance to the first round once enough players have acknowledged.
    pub fn check_ready(&mut self, player_count: usize) -> bool {
        if self.phase != MatchPhase::Reveal || self.ready_players.len() < player_count {
            return false;
        }
        self.phase = MatchPhase::Round;
        self.current_turn_index = 0;
        self.game_id = Some(Uuid::new_v4().simple().to_string());
        true
    }

    /// Pass the turn. Only the turn holder or the host may do this.
    pub fn next_turn(&mut self, issuer: UserId, issuer_is_host: bool) -> Result<(), MatchError> {
        self.expect_phase(MatchPhase::Round)?;
        if !issuer_is_host && self.current_turn() != Some(issuer) {
            return Err(MatchError::NotYourTurn);
        }
        self.advance_turn();
        Ok(())
    }

    fn advance_turn(&mut self) {
        self.current_turn_index += 1;
        if self.current_turn_index >= self.turn_order.len() {
            self.current_turn_index = 0;
            self.round += 1;
            if self.round > self.total_rounds {
                self.phase = MatchPhase::Vote;
            }
        }
    }

    /// Reconcile with a player having left the room mid-match. Their ballot is
    /// discarded and any pending ready-check or tally is re-run against the
    /// smaller player list.
    pub fn player_left(&mut self, user_id: UserId, present: &[UserId]) {
        self.votes.remove(&user_id);
        match self.phase {
            MatchPhase::Reveal => {
                self.check_ready(present.len());
            }
            MatchPhase::Vote => {
                self.settle_votes(present.len());
            }
            MatchPhase::Round | MatchPhase::Result => {}
        }
    }
}

// -- Errors --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("not enough players (need at least {})", MIN_PLAYERS)]
    NotEnoughPlayers,
    #[error("no words available for the selected categories and difficulty")]
    NoWordsAvailable,
    #[error("not allowed during the {0:?} phase")]
    WrongPhase(MatchPhase),
    #[error("not your turn")]
    NotYourTurn,
    #[error("player is not part of this match")]
    NotAParticipant,
    #[error("that player cannot be voted for")]
    InvalidTarget,
    #[error("impostors do not vote in a runoff")]
    ImpostorInRunoff,
}
