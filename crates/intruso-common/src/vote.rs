use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::{MatchError, MatchPhase, MatchState};
use crate::player::{Faction, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ballot {
    pub voter: UserId,
    pub target: UserId,
}

/// Where the vote stands after a ballot (or a departure) was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteProgress {
    Waiting { cast: usize, required: usize },
    Runoff(Vec<UserId>),
    Finalized,
}

/// Derived result of a finished match. Never stored, recomputed from votes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchOutcome {
    pub eliminated: Option<UserId>,
    pub winner: Faction,
    /// Counted (non-impostor) ballots per target, highest first.
    pub tally: Vec<(UserId, usize)>,
}

impl MatchOutcome {
    pub fn is_winner(&self, faction: Faction) -> bool {
        self.winner == faction
    }
}

/// Count ballots per target, ignoring ballots cast by impostors.
pub fn tally(votes: &BTreeMap<UserId, UserId>, impostor_ids: &[UserId]) -> BTreeMap<UserId, usize> {
    let mut counts = BTreeMap::new();
    for (voter, target) in votes {
        if impostor_ids.contains(voter) {
            continue;
        }
        *counts.entry(*target).or_insert(0) += 1;
    }
    counts
}

/// Targets sharing the highest count, ordered by their position in `order`.
pub fn leaders(counts: &BTreeMap<UserId, usize>, order: &[UserId]) -> Vec<UserId> {
    let Some(max) = counts.values().copied().max() else {
        return Vec::new();
    };
    let mut tied: Vec<UserId> = counts
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(id, _)| *id)
        .collect();
    tied.sort_by_key(|id| order.iter().position(|o| o == id).unwrap_or(usize::MAX));
    tied
}

impl MatchState {
    /// Ballots needed before the tally runs. Impostors sit out a runoff.
    pub fn required_ballots(&self, player_count: usize) -> usize {
        if self.is_runoff {
            player_count.saturating_sub(self.impostor_ids.len())
        } else {
            player_count
        }
    }

    /// Merge one ballot (last ballot per voter wins) and settle the vote if
    /// the threshold is reached. `present` is the room's current player list.
    pub fn cast_vote(&mut self, ballot: Ballot, present: &[UserId]) -> Result<VoteProgress, MatchError> {
        if self.phase != MatchPhase::Vote {
            return Err(MatchError::WrongPhase(self.phase));
        }
        if !present.contains(&ballot.voter) {
            return Err(MatchError::NotAParticipant);
        }
        if !self.turn_order.contains(&ballot.target) {
            return Err(MatchError::InvalidTarget);
        }
        if self.is_runoff {
            if self.is_impostor(ballot.voter) {
                return Err(MatchError::ImpostorInRunoff);
            }
            if !self.runoff_candidates.contains(&ballot.target) {
                return Err(MatchError::InvalidTarget);
            }
        }

        self.votes.insert(ballot.voter, ballot.target);
        Ok(self.settle_votes(present.len()))
    }

    /// Run the tally if enough ballots are in. A first-ballot tie opens a
    /// runoff between the tied targets; anything else finishes the match.
    pub fn settle_votes(&mut self, player_count: usize) -> VoteProgress {
        let required = self.required_ballots(player_count);
        if self.phase != MatchPhase::Vote || self.votes.len() < required {
            return VoteProgress::Waiting {
                cast: self.votes.len(),
                required,
            };
        }

        let counts = tally(&self.votes, &self.impostor_ids);
        let tied = leaders(&counts, &self.turn_order);

        if tied.len() > 1 && !self.is_runoff {
            self.is_runoff = true;
            self.runoff_candidates = tied.clone();
            self.votes.clear();
            return VoteProgress::Runoff(tied);
        }

        self.phase = MatchPhase::Result;
        VoteProgress::Finalized
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        if self.phase != MatchPhase::Result {
            return None;
        }

        let counts = tally(&self.votes, &self.impostor_ids);
        let tied = leaders(&counts, &self.turn_order);
        let eliminated = match tied.as_slice() {
            [single] => Some(*single),
            _ => None,
        };
        let winner = match eliminated {
            Some(id) if self.is_impostor(id) => Faction::Citizen,
            _ => Faction::Impostor,
        };

        let mut ranked: Vec<(UserId, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        Some(MatchOutcome {
            eliminated,
            winner,
            tally: ranked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Build a match already in the vote phase with a fixed turn order and
    /// the given impostors.
    fn voting(players: &[UserId], impostors: &[UserId]) -> MatchState {
        MatchState {
            phase: MatchPhase::Vote,
            secret_word: "Piano".into(),
            category: "General".into(),
            impostor_ids: impostors.to_vec(),
            turn_order: players.to_vec(),
            current_turn_index: 0,
            round: 3,
            total_rounds: 2,
            ready_players: players.to_vec(),
            votes: BTreeMap::new(),
            is_runoff: false,
            runoff_candidates: Vec::new(),
            game_id: Some("game".into()),
        }
    }

    fn ids(n: usize) -> Vec<UserId> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn vote(state: &mut MatchState, present: &[UserId], voter: UserId, target: UserId) -> VoteProgress {
        state.cast_vote(Ballot { voter, target }, present).unwrap()
    }

    #[test]
    fn test_impostor_ballot_counts_toward_threshold_but_not_tally() {
        let p = ids(5);
        let (a, b, c, d, e) = (p[0], p[1], p[2], p[3], p[4]);
        let mut state = voting(&p, &[c]);

        assert_eq!(vote(&mut state, &p, a, c), VoteProgress::Waiting { cast: 1, required: 5 });
        vote(&mut state, &p, b, c);
        vote(&mut state, &p, c, c);
        vote(&mut state, &p, d, e);
        assert_eq!(vote(&mut state, &p, e, c), VoteProgress::Finalized);

        let counts = tally(&state.votes, &state.impostor_ids);
        assert_eq!(counts.get(&c), Some(&3));
        assert_eq!(counts.get(&e), Some(&1));

        let outcome = state.outcome().unwrap();
        assert_eq!(outcome.eliminated, Some(c));
        assert_eq!(outcome.winner, Faction::Citizen);
        assert_eq!(outcome.tally[0], (c, 3));
    }

    #[test]
    fn test_eliminating_a_citizen_lets_impostors_win() {
        let p = ids(3);
        let mut state = voting(&p, &[p[2]]);
        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[0]);
        assert!(matches!(vote(&mut state, &p, p[2], p[0]), VoteProgress::Runoff(_)));
        vote(&mut state, &p, p[0], p[1]);
        assert_eq!(vote(&mut state, &p, p[1], p[1]), VoteProgress::Finalized);

        let outcome = state.outcome().unwrap();
        assert_eq!(outcome.eliminated, Some(p[1]));
        assert_eq!(outcome.winner, Faction::Impostor);
        assert!(outcome.is_winner(state.faction(p[2])));
        assert!(!outcome.is_winner(state.faction(p[0])));
    }

    #[test]
    fn test_last_ballot_from_same_voter_wins() {
        let p = ids(3);
        let mut state = voting(&p, &[p[2]]);
        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[0], p[2]);
        assert_eq!(state.votes.len(), 1);
        assert_eq!(state.votes.get(&p[0]), Some(&p[2]));
    }

    #[test]
    fn test_tie_triggers_runoff_then_second_tie_finalizes_without_elimination() {
        let p = ids(4);
        let impostor = p[3];
        let mut state = voting(&p, &[impostor]);

        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[0]);
        vote(&mut state, &p, p[2], p[3]);
        let progress = vote(&mut state, &p, impostor, p[0]);

        assert_eq!(progress, VoteProgress::Runoff(vec![p[0], p[1], p[3]]));
        assert!(state.is_runoff);
        assert!(state.votes.is_empty());
        assert_eq!(state.runoff_candidates, vec![p[0], p[1], p[3]]);
        assert_eq!(state.phase, MatchPhase::Vote);
        assert_eq!(state.required_ballots(p.len()), 3);

        vote(&mut state, &p, p[0], p[1]);
        assert_eq!(
            vote(&mut state, &p, p[1], p[0]),
            VoteProgress::Waiting { cast: 2, required: 3 }
        );
        assert_eq!(vote(&mut state, &p, p[2], p[3]), VoteProgress::Finalized);
        assert_eq!(state.phase, MatchPhase::Result);

        let outcome = state.outcome().unwrap();
        assert_eq!(outcome.eliminated, None);
        assert_eq!(outcome.winner, Faction::Impostor);
    }

    #[test]
    fn test_two_way_tie_runoff_between_two_candidates() {
        let p = ids(5);
        let impostor = p[4];
        let mut state = voting(&p, &[impostor]);

        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[0]);
        vote(&mut state, &p, p[2], p[1]);
        vote(&mut state, &p, p[3], p[0]);
        let progress = vote(&mut state, &p, impostor, p[2]);
        assert_eq!(progress, VoteProgress::Runoff(vec![p[0], p[1]]));

        // Four eligible voters split again.
        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[0]);
        vote(&mut state, &p, p[2], p[0]);
        assert_eq!(vote(&mut state, &p, p[3], p[1]), VoteProgress::Finalized);
        assert_eq!(state.outcome().unwrap().eliminated, None);
    }

    #[test]
    fn test_runoff_threshold_still_discounts_departed_impostor() {
        let p = ids(5);
        let impostor = p[4];
        let mut state = voting(&p, &[impostor]);
        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[0]);
        vote(&mut state, &p, p[2], p[1]);
        vote(&mut state, &p, p[3], p[0]);
        assert_eq!(vote(&mut state, &p, impostor, p[2]), VoteProgress::Runoff(vec![p[0], p[1]]));

        let present = &p[..4];
        state.player_left(impostor, present);
        assert_eq!(state.required_ballots(present.len()), 3);

        vote(&mut state, present, p[0], p[1]);
        vote(&mut state, present, p[1], p[0]);
        assert_eq!(vote(&mut state, present, p[2], p[1]), VoteProgress::Finalized);
        assert!(!state.votes.contains_key(&p[3]));
        assert_eq!(state.outcome().unwrap().eliminated, Some(p[1]));
    }

    #[test]
    fn test_clear_leader_skips_runoff() {
        let p = ids(4);
        let impostor = p[3];
        let mut state = voting(&p, &[impostor]);

        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[0]);
        vote(&mut state, &p, p[2], p[0]);
        // Would tie p[0] and p[1] if the impostor ballot counted.
        let progress = vote(&mut state, &p, impostor, p[1]);

        assert_eq!(progress, VoteProgress::Finalized);
        assert!(!state.is_runoff);
        assert_eq!(state.outcome().unwrap().eliminated, Some(p[0]));
    }

    #[test]
    fn test_runoff_rules() {
        let p = ids(4);
        let impostor = p[3];
        let mut state = voting(&p, &[impostor]);
        state.is_runoff = true;
        state.runoff_candidates = vec![p[0], p[1]];

        assert_eq!(
            state.cast_vote(Ballot { voter: impostor, target: p[0] }, &p),
            Err(MatchError::ImpostorInRunoff)
        );
        assert_eq!(
            state.cast_vote(Ballot { voter: p[0], target: p[2] }, &p),
            Err(MatchError::InvalidTarget)
        );
        assert!(state.cast_vote(Ballot { voter: p[0], target: p[1] }, &p).is_ok());
    }

    #[test]
    fn test_ballot_validation() {
        let p = ids(3);
        let mut state = voting(&p, &[p[0]]);
        let stranger = Uuid::new_v4();
        assert_eq!(
            state.cast_vote(Ballot { voter: stranger, target: p[0] }, &p),
            Err(MatchError::NotAParticipant)
        );
        assert_eq!(
            state.cast_vote(Ballot { voter: p[1], target: stranger }, &p),
            Err(MatchError::InvalidTarget)
        );

        state.phase = MatchPhase::Round;
        assert_eq!(
            state.cast_vote(Ballot { voter: p[1], target: p[0] }, &p),
            Err(MatchError::WrongPhase(MatchPhase::Round))
        );
    }

    #[test]
    fn test_departure_removes_ballot_and_can_settle_vote() {
        let p = ids(4);
        let mut state = voting(&p, &[p[3]]);
        vote(&mut state, &p, p[0], p[3]);
        vote(&mut state, &p, p[1], p[3]);
        vote(&mut state, &p, p[3], p[0]);

        let present = [p[0], p[1], p[3]];
        state.player_left(p[2], &present);
        assert_eq!(state.phase, MatchPhase::Result);
        assert_eq!(state.outcome().unwrap().eliminated, Some(p[3]));
    }

    #[test]
    fn test_only_impostor_ballots_finalize_without_elimination() {
        let p = ids(3);
        let mut state = voting(&p, &[p[0], p[1], p[2]]);
        vote(&mut state, &p, p[0], p[1]);
        vote(&mut state, &p, p[1], p[2]);
        assert_eq!(vote(&mut state, &p, p[2], p[0]), VoteProgress::Finalized);
        assert_eq!(state.outcome().unwrap().eliminated, None);
    }
}
