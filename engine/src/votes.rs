// ═══════════════════════════════════════════════════════════════════════
// Votes — the closed set of in-game vote variants and the tally logic.
//
// A vote is launched by a player, voted on by every non-vassal house, and
// accepted once positive votes reach two thirds of the electorate
// (rounded up). The acceptance side effects run at the session root,
// which owns the player table and the phase tree; this module only
// carries the vote entity itself.
// ═══════════════════════════════════════════════════════════════════════

use crate::errors::Rejection;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of vote behaviors. An unrecognized discriminant in a
/// serialized vote is a protocol error and fails deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum VoteType {
    CancelGame,
    EndGame,
    /// `replacer` takes over the seat of `replaced`.
    ReplacePlayer { replaced: UserId, replacer: UserId },
    /// The seat of `replaced` is handed to vassal control.
    ReplacePlayerByVassal { replaced: UserId },
}

impl VoteType {
    /// Human-readable description, used in vote-started log entries.
    pub fn verb(&self) -> String {
        match self {
            VoteType::CancelGame => "cancel the game".to_string(),
            VoteType::EndGame => "end the game after the current turn".to_string(),
            VoteType::ReplacePlayer { replaced, replacer } => {
                format!("replace {replaced} with {replacer}")
            }
            VoteType::ReplacePlayerByVassal { replaced } => {
                format!("replace {replaced} with a vassal")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteState {
    Ongoing,
    Accepted,
    Refused,
    /// The vote became moot before acceptance and was withdrawn.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: u64,
    pub initiator: UserId,
    pub vote_type: VoteType,
    /// Size of the electorate, fixed at launch.
    pub participant_count: usize,
    pub votes: BTreeMap<HouseName, bool>,
    pub state: VoteState,
}

impl Vote {
    pub fn new(id: u64, initiator: UserId, vote_type: VoteType, participant_count: usize) -> Self {
        Vote {
            id,
            initiator,
            vote_type,
            participant_count,
            votes: BTreeMap::new(),
            state: VoteState::Ongoing,
        }
    }

    /// Positive votes needed for acceptance: ⌈2·electorate/3⌉.
    pub fn threshold(&self) -> usize {
        (2 * self.participant_count + 2) / 3
    }

    pub fn positive_count(&self) -> usize {
        self.votes.values().filter(|c| **c).count()
    }

    /// Record a house's vote and update the terminal state. The caller has
    /// already verified the house is an eligible voter.
    pub fn cast(&mut self, house: HouseName, choice: bool) -> Result<VoteState, Rejection> {
        if self.state != VoteState::Ongoing {
            return Err(Rejection::VoteNotOngoing);
        }
        if self.votes.contains_key(&house) {
            return Err(Rejection::AlreadyVoted);
        }
        self.votes.insert(house, choice);

        let positive = self.positive_count();
        let remaining = self.participant_count - self.votes.len();
        if positive >= self.threshold() {
            self.state = VoteState::Accepted;
        } else if positive + remaining < self.threshold() {
            // Acceptance is no longer reachable.
            self.state = VoteState::Refused;
        }
        Ok(self.state)
    }

    pub fn cancel(&mut self) {
        self.state = VoteState::Cancelled;
    }

    pub fn is_ongoing(&self) -> bool {
        self.state == VoteState::Ongoing
    }
}
