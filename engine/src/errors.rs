// ═══════════════════════════════════════════════════════════════════════
// Error types
//
// Two classes of failure exist in this engine:
//   - Illegal player actions: rejected with a Rejection reason code sent to
//     the requesting client only. No mutation happens before validation.
//   - Contract violations (wrong-kind routing, unknown discriminants,
//     missing commander): these are bugs, not player errors, and panic.
// ═══════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason codes for rejected player actions. Serialized kebab-case on the
/// wire, e.g. `"only-players-can-vote"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rejection {
    #[error("user already controls a house in this game")]
    AlreadyPlaying,
    #[error("another vote is already ongoing")]
    OngoingVote,
    #[error("the game has been cancelled")]
    GameCancelled,
    #[error("the game has ended")]
    GameEnded,
    #[error("only players of this game can vote")]
    OnlyPlayersCanVote,
    #[error("the minimum player count has been reached")]
    MinPlayerCountReached,
    #[error("it is not this user's turn to act")]
    NotYourTurn,
    #[error("this house has already voted")]
    AlreadyVoted,
    #[error("this vote is no longer ongoing")]
    VoteNotOngoing,
    #[error("the requested action is not legal in the current phase")]
    IllegalChoice,
    #[error("unknown user")]
    UnknownUser,
}

/// Failure of the external persistence/notification collaborator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
