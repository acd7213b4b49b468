// ═══════════════════════════════════════════════════════════════════════
// Protocol boundary — inbound client messages, outbound server messages,
// game-log entries, and the Outbox.
//
// The engine mutates entity state synchronously and pushes the resulting
// outbound events into an Outbox; a dispatcher (transport layer) delivers
// them after the message handler returns. This keeps the core testable
// without a network.
//
// Wire tags are kebab-case `type` discriminants, e.g. "change-power-token".
// ═══════════════════════════════════════════════════════════════════════

use crate::errors::Rejection;
use crate::types::*;
use crate::votes::Vote;
use crate::westeros::WesterosCardType;
use serde::{Deserialize, Serialize};

// ── Inbound ────────────────────────────────────────────────────────────

/// One order placement during the planning phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub region: RegionId,
    pub order: Order,
}

/// One unit recruited during a mustering leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mustering {
    /// Where the unit is placed: the mustering region itself or one of its
    /// adjacent regions (ships go to the adjacent sea or port).
    pub to: RegionId,
    pub unit_type: UnitType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Planning: place this turn's orders for the sender's house (and any
    /// vassals it commands).
    PlaceOrders { orders: Vec<PlacedOrder> },
    /// March resolution: resolve the march order on `from`, optionally
    /// moving every unit to `to`. `None` removes the order without moving.
    ResolveMarch {
        from: RegionId,
        to: Option<RegionId>,
    },
    /// Combat: commit a power-token bid.
    CombatBid { power_tokens: u32 },
    /// Mustering leaf: recruit units from `region`.
    ResolveMustering {
        region: RegionId,
        musterings: Vec<Mustering>,
    },
    /// Mustering leaf (starred consolidate power only): forgo mustering and
    /// take the power tokens instead.
    TakePowerTokens { region: RegionId },
    /// Cast a vote.
    Vote { vote_id: u64, choice: bool },
    LaunchCancelGameVote,
    LaunchEndGameVote,
    /// Offer to take over a seat. The sender is the replacer.
    LaunchReplacePlayerVote { replaced: UserId },
    /// Propose handing a seat to vassal control.
    LaunchReplacePlayerByVassalVote { replaced: UserId },
}

// ── Outbound ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ChangePowerToken {
        house_id: HouseName,
        power_token_count: u32,
    },
    UpdateMaxTurns {
        max_turns: u32,
    },
    PlayerReplaced {
        old_user: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_user: Option<UserId>,
    },
    /// Full vassal relation table; broadcast whenever relations change.
    VassalRelations {
        relations: Vec<(HouseName, HouseName)>,
    },
    VoteStarted {
        vote: Vote,
    },
    VoteCast {
        vote_id: u64,
        house: HouseName,
        choice: bool,
    },
    VoteCancelled {
        vote_id: u64,
    },
    GameLog {
        entry: GameLogEntry,
    },
    /// Sent to the requesting client only; never broadcast.
    ActionRejected {
        reason: Rejection,
    },
}

/// Tagged log entries, appended to the session's game log and broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum GameLogEntry {
    TurnBegins {
        turn: u32,
    },
    WesterosCardExecuted {
        card: WesterosCardType,
    },
    ActionPhaseResolveConsolidatePowerBegan,
    ConsolidatePowerOrderResolved {
        house: HouseName,
        region: RegionId,
        starred: bool,
        power_token_count: i32,
    },
    PlayerMustered {
        house: HouseName,
        region: RegionId,
        musterings: Vec<Mustering>,
    },
    CombatResult {
        attacker: HouseName,
        defender: HouseName,
        region: RegionId,
        winner: HouseName,
    },
    PlayerReplaced {
        old_user: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_user: Option<UserId>,
        house: HouseName,
    },
    VoteStarted {
        initiator: UserId,
        verb: String,
    },
    GameEnded {
        winner: HouseName,
    },
    GameCancelled,
}

/// External notification hooks (delivered by the website backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Notification {
    ReadyToStart,
    YourTurn,
    BattleResults,
    NewVote,
    GameEnded,
}

/// One outbound effect, left for the dispatcher to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outbound {
    Broadcast(ServerMessage),
    Direct(UserId, ServerMessage),
    Notify {
        kind: Notification,
        users: Vec<UserId>,
    },
}

/// Ordered collection of outbound effects produced while handling one
/// inbound message.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outbound>,
}

impl Outbox {
    pub fn new() -> Self {
        Outbox::default()
    }

    pub fn broadcast(&mut self, msg: ServerMessage) {
        self.items.push(Outbound::Broadcast(msg));
    }

    pub fn direct(&mut self, user: &UserId, msg: ServerMessage) {
        self.items.push(Outbound::Direct(user.clone(), msg));
    }

    pub fn notify(&mut self, kind: Notification, users: Vec<UserId>) {
        if !users.is_empty() {
            self.items.push(Outbound::Notify { kind, users });
        }
    }

    pub fn items(&self) -> &[Outbound] {
        &self.items
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_wire_tags() {
        let msg = ServerMessage::ChangePowerToken {
            house_id: HouseName::Stark,
            power_token_count: 7,
        };
        let j = serde_json::to_value(&msg).unwrap();
        assert_eq!(j["type"], "change-power-token");
        assert_eq!(j["houseId"], "Stark");
        assert_eq!(j["powerTokenCount"], 7);
    }

    #[test]
    fn test_player_replaced_omits_absent_new_user() {
        let msg = ServerMessage::PlayerReplaced {
            old_user: UserId::from("u1"),
            new_user: None,
        };
        let j = serde_json::to_value(&msg).unwrap();
        assert_eq!(j["oldUser"], "u1");
        assert!(j.get("newUser").is_none());
    }

    #[test]
    fn test_client_message_round_trip() {
        let msg = ClientMessage::Vote {
            vote_id: 3,
            choice: true,
        };
        let j = serde_json::to_string(&msg).unwrap();
        assert!(j.contains("\"type\":\"vote\""));
        assert!(j.contains("\"voteId\":3"));
        let back: ClientMessage = serde_json::from_str(&j).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_discriminant_is_an_error() {
        let err = serde_json::from_str::<ClientMessage>("{\"type\":\"warg-into-raven\"}");
        assert!(err.is_err());
    }

    #[test]
    fn test_outbox_preserves_order() {
        let mut out = Outbox::new();
        out.broadcast(ServerMessage::UpdateMaxTurns { max_turns: 5 });
        out.direct(
            &UserId::from("u1"),
            ServerMessage::ActionRejected {
                reason: crate::errors::Rejection::NotYourTurn,
            },
        );
        let items = out.drain();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Outbound::Broadcast(_)));
        assert!(matches!(items[1], Outbound::Direct(..)));
        assert!(out.items().is_empty());
    }
}
