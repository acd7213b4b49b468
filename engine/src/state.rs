// ═══════════════════════════════════════════════════════════════════════
// Phase plumbing — the context handed down the chain of phase nodes.
//
// The phase tree is a singly-branching chain: every node owns at most one
// active child, and only the deepest (leaf) node accepts player input.
// Nodes never hold parent pointers; instead, each node's methods receive a
// PhaseCtx with the entity graph, the player table and the outbox, and
// completion is reported upward through return values. Replacing the child
// is the only way to transition; the old child is discarded.
// ═══════════════════════════════════════════════════════════════════════

use crate::game::Game;
use crate::messages::{GameLogEntry, Notification, Outbox, ServerMessage};
use crate::types::*;
use std::collections::BTreeMap;

/// Mutable context for phase logic. Split-borrowed out of the ingame root
/// so a child node and the entity graph can be mutated together.
pub struct PhaseCtx<'a> {
    pub game: &'a mut Game,
    pub players: &'a BTreeMap<UserId, Player>,
    pub game_log: &'a mut Vec<GameLogEntry>,
    pub out: &'a mut Outbox,
}

impl PhaseCtx<'_> {
    /// Append a log entry and broadcast it.
    pub fn log(&mut self, entry: GameLogEntry) {
        self.out
            .broadcast(ServerMessage::GameLog { entry: entry.clone() });
        self.game_log.push(entry);
    }

    /// A vassal is a house with no controlling player.
    pub fn is_vassal_house(&self, house: HouseName) -> bool {
        !self.players.values().any(|p| p.house == house)
    }

    /// The player controlling a house: its own player, or the player of its
    /// commanding house if it is a vassal.
    pub fn try_controller_of_house(&self, house: HouseName) -> Option<&Player> {
        if let Some(p) = self.players.values().find(|p| p.house == house) {
            return Some(p);
        }
        let commander = self.game.vassal_relations.commander_of(house)?;
        self.players.values().find(|p| p.house == commander)
    }

    /// Like [`Self::try_controller_of_house`], but a missing controller is a
    /// contract violation.
    pub fn controller_of_house(&self, house: HouseName) -> &Player {
        self.try_controller_of_house(house)
            .unwrap_or_else(|| panic!("no controller for house {house}"))
    }

    /// Change a house's power tokens (capped by the engine-wide maximum)
    /// and broadcast the new total. Returns the delta actually applied.
    pub fn change_power_tokens(&mut self, house: HouseName, delta: i32) -> i32 {
        let applied = self.game.change_power_tokens(house, delta);
        self.out.broadcast(ServerMessage::ChangePowerToken {
            house_id: house,
            power_token_count: self.game.house(house).power_tokens,
        });
        applied
    }

    /// Queue a your-turn notification for whoever controls `house`.
    pub fn notify_your_turn(&mut self, house: HouseName) {
        if let Some(p) = self.try_controller_of_house(house) {
            let user = p.user.clone();
            self.out.notify(Notification::YourTurn, vec![user]);
        }
    }

    pub fn view(&self) -> ViewCtx<'_> {
        ViewCtx {
            game: self.game,
            players: self.players,
        }
    }
}

/// Read-only context, used for waited-user computation and view building.
#[derive(Clone, Copy)]
pub struct ViewCtx<'a> {
    pub game: &'a Game,
    pub players: &'a BTreeMap<UserId, Player>,
}

impl<'a> ViewCtx<'a> {
    pub fn is_vassal_house(&self, house: HouseName) -> bool {
        !self.players.values().any(|p| p.house == house)
    }

    pub fn try_controller_of_house(&self, house: HouseName) -> Option<&'a Player> {
        if let Some(p) = self.players.values().find(|p| p.house == house) {
            return Some(p);
        }
        let commander = self.game.vassal_relations.commander_of(house)?;
        self.players.values().find(|p| p.house == commander)
    }

    pub fn controller_of_house(&self, house: HouseName) -> &'a Player {
        self.try_controller_of_house(house)
            .unwrap_or_else(|| panic!("no controller for house {house}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::demo_game;

    fn players() -> BTreeMap<UserId, Player> {
        let mut m = BTreeMap::new();
        m.insert(
            UserId::from("u1"),
            Player {
                user: UserId::from("u1"),
                house: HouseName::Stark,
            },
        );
        m.insert(
            UserId::from("u2"),
            Player {
                user: UserId::from("u2"),
                house: HouseName::Lannister,
            },
        );
        m
    }

    #[test]
    fn test_vassal_house_has_commanders_controller() {
        let mut game = demo_game();
        game.vassal_relations
            .set(HouseName::Baratheon, HouseName::Stark);
        let players = players();
        let mut log = Vec::new();
        let mut out = Outbox::new();
        let ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        assert!(ctx.is_vassal_house(HouseName::Baratheon));
        assert!(!ctx.is_vassal_house(HouseName::Stark));
        assert_eq!(
            ctx.controller_of_house(HouseName::Baratheon).user,
            UserId::from("u1")
        );
    }

    #[test]
    #[should_panic(expected = "no controller")]
    fn test_orphan_house_controller_panics() {
        let mut game = demo_game();
        let players = players();
        let mut log = Vec::new();
        let mut out = Outbox::new();
        let ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        // Baratheon has neither a player nor a commander.
        ctx.controller_of_house(HouseName::Baratheon);
    }

    #[test]
    fn test_change_power_tokens_broadcasts() {
        let mut game = demo_game();
        let players = players();
        let mut log = Vec::new();
        let mut out = Outbox::new();
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        let applied = ctx.change_power_tokens(HouseName::Stark, 3);
        assert_eq!(applied, 3);
        assert!(matches!(
            out.items()[0],
            crate::messages::Outbound::Broadcast(ServerMessage::ChangePowerToken { .. })
        ));
    }
}
