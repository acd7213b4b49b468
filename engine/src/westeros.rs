// ═══════════════════════════════════════════════════════════════════════
// Westeros phase — draws the top card of the Westeros deck and executes
// its effect against the whole board before the action phase begins.
//
// Card effects are batch effects: every mutation they cause is applied
// (and broadcast) before the phase proceeds, because later cards in the
// same batch may read the just-updated totals.
// ═══════════════════════════════════════════════════════════════════════

use crate::messages::GameLogEntry;
use crate::state::PhaseCtx;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WesterosCardType {
    /// Every house gains power for crown icons and uncontested ports.
    GameOfThrones,
    /// No effect.
    LastDaysOfSummer,
}

impl WesterosCardType {
    pub fn execute(self, ctx: &mut PhaseCtx<'_>) {
        match self {
            WesterosCardType::GameOfThrones => execute_game_of_thrones(ctx),
            WesterosCardType::LastDaysOfSummer => {}
        }
    }
}

/// The "Game of Thrones" card: for every house, sum the crown icons of its
/// controlled regions, plus one per controlled port whose adjacent sea is
/// uncontrolled or controlled by the same house. Houses with a positive sum
/// receive the gain; each gain is broadcast individually.
fn execute_game_of_thrones(ctx: &mut PhaseCtx<'_>) {
    let houses: Vec<HouseName> = ctx.game.turn_order().collect();

    let gains: Vec<(HouseName, i32)> = houses
        .iter()
        .map(|&house| {
            let controlled = ctx.game.world.controlled_regions(house);
            let crowns: i32 = controlled.iter().map(|r| r.crown_icons as i32).sum();
            let ports: i32 = controlled
                .iter()
                .filter(|r| r.kind == RegionKind::Port)
                .filter(|r| {
                    let sea = ctx.game.world.adjacent_sea_of_port(r.id);
                    sea.controller().is_none() || sea.controller() == Some(house)
                })
                .count() as i32;
            (house, crowns + ports)
        })
        .filter(|(_, gain)| *gain > 0)
        .collect();

    for (house, gain) in gains {
        ctx.change_power_tokens(house, gain);
    }
}

/// The Westeros phase node. Always completes synchronously: no card in
/// scope suspends for player input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WesterosState {
    pub executed: Vec<WesterosCardType>,
}

impl WesterosState {
    pub fn new() -> Self {
        WesterosState::default()
    }

    /// Draw and execute the top Westeros card. Returns true (phase done).
    pub fn first_start(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        if ctx.game.westeros_deck.is_empty() {
            return true;
        }
        let card = ctx.game.westeros_deck.remove(0);
        // Cycle the card to the bottom of the deck.
        ctx.game.westeros_deck.push(card);
        log::debug!("westeros card drawn: {card:?}");
        ctx.log(GameLogEntry::WesterosCardExecuted { card });
        card.execute(ctx);
        self.executed.push(card);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Outbound, Outbox, ServerMessage};
    use crate::setup::{demo_game, regions};
    use crate::types::Player;
    use std::collections::BTreeMap;

    fn ctx_fixture() -> (crate::game::Game, BTreeMap<crate::types::UserId, Player>) {
        (demo_game(), BTreeMap::new())
    }

    #[test]
    fn test_game_of_thrones_grants_crowns_plus_free_ports() {
        let (mut game, players) = ctx_fixture();
        // Stark controls Winterfell (1 crown) from setup. Give Lannister its
        // port; its own ship controls the adjacent sea, so the port counts.
        let before_stark = game.house(HouseName::Stark).power_tokens;
        let before_lan = game.house(HouseName::Lannister).power_tokens;

        let mut log = Vec::new();
        let mut out = Outbox::new();
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        execute_game_of_thrones(&mut ctx);

        // Winterfell 1 crown → +1.
        assert_eq!(
            game.house(HouseName::Stark).power_tokens,
            before_stark + 1
        );
        // Lannisport 1 crown + port with self-controlled sea → +2.
        assert_eq!(
            game.house(HouseName::Lannister).power_tokens,
            before_lan + 2
        );
    }

    #[test]
    fn test_contested_port_grants_nothing() {
        let (mut game, players) = ctx_fixture();
        // An enemy ship takes The Golden Sound: Lannister's port no longer
        // counts, only the Lannisport crown icon does.
        game.world
            .region_mut(regions::THE_GOLDEN_SOUND)
            .units
            .clear();
        game.world.region_mut(regions::THE_GOLDEN_SOUND).units.push(Unit {
            unit_type: UnitType::Ship,
            house: HouseName::Stark,
        });
        let before = game.house(HouseName::Lannister).power_tokens;
        let mut log = Vec::new();
        let mut out = Outbox::new();
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        execute_game_of_thrones(&mut ctx);
        assert_eq!(game.house(HouseName::Lannister).power_tokens, before + 1);
    }

    #[test]
    fn test_each_gain_broadcast_individually() {
        let (mut game, players) = ctx_fixture();
        let mut log = Vec::new();
        let mut out = Outbox::new();
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        execute_game_of_thrones(&mut ctx);
        let broadcasts = out
            .items()
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    Outbound::Broadcast(ServerMessage::ChangePowerToken { .. })
                )
            })
            .count();
        // All three demo houses have at least one crown icon.
        assert_eq!(broadcasts, 3);
    }

    #[test]
    fn test_westeros_phase_cycles_deck() {
        let (mut game, players) = ctx_fixture();
        let first = game.westeros_deck[0];
        let len = game.westeros_deck.len();
        let mut log = Vec::new();
        let mut out = Outbox::new();
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        let mut state = WesterosState::new();
        assert!(state.first_start(&mut ctx));
        assert_eq!(state.executed, vec![first]);
        assert_eq!(game.westeros_deck.len(), len);
        assert_eq!(*game.westeros_deck.last().unwrap(), first);
    }
}
