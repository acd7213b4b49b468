// ═══════════════════════════════════════════════════════════════════════
// Consolidate-power resolution — walks the houses in turn order, resolving
// consolidate-power (and vassal defense-muster) orders one house at a
// time. Resolution cascades synchronously through fast-trackable houses
// and suspends on a mustering leaf whenever a choice is required.
// ═══════════════════════════════════════════════════════════════════════

use crate::errors::Rejection;
use crate::game::Game;
use crate::messages::{ClientMessage, GameLogEntry};
use crate::mustering::PlayerMusteringState;
use crate::state::{PhaseCtx, ViewCtx};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Power-token gain of resolving a consolidate-power order on `region` for
/// `house`, before the engine-wide cap is applied.
///
/// An Iron Bank order never grants power. A sea grants nothing; a port
/// grants one token only while its adjacent sea is uncontrolled or held by
/// the same house; a land region grants one plus its crown icons.
pub fn potential_gained_power_tokens(game: &Game, region: RegionId, house: HouseName) -> i32 {
    let r = game.world.region(region);
    if r.order.map_or(false, |o| o.kind == OrderKind::IronBank) {
        return 0;
    }
    match r.kind {
        RegionKind::Sea => 0,
        RegionKind::Port => {
            let sea = game.world.adjacent_sea_of_port(region);
            if sea.controller().is_none() || sea.controller() == Some(house) {
                1
            } else {
                0
            }
        }
        RegionKind::Land => 1 + r.crown_icons as i32,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConsolidatePowerState {
    /// The last house whose order was resolved; the next scan starts after
    /// it in turn order.
    pub last_resolved: Option<HouseName>,
    /// Live mustering leaf, present only while suspended for player input.
    pub child: Option<PlayerMusteringState>,
}

impl ResolveConsolidatePowerState {
    pub fn new() -> Self {
        ResolveConsolidatePowerState {
            last_resolved: None,
            child: None,
        }
    }

    /// Returns true when the whole resolution is already done.
    pub fn first_start(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        ctx.log(GameLogEntry::ActionPhaseResolveConsolidatePowerBegan);
        self.proceed_next_resolve(ctx)
    }

    fn cp_regions(&self, game: &Game, house: HouseName) -> Vec<RegionId> {
        game.world
            .ordered_regions_of_house(house, |o| o.kind.is_consolidate_power())
    }

    fn defense_muster_regions(&self, game: &Game, house: HouseName) -> Vec<RegionId> {
        game.world
            .ordered_regions_of_house(house, |o| o.kind == OrderKind::DefenseMuster)
    }

    /// Scan the fixed cyclic turn order, starting after the last-resolved
    /// house, for the first house with a pending consolidate-power order
    /// (or, for a vassal, a pending defense-muster order). At most one full
    /// cycle is scanned; `None` means the phase is exhausted.
    pub fn next_house_to_resolve(&self, game: &Game) -> Option<HouseName> {
        let mut house = match self.last_resolved {
            Some(h) => game.next_in_turn_order(h),
            None => game.first_in_turn_order(),
        };
        for _ in 0..game.houses.len() {
            let has_cp = !self.cp_regions(game, house).is_empty();
            let has_vassal_dm = game.vassal_relations.is_vassal(house)
                && !self.defense_muster_regions(game, house).is_empty();
            if has_cp || has_vassal_dm {
                return Some(house);
            }
            house = game.next_in_turn_order(house);
        }
        None
    }

    /// Drive resolution forward until it either exhausts every house (true)
    /// or suspends on a mustering leaf (false).
    pub fn proceed_next_resolve(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        loop {
            let house = match self.next_house_to_resolve(ctx.game) {
                Some(h) => h,
                None => return true,
            };

            let cp = self.cp_regions(ctx.game, house);
            if cp.is_empty() {
                // Vassal with a defense-muster order only.
                let mut leaf =
                    PlayerMusteringState::new(house, MusterType::DefenseMusterOrder);
                leaf.first_start(ctx);
                self.child = Some(leaf);
                return false;
            }

            let fast_trackable = cp.iter().all(|r| {
                let region = ctx.game.world.region(*r);
                let starred = region.order.map_or(false, |o| o.starred);
                !starred || !region.has_structure
            });
            if fast_trackable {
                // First eligible order in stable input order; no player
                // interaction needed.
                let region = cp[0];
                let starred = ctx
                    .game
                    .world
                    .region(region)
                    .order
                    .map_or(false, |o| o.starred);
                let gain = potential_gained_power_tokens(ctx.game, region, house);
                let applied = if gain > 0 {
                    ctx.change_power_tokens(house, gain)
                } else {
                    0
                };
                ctx.game.world.region_mut(region).order = None;
                ctx.log(GameLogEntry::ConsolidatePowerOrderResolved {
                    house,
                    region,
                    starred,
                    power_token_count: applied,
                });
                self.last_resolved = Some(house);
                continue;
            }

            // A starred order on a structure exists: the player chooses
            // between mustering and power tokens.
            let mut leaf =
                PlayerMusteringState::new(house, MusterType::StarredConsolidatePower);
            leaf.first_start(ctx);
            self.child = Some(leaf);
            return false;
        }
    }

    pub fn waited_users(&self, view: ViewCtx<'_>) -> Vec<UserId> {
        match &self.child {
            Some(leaf) => leaf.waited_users(view),
            None => Vec::new(),
        }
    }

    /// Forward a player message to the live leaf. Returns true when the
    /// whole resolution phase completed as a result.
    pub fn on_player_message(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        player: &Player,
        msg: &ClientMessage,
    ) -> Result<bool, Rejection> {
        let leaf = self
            .child
            .as_mut()
            .unwrap_or_else(|| panic!("consolidate-power resolution has no live child"));
        match leaf.on_player_message(ctx, player, msg)? {
            Some(outcome) => {
                ctx.game.world.region_mut(outcome.region).order = None;
                self.last_resolved = Some(outcome.house);
                self.child = None;
                Ok(self.proceed_next_resolve(ctx))
            }
            None => Ok(false),
        }
    }

    /// Resolve the suspended leaf without player input (the waited-on house
    /// just lost its player to a vassal-replacement vote). Returns true
    /// when the phase completed.
    pub fn resolve_default(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        let leaf = match self.child.take() {
            Some(l) => l,
            None => return false,
        };
        let outcome = leaf.resolve_default(ctx.game);
        ctx.game.world.region_mut(outcome.region).order = None;
        self.last_resolved = Some(outcome.house);
        self.proceed_next_resolve(ctx)
    }
}

impl Default for ResolveConsolidatePowerState {
    fn default() -> Self {
        ResolveConsolidatePowerState::new()
    }
}
