// ═══════════════════════════════════════════════════════════════════════
// Action phase — resolves the placed orders for one turn. March orders
// are resolved first (possibly suspending on a combat), then the
// consolidate-power resolution runs.
// ═══════════════════════════════════════════════════════════════════════

use crate::consolidate::ResolveConsolidatePowerState;
use crate::errors::Rejection;
use crate::messages::{ClientMessage, GameLogEntry, Notification};
use crate::state::{PhaseCtx, ViewCtx};
use crate::types::*;
use serde::{Deserialize, Serialize};

// ── March resolution ───────────────────────────────────────────────────

enum MarchOutcome {
    Resolved,
    CombatStarted(CombatState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveMarchState {
    pub last_resolved: Option<HouseName>,
    /// House currently asked to resolve one of its march orders.
    pub current: Option<HouseName>,
}

impl ResolveMarchState {
    pub fn new() -> Self {
        ResolveMarchState {
            last_resolved: None,
            current: None,
        }
    }

    fn march_regions(&self, game: &crate::game::Game, house: HouseName) -> Vec<RegionId> {
        game.world
            .ordered_regions_of_house(house, |o| o.kind == OrderKind::March)
    }

    /// One-cycle scan for the next house with a pending march order.
    pub fn next_house_to_resolve(&self, game: &crate::game::Game) -> Option<HouseName> {
        let mut house = match self.last_resolved {
            Some(h) => game.next_in_turn_order(h),
            None => game.first_in_turn_order(),
        };
        for _ in 0..game.houses.len() {
            if !self.march_regions(game, house).is_empty() {
                return Some(house);
            }
            house = game.next_in_turn_order(house);
        }
        None
    }

    /// Ask the next house for input, or report the stage done.
    pub fn proceed(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        match self.next_house_to_resolve(ctx.game) {
            Some(house) => {
                self.current = Some(house);
                ctx.notify_your_turn(house);
                false
            }
            None => {
                self.current = None;
                true
            }
        }
    }

    pub fn waited_users(&self, view: ViewCtx<'_>) -> Vec<UserId> {
        match self.current {
            Some(house) => vec![view.controller_of_house(house).user.clone()],
            None => Vec::new(),
        }
    }

    fn on_player_message(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        player: &Player,
        msg: &ClientMessage,
    ) -> Result<MarchOutcome, Rejection> {
        let house = self
            .current
            .unwrap_or_else(|| panic!("march resolution is not waiting on anyone"));
        if ctx.controller_of_house(house).user != player.user {
            return Err(Rejection::NotYourTurn);
        }
        let (from, to) = match msg {
            ClientMessage::ResolveMarch { from, to } => (*from, *to),
            _ => return Err(Rejection::IllegalChoice),
        };
        if !self.march_regions(ctx.game, house).contains(&from) {
            return Err(Rejection::IllegalChoice);
        }

        let to = match to {
            Some(to) => to,
            None => {
                // March declined: the order is simply removed.
                ctx.game.world.region_mut(from).order = None;
                self.last_resolved = Some(house);
                self.current = None;
                return Ok(MarchOutcome::Resolved);
            }
        };
        if !ctx.game.world.region(from).adjacent.contains(&to) {
            return Err(Rejection::IllegalChoice);
        }

        let target = ctx.game.world.region(to);
        let enemy_units = !target.units.is_empty() && target.controller() != Some(house);
        ctx.game.world.region_mut(from).order = None;
        self.last_resolved = Some(house);
        self.current = None;

        if enemy_units {
            let defender = ctx
                .game
                .world
                .region(to)
                .controller()
                .unwrap_or_else(|| panic!("occupied region without a controller"));
            return Ok(MarchOutcome::CombatStarted(CombatState::new(
                house, defender, from, to,
            )));
        }

        // Unopposed march: move every unit, leave a control marker behind.
        let units = std::mem::take(&mut ctx.game.world.region_mut(from).units);
        ctx.game.world.region_mut(from).control_marker = Some(house);
        let target = ctx.game.world.region_mut(to);
        target.control_marker = None;
        target.units.extend(units);
        Ok(MarchOutcome::Resolved)
    }

    /// Remove the blocked house's first march order without moving.
    fn resolve_default(&mut self, ctx: &mut PhaseCtx<'_>) {
        let house = match self.current {
            Some(h) => h,
            None => return,
        };
        if let Some(from) = self.march_regions(ctx.game, house).first().copied() {
            ctx.game.world.region_mut(from).order = None;
        }
        self.last_resolved = Some(house);
        self.current = None;
    }
}

impl Default for ResolveMarchState {
    fn default() -> Self {
        ResolveMarchState::new()
    }
}

// ── Combat ─────────────────────────────────────────────────────────────

/// A suspended battle over `region`. Attacker and defender sequentially
/// commit a power-token bid; total strength is unit count plus bid, and
/// the defender holds on ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatState {
    pub attacker: HouseName,
    pub defender: HouseName,
    /// Region the attacking units march from.
    pub from: RegionId,
    /// Embattled region.
    pub region: RegionId,
    pub attacker_bid: Option<u32>,
    pub defender_bid: Option<u32>,
}

impl CombatState {
    pub fn new(attacker: HouseName, defender: HouseName, from: RegionId, region: RegionId) -> Self {
        CombatState {
            attacker,
            defender,
            from,
            region,
            attacker_bid: None,
            defender_bid: None,
        }
    }

    /// The house whose bid is awaited. The attacker always bids first.
    pub fn waited_house(&self) -> HouseName {
        if self.attacker_bid.is_none() {
            self.attacker
        } else {
            self.defender
        }
    }

    pub fn first_start(&mut self, ctx: &mut PhaseCtx<'_>) {
        log::debug!(
            "combat started: {} attacks {} at region {:?}",
            self.attacker,
            self.defender,
            self.region
        );
        ctx.notify_your_turn(self.waited_house());
    }

    pub fn waited_users(&self, view: ViewCtx<'_>) -> Vec<UserId> {
        vec![view.controller_of_house(self.waited_house()).user.clone()]
    }

    /// Returns the winner once both bids are in.
    fn on_player_message(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        player: &Player,
        msg: &ClientMessage,
    ) -> Result<Option<HouseName>, Rejection> {
        let house = self.waited_house();
        if ctx.controller_of_house(house).user != player.user {
            return Err(Rejection::NotYourTurn);
        }
        let bid = match msg {
            ClientMessage::CombatBid { power_tokens } => *power_tokens,
            _ => return Err(Rejection::IllegalChoice),
        };
        if bid > ctx.game.house(house).power_tokens {
            return Err(Rejection::IllegalChoice);
        }
        if self.attacker_bid.is_none() {
            self.attacker_bid = Some(bid);
            ctx.notify_your_turn(self.defender);
            return Ok(None);
        }
        self.defender_bid = Some(bid);
        Ok(Some(self.resolve(ctx)))
    }

    fn resolve(&mut self, ctx: &mut PhaseCtx<'_>) -> HouseName {
        let attacker_bid = self.attacker_bid.unwrap_or(0);
        let defender_bid = self.defender_bid.unwrap_or(0);
        ctx.change_power_tokens(self.attacker, -(attacker_bid as i32));
        ctx.change_power_tokens(self.defender, -(defender_bid as i32));

        let attacker_strength =
            ctx.game.world.region(self.from).units.len() as u32 + attacker_bid;
        let defender_strength =
            ctx.game.world.region(self.region).units.len() as u32 + defender_bid;
        // Defender holds ties.
        let winner = if attacker_strength > defender_strength {
            self.attacker
        } else {
            self.defender
        };

        if winner == self.attacker {
            ctx.game.world.region_mut(self.region).units.clear();
            let units = std::mem::take(&mut ctx.game.world.region_mut(self.from).units);
            ctx.game.world.region_mut(self.from).control_marker = Some(self.attacker);
            let target = ctx.game.world.region_mut(self.region);
            target.control_marker = None;
            target.units.extend(units);
        } else {
            // The repelled attacking force is destroyed.
            ctx.game.world.region_mut(self.from).units.clear();
        }

        ctx.log(GameLogEntry::CombatResult {
            attacker: self.attacker,
            defender: self.defender,
            region: self.region,
            winner,
        });
        let view = ctx.view();
        let users: Vec<UserId> = [self.attacker, self.defender]
            .iter()
            .filter_map(|h| view.try_controller_of_house(*h))
            .map(|p| p.user.clone())
            .collect();
        ctx.out.notify(Notification::BattleResults, users);
        winner
    }

    /// Fill only the awaited bid with zero; the opponent's choice stays
    /// theirs to make. Returns the winner once both bids are in.
    fn resolve_default(&mut self, ctx: &mut PhaseCtx<'_>) -> Option<HouseName> {
        if self.attacker_bid.is_none() {
            self.attacker_bid = Some(0);
            if self.defender_bid.is_none() {
                ctx.notify_your_turn(self.defender);
                return None;
            }
        } else {
            self.defender_bid = Some(0);
        }
        Some(self.resolve(ctx))
    }
}

// ── Action phase root ──────────────────────────────────────────────────

/// Stage precedence: a live consolidate-power resolution outranks a live
/// combat, which outranks march resolution. Only the deepest stage
/// accepts input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub marches: ResolveMarchState,
    pub combat: Option<CombatState>,
    pub consolidate: Option<ResolveConsolidatePowerState>,
}

impl ActionState {
    pub fn new() -> Self {
        ActionState {
            marches: ResolveMarchState::new(),
            combat: None,
            consolidate: None,
        }
    }

    /// Returns true when the whole action phase is already done.
    pub fn first_start(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        if self.marches.proceed(ctx) {
            return self.enter_consolidate(ctx);
        }
        false
    }

    fn enter_consolidate(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        let mut cp = ResolveConsolidatePowerState::new();
        let done = cp.first_start(ctx);
        self.consolidate = Some(cp);
        done
    }

    pub fn active_combat(&self) -> Option<&CombatState> {
        self.combat.as_ref()
    }

    pub fn waited_users(&self, view: ViewCtx<'_>) -> Vec<UserId> {
        if let Some(cp) = &self.consolidate {
            return cp.waited_users(view);
        }
        if let Some(combat) = &self.combat {
            return combat.waited_users(view);
        }
        self.marches.waited_users(view)
    }

    /// Route a player message to the deepest live stage. Returns true when
    /// the whole action phase completed as a result.
    pub fn on_player_message(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        player: &Player,
        msg: &ClientMessage,
    ) -> Result<bool, Rejection> {
        if let Some(cp) = &mut self.consolidate {
            return cp.on_player_message(ctx, player, msg);
        }
        if let Some(combat) = &mut self.combat {
            if combat.on_player_message(ctx, player, msg)?.is_some() {
                self.combat = None;
                if self.marches.proceed(ctx) {
                    return Ok(self.enter_consolidate(ctx));
                }
            }
            return Ok(false);
        }
        match self.marches.on_player_message(ctx, player, msg)? {
            MarchOutcome::Resolved => {
                if self.marches.proceed(ctx) {
                    return Ok(self.enter_consolidate(ctx));
                }
                Ok(false)
            }
            MarchOutcome::CombatStarted(mut combat) => {
                combat.first_start(ctx);
                self.combat = Some(combat);
                Ok(false)
            }
        }
    }

    /// Resolve the currently suspended leaf without player input. Returns
    /// true when the whole action phase completed as a result.
    pub fn resolve_default(&mut self, ctx: &mut PhaseCtx<'_>) -> bool {
        if let Some(cp) = &mut self.consolidate {
            return cp.resolve_default(ctx);
        }
        if let Some(combat) = &mut self.combat {
            if combat.resolve_default(ctx).is_none() {
                return false;
            }
            self.combat = None;
        } else {
            self.marches.resolve_default(ctx);
        }
        if self.marches.proceed(ctx) {
            return self.enter_consolidate(ctx);
        }
        false
    }
}

impl Default for ActionState {
    fn default() -> Self {
        ActionState::new()
    }
}
