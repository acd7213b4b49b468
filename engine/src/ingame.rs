// ═══════════════════════════════════════════════════════════════════════
// Ingame root — the top of the phase tree. Owns the entity graph, the
// player table, the game log and the vote registry; drives the turn loop
// (Westeros phase, planning, action) and executes accepted votes.
//
// Message handling is run-to-completion: a handler either rejects with a
// reason code before any mutation, or mutates, cascades as far as the
// data allows, and leaves the tree suspended at the new leaf.
// ═══════════════════════════════════════════════════════════════════════

use crate::action::ActionState;
use crate::errors::Rejection;
use crate::game::Game;
use crate::messages::{
    ClientMessage, GameLogEntry, Notification, Outbox, PlacedOrder, ServerMessage,
};
use crate::state::{PhaseCtx, ViewCtx};
use crate::types::*;
use crate::votes::{Vote, VoteState, VoteType};
use crate::westeros::WesterosState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Planning ───────────────────────────────────────────────────────────

/// Order placement. Every player submits orders for the houses it
/// controls (its own plus commanded vassals) in one message; the phase
/// completes when every player house is ready.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningState {
    pub ready: BTreeSet<HouseName>,
}

impl PlanningState {
    pub fn new() -> Self {
        PlanningState::default()
    }

    pub fn first_start(&mut self, ctx: &mut PhaseCtx<'_>) {
        let users = ctx.players.keys().cloned().collect();
        ctx.out.notify(Notification::YourTurn, users);
    }

    /// Houses the player places orders for: its own plus its vassals.
    fn houses_of_player(&self, ctx: &PhaseCtx<'_>, player: &Player) -> Vec<HouseName> {
        let mut houses = vec![player.house];
        for (vassal, commander) in ctx.game.vassal_relations.entries() {
            if commander == player.house {
                houses.push(vassal);
            }
        }
        houses
    }

    /// True once every house with a player has submitted.
    pub fn is_done(&self, players: &BTreeMap<UserId, Player>) -> bool {
        players.values().all(|p| self.ready.contains(&p.house))
    }

    pub fn waited_users(&self, view: ViewCtx<'_>) -> Vec<UserId> {
        view.players
            .values()
            .filter(|p| !self.ready.contains(&p.house))
            .map(|p| p.user.clone())
            .collect()
    }

    /// Returns true when planning completed.
    pub fn on_player_message(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        player: &Player,
        msg: &ClientMessage,
    ) -> Result<bool, Rejection> {
        let orders = match msg {
            ClientMessage::PlaceOrders { orders } => orders,
            _ => return Err(Rejection::IllegalChoice),
        };
        if self.ready.contains(&player.house) {
            return Err(Rejection::IllegalChoice);
        }
        let houses = self.houses_of_player(ctx, player);
        for PlacedOrder { region, order } in orders {
            let r = ctx.game.world.region(*region);
            let owner = match r.controller() {
                Some(h) if houses.contains(&h) => h,
                _ => return Err(Rejection::IllegalChoice),
            };
            // Vassal regions take defense-muster orders only; player
            // regions take everything else.
            let vassal_region = ctx.game.vassal_relations.is_vassal(owner);
            if vassal_region != (order.kind == OrderKind::DefenseMuster) {
                return Err(Rejection::IllegalChoice);
            }
        }
        for PlacedOrder { region, order } in orders {
            ctx.game.place_order(*region, *order);
        }
        self.ready.insert(player.house);
        Ok(self.is_done(ctx.players))
    }
}

// ── Child chain ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IngameChild {
    Planning(PlanningState),
    Action(ActionState),
    GameEnded { winner: HouseName },
    Cancelled,
}

// ── Root node ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngameState {
    pub players: BTreeMap<UserId, Player>,
    pub game: Game,
    pub game_log: Vec<GameLogEntry>,
    pub votes: BTreeMap<u64, Vote>,
    pub next_vote_id: u64,
    pub child: IngameChild,
}

macro_rules! phase_ctx {
    ($self:expr, $out:expr) => {
        PhaseCtx {
            game: &mut $self.game,
            players: &$self.players,
            game_log: &mut $self.game_log,
            out: $out,
        }
    };
}

impl IngameState {
    pub fn new(game: Game, players: BTreeMap<UserId, Player>) -> Self {
        IngameState {
            players,
            game,
            game_log: Vec::new(),
            votes: BTreeMap::new(),
            next_vote_id: 0,
            child: IngameChild::Planning(PlanningState::new()),
        }
    }

    /// Enter the first turn. Invoked exactly once, on creation.
    pub fn first_start(&mut self, out: &mut Outbox) {
        self.proceed_to_next_turn(out);
    }

    pub fn view(&self) -> ViewCtx<'_> {
        ViewCtx {
            game: &self.game,
            players: &self.players,
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.child, IngameChild::GameEnded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.child, IngameChild::Cancelled)
    }

    /// Users the current leaf is waiting on; empty in a terminal phase.
    pub fn waited_users(&self) -> Vec<UserId> {
        match &self.child {
            IngameChild::Planning(p) => p.waited_users(self.view()),
            IngameChild::Action(a) => a.waited_users(self.view()),
            IngameChild::GameEnded { .. } | IngameChild::Cancelled => Vec::new(),
        }
    }

    pub fn ongoing_vote(&self) -> Option<&Vote> {
        self.votes.values().find(|v| v.is_ongoing())
    }

    // ── Turn loop ──────────────────────────────────────────────────────

    fn proceed_to_next_turn(&mut self, out: &mut Outbox) {
        self.game.turn += 1;
        if self.game.turn > self.game.max_turns {
            self.end_game(out);
            return;
        }
        let mut ctx = phase_ctx!(self, out);
        ctx.log(GameLogEntry::TurnBegins {
            turn: ctx.game.turn,
        });
        WesterosState::new().first_start(&mut ctx);
        let mut planning = PlanningState::new();
        planning.first_start(&mut ctx);
        self.child = IngameChild::Planning(planning);
    }

    fn enter_action(&mut self, out: &mut Outbox) {
        let mut action = ActionState::new();
        let done = {
            let mut ctx = phase_ctx!(self, out);
            action.first_start(&mut ctx)
        };
        if done {
            self.proceed_to_next_turn(out);
        } else {
            self.child = IngameChild::Action(action);
        }
    }

    fn end_game(&mut self, out: &mut Outbox) {
        let winner = self
            .game
            .potential_winners()
            .into_iter()
            .find(|h| !self.game.vassal_relations.is_vassal(*h))
            .unwrap_or_else(|| panic!("game has no non-vassal house"));
        let mut ctx = phase_ctx!(self, out);
        ctx.log(GameLogEntry::GameEnded { winner });
        let users: Vec<UserId> = self.players.keys().cloned().collect();
        out.notify(Notification::GameEnded, users);
        self.child = IngameChild::GameEnded { winner };
        log::info!("game ended, winner: {winner}");
    }

    // ── Message routing ────────────────────────────────────────────────

    pub fn on_client_message(
        &mut self,
        user: &UserId,
        msg: &ClientMessage,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        match msg {
            ClientMessage::Vote { vote_id, choice } => self.cast_vote(user, *vote_id, *choice, out),
            ClientMessage::LaunchCancelGameVote => {
                let initiator = self.voter(user)?.user.clone();
                self.launch_vote(initiator, VoteType::CancelGame, out)
            }
            ClientMessage::LaunchEndGameVote => {
                let initiator = self.voter(user)?.user.clone();
                self.launch_vote(initiator, VoteType::EndGame, out)
            }
            ClientMessage::LaunchReplacePlayerVote { replaced } => {
                self.launch_replace_player(user, replaced, out)
            }
            ClientMessage::LaunchReplacePlayerByVassalVote { replaced } => {
                self.launch_replace_player_by_vassal(user, replaced, out)
            }
            _ => self.route_to_child(user, msg, out),
        }
    }

    fn route_to_child(
        &mut self,
        user: &UserId,
        msg: &ClientMessage,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        let player = match &self.child {
            IngameChild::GameEnded { .. } => return Err(Rejection::GameEnded),
            IngameChild::Cancelled => return Err(Rejection::GameCancelled),
            _ => self
                .players
                .get(user)
                .cloned()
                .ok_or(Rejection::UnknownUser)?,
        };
        match &mut self.child {
            IngameChild::Planning(planning) => {
                let done = {
                    let mut ctx = phase_ctx!(self, out);
                    planning.on_player_message(&mut ctx, &player, msg)?
                };
                if done {
                    self.enter_action(out);
                }
                Ok(())
            }
            IngameChild::Action(action) => {
                let done = {
                    let mut ctx = phase_ctx!(self, out);
                    action.on_player_message(&mut ctx, &player, msg)?
                };
                if done {
                    self.proceed_to_next_turn(out);
                }
                Ok(())
            }
            IngameChild::GameEnded { .. } | IngameChild::Cancelled => unreachable!(),
        }
    }

    // ── Vote subsystem ─────────────────────────────────────────────────

    fn ensure_no_terminal_phase(&self) -> Result<(), Rejection> {
        match self.child {
            IngameChild::GameEnded { .. } => Err(Rejection::GameEnded),
            IngameChild::Cancelled => Err(Rejection::GameCancelled),
            _ => Ok(()),
        }
    }

    fn voter(&self, user: &UserId) -> Result<&Player, Rejection> {
        self.players.get(user).ok_or(Rejection::OnlyPlayersCanVote)
    }

    fn launch_vote(
        &mut self,
        initiator: UserId,
        vote_type: VoteType,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        self.ensure_no_terminal_phase()?;
        if self.ongoing_vote().is_some() {
            return Err(Rejection::OngoingVote);
        }
        let id = self.next_vote_id;
        self.next_vote_id += 1;
        let vote = Vote::new(id, initiator.clone(), vote_type.clone(), self.players.len());
        out.broadcast(ServerMessage::VoteStarted { vote: vote.clone() });
        self.votes.insert(id, vote);
        let mut ctx = phase_ctx!(self, out);
        ctx.log(GameLogEntry::VoteStarted {
            initiator,
            verb: vote_type.verb(),
        });
        let users: Vec<UserId> = self.players.keys().cloned().collect();
        out.notify(Notification::NewVote, users);
        log::debug!("vote {id} launched: {}", vote_type.verb());
        Ok(())
    }

    fn launch_replace_player(
        &mut self,
        replacer: &UserId,
        replaced: &UserId,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        self.ensure_no_terminal_phase()?;
        // The replacer offers to take a seat; it must not hold one already.
        if self.players.contains_key(replacer) {
            return Err(Rejection::AlreadyPlaying);
        }
        if !self.players.contains_key(replaced) {
            return Err(Rejection::UnknownUser);
        }
        self.launch_vote(
            replacer.clone(),
            VoteType::ReplacePlayer {
                replaced: replaced.clone(),
                replacer: replacer.clone(),
            },
            out,
        )
    }

    fn launch_replace_player_by_vassal(
        &mut self,
        initiator: &UserId,
        replaced: &UserId,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        self.ensure_no_terminal_phase()?;
        let initiator = self.voter(initiator)?.user.clone();
        if !self.players.contains_key(replaced) {
            return Err(Rejection::UnknownUser);
        }
        if self.players.len() <= 2 {
            return Err(Rejection::MinPlayerCountReached);
        }
        self.launch_vote(
            initiator,
            VoteType::ReplacePlayerByVassal {
                replaced: replaced.clone(),
            },
            out,
        )
    }

    fn cast_vote(
        &mut self,
        user: &UserId,
        vote_id: u64,
        choice: bool,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        self.ensure_no_terminal_phase()?;
        let house = self.voter(user)?.house;
        let vote = self
            .votes
            .get_mut(&vote_id)
            .ok_or(Rejection::VoteNotOngoing)?;
        let state = vote.cast(house, choice)?;
        out.broadcast(ServerMessage::VoteCast {
            vote_id,
            house,
            choice,
        });
        if state == VoteState::Accepted {
            self.execute_accepted(vote_id, out);
        }
        Ok(())
    }

    /// Runs the accepted vote's side effect exactly once: a vote reaches
    /// Accepted exactly once (later casts are rejected), and this is only
    /// called at that transition.
    fn execute_accepted(&mut self, vote_id: u64, out: &mut Outbox) {
        let vote_type = self.votes[&vote_id].vote_type.clone();
        log::info!("vote {vote_id} accepted: {}", vote_type.verb());
        match vote_type {
            VoteType::CancelGame => {
                let mut ctx = phase_ctx!(self, out);
                ctx.log(GameLogEntry::GameCancelled);
                self.child = IngameChild::Cancelled;
            }
            VoteType::EndGame => {
                self.game.max_turns = self.game.turn;
                out.broadcast(ServerMessage::UpdateMaxTurns {
                    max_turns: self.game.max_turns,
                });
            }
            VoteType::ReplacePlayer { replaced, replacer } => {
                self.execute_replace_player(vote_id, &replaced, &replacer, out);
            }
            VoteType::ReplacePlayerByVassal { replaced } => {
                self.execute_replace_player_by_vassal(vote_id, &replaced, out);
            }
        }
    }

    /// A replacement vote is moot once the replaced user no longer holds a
    /// seat; it is withdrawn without side effects.
    fn cancel_moot_vote(&mut self, vote_id: u64, out: &mut Outbox) {
        log::debug!("vote {vote_id} became moot, cancelling");
        if let Some(vote) = self.votes.get_mut(&vote_id) {
            vote.cancel();
        }
        out.broadcast(ServerMessage::VoteCancelled { vote_id });
    }

    fn execute_replace_player(
        &mut self,
        vote_id: u64,
        replaced: &UserId,
        replacer: &UserId,
        out: &mut Outbox,
    ) {
        let house = match self.players.get(replaced) {
            Some(p) => p.house,
            None => return self.cancel_moot_vote(vote_id, out),
        };
        let waited_before = self.waited_users();
        self.players.remove(replaced);
        self.players.insert(
            replacer.clone(),
            Player {
                user: replacer.clone(),
                house,
            },
        );
        out.broadcast(ServerMessage::PlayerReplaced {
            old_user: replaced.clone(),
            new_user: Some(replacer.clone()),
        });
        let mut ctx = phase_ctx!(self, out);
        ctx.log(GameLogEntry::PlayerReplaced {
            old_user: replaced.clone(),
            new_user: Some(replacer.clone()),
            house,
        });
        // The leaf may have been waiting on the departed user; the
        // newcomer must not be silently blocked.
        if waited_before.contains(replaced) {
            out.notify(Notification::YourTurn, vec![replacer.clone()]);
        }
    }

    fn execute_replace_player_by_vassal(
        &mut self,
        vote_id: u64,
        replaced: &UserId,
        out: &mut Outbox,
    ) {
        let house = match self.players.get(replaced) {
            Some(p) => p.house,
            None => return self.cancel_moot_vote(vote_id, out),
        };
        let commander = self.pick_commander_for(house);
        let waited_before = self.waited_users();

        self.players.remove(replaced);
        self.game.vassal_relations.reassign_commander(house, commander);
        self.game.vassal_relations.set(house, commander);

        // Relations go out before the player removal: clients must see the
        // new chain of command before losing the old player reference.
        out.broadcast(ServerMessage::VassalRelations {
            relations: self.game.vassal_relations.entries(),
        });
        out.broadcast(ServerMessage::PlayerReplaced {
            old_user: replaced.clone(),
            new_user: None,
        });
        let mut ctx = phase_ctx!(self, out);
        ctx.log(GameLogEntry::PlayerReplaced {
            old_user: replaced.clone(),
            new_user: None,
            house,
        });

        // Unblock the tree if it was waiting on the departed user.
        if waited_before.contains(replaced) {
            match &mut self.child {
                IngameChild::Planning(planning) => {
                    if planning.is_done(&self.players) {
                        self.enter_action(out);
                    }
                }
                IngameChild::Action(action) => {
                    let done = {
                        let mut ctx = phase_ctx!(self, out);
                        action.resolve_default(&mut ctx)
                    };
                    if done {
                        self.proceed_to_next_turn(out);
                    }
                }
                IngameChild::GameEnded { .. } | IngameChild::Cancelled => {}
            }
        }
    }

    /// The commanding house controlling `house`, resolving vassalage.
    fn controlling_house(&self, house: HouseName) -> HouseName {
        self.game
            .vassal_relations
            .commander_of(house)
            .unwrap_or(house)
    }

    /// Scan the potential-winner ranking for the first house eligible to
    /// command `house`: not itself, not a vassal, and not the opposing
    /// commander of an active combat `house` is fighting in.
    fn pick_commander_for(&self, house: HouseName) -> HouseName {
        let mut forbidden: Vec<HouseName> = Vec::new();
        if let IngameChild::Action(action) = &self.child {
            if let Some(combat) = action.active_combat() {
                if combat.attacker == house {
                    forbidden.push(self.controlling_house(combat.defender));
                }
                if combat.defender == house {
                    forbidden.push(self.controlling_house(combat.attacker));
                }
            }
        }
        self.game
            .potential_winners()
            .into_iter()
            .filter(|h| *h != house)
            .filter(|h| !self.game.vassal_relations.is_vassal(*h))
            .find(|h| !forbidden.contains(h))
            .unwrap_or_else(|| panic!("no eligible commander for house {house}"))
    }

    // ── Views ──────────────────────────────────────────────────────────

    /// Serialized view of the whole tree. The admin view is complete; a
    /// player view hides the orders of houses the viewer does not control
    /// while planning is ongoing.
    pub fn serialize_to_client(
        &self,
        is_admin: bool,
        viewer: Option<&Player>,
    ) -> Result<serde_json::Value, serde_json::Error> {
        if is_admin {
            return serde_json::to_value(self);
        }
        let mut view = self.clone();
        if matches!(view.child, IngameChild::Planning(_)) {
            let visible: BTreeSet<HouseName> = match viewer {
                Some(p) => {
                    let mut houses = BTreeSet::new();
                    houses.insert(p.house);
                    for (vassal, commander) in view.game.vassal_relations.entries() {
                        if commander == p.house {
                            houses.insert(vassal);
                        }
                    }
                    houses
                }
                None => BTreeSet::new(),
            };
            for region in &mut view.game.world.regions {
                let owned = region.controller().map_or(false, |h| visible.contains(&h));
                if !owned {
                    region.order = None;
                }
            }
        }
        serde_json::to_value(&view)
    }

    /// Reconstruct the tree from an admin view.
    pub fn from_serialized(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
