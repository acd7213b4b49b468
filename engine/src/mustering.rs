// ═══════════════════════════════════════════════════════════════════════
// Player mustering — the leaf phase collecting one house's unit-placement
// (or power-token) choice for a starred consolidate-power order or a
// vassal defense-muster order.
// ═══════════════════════════════════════════════════════════════════════

use crate::consolidate;
use crate::errors::Rejection;
use crate::messages::{ClientMessage, GameLogEntry, Mustering};
use crate::state::{PhaseCtx, ViewCtx};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Reported to the parent when the leaf completes: which house mustered
/// and which region's order was consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusterOutcome {
    pub house: HouseName,
    pub region: RegionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMusteringState {
    pub house: HouseName,
    pub muster_type: MusterType,
}

impl PlayerMusteringState {
    pub fn new(house: HouseName, muster_type: MusterType) -> Self {
        PlayerMusteringState { house, muster_type }
    }

    pub fn first_start(&mut self, ctx: &mut PhaseCtx<'_>) {
        log::debug!(
            "mustering started: house={} type={:?}",
            self.house,
            self.muster_type
        );
        ctx.notify_your_turn(self.house);
    }

    /// Regions this leaf can resolve, in stable region-id order.
    pub fn eligible_regions(&self, game: &crate::game::Game) -> Vec<RegionId> {
        match self.muster_type {
            MusterType::StarredConsolidatePower => game
                .world
                .ordered_regions_of_house(self.house, |o| {
                    o.kind.is_consolidate_power() && o.starred
                })
                .into_iter()
                .filter(|r| game.world.region(*r).has_structure)
                .collect(),
            MusterType::DefenseMusterOrder => game
                .world
                .ordered_regions_of_house(self.house, |o| o.kind == OrderKind::DefenseMuster),
        }
    }

    pub fn waited_users(&self, view: ViewCtx<'_>) -> Vec<UserId> {
        vec![view.controller_of_house(self.house).user.clone()]
    }

    pub fn on_player_message(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        player: &Player,
        msg: &ClientMessage,
    ) -> Result<Option<MusterOutcome>, Rejection> {
        if ctx.controller_of_house(self.house).user != player.user {
            return Err(Rejection::NotYourTurn);
        }

        match msg {
            ClientMessage::ResolveMustering { region, musterings } => {
                self.resolve_mustering(ctx, *region, musterings)
            }
            ClientMessage::TakePowerTokens { region } => self.take_power_tokens(ctx, *region),
            _ => Err(Rejection::IllegalChoice),
        }
    }

    fn resolve_mustering(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        region: RegionId,
        musterings: &[Mustering],
    ) -> Result<Option<MusterOutcome>, Rejection> {
        if !self.eligible_regions(ctx.game).contains(&region) {
            return Err(Rejection::IllegalChoice);
        }

        let origin = ctx.game.world.region(region);
        let points: u8 = musterings.iter().map(|m| m.unit_type.muster_cost()).sum();
        if points > origin.muster_points() {
            return Err(Rejection::IllegalChoice);
        }
        for m in musterings {
            let to = ctx.game.world.region(m.to);
            let legal = match m.unit_type {
                // Land units muster into the mustering region itself.
                UnitType::Footman | UnitType::Knight | UnitType::SiegeEngine => m.to == region,
                // Ships go to an adjacent port or sea.
                UnitType::Ship => {
                    origin.adjacent.contains(&m.to)
                        && matches!(to.kind, RegionKind::Port | RegionKind::Sea)
                }
            };
            let free_for_us = to.controller().is_none() || to.controller() == Some(self.house);
            if !legal || !free_for_us {
                return Err(Rejection::IllegalChoice);
            }
        }

        // Validated; now mutate.
        for m in musterings {
            ctx.game.world.region_mut(m.to).units.push(Unit {
                unit_type: m.unit_type,
                house: self.house,
            });
        }
        ctx.log(GameLogEntry::PlayerMustered {
            house: self.house,
            region,
            musterings: musterings.to_vec(),
        });
        Ok(Some(MusterOutcome {
            house: self.house,
            region,
        }))
    }

    fn take_power_tokens(
        &mut self,
        ctx: &mut PhaseCtx<'_>,
        region: RegionId,
    ) -> Result<Option<MusterOutcome>, Rejection> {
        if self.muster_type != MusterType::StarredConsolidatePower {
            return Err(Rejection::IllegalChoice);
        }
        if !self.eligible_regions(ctx.game).contains(&region) {
            return Err(Rejection::IllegalChoice);
        }

        let mut gains = consolidate::potential_gained_power_tokens(ctx.game, region, self.house);
        if gains > 0 {
            gains = ctx.change_power_tokens(self.house, gains);
        }
        ctx.log(GameLogEntry::ConsolidatePowerOrderResolved {
            house: self.house,
            region,
            starred: true,
            power_token_count: gains,
        });
        Ok(Some(MusterOutcome {
            house: self.house,
            region,
        }))
    }

    /// Resolve without player input, declining any muster. Used when the
    /// waited-on house loses its player to a vassal-replacement vote so the
    /// tree never deadlocks.
    pub fn resolve_default(&self, game: &crate::game::Game) -> MusterOutcome {
        let region = *self
            .eligible_regions(game)
            .first()
            .expect("mustering leaf spawned without an eligible region");
        MusterOutcome {
            house: self.house,
            region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Outbox;
    use crate::setup::{demo_game, regions};
    use std::collections::BTreeMap;

    fn fixture() -> (
        crate::game::Game,
        BTreeMap<UserId, Player>,
        Vec<GameLogEntry>,
        Outbox,
    ) {
        let game = demo_game();
        let mut players = BTreeMap::new();
        for (uid, house) in [
            ("u1", HouseName::Stark),
            ("u2", HouseName::Lannister),
            ("u3", HouseName::Baratheon),
        ] {
            players.insert(
                UserId::from(uid),
                Player {
                    user: UserId::from(uid),
                    house,
                },
            );
        }
        (game, players, Vec::new(), Outbox::new())
    }

    #[test]
    fn test_take_power_tokens_resolves_starred_order() {
        let (mut game, players, mut log, mut out) = fixture();
        game.place_order(
            regions::WINTERFELL,
            Order {
                kind: OrderKind::ConsolidatePower,
                starred: true,
            },
        );
        let mut leaf =
            PlayerMusteringState::new(HouseName::Stark, MusterType::StarredConsolidatePower);
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        let player = ctx.players.get(&UserId::from("u1")).unwrap().clone();
        let outcome = leaf
            .on_player_message(
                &mut ctx,
                &player,
                &ClientMessage::TakePowerTokens {
                    region: regions::WINTERFELL,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(outcome.region, regions::WINTERFELL);
        // Winterfell: land, 1 crown icon → 2 tokens.
        assert_eq!(game.house(HouseName::Stark).power_tokens, 7);
        assert!(matches!(
            log.last(),
            Some(GameLogEntry::ConsolidatePowerOrderResolved {
                starred: true,
                power_token_count: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_wrong_player_rejected() {
        let (mut game, players, mut log, mut out) = fixture();
        game.place_order(
            regions::WINTERFELL,
            Order {
                kind: OrderKind::ConsolidatePower,
                starred: true,
            },
        );
        let mut leaf =
            PlayerMusteringState::new(HouseName::Stark, MusterType::StarredConsolidatePower);
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        let intruder = ctx.players.get(&UserId::from("u2")).unwrap().clone();
        let err = leaf.on_player_message(
            &mut ctx,
            &intruder,
            &ClientMessage::TakePowerTokens {
                region: regions::WINTERFELL,
            },
        );
        assert_eq!(err, Err(Rejection::NotYourTurn));
        // No mutation happened.
        assert_eq!(game.house(HouseName::Stark).power_tokens, 5);
    }

    #[test]
    fn test_muster_over_budget_rejected() {
        let (mut game, players, mut log, mut out) = fixture();
        game.place_order(
            regions::WINTERFELL,
            Order {
                kind: OrderKind::ConsolidatePower,
                starred: true,
            },
        );
        let mut leaf =
            PlayerMusteringState::new(HouseName::Stark, MusterType::StarredConsolidatePower);
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        let player = ctx.players.get(&UserId::from("u1")).unwrap().clone();
        // Two knights cost 4 points; a structure grants only 2.
        let err = leaf.on_player_message(
            &mut ctx,
            &player,
            &ClientMessage::ResolveMustering {
                region: regions::WINTERFELL,
                musterings: vec![
                    Mustering {
                        to: regions::WINTERFELL,
                        unit_type: UnitType::Knight,
                    },
                    Mustering {
                        to: regions::WINTERFELL,
                        unit_type: UnitType::Knight,
                    },
                ],
            },
        );
        assert_eq!(err, Err(Rejection::IllegalChoice));
    }

    #[test]
    fn test_muster_places_units() {
        let (mut game, players, mut log, mut out) = fixture();
        game.place_order(
            regions::WINTERFELL,
            Order {
                kind: OrderKind::ConsolidatePower,
                starred: true,
            },
        );
        let before = game.world.region(regions::WINTERFELL).units.len();
        let mut leaf =
            PlayerMusteringState::new(HouseName::Stark, MusterType::StarredConsolidatePower);
        let mut ctx = PhaseCtx {
            game: &mut game,
            players: &players,
            game_log: &mut log,
            out: &mut out,
        };
        let player = ctx.players.get(&UserId::from("u1")).unwrap().clone();
        let outcome = leaf
            .on_player_message(
                &mut ctx,
                &player,
                &ClientMessage::ResolveMustering {
                    region: regions::WINTERFELL,
                    musterings: vec![Mustering {
                        to: regions::WINTERFELL,
                        unit_type: UnitType::Knight,
                    }],
                },
            )
            .unwrap();
        assert!(outcome.is_some());
        assert_eq!(game.world.region(regions::WINTERFELL).units.len(), before + 1);
        assert!(matches!(log.last(), Some(GameLogEntry::PlayerMustered { .. })));
    }

    #[test]
    fn test_vassal_default_resolution_declines() {
        let (mut game, _players, ..) = fixture();
        game.place_order(
            regions::DRAGONSTONE,
            Order {
                kind: OrderKind::DefenseMuster,
                starred: false,
            },
        );
        let leaf =
            PlayerMusteringState::new(HouseName::Baratheon, MusterType::DefenseMusterOrder);
        let outcome = leaf.resolve_default(&game);
        assert_eq!(outcome.region, regions::DRAGONSTONE);
        assert_eq!(outcome.house, HouseName::Baratheon);
    }
}
