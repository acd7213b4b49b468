// ═══════════════════════════════════════════════════════════════════════
// Driver — random but always-legal play against a session, used by the
// simulate and log commands. Seed-deterministic via ChaCha8.
// ═══════════════════════════════════════════════════════════════════════

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use throne_engine::action::ActionState;
use throne_engine::ingame::{IngameChild, IngameState};
use throne_engine::messages::{Mustering, PlacedOrder};
use throne_engine::setup::demo_session;
use throne_engine::{ClientMessage, Session};
use throne_engine::{MusterType, Order, OrderKind, Player, RegionId, RegionKind, UnitType, UserId};

pub struct DriveReport {
    pub session: Session,
    pub steps: u32,
}

/// Drive a fresh demo session to completion with random legal play,
/// verifying the admin-view round trip at every suspension point.
pub fn play_random_session(seed: u64) -> Result<DriveReport, String> {
    let (mut session, _) = demo_session();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut steps = 0u32;
    while session.state() == "ongoing" {
        steps += 1;
        if steps >= 10_000 {
            return Err(format!("seed {seed}: session failed to terminate"));
        }
        let waited = session.ingame.waited_users();
        if waited.is_empty() {
            return Err(format!("seed {seed}: ongoing session waits on nobody"));
        }
        let user = waited[rng.gen_range(0..waited.len())].clone();
        let msg = pick_message(&session.ingame, &user, &mut rng);
        session.handle_message(&user, &msg);

        let admin = session
            .ingame
            .serialize_to_client(true, None)
            .map_err(|e| e.to_string())?;
        let restored = IngameState::from_serialized(admin.clone()).map_err(|e| e.to_string())?;
        let again = restored
            .serialize_to_client(true, None)
            .map_err(|e| e.to_string())?;
        if again != admin {
            return Err(format!("seed {seed}: round trip diverged at step {steps}"));
        }
    }
    Ok(DriveReport { session, steps })
}

fn pick_message(ingame: &IngameState, user: &UserId, rng: &mut ChaCha8Rng) -> ClientMessage {
    let player = &ingame.players[user];
    match &ingame.child {
        IngameChild::Planning(_) => pick_orders(ingame, player, rng),
        IngameChild::Action(action) => pick_action(ingame, action, rng),
        IngameChild::GameEnded { .. } | IngameChild::Cancelled => {
            unreachable!("terminal phases wait on nobody")
        }
    }
}

fn pick_orders(ingame: &IngameState, player: &Player, rng: &mut ChaCha8Rng) -> ClientMessage {
    let mut houses = vec![player.house];
    for (vassal, commander) in ingame.game.vassal_relations.entries() {
        if commander == player.house {
            houses.push(vassal);
        }
    }
    let mut orders = Vec::new();
    for region in &ingame.game.world.regions {
        let owner = match region.controller() {
            Some(h) if houses.contains(&h) && !region.units.is_empty() => h,
            _ => continue,
        };
        if rng.gen_bool(0.3) {
            continue;
        }
        let kind = if ingame.game.vassal_relations.is_vassal(owner) {
            OrderKind::DefenseMuster
        } else {
            [
                OrderKind::March,
                OrderKind::ConsolidatePower,
                OrderKind::Defense,
            ][rng.gen_range(0..3)]
        };
        orders.push(PlacedOrder {
            region: region.id,
            order: Order {
                kind,
                starred: kind == OrderKind::ConsolidatePower && rng.gen_bool(0.4),
            },
        });
    }
    ClientMessage::PlaceOrders { orders }
}

fn pick_action(ingame: &IngameState, action: &ActionState, rng: &mut ChaCha8Rng) -> ClientMessage {
    if let Some(cp) = &action.consolidate {
        let leaf = cp.child.as_ref().expect("suspended without a leaf");
        let region = leaf.eligible_regions(&ingame.game)[0];
        return match leaf.muster_type {
            MusterType::StarredConsolidatePower => {
                if rng.gen_bool(0.5) {
                    ClientMessage::TakePowerTokens { region }
                } else {
                    ClientMessage::ResolveMustering {
                        region,
                        musterings: vec![Mustering {
                            to: region,
                            unit_type: UnitType::Footman,
                        }],
                    }
                }
            }
            MusterType::DefenseMusterOrder => ClientMessage::ResolveMustering {
                region,
                musterings: vec![],
            },
        };
    }
    if let Some(combat) = &action.combat {
        let house = combat.waited_house();
        let max = ingame.game.house(house).power_tokens.min(3);
        return ClientMessage::CombatBid {
            power_tokens: rng.gen_range(0..=max),
        };
    }
    let house = action.marches.current.expect("march stage waits on nobody");
    let from = ingame
        .game
        .world
        .ordered_regions_of_house(house, |o| o.kind == OrderKind::March)[0];
    let lands: Vec<RegionId> = ingame
        .game
        .world
        .region(from)
        .adjacent
        .iter()
        .copied()
        .filter(|r| ingame.game.world.region(*r).kind == RegionKind::Land)
        .collect();
    let to = if lands.is_empty() || rng.gen_bool(0.3) {
        None
    } else {
        Some(lands[rng.gen_range(0..lands.len())])
    };
    ClientMessage::ResolveMarch { from, to }
}
