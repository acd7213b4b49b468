// ═══════════════════════════════════════════════════════════════════════
// Demo setup — a deterministic three-house world used by the runner, the
// demos and the test suite. Small enough to reason about by hand, rich
// enough to exercise ports, seas, structures and crown icons.
// ═══════════════════════════════════════════════════════════════════════

use crate::game::{Game, VassalRelations};
use crate::ingame::IngameState;
use crate::session::Session;
use crate::types::*;
use crate::westeros::WesterosCardType;
use crate::world::{Region, World};
use std::collections::BTreeMap;

/// Region ids of the demo world.
pub mod regions {
    use crate::types::RegionId;

    pub const WINTERFELL: RegionId = RegionId(0);
    pub const WHITE_HARBOR: RegionId = RegionId(1);
    pub const THE_SHIVERING_SEA: RegionId = RegionId(2);
    pub const WHITE_HARBOR_PORT: RegionId = RegionId(3);
    pub const KINGS_LANDING: RegionId = RegionId(4);
    pub const LANNISPORT: RegionId = RegionId(5);
    pub const THE_GOLDEN_SOUND: RegionId = RegionId(6);
    pub const LANNISPORT_PORT: RegionId = RegionId(7);
    pub const THE_REACH: RegionId = RegionId(8);
    pub const DRAGONSTONE: RegionId = RegionId(9);
    pub const SHIPBREAKER_BAY: RegionId = RegionId(10);
    pub const DRAGONSTONE_PORT: RegionId = RegionId(11);
}

fn land(
    id: RegionId,
    name: &str,
    crown_icons: u8,
    has_structure: bool,
    adjacent: Vec<RegionId>,
) -> Region {
    Region {
        id,
        name: name.to_string(),
        kind: RegionKind::Land,
        crown_icons,
        has_structure,
        adjacent,
        adjacent_sea: None,
        units: Vec::new(),
        order: None,
        control_marker: None,
    }
}

fn sea(id: RegionId, name: &str, adjacent: Vec<RegionId>) -> Region {
    Region {
        id,
        name: name.to_string(),
        kind: RegionKind::Sea,
        crown_icons: 0,
        has_structure: false,
        adjacent,
        adjacent_sea: None,
        units: Vec::new(),
        order: None,
        control_marker: None,
    }
}

fn port(id: RegionId, name: &str, adjacent_sea: RegionId) -> Region {
    Region {
        id,
        name: name.to_string(),
        kind: RegionKind::Port,
        crown_icons: 0,
        has_structure: false,
        adjacent: vec![adjacent_sea],
        adjacent_sea: Some(adjacent_sea),
        units: Vec::new(),
        order: None,
        control_marker: None,
    }
}

/// The demo board, empty of units.
pub fn demo_world() -> World {
    use regions::*;
    World::new(vec![
        land(WINTERFELL, "Winterfell", 1, true, vec![WHITE_HARBOR]),
        land(
            WHITE_HARBOR,
            "White Harbor",
            0,
            false,
            vec![WINTERFELL, KINGS_LANDING, WHITE_HARBOR_PORT],
        ),
        sea(THE_SHIVERING_SEA, "The Shivering Sea", vec![]),
        port(WHITE_HARBOR_PORT, "White Harbor Port", THE_SHIVERING_SEA),
        land(
            KINGS_LANDING,
            "King's Landing",
            2,
            true,
            vec![WHITE_HARBOR, THE_REACH, DRAGONSTONE],
        ),
        land(
            LANNISPORT,
            "Lannisport",
            1,
            true,
            vec![THE_REACH, LANNISPORT_PORT],
        ),
        sea(THE_GOLDEN_SOUND, "The Golden Sound", vec![]),
        port(LANNISPORT_PORT, "Lannisport Port", THE_GOLDEN_SOUND),
        land(
            THE_REACH,
            "The Reach",
            0,
            false,
            vec![KINGS_LANDING, LANNISPORT, DRAGONSTONE],
        ),
        land(
            DRAGONSTONE,
            "Dragonstone",
            1,
            true,
            vec![KINGS_LANDING, THE_REACH, DRAGONSTONE_PORT],
        ),
        sea(SHIPBREAKER_BAY, "Shipbreaker Bay", vec![]),
        port(DRAGONSTONE_PORT, "Dragonstone Port", SHIPBREAKER_BAY),
    ])
}

fn place(world: &mut World, region: RegionId, house: HouseName, unit_types: &[UnitType]) {
    for unit_type in unit_types {
        world.region_mut(region).units.push(Unit {
            unit_type: *unit_type,
            house,
        });
    }
}

/// A three-house game on the demo board: Stark, Lannister and Baratheon,
/// in that turn order, with their starting garrisons.
pub fn demo_game() -> Game {
    use regions::*;
    let mut world = demo_world();
    place(
        &mut world,
        WINTERFELL,
        HouseName::Stark,
        &[UnitType::Knight, UnitType::Footman],
    );
    place(&mut world, WHITE_HARBOR, HouseName::Stark, &[UnitType::Footman]);
    place(
        &mut world,
        LANNISPORT,
        HouseName::Lannister,
        &[UnitType::Knight, UnitType::Footman],
    );
    place(
        &mut world,
        THE_GOLDEN_SOUND,
        HouseName::Lannister,
        &[UnitType::Ship],
    );
    place(
        &mut world,
        LANNISPORT_PORT,
        HouseName::Lannister,
        &[UnitType::Ship],
    );
    place(
        &mut world,
        DRAGONSTONE,
        HouseName::Baratheon,
        &[UnitType::Knight, UnitType::Footman],
    );
    place(
        &mut world,
        DRAGONSTONE_PORT,
        HouseName::Baratheon,
        &[UnitType::Ship],
    );

    Game {
        houses: [HouseName::Stark, HouseName::Lannister, HouseName::Baratheon]
            .iter()
            .map(|h| crate::game::House {
                id: *h,
                power_tokens: 5,
            })
            .collect(),
        turn: 0,
        max_turns: 6,
        max_power_tokens: 20,
        vassal_relations: VassalRelations::default(),
        world,
        westeros_deck: vec![
            WesterosCardType::GameOfThrones,
            WesterosCardType::LastDaysOfSummer,
        ],
    }
}

/// The demo seats: u1/u2/u3 play Stark/Lannister/Baratheon.
pub fn demo_seats() -> Vec<(User, HouseName)> {
    [
        ("u1", "Alice", HouseName::Stark),
        ("u2", "Bob", HouseName::Lannister),
        ("u3", "Carol", HouseName::Baratheon),
    ]
    .iter()
    .map(|(id, name, house)| {
        (
            User {
                id: UserId::from(*id),
                name: name.to_string(),
            },
            *house,
        )
    })
    .collect()
}

/// An ingame tree for the demo game, not yet started.
pub fn demo_ingame() -> IngameState {
    let mut players = BTreeMap::new();
    for (user, house) in demo_seats() {
        players.insert(
            user.id.clone(),
            Player {
                user: user.id,
                house,
            },
        );
    }
    IngameState::new(demo_game(), players)
}

/// A started demo session plus its initial outbound events.
pub fn demo_session() -> (Session, Vec<crate::messages::Outbound>) {
    Session::new("demo", demo_seats(), demo_game())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_world_is_well_formed() {
        let world = demo_world();
        assert_eq!(world.regions.len(), 12);
        // Every port opens onto a sea.
        for r in &world.regions {
            if r.kind == RegionKind::Port {
                assert_eq!(
                    world.adjacent_sea_of_port(r.id).kind,
                    RegionKind::Sea
                );
            }
        }
    }

    #[test]
    fn test_demo_game_starting_positions() {
        let game = demo_game();
        assert_eq!(
            game.world.region(regions::WINTERFELL).controller(),
            Some(HouseName::Stark)
        );
        assert_eq!(
            game.world.region(regions::LANNISPORT_PORT).controller(),
            Some(HouseName::Lannister)
        );
        assert_eq!(game.world.region(regions::KINGS_LANDING).controller(), None);
        // One structure per house at start.
        for h in game.turn_order() {
            assert_eq!(game.controlled_structures(h), 1);
        }
    }
}
