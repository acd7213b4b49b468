// ═══════════════════════════════════════════════════════════════════════
// Game — the mutable entity graph shared by every phase: houses in fixed
// turn order, the turn counter, vassal relations and the board.
// ═══════════════════════════════════════════════════════════════════════

use crate::types::*;
use crate::westeros::WesterosCardType;
use crate::world::World;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct House {
    pub id: HouseName,
    pub power_tokens: u32,
}

/// vassal → commanding house.
///
/// Invariants: no self-reference, every vassal maps to at most one
/// commander, and a commander is never itself a vassal (no chains).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VassalRelations(BTreeMap<HouseName, HouseName>);

impl VassalRelations {
    pub fn commander_of(&self, vassal: HouseName) -> Option<HouseName> {
        self.0.get(&vassal).copied()
    }

    pub fn set(&mut self, vassal: HouseName, commander: HouseName) {
        assert_ne!(vassal, commander, "a house cannot command itself");
        assert!(
            !self.0.contains_key(&commander),
            "a vassal cannot command another house"
        );
        self.0.remove(&vassal);
        // The new vassal must not command anyone either.
        let commanded: Vec<HouseName> = self
            .0
            .iter()
            .filter(|(_, c)| **c == vassal)
            .map(|(v, _)| *v)
            .collect();
        assert!(
            commanded.is_empty(),
            "house becoming a vassal still commands other vassals"
        );
        self.0.insert(vassal, commander);
    }

    /// Hand every vassal of `old` over to `new`.
    pub fn reassign_commander(&mut self, old: HouseName, new: HouseName) {
        for commander in self.0.values_mut() {
            if *commander == old {
                *commander = new;
            }
        }
    }

    pub fn entries(&self) -> Vec<(HouseName, HouseName)> {
        self.0.iter().map(|(v, c)| (*v, *c)).collect()
    }

    pub fn is_vassal(&self, house: HouseName) -> bool {
        self.0.contains_key(&house)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Houses in the session, in fixed cyclic turn order. The order is set
    /// at setup and never changes; iteration order is the turn order.
    pub houses: Vec<House>,
    pub turn: u32,
    pub max_turns: u32,
    /// Engine-wide cap on a house's power tokens.
    pub max_power_tokens: u32,
    pub vassal_relations: VassalRelations,
    pub world: World,
    /// Remaining Westeros deck, drawn from the front.
    pub westeros_deck: Vec<WesterosCardType>,
}

impl Game {
    pub fn house(&self, h: HouseName) -> &House {
        self.houses
            .iter()
            .find(|x| x.id == h)
            .unwrap_or_else(|| panic!("house {h} is not part of this game"))
    }

    pub fn house_mut(&mut self, h: HouseName) -> &mut House {
        self.houses
            .iter_mut()
            .find(|x| x.id == h)
            .unwrap_or_else(|| panic!("house {h} is not part of this game"))
    }

    pub fn turn_order(&self) -> impl Iterator<Item = HouseName> + '_ {
        self.houses.iter().map(|h| h.id)
    }

    pub fn first_in_turn_order(&self) -> HouseName {
        self.houses.first().expect("game has no houses").id
    }

    /// The house after `h` in the fixed cyclic turn order.
    pub fn next_in_turn_order(&self, h: HouseName) -> HouseName {
        let idx = self
            .houses
            .iter()
            .position(|x| x.id == h)
            .unwrap_or_else(|| panic!("house {h} is not part of this game"));
        self.houses[(idx + 1) % self.houses.len()].id
    }

    /// Additively change a house's power tokens, clamped to
    /// [0, max_power_tokens]. Returns the delta actually applied.
    pub fn change_power_tokens(&mut self, h: HouseName, delta: i32) -> i32 {
        let cap = self.max_power_tokens as i64;
        let house = self.house_mut(h);
        let before = house.power_tokens as i64;
        let after = (before + delta as i64).clamp(0, cap);
        house.power_tokens = after as u32;
        (after - before) as i32
    }

    pub fn controlled_structures(&self, h: HouseName) -> usize {
        self.world
            .regions
            .iter()
            .filter(|r| r.has_structure && r.controller() == Some(h))
            .count()
    }

    /// All houses ranked by who is currently winning: most controlled
    /// structures, then most power tokens, then earliest turn-order
    /// position. Vassals are included; callers filter as needed.
    pub fn potential_winners(&self) -> Vec<HouseName> {
        let mut ranked: Vec<(HouseName, usize, u32, usize)> = self
            .houses
            .iter()
            .enumerate()
            .map(|(pos, h)| (h.id, self.controlled_structures(h.id), h.power_tokens, pos))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.3.cmp(&b.3)));
        ranked.into_iter().map(|(h, ..)| h).collect()
    }

    /// Place an order token on a region. At most one order per region.
    pub fn place_order(&mut self, region: RegionId, order: Order) {
        self.world.region_mut(region).order = Some(order);
    }
}
