// ═══════════════════════════════════════════════════════════════════════
// World — the board: regions, their static attributes, and their dynamic
// state (units, placed order, control marker).
//
// Map geometry is an input to the engine, not a rule table: a World is
// built from region definitions at setup and never grows or shrinks.
// ═══════════════════════════════════════════════════════════════════════

use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub kind: RegionKind,
    /// Crown icons printed on the region (static).
    pub crown_icons: u8,
    /// Castle or stronghold present (static).
    pub has_structure: bool,
    /// Adjacent regions, for marching.
    pub adjacent: Vec<RegionId>,
    /// For ports only: the sea region this port opens onto.
    pub adjacent_sea: Option<RegionId>,

    // Dynamic state
    pub units: Vec<Unit>,
    pub order: Option<Order>,
    /// Control marker left behind when an area is vacated.
    pub control_marker: Option<HouseName>,
}

impl Region {
    /// The house controlling this region: derived from unit occupancy,
    /// falling back to a control marker on an empty region.
    pub fn controller(&self) -> Option<HouseName> {
        self.units.first().map(|u| u.house).or(self.control_marker)
    }

    /// Mustering points granted by this region.
    pub fn muster_points(&self) -> u8 {
        if self.has_structure {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub regions: Vec<Region>,
}

impl World {
    pub fn new(regions: Vec<Region>) -> Self {
        for (i, r) in regions.iter().enumerate() {
            assert_eq!(r.id.0 as usize, i, "region ids must be dense and ordered");
        }
        World { regions }
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0 as usize]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id.0 as usize]
    }

    /// The sea a port opens onto. Calling this for a non-port region is a
    /// contract violation.
    pub fn adjacent_sea_of_port(&self, id: RegionId) -> &Region {
        let port = self.region(id);
        assert_eq!(port.kind, RegionKind::Port, "{} is not a port", port.name);
        let sea = port
            .adjacent_sea
            .unwrap_or_else(|| panic!("port {} has no adjacent sea", port.name));
        self.region(sea)
    }

    pub fn controlled_regions(&self, house: HouseName) -> Vec<&Region> {
        self.regions
            .iter()
            .filter(|r| r.controller() == Some(house))
            .collect()
    }

    /// Regions controlled by `house` bearing an order matching `pred`,
    /// in stable region-id order.
    pub fn ordered_regions_of_house(
        &self,
        house: HouseName,
        pred: impl Fn(&Order) -> bool,
    ) -> Vec<RegionId> {
        self.regions
            .iter()
            .filter(|r| r.controller() == Some(house))
            .filter(|r| r.order.as_ref().map_or(false, &pred))
            .map(|r| r.id)
            .collect()
    }
}
