// ═══════════════════════════════════════════════════════════════════════
// Core identifiers and small shared types
// ═══════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

// ── House ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HouseName {
    Stark,
    Lannister,
    Baratheon,
    Greyjoy,
    Tyrell,
    Martell,
}

impl HouseName {
    pub const ALL: [HouseName; 6] = [
        HouseName::Stark,
        HouseName::Lannister,
        HouseName::Baratheon,
        HouseName::Greyjoy,
        HouseName::Tyrell,
        HouseName::Martell,
    ];
}

impl std::fmt::Display for HouseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HouseName::Stark => write!(f, "Stark"),
            HouseName::Lannister => write!(f, "Lannister"),
            HouseName::Baratheon => write!(f, "Baratheon"),
            HouseName::Greyjoy => write!(f, "Greyjoy"),
            HouseName::Tyrell => write!(f, "Tyrell"),
            HouseName::Martell => write!(f, "Martell"),
        }
    }
}

// ── User / Player ──────────────────────────────────────────────────────

/// Network identity of a connected user. Assigned by the website backend,
/// opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// Binds a user to exactly one house for the lifetime of a session.
/// The user→player mapping is 1:1 and only mutated by replacement votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub user: UserId,
    pub house: HouseName,
}

// ── Region ID ──────────────────────────────────────────────────────────
// Compact, copyable region identifier. Index into World::regions.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionKind {
    Land,
    Sea,
    Port,
}

// ── Units ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitType {
    Footman,
    Knight,
    Ship,
    SiegeEngine,
}

impl UnitType {
    /// Mustering cost in points (a structure grants 2 points).
    pub fn muster_cost(self) -> u8 {
        match self {
            UnitType::Footman => 1,
            UnitType::Knight => 2,
            UnitType::Ship => 1,
            UnitType::SiegeEngine => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub unit_type: UnitType,
    pub house: HouseName,
}

// ── Orders ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    March,
    Raid,
    Support,
    Defense,
    ConsolidatePower,
    /// Vassal-only order resolved during consolidate-power resolution.
    DefenseMuster,
    /// Iron Bank pseudo-order: occupies a region but never grants power.
    IronBank,
}

impl OrderKind {
    /// Whether this order participates in consolidate-power resolution.
    pub fn is_consolidate_power(self) -> bool {
        matches!(self, OrderKind::ConsolidatePower | OrderKind::IronBank)
    }
}

/// An order token placed on a region. At most one per region; consumed
/// (removed) exactly once during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub kind: OrderKind,
    pub starred: bool,
}

// ── Mustering ──────────────────────────────────────────────────────────

/// The flavor of a mustering leaf phase. Matches the two entry points of
/// consolidate-power resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MusterType {
    StarredConsolidatePower,
    DefenseMusterOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_house_display() {
        assert_eq!(format!("{}", HouseName::Stark), "Stark");
        assert_eq!(format!("{}", HouseName::Baratheon), "Baratheon");
    }

    #[test]
    fn test_order_kind_cp_family() {
        assert!(OrderKind::ConsolidatePower.is_consolidate_power());
        assert!(OrderKind::IronBank.is_consolidate_power());
        assert!(!OrderKind::DefenseMuster.is_consolidate_power());
        assert!(!OrderKind::March.is_consolidate_power());
    }

    #[test]
    fn test_muster_costs() {
        assert_eq!(UnitType::Footman.muster_cost(), 1);
        assert_eq!(UnitType::Knight.muster_cost(), 2);
        assert_eq!(UnitType::Ship.muster_cost(), 1);
        assert_eq!(UnitType::SiegeEngine.muster_cost(), 2);
    }

    #[test]
    fn test_order_kind_wire_tags() {
        let j = serde_json::to_string(&OrderKind::ConsolidatePower).unwrap();
        assert_eq!(j, "\"consolidate-power\"");
        let j = serde_json::to_string(&OrderKind::IronBank).unwrap();
        assert_eq!(j, "\"iron-bank\"");
    }
}
