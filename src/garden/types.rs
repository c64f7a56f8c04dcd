use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const STACK_SCHEMA_VERSION: u8 = 1;
pub const OFFER_SCHEMA_VERSION: u8 = 1;
pub const GIFT_SCHEMA_VERSION: u8 = 1;

/// Side length of the planting grid. Valid planted coordinates are `1..=GRID_SIZE`.
pub const GRID_SIZE: u8 = 5;
/// The tile every starter garden's house marker occupies.
pub const HOUSE_TILE: (u8, u8) = (3, 3);
/// A planted crop stops growing once its quantity reaches this stage.
pub const MAX_GROWTH_STAGE: i64 = 6;
/// Crops at or above this stage can no longer be watered (the bonus would be wasted).
pub const WATERABLE_BELOW_STAGE: i64 = 5;

/// Everything a stack row can hold: the fixed crop set plus the three
/// non-crop markers (water and coin balances, and the house that marks a
/// garden as seeded).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    GreenApple,
    Blueberries,
    Cherries,
    Corn,
    Grapes,
    Lemon,
    Peach,
    Water,
    Coins,
    House,
}

impl ItemKind {
    /// The plantable crop set, in canonical order.
    pub const CROPS: [ItemKind; 7] = [
        ItemKind::GreenApple,
        ItemKind::Blueberries,
        ItemKind::Cherries,
        ItemKind::Corn,
        ItemKind::Grapes,
        ItemKind::Lemon,
        ItemKind::Peach,
    ];

    pub fn is_crop(&self) -> bool {
        Self::CROPS.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::GreenApple => "green_apple",
            ItemKind::Blueberries => "blueberries",
            ItemKind::Cherries => "cherries",
            ItemKind::Corn => "corn",
            ItemKind::Grapes => "grapes",
            ItemKind::Lemon => "lemon",
            ItemKind::Peach => "peach",
            ItemKind::Water => "water",
            ItemKind::Coins => "coins",
            ItemKind::House => "house",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inventory row. A stack at `(0, 0)` is liquid storage (harvested
/// units, the coin balance, the water bank); a stack at `x, y ∈ 1..=5`
/// occupies one tile of the planting grid.
///
/// Harvested crop units are discrete quantity-1 rows so the oldest can be
/// consumed first; coins and water are single rows whose quantity is a
/// running balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemStack {
    /// Monotonic creation-time id; doubles as the FIFO age of the row.
    pub id: u64,
    pub guild_id: String,
    pub user_id: String,
    pub kind: ItemKind,
    pub x: u8,
    pub y: u8,
    pub quantity: i64,
    pub watered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ItemStack {
    /// Build a stack with no id yet; the store assigns one on insert.
    pub fn draft(guild_id: &str, user_id: &str, kind: ItemKind, x: u8, y: u8, quantity: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            x,
            y,
            quantity,
            watered: false,
            created_at: now,
            updated_at: now,
            schema_version: STACK_SCHEMA_VERSION,
        }
    }

    /// True for rows occupying a planting-grid tile.
    pub fn is_planted(&self) -> bool {
        self.x > 0 && self.y > 0
    }

    /// True for rows in the `(0, 0)` storage bucket.
    pub fn is_stored(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One logical entry of the grouped garden view: `(0, 0)` rows of the same
/// kind are summed into a single entry, planted rows stay individual.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedStack {
    pub kind: ItemKind,
    pub x: u8,
    pub y: u8,
    pub quantity: i64,
    /// Representative row id: the oldest row contributing to this entry.
    pub oldest_id: u64,
    pub watered: bool,
}

/// A player's garden as read from the store.
#[derive(Debug, Clone)]
pub struct GardenSnapshot {
    pub stacks: Vec<ItemStack>,
    /// True when this read seeded a brand-new starter garden.
    pub newly_seeded: bool,
}

/// Who may accept a trade offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeTarget {
    /// Any visitor may accept.
    Anyone,
    /// Only the named user may accept.
    User(String),
}

/// One side of a trade: a concrete amount of an item kind, or nothing at
/// all (a gift in one direction).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeGood {
    Nothing,
    Item { kind: ItemKind, amount: i64 },
}

/// A committed trade offer. At most one exists per (guild, user); a new
/// commit overwrites the old offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeOffer {
    pub guild_id: String,
    pub user_id: String,
    pub target: TradeTarget,
    pub offered: TradeGood,
    pub requested: TradeGood,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

/// An achievement grant that can be unwrapped once for a crop bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GiftGrant {
    pub id: u64,
    pub guild_id: String,
    pub user_id: String,
    pub achievement_id: u32,
    pub opened: bool,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl GiftGrant {
    pub fn draft(guild_id: &str, user_id: &str, achievement_id: u32) -> Self {
        Self {
            id: 0,
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            achievement_id,
            opened: false,
            created_at: Utc::now(),
            schema_version: GIFT_SCHEMA_VERSION,
        }
    }
}

// ============================================================================
// Operation receipts
// ============================================================================

/// Outcome of a crop purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub kind: ItemKind,
    pub quantity: i64,
    pub total_cost: i64,
    pub remaining_coins: i64,
}

/// Outcome of a sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleReceipt {
    pub units_sold: usize,
    pub coins_credited: i64,
}

/// Outcome of a harvest: the yield per harvested tile.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReceipt {
    pub yields: Vec<(ItemKind, i64)>,
}

impl HarvestReceipt {
    pub fn total_units(&self) -> i64 {
        self.yields.iter().map(|(_, n)| n).sum()
    }
}

/// Outcome of watering.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterReceipt {
    pub watered: Vec<(u8, u8)>,
    pub water_spent: i64,
}

/// Outcome of an accepted trade, from the accepter's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub offerer: String,
    pub accepter: String,
    /// What the accepter received.
    pub received: TradeGood,
    /// What the accepter gave up.
    pub delivered: TradeGood,
}

/// Counters from one growth tick, for logging and status output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrowthReport {
    pub gardens: usize,
    pub grown: usize,
    pub bonus_growth: usize,
    pub withered: usize,
    pub spoiled: usize,
    /// Gardens skipped because their update failed; the tick carries on.
    pub failures: usize,
}
