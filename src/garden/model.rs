//! Garden reads and player-initiated mutations: lazy seeding, the grouped
//! inventory view, and the plant / harvest / water operations.
//!
//! Two representations of the same garden matter here and must not be
//! conflated: the **ungrouped** stack list (discrete quantity-1 rows whose
//! ids encode age) feeds FIFO consumption, while the **grouped** view
//! (per-kind sums for the storage bucket) feeds quantity checks and
//! display. Selling and trading consume specific oldest rows; validation
//! always checks the aggregate.

use std::collections::VecDeque;

use log::debug;
use rand::Rng;

use crate::garden::errors::GardenError;
use crate::garden::storage::GardenStore;
use crate::garden::types::{
    GardenSnapshot, GroupedStack, HarvestReceipt, ItemKind, ItemStack, WaterReceipt, GRID_SIZE,
    HOUSE_TILE, WATERABLE_BELOW_STAGE,
};

/// Which tiles a harvest or watering pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSelection {
    /// One specific tile.
    Tile(u8, u8),
    /// Every eligible tile in the grid.
    All,
}

/// Fetch a player's garden, seeding a starter garden on first access.
///
/// A garden exists once it holds a house row. With `read_only` set (a
/// visitor looking at someone else's garden) a missing garden is
/// `NotFound` instead of being created.
///
/// The starter garden holds the house at (3, 3), one random starter crop
/// unit drawn from the kinds the player does not already hold (the pool
/// resets to the full crop set when exhausted), and zero-balance coin and
/// water rows.
pub fn get_or_create_garden<R: Rng>(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    read_only: bool,
    rng: &mut R,
) -> Result<GardenSnapshot, GardenError> {
    let stacks = store.list_stacks(guild_id, user_id)?;
    if stacks.iter().any(|s| s.kind == ItemKind::House) {
        return Ok(GardenSnapshot {
            stacks,
            newly_seeded: false,
        });
    }
    if read_only {
        return Err(GardenError::NotFound(format!(
            "garden: {}:{}",
            guild_id, user_id
        )));
    }

    let mut remaining: Vec<ItemKind> = ItemKind::CROPS
        .iter()
        .copied()
        .filter(|crop| !stacks.iter().any(|s| s.kind == *crop))
        .collect();
    if remaining.is_empty() {
        remaining = ItemKind::CROPS.to_vec();
    }
    let starter = remaining[rng.gen_range(0..remaining.len())];

    let (hx, hy) = HOUSE_TILE;
    let seeded = store.insert_stacks(vec![
        ItemStack::draft(guild_id, user_id, ItemKind::House, hx, hy, 1),
        ItemStack::draft(guild_id, user_id, starter, 0, 0, 1),
        ItemStack::draft(guild_id, user_id, ItemKind::Coins, 0, 0, 0),
        ItemStack::draft(guild_id, user_id, ItemKind::Water, 0, 0, 0),
    ])?;
    debug!(
        "seeded starter garden for {}:{} with {}",
        guild_id, user_id, starter
    );

    let mut all = stacks;
    all.extend(seeded);
    Ok(GardenSnapshot {
        stacks: all,
        newly_seeded: true,
    })
}

/// Collapse a stack list into the grouped view: storage-bucket rows of one
/// kind become a single entry carrying the total quantity and the oldest
/// contributing row id; planted rows pass through untouched.
pub fn group_stacks(stacks: &[ItemStack]) -> Vec<GroupedStack> {
    let mut grouped: Vec<GroupedStack> = Vec::new();
    for stack in stacks {
        if stack.is_stored() {
            if let Some(entry) = grouped
                .iter_mut()
                .find(|g| g.x == 0 && g.y == 0 && g.kind == stack.kind)
            {
                entry.quantity += stack.quantity;
                entry.oldest_id = entry.oldest_id.min(stack.id);
                continue;
            }
        }
        grouped.push(GroupedStack {
            kind: stack.kind,
            x: stack.x,
            y: stack.y,
            quantity: stack.quantity,
            oldest_id: stack.id,
            watered: stack.watered,
        });
    }
    grouped
}

/// Aggregate stored quantity of one kind.
pub fn stored_quantity(stacks: &[ItemStack], kind: ItemKind) -> i64 {
    stacks
        .iter()
        .filter(|s| s.is_stored() && s.kind == kind)
        .map(|s| s.quantity)
        .sum()
}

/// The oldest-first queue of storage-bucket unit rows for one kind.
/// Selling, trading, and seed consumption all pop from here so the units
/// acquired earliest are always the ones spent first.
#[derive(Debug, Clone)]
pub struct HarvestQueue {
    ids: VecDeque<u64>,
}

impl HarvestQueue {
    pub fn for_kind(stacks: &[ItemStack], kind: ItemKind) -> Self {
        let mut ids: Vec<u64> = stacks
            .iter()
            .filter(|s| s.is_stored() && s.kind == kind && s.kind.is_crop())
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        Self { ids: ids.into() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Take the `n` oldest row ids, or `None` when fewer than `n` remain.
    pub fn pop_oldest(&mut self, n: usize) -> Option<Vec<u64>> {
        if self.ids.len() < n {
            return None;
        }
        Some(self.ids.drain(..n).collect())
    }
}

fn tile_in_grid(x: u8, y: u8) -> bool {
    (1..=GRID_SIZE).contains(&x) && (1..=GRID_SIZE).contains(&y)
}

/// Plant one unit of `kind` at tile `(x, y)`.
///
/// The oldest harvested unit of that kind is consumed as the seed and the
/// planted row starts at growth stage zero. An occupied tile is a hard
/// error; callers that pre-check occupancy for their UI still get the
/// store-level guarantee.
pub fn plant_crop<R: Rng>(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    kind: ItemKind,
    x: u8,
    y: u8,
    rng: &mut R,
) -> Result<ItemStack, GardenError> {
    if !kind.is_crop() {
        return Err(GardenError::InvalidTarget(format!("{} is not plantable", kind)));
    }
    if !tile_in_grid(x, y) {
        return Err(GardenError::InvalidTarget(format!(
            "tile ({}, {}) is outside the {}x{} grid",
            x, y, GRID_SIZE, GRID_SIZE
        )));
    }
    let snapshot = get_or_create_garden(store, guild_id, user_id, false, rng)?;
    if snapshot.stacks.iter().any(|s| s.x == x && s.y == y) {
        return Err(GardenError::OccupiedTile { x, y });
    }
    let mut queue = HarvestQueue::for_kind(&snapshot.stacks, kind);
    let Some(seed_ids) = queue.pop_oldest(1) else {
        return Err(GardenError::InsufficientFunds);
    };
    let planted = store.new_stack(guild_id, user_id, kind, x, y, 0);
    store.exchange_units(guild_id, user_id, &[planted.clone()], &seed_ids, None)?;
    Ok(planted)
}

/// Harvest planted crops into the storage bucket.
///
/// A row at growth stage `q` yields `q - 1` discrete unit rows and is
/// removed from its tile. `All` skips rows below stage two — there is
/// nothing to reap yet, and digging up a seedling is reserved for an
/// explicit tile harvest.
pub fn harvest_crops(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    selection: TileSelection,
) -> Result<HarvestReceipt, GardenError> {
    let stacks = store.list_stacks(guild_id, user_id)?;
    let targets: Vec<&ItemStack> = match selection {
        TileSelection::Tile(x, y) => {
            let found = stacks
                .iter()
                .find(|s| s.x == x && s.y == y && s.kind.is_crop());
            match found {
                Some(stack) => vec![stack],
                None => {
                    return Err(GardenError::NotFound(format!("crop at ({}, {})", x, y)));
                }
            }
        }
        TileSelection::All => stacks
            .iter()
            .filter(|s| s.is_planted() && s.kind.is_crop() && s.quantity >= 2)
            .collect(),
    };

    let mut delete_ids = Vec::with_capacity(targets.len());
    let mut inserts = Vec::new();
    let mut yields = Vec::with_capacity(targets.len());
    for stack in targets {
        let units = (stack.quantity - 1).max(0);
        for _ in 0..units {
            inserts.push(store.new_stack(guild_id, user_id, stack.kind, 0, 0, 1));
        }
        delete_ids.push(stack.id);
        yields.push((stack.kind, units));
    }
    store.exchange_units(guild_id, user_id, &inserts, &delete_ids, None)?;
    Ok(HarvestReceipt { yields })
}

/// Water planted crops, spending one unit of the water bank per tile.
///
/// Only unwatered crops below stage five are eligible (watering a nearly
/// grown crop would waste the bonus). The bank must cover every tile
/// actually watered; otherwise nothing is watered at all.
pub fn water_crops(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    selection: TileSelection,
) -> Result<WaterReceipt, GardenError> {
    let stacks = store.list_stacks(guild_id, user_id)?;
    let eligible = |s: &&ItemStack| {
        s.is_planted() && s.kind.is_crop() && !s.watered && s.quantity < WATERABLE_BELOW_STAGE
    };
    let targets: Vec<&ItemStack> = match selection {
        TileSelection::Tile(x, y) => {
            let found = stacks
                .iter()
                .filter(|s| s.x == x && s.y == y)
                .find(eligible);
            match found {
                Some(stack) => vec![stack],
                None => {
                    return Err(GardenError::NotFound(format!(
                        "waterable crop at ({}, {})",
                        x, y
                    )));
                }
            }
        }
        TileSelection::All => stacks.iter().filter(eligible).collect(),
    };
    if targets.is_empty() {
        return Ok(WaterReceipt {
            watered: Vec::new(),
            water_spent: 0,
        });
    }

    let cost = targets.len() as i64;
    store.adjust_quantity(guild_id, user_id, ItemKind::Water, -cost)?;
    let ids: Vec<u64> = targets.iter().map(|s| s.id).collect();
    store.set_watered(guild_id, user_id, &ids, true)?;
    Ok(WaterReceipt {
        watered: targets.iter().map(|s| (s.x, s.y)).collect(),
        water_spent: cost,
    })
}
