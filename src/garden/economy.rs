//! Buying, selling, and the stalk market.
//!
//! Crops cost a flat ten coins to buy. Everything sells back at two coins
//! a unit, except corn: corn moves at the garden owner's daily stalk
//! price, so the profitable play is hawking it around other people's
//! gardens.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::garden::errors::GardenError;
use crate::garden::model::stored_quantity;
use crate::garden::storage::GardenStore;
use crate::garden::types::{ItemKind, PurchaseReceipt, SaleReceipt};

/// Flat purchase price per crop unit.
pub const CROP_PRICE: i64 = 10;
/// Flat sale price for every crop kind except corn.
pub const FLAT_SALE_PRICE: i64 = 2;

/// The day's stalk price for one user's garden.
///
/// Derived fresh on every call from a digest over the user id and the
/// calendar date — never stored, stable all day, different tomorrow and
/// different next door. The last digest byte lands on a price ladder
/// weighted heavily toward the low rungs.
pub fn stalk_price(user_id: &str, date: NaiveDate) -> i64 {
    let digest = Sha256::digest(format!("{}{}", user_id, date.format("%Y-%m-%d")).as_bytes());
    match digest[digest.len() - 1] {
        0..=99 => 1,
        100..=174 => 2,
        175..=199 => 4,
        200..=229 => 8,
        230..=244 => 16,
        245..=252 => 32,
        _ => 64,
    }
}

/// Buy `quantity` units of a crop at the flat price.
///
/// The units land in storage as discrete rows and the coin decrement is
/// checked at the store level inside the same transaction: a balance that
/// cannot cover the cost rejects the whole purchase, no matter what any
/// caller-side affordability check concluded from a stale read.
pub fn buy_crops(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    kind: ItemKind,
    quantity: i64,
) -> Result<PurchaseReceipt, GardenError> {
    if !kind.is_crop() {
        return Err(GardenError::InvalidTarget(format!("{} is not for sale", kind)));
    }
    if quantity <= 0 {
        return Err(GardenError::InvalidTarget("quantity must be positive".into()));
    }
    let stacks = store.list_stacks(guild_id, user_id)?;
    let coins_row = stacks
        .iter()
        .find(|s| s.is_stored() && s.kind == ItemKind::Coins)
        .ok_or_else(|| GardenError::NotFound(format!("garden: {}:{}", guild_id, user_id)))?;

    let total_cost = CROP_PRICE * quantity;
    let inserts: Vec<_> = (0..quantity)
        .map(|_| store.new_stack(guild_id, user_id, kind, 0, 0, 1))
        .collect();
    let remaining = store
        .exchange_units(guild_id, user_id, &inserts, &[], Some((coins_row.id, -total_cost)))?
        .unwrap_or(0);
    Ok(PurchaseReceipt {
        kind,
        quantity,
        total_cost,
        remaining_coins: remaining,
    })
}

/// Sell the named harvested units.
///
/// `price_host` is whose stalk price corn fetches: the seller's own id
/// when selling at home, the garden owner's id when hawking corn on a
/// visit. Exactly the named rows are deleted and the proceeds credited in
/// one transaction.
pub fn sell_crops(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    ids: &[u64],
    price_host: &str,
    date: NaiveDate,
) -> Result<SaleReceipt, GardenError> {
    if ids.is_empty() {
        return Ok(SaleReceipt {
            units_sold: 0,
            coins_credited: 0,
        });
    }
    let stacks = store.list_stacks(guild_id, user_id)?;
    let coins_row = stacks
        .iter()
        .find(|s| s.is_stored() && s.kind == ItemKind::Coins)
        .ok_or_else(|| GardenError::NotFound(format!("garden: {}:{}", guild_id, user_id)))?;

    let corn_price = stalk_price(price_host, date);
    let mut proceeds = 0i64;
    for id in ids {
        let row = stacks
            .iter()
            .find(|s| s.id == *id)
            .ok_or_else(|| GardenError::NotFound(format!("stack: {}", id)))?;
        if !row.is_stored() || !row.kind.is_crop() {
            return Err(GardenError::InvalidTarget(format!(
                "stack {} is not a harvested crop",
                id
            )));
        }
        proceeds += match row.kind {
            ItemKind::Corn => corn_price * row.quantity,
            _ => FLAT_SALE_PRICE * row.quantity,
        };
    }

    store.exchange_units(guild_id, user_id, &[], ids, Some((coins_row.id, proceeds)))?;
    Ok(SaleReceipt {
        units_sold: ids.len(),
        coins_credited: proceeds,
    })
}

/// Ids of the oldest `amount` stored units of `kind`, for sell flows that
/// take a quantity rather than explicit rows.
pub fn oldest_unit_ids(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    kind: ItemKind,
    amount: usize,
) -> Result<Vec<u64>, GardenError> {
    let stacks = store.list_stacks(guild_id, user_id)?;
    if stored_quantity(&stacks, kind) < amount as i64 {
        return Err(GardenError::InsufficientFunds);
    }
    let mut queue = crate::garden::model::HarvestQueue::for_kind(&stacks, kind);
    queue
        .pop_oldest(amount)
        .ok_or(GardenError::InsufficientFunds)
}
