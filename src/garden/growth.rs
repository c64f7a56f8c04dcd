//! The growth engine: one batch pass over every garden, run from the
//! scheduler rather than by player action.
//!
//! Per tick, in order: every planted crop below stage six grows by one,
//! watered crops below stage six grow by one more, every watered flag is
//! cleared, planted crops stale for three days or longer reset to stage
//! one, and harvested units older than three days spoil out of storage.
//!
//! Growth is a flat +1 per invocation. A missed tick is simply missed;
//! nothing is backfilled.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use crate::garden::errors::GardenError;
use crate::garden::storage::GardenStore;
use crate::garden::types::{GrowthReport, MAX_GROWTH_STAGE};
use crate::logutil::escape_log;

/// Days a planted crop can sit untouched before withering back to stage
/// one, and days a harvested unit keeps before spoiling.
pub const STALE_AFTER_DAYS: i64 = 3;

/// Advance every garden by one tick. A failure in one garden is logged
/// and skipped; the remaining gardens still get their growth.
pub fn run_growth_tick(store: &GardenStore, now: DateTime<Utc>) -> Result<GrowthReport, GardenError> {
    let mut report = GrowthReport::default();
    let owners = store.garden_owners()?;
    report.gardens = owners.len();
    for (guild_id, user_id) in owners {
        match tick_garden(store, &guild_id, &user_id, now, &mut report) {
            Ok(()) => {}
            Err(err) => {
                report.failures += 1;
                warn!(
                    "growth tick skipped garden {}:{}: {}",
                    escape_log(&guild_id),
                    escape_log(&user_id),
                    err
                );
            }
        }
    }
    info!(
        "growth tick: {} gardens, {} grown ({} bonus), {} withered, {} spoiled, {} failures",
        report.gardens,
        report.grown,
        report.bonus_growth,
        report.withered,
        report.spoiled,
        report.failures
    );
    Ok(report)
}

fn tick_garden(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
    report: &mut GrowthReport,
) -> Result<(), GardenError> {
    let cutoff = now - Duration::days(STALE_AFTER_DAYS);
    let stacks = store.list_stacks(guild_id, user_id)?;
    let mut spoiled_ids = Vec::new();

    for stack in stacks {
        if stack.is_stored() {
            // Abandoned harvest spoils after three days in storage.
            if stack.kind.is_crop() && stack.created_at <= cutoff {
                spoiled_ids.push(stack.id);
                report.spoiled += 1;
            }
            continue;
        }
        if !stack.kind.is_crop() {
            continue;
        }

        // Staleness is judged against the row as it stood when the tick
        // began; a crop this very tick grows is still withered if nobody
        // touched it for three days before.
        let was_stale = stack.updated_at < cutoff;
        let mut updated = stack;
        let mut mutated = false;

        if updated.quantity < MAX_GROWTH_STAGE {
            updated.quantity += 1;
            report.grown += 1;
            mutated = true;
            if updated.watered && updated.quantity < MAX_GROWTH_STAGE {
                updated.quantity += 1;
                report.bonus_growth += 1;
            }
        }
        if updated.watered {
            updated.watered = false;
            mutated = true;
        }
        if was_stale {
            updated.quantity = 1;
            report.withered += 1;
            mutated = true;
        }

        if mutated {
            updated.touch();
            store.put_stack(&updated)?;
        }
    }

    if !spoiled_ids.is_empty() {
        store.delete_stacks(guild_id, user_id, &spoiled_ids)?;
    }
    Ok(())
}
