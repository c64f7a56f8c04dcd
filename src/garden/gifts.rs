//! One-shot unwrapping of achievement-granted gifts into crop bundles.

use log::info;
use rand::Rng;

use crate::garden::errors::GardenError;
use crate::garden::storage::GardenStore;
use crate::garden::types::ItemKind;

/// Copies of each drawn crop kind a single grant pays out.
pub const COPIES_PER_GRANT: i64 = 3;

/// Open every unopened gift grant the player holds for the given
/// achievement ids.
///
/// Each grant draws one crop kind, sampled without replacement so a batch
/// of grants spreads across the crop set; when the pool runs dry
/// mid-batch it resets to the full set. Every drawn kind pays out three
/// unit rows. Grants are marked opened in the same transaction that
/// awards the crops, and a second call finds nothing to open and returns
/// `None`.
pub fn open_gifts<R: Rng>(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
    grant_ids: &[u32],
    rng: &mut R,
) -> Result<Option<Vec<ItemKind>>, GardenError> {
    let grants = store.unopened_gifts(guild_id, user_id, grant_ids)?;
    if grants.is_empty() {
        return Ok(None);
    }

    let mut pool: Vec<ItemKind> = ItemKind::CROPS.to_vec();
    let mut drawn = Vec::with_capacity(grants.len());
    let mut inserts = Vec::with_capacity(grants.len() * COPIES_PER_GRANT as usize);
    for _ in &grants {
        if pool.is_empty() {
            pool = ItemKind::CROPS.to_vec();
        }
        let kind = pool.swap_remove(rng.gen_range(0..pool.len()));
        for _ in 0..COPIES_PER_GRANT {
            inserts.push(store.new_stack(guild_id, user_id, kind, 0, 0, 1));
        }
        drawn.push(kind);
    }

    let grant_row_ids: Vec<u64> = grants.iter().map(|g| g.id).collect();
    store.award_gifts(guild_id, user_id, &grant_row_ids, &inserts)?;
    info!(
        "opened {} gift(s) for {}:{}: {:?}",
        grants.len(),
        guild_id,
        user_id,
        drawn
    );
    Ok(Some(drawn))
}
