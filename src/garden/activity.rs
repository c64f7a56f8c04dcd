//! Conversion of chat activity into the water currency.
//!
//! Every message a gardener writes feeds a per-(guild, user) character
//! counter; each full thousand characters converts into one unit of
//! banked water, up to a 25-water bank. Roleplay-channel characters count
//! triple. The counters live in this explicit tally object — owned by
//! whoever drives the engine, handed around by reference — and are
//! persisted through the store on a timed flush so a restart loses at
//! most a minute of typing.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::garden::errors::GardenError;
use crate::garden::storage::GardenStore;

/// Characters per unit of banked water.
pub const CHARS_PER_WATER: u64 = 1000;
/// Multiplier for characters written in roleplay channels.
pub const ROLEPLAY_MULTIPLIER: u64 = 3;
/// The water bank never holds more than this.
pub const WATER_BANK_CAP: i64 = 25;
/// Dirty counters are written back after this long at the latest.
const FLUSH_INTERVAL_SECS: i64 = 60;

/// In-memory character counters with persistence hooks.
pub struct CharacterTally {
    counts: HashMap<(String, String), u64>,
    last_flush: DateTime<Utc>,
}

impl CharacterTally {
    /// Load persisted counters and make sure every seeded garden owner
    /// has an entry, so their typing starts counting immediately.
    pub fn load(store: &GardenStore) -> Result<Self, GardenError> {
        let mut counts = store.load_tally()?;
        for owner in store.garden_owners()? {
            counts.entry(owner).or_insert(0);
        }
        Ok(Self {
            counts,
            last_flush: Utc::now(),
        })
    }

    /// Begin counting for a freshly seeded garden.
    pub fn register(&mut self, guild_id: &str, user_id: &str) {
        self.counts
            .entry((guild_id.to_string(), user_id.to_string()))
            .or_insert(0);
    }

    /// Credit one message's characters. Only players with a tally entry
    /// (i.e. a garden) accumulate; everyone else's typing is ignored.
    /// Returns the water actually banked, which may be clipped by the cap.
    pub fn record_message(
        &mut self,
        store: &GardenStore,
        guild_id: &str,
        user_id: &str,
        characters: u64,
        roleplay: bool,
    ) -> Result<i64, GardenError> {
        let key = (guild_id.to_string(), user_id.to_string());
        let Some(count) = self.counts.get_mut(&key) else {
            return Ok(0);
        };
        let weighted = if roleplay {
            characters * ROLEPLAY_MULTIPLIER
        } else {
            characters
        };
        *count += weighted;

        let mut earned = 0i64;
        while *count >= CHARS_PER_WATER {
            *count -= CHARS_PER_WATER;
            earned += 1;
        }

        let mut banked = 0;
        if earned > 0 {
            banked = store.add_water_capped(guild_id, user_id, earned, WATER_BANK_CAP)?;
            debug!(
                "{}:{} earned {} water ({} banked)",
                guild_id, user_id, earned, banked
            );
            self.flush(store)?;
        } else {
            self.flush_if_due(store, Utc::now())?;
        }
        Ok(banked)
    }

    /// Write the counters back when the flush interval has elapsed.
    pub fn flush_if_due(
        &mut self,
        store: &GardenStore,
        now: DateTime<Utc>,
    ) -> Result<bool, GardenError> {
        if now - self.last_flush < Duration::seconds(FLUSH_INTERVAL_SECS) {
            return Ok(false);
        }
        self.flush(store)?;
        Ok(true)
    }

    /// Write the counters back unconditionally.
    pub fn flush(&mut self, store: &GardenStore) -> Result<(), GardenError> {
        store.save_tally(&self.counts)?;
        self.last_flush = Utc::now();
        Ok(())
    }

    /// Current residual character count for one player.
    pub fn residual(&self, guild_id: &str, user_id: &str) -> Option<u64> {
        self.counts
            .get(&(guild_id.to_string(), user_id.to_string()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garden::storage::GardenStoreBuilder;
    use crate::garden::types::{ItemKind, ItemStack};
    use tempfile::TempDir;

    fn seed_garden(store: &GardenStore, guild: &str, user: &str) {
        store
            .insert_stacks(vec![
                ItemStack::draft(guild, user, ItemKind::House, 3, 3, 1),
                ItemStack::draft(guild, user, ItemKind::Water, 0, 0, 0),
                ItemStack::draft(guild, user, ItemKind::Coins, 0, 0, 0),
            ])
            .expect("seed");
    }

    fn water_balance(store: &GardenStore, guild: &str, user: &str) -> i64 {
        store
            .list_stacks(guild, user)
            .expect("list")
            .iter()
            .find(|s| s.kind == ItemKind::Water)
            .expect("water row")
            .quantity
    }

    #[test]
    fn a_thousand_characters_banks_one_water() {
        let dir = TempDir::new().expect("tempdir");
        let store = GardenStoreBuilder::new(dir.path()).open().expect("store");
        seed_garden(&store, "g1", "u1");
        let mut tally = CharacterTally::load(&store).expect("load");

        let banked = tally
            .record_message(&store, "g1", "u1", 600, false)
            .expect("record");
        assert_eq!(banked, 0);
        let banked = tally
            .record_message(&store, "g1", "u1", 500, false)
            .expect("record");
        assert_eq!(banked, 1);
        assert_eq!(water_balance(&store, "g1", "u1"), 1);
        assert_eq!(tally.residual("g1", "u1"), Some(100));
    }

    #[test]
    fn roleplay_characters_count_triple() {
        let dir = TempDir::new().expect("tempdir");
        let store = GardenStoreBuilder::new(dir.path()).open().expect("store");
        seed_garden(&store, "g1", "u1");
        let mut tally = CharacterTally::load(&store).expect("load");

        let banked = tally
            .record_message(&store, "g1", "u1", 400, true)
            .expect("record");
        assert_eq!(banked, 1, "400 roleplay chars weigh 1200");
        assert_eq!(tally.residual("g1", "u1"), Some(200));
    }

    #[test]
    fn the_bank_caps_at_twenty_five() {
        let dir = TempDir::new().expect("tempdir");
        let store = GardenStoreBuilder::new(dir.path()).open().expect("store");
        seed_garden(&store, "g1", "u1");
        store
            .adjust_quantity("g1", "u1", ItemKind::Water, 24)
            .expect("prefill");
        let mut tally = CharacterTally::load(&store).expect("load");

        let banked = tally
            .record_message(&store, "g1", "u1", 5000, false)
            .expect("record");
        assert_eq!(banked, 1, "only one of five earned units fits");
        assert_eq!(water_balance(&store, "g1", "u1"), WATER_BANK_CAP);
    }

    #[test]
    fn gardenless_typists_accumulate_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let store = GardenStoreBuilder::new(dir.path()).open().expect("store");
        let mut tally = CharacterTally::load(&store).expect("load");

        let banked = tally
            .record_message(&store, "g1", "stranger", 5000, true)
            .expect("record");
        assert_eq!(banked, 0);
        assert_eq!(tally.residual("g1", "stranger"), None);
    }

    #[test]
    fn counters_survive_a_reload() {
        let dir = TempDir::new().expect("tempdir");
        let store = GardenStoreBuilder::new(dir.path()).open().expect("store");
        seed_garden(&store, "g1", "u1");
        let mut tally = CharacterTally::load(&store).expect("load");
        tally
            .record_message(&store, "g1", "u1", 700, false)
            .expect("record");
        tally.flush(&store).expect("flush");

        let reloaded = CharacterTally::load(&store).expect("reload");
        assert_eq!(reloaded.residual("g1", "u1"), Some(700));
    }
}
