//! Garden data model, persistence, and game rules.
//! The module splits along the life of a crop: `model` covers reads and
//! player actions, `growth` the scheduled tick, `economy` the coin flows,
//! `trade` the offer protocol, `gifts` the achievement bundles, and
//! `activity` the typing-to-water conversion feeding it all.

pub mod activity;
pub mod economy;
pub mod errors;
pub mod gifts;
pub mod growth;
pub mod model;
pub mod scheduler;
pub mod storage;
pub mod trade;
pub mod types;

pub use activity::{CharacterTally, CHARS_PER_WATER, ROLEPLAY_MULTIPLIER, WATER_BANK_CAP};
pub use economy::{buy_crops, oldest_unit_ids, sell_crops, stalk_price, CROP_PRICE, FLAT_SALE_PRICE};
pub use errors::GardenError;
pub use gifts::{open_gifts, COPIES_PER_GRANT};
pub use growth::{run_growth_tick, STALE_AFTER_DAYS};
pub use model::{
    get_or_create_garden, group_stacks, harvest_crops, plant_crop, stored_quantity, water_crops,
    HarvestQueue, TileSelection,
};
pub use scheduler::{GrowthFrequency, GrowthScheduler};
pub use storage::{GardenStore, GardenStoreBuilder};
pub use trade::{accept_trade, get_offer, OfferAmount, TradeDraft};
pub use types::*;
