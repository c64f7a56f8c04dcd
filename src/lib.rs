//! # Gardenbot - Garden Economy Engine for Chat-Bot Minigames
//!
//! Gardenbot is the game core behind a virtual-garden minigame: each player
//! tends a 5x5 plot, plants and waters crops, harvests them into storage,
//! and trades the results with other players for coins - including corn,
//! which moves on a per-garden daily "stalk market" price.
//!
//! The chat platform itself (command parsing, embeds, permissions, message
//! delivery) is deliberately outside this crate. The engine exposes plain
//! data in and plain data out, so any front end can drive it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gardenbot::garden::{self, GardenStore, TileSelection};
//!
//! fn main() -> Result<(), gardenbot::garden::GardenError> {
//!     let store = GardenStore::open("data/garden")?;
//!     let mut rng = rand::thread_rng();
//!
//!     // First access seeds a starter garden.
//!     let snapshot = garden::get_or_create_garden(&store, "guild", "player", false, &mut rng)?;
//!     assert!(snapshot.newly_seeded);
//!
//!     // Water whatever is planted, then run a growth tick.
//!     garden::water_crops(&store, "guild", "player", TileSelection::All)?;
//!     garden::run_growth_tick(&store, chrono::Utc::now())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`garden`] - the engine: inventory model, growth, economy, trades, gifts
//! - [`config`] - TOML configuration loading and validation
//! - [`logutil`] - log sanitization for externally supplied identifiers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Command layer  │ ← chat front end (not this crate)
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Garden engine  │ ← rules, invariants, receipts
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  GardenStore    │ ← sled-backed persistence, transactions
//! └─────────────────┘
//! ```
//!
//! Consistency rests on two store-level guarantees rather than locks:
//! balance changes are conditional atomic updates that refuse to go
//! negative, and every multi-row operation (a purchase, a sale, both legs
//! of a trade, a gift award) commits inside a single store transaction.

pub mod config;
pub mod garden;
pub mod logutil;
