//! The peer-to-peer trade protocol.
//!
//! Building an offer walks a fixed negotiation sequence — pick a target,
//! pick the offered item, its amount, the requested item, its amount —
//! and the types enforce the order: each step consumes the previous one,
//! so a half-built offer cannot be committed or skipped ahead.
//!
//! Committing late-binds an "offer everything" amount against the stock
//! at commit time, not at the moment the player said "all". Reading an
//! offer lazily purges it once the offering side can no longer cover it.
//! Accepting re-validates both sides and then moves both legs and deletes
//! the offer inside a single store transaction, so no interleaving can
//! leave one garden credited and the other untouched.

use log::{debug, info};

use crate::garden::errors::GardenError;
use crate::garden::model::{group_stacks, stored_quantity, HarvestQueue};
use crate::garden::storage::{GardenStore, TransferPlan};
use crate::garden::types::{
    ItemKind, ItemStack, TradeGood, TradeOffer, TradeReceipt, TradeTarget, OFFER_SCHEMA_VERSION,
};
use crate::logutil::escape_log;

/// How much of the offered item goes on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAmount {
    Exact(i64),
    /// Resolved to the player's entire stock at commit time.
    All,
}

/// Entry point of the negotiation sequence.
pub struct TradeDraft;

impl TradeDraft {
    pub fn for_player(guild_id: &str, user_id: &str) -> ChoosingTarget {
        ChoosingTarget {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

pub struct ChoosingTarget {
    guild_id: String,
    user_id: String,
}

impl ChoosingTarget {
    pub fn target(self, target: TradeTarget) -> ChoosingOfferedItem {
        ChoosingOfferedItem {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target,
        }
    }
}

pub struct ChoosingOfferedItem {
    guild_id: String,
    user_id: String,
    target: TradeTarget,
}

impl ChoosingOfferedItem {
    pub fn offer(self, kind: ItemKind) -> ChoosingOfferedAmount {
        ChoosingOfferedAmount {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered_kind: kind,
        }
    }

    /// Offer nothing: a one-way gift in the requested direction.
    pub fn offer_nothing(self) -> ChoosingRequestedItem {
        ChoosingRequestedItem {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered: OfferedSide::Nothing,
        }
    }
}

enum OfferedSide {
    Nothing,
    Item { kind: ItemKind, amount: OfferAmount },
}

pub struct ChoosingOfferedAmount {
    guild_id: String,
    user_id: String,
    target: TradeTarget,
    offered_kind: ItemKind,
}

impl ChoosingOfferedAmount {
    pub fn amount(self, amount: OfferAmount) -> ChoosingRequestedItem {
        ChoosingRequestedItem {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered: OfferedSide::Item {
                kind: self.offered_kind,
                amount,
            },
        }
    }
}

pub struct ChoosingRequestedItem {
    guild_id: String,
    user_id: String,
    target: TradeTarget,
    offered: OfferedSide,
}

impl ChoosingRequestedItem {
    pub fn request(self, kind: ItemKind) -> ChoosingRequestedAmount {
        ChoosingRequestedAmount {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered: self.offered,
            requested_kind: kind,
        }
    }

    /// Request nothing: a one-way gift in the offered direction.
    pub fn request_nothing(self) -> ReadyToCommit {
        ReadyToCommit {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered: self.offered,
            requested: TradeGood::Nothing,
        }
    }
}

pub struct ChoosingRequestedAmount {
    guild_id: String,
    user_id: String,
    target: TradeTarget,
    offered: OfferedSide,
    requested_kind: ItemKind,
}

impl ChoosingRequestedAmount {
    pub fn amount(self, amount: i64) -> ReadyToCommit {
        ReadyToCommit {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered: self.offered,
            requested: TradeGood::Item {
                kind: self.requested_kind,
                amount,
            },
        }
    }
}

pub struct ReadyToCommit {
    guild_id: String,
    user_id: String,
    target: TradeTarget,
    offered: OfferedSide,
    requested: TradeGood,
}

impl ReadyToCommit {
    /// Resolve the offered amount against current stock and store the
    /// offer, overwriting any previous offer this player had open.
    pub fn commit(self, store: &GardenStore) -> Result<TradeOffer, GardenError> {
        if let OfferedSide::Item { kind, .. } = &self.offered {
            ensure_tradable(*kind)?;
        }
        if let TradeGood::Item { kind, .. } = &self.requested {
            ensure_tradable(*kind)?;
        }
        let offered = match self.offered {
            OfferedSide::Nothing => TradeGood::Nothing,
            OfferedSide::Item { kind, amount } => {
                let resolved = match amount {
                    OfferAmount::Exact(n) => n,
                    OfferAmount::All => {
                        let stacks = store.list_stacks(&self.guild_id, &self.user_id)?;
                        if stacks.is_empty() {
                            return Err(GardenError::NotFound(format!(
                                "garden: {}:{}",
                                self.guild_id, self.user_id
                            )));
                        }
                        aggregate_of(&stacks, kind)
                    }
                };
                TradeGood::Item {
                    kind,
                    amount: resolved,
                }
            }
        };
        let offer = TradeOffer {
            guild_id: self.guild_id,
            user_id: self.user_id,
            target: self.target,
            offered,
            requested: self.requested,
            created_at: chrono::Utc::now(),
            schema_version: OFFER_SCHEMA_VERSION,
        };
        store.upsert_offer(offer.clone())?;
        debug!(
            "offer committed by {}:{}: {:?} for {:?}",
            offer.guild_id, offer.user_id, offer.offered, offer.requested
        );
        Ok(offer)
    }
}

/// Crops and coins go on the table; the water bank and the house marker
/// never change hands.
fn ensure_tradable(kind: ItemKind) -> Result<(), GardenError> {
    if kind.is_crop() || kind == ItemKind::Coins {
        Ok(())
    } else {
        Err(GardenError::InvalidTarget(format!("{} cannot be traded", kind)))
    }
}

fn aggregate_of(stacks: &[ItemStack], kind: ItemKind) -> i64 {
    group_stacks(stacks)
        .iter()
        .find(|g| g.x == 0 && g.y == 0 && g.kind == kind)
        .map(|g| g.quantity)
        .unwrap_or(0)
}

/// Fetch a player's open offer, purging it when the offering side's stock
/// has fallen below the amount on the table.
pub fn get_offer(
    store: &GardenStore,
    guild_id: &str,
    user_id: &str,
) -> Result<Option<TradeOffer>, GardenError> {
    let Some(offer) = store.get_offer_record(guild_id, user_id)? else {
        return Ok(None);
    };
    if let TradeGood::Item { kind, amount } = &offer.offered {
        let stacks = store.list_stacks(guild_id, user_id)?;
        if aggregate_of(&stacks, *kind) < *amount {
            store.delete_offer(guild_id, user_id)?;
            debug!("purged stale offer from {}:{}", guild_id, user_id);
            return Ok(None);
        }
    }
    Ok(Some(offer))
}

/// Build the transfer plan for one side: which rows move from payer to
/// payee. Returns `None` when the payer cannot cover the good.
fn plan_leg(
    store: &GardenStore,
    guild_id: &str,
    payer: &str,
    payee: &str,
    good: &TradeGood,
) -> Result<Option<TransferPlan>, GardenError> {
    let TradeGood::Item { kind, amount } = good else {
        return Ok(Some(TransferPlan::Nothing));
    };
    if *kind == ItemKind::Coins {
        let payer_stacks = store.list_stacks(guild_id, payer)?;
        let payee_stacks = store.list_stacks(guild_id, payee)?;
        let payer_row = payer_stacks
            .iter()
            .find(|s| s.is_stored() && s.kind == ItemKind::Coins);
        let payee_row = payee_stacks
            .iter()
            .find(|s| s.is_stored() && s.kind == ItemKind::Coins);
        let (Some(payer_row), Some(payee_row)) = (payer_row, payee_row) else {
            return Ok(None);
        };
        if payer_row.quantity < *amount {
            return Ok(None);
        }
        return Ok(Some(TransferPlan::Coins {
            payer_row: payer_row.id,
            payee_row: payee_row.id,
            amount: *amount,
        }));
    }

    let stacks = store.list_stacks(guild_id, payer)?;
    if stored_quantity(&stacks, *kind) < *amount {
        return Ok(None);
    }
    let mut queue = HarvestQueue::for_kind(&stacks, *kind);
    let Some(ids) = queue.pop_oldest(*amount as usize) else {
        return Ok(None);
    };
    Ok(Some(TransferPlan::Units { kind: *kind, ids }))
}

/// Accept another player's open offer.
///
/// The accepter must match the offer's target. Both sides are
/// re-validated against live stock; an unsatisfiable offer is purged and
/// reported stale, leaving both gardens untouched. On success the offered
/// leg, the requested leg, and the offer deletion commit atomically.
pub fn accept_trade(
    store: &GardenStore,
    guild_id: &str,
    offerer: &str,
    accepter: &str,
) -> Result<TradeReceipt, GardenError> {
    let Some(offer) = get_offer(store, guild_id, offerer)? else {
        return Err(GardenError::NotFound(format!("trade offer: {}", offerer)));
    };
    match &offer.target {
        TradeTarget::Anyone => {}
        TradeTarget::User(target) if target == accepter => {}
        TradeTarget::User(_) => {
            return Err(GardenError::InvalidTarget(format!(
                "offer from {} is not open to {}",
                offerer, accepter
            )));
        }
    }
    // The accepter needs a garden of their own to pay from and receive into.
    let accepter_stacks = store.list_stacks(guild_id, accepter)?;
    if !accepter_stacks.iter().any(|s| s.kind == ItemKind::House) {
        return Err(GardenError::NotFound(format!(
            "garden: {}:{}",
            guild_id, accepter
        )));
    }

    let offered_plan = plan_leg(store, guild_id, offerer, accepter, &offer.offered)?;
    let requested_plan = plan_leg(store, guild_id, accepter, offerer, &offer.requested)?;
    let (Some(offered_plan), Some(requested_plan)) = (offered_plan, requested_plan) else {
        store.delete_offer(guild_id, offerer)?;
        return Err(GardenError::StaleOffer);
    };

    match store.execute_trade(guild_id, offerer, accepter, &offered_plan, &requested_plan) {
        Ok(()) => {}
        Err(GardenError::StaleOffer) => {
            // A row moved between planning and commit; the offer is dead.
            store.delete_offer(guild_id, offerer)?;
            return Err(GardenError::StaleOffer);
        }
        Err(err) => return Err(err),
    }
    info!(
        "trade accepted in {}: {} gave {:?}, {} gave {:?}",
        escape_log(guild_id),
        escape_log(offerer),
        offer.offered,
        escape_log(accepter),
        offer.requested
    );
    Ok(TradeReceipt {
        offerer: offerer.to_string(),
        accepter: accepter.to_string(),
        received: offer.offered,
        delivered: offer.requested,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garden::storage::GardenStoreBuilder;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> GardenStore {
        GardenStoreBuilder::new(dir.path()).open().expect("store")
    }

    fn seed_units(store: &GardenStore, guild: &str, user: &str, kind: ItemKind, n: usize) {
        for _ in 0..n {
            store
                .insert_stacks(vec![ItemStack::draft(guild, user, kind, 0, 0, 1)])
                .expect("insert");
        }
    }

    // Seed bare gardens (house + empty balances, no random starter crop)
    // so the unit counts below are exact.
    fn seed_garden(store: &GardenStore, guild: &str, user: &str) {
        store
            .insert_stacks(vec![
                ItemStack::draft(guild, user, ItemKind::House, 3, 3, 1),
                ItemStack::draft(guild, user, ItemKind::Coins, 0, 0, 0),
                ItemStack::draft(guild, user, ItemKind::Water, 0, 0, 0),
            ])
            .expect("seed");
    }

    fn setup_two_gardens(store: &GardenStore) {
        seed_garden(store, "g1", "alice");
        seed_garden(store, "g1", "bob");
    }

    #[test]
    fn offer_all_is_resolved_at_commit_time() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Corn, 7);

        let draft = TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Corn)
            .amount(OfferAmount::All)
            .request(ItemKind::Coins)
            .amount(5);

        // Stock changes after "all" was chosen but before commit.
        seed_units(&store, "g1", "alice", ItemKind::Corn, 3);

        let offer = draft.commit(&store).expect("commit");
        assert_eq!(
            offer.offered,
            TradeGood::Item {
                kind: ItemKind::Corn,
                amount: 10
            },
            "late binding sees the stock at commit time"
        );
    }

    #[test]
    fn committing_overwrites_the_previous_offer() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Corn, 5);
        seed_units(&store, "g1", "alice", ItemKind::Peach, 2);

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Corn)
            .amount(OfferAmount::Exact(5))
            .request_nothing()
            .commit(&store)
            .expect("first");
        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::User("bob".into()))
            .offer(ItemKind::Peach)
            .amount(OfferAmount::Exact(2))
            .request(ItemKind::Coins)
            .amount(4)
            .commit(&store)
            .expect("second");

        let offer = get_offer(&store, "g1", "alice").expect("get").expect("open");
        assert_eq!(offer.target, TradeTarget::User("bob".into()));
        assert_eq!(
            offer.offered,
            TradeGood::Item {
                kind: ItemKind::Peach,
                amount: 2
            }
        );
    }

    #[test]
    fn stale_offers_purge_on_read() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Grapes, 3);

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Grapes)
            .amount(OfferAmount::Exact(3))
            .request_nothing()
            .commit(&store)
            .expect("commit");

        // Alice's stock drops below the offered amount.
        let stacks = store.list_stacks("g1", "alice").expect("list");
        let grape_id = stacks
            .iter()
            .find(|s| s.is_stored() && s.kind == ItemKind::Grapes)
            .expect("grape")
            .id;
        store.delete_stacks("g1", "alice", &[grape_id]).expect("drop");

        assert!(get_offer(&store, "g1", "alice").expect("get").is_none());
        assert!(
            store.get_offer_record("g1", "alice").expect("raw").is_none(),
            "purge deletes the record, not just the view"
        );
    }

    #[test]
    fn accept_moves_both_legs_and_deletes_the_offer() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Corn, 4);
        store
            .adjust_quantity("g1", "bob", ItemKind::Coins, 50)
            .expect("fund bob");

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::User("bob".into()))
            .offer(ItemKind::Corn)
            .amount(OfferAmount::Exact(3))
            .request(ItemKind::Coins)
            .amount(20)
            .commit(&store)
            .expect("commit");

        let receipt = accept_trade(&store, "g1", "alice", "bob").expect("accept");
        assert_eq!(
            receipt.received,
            TradeGood::Item {
                kind: ItemKind::Corn,
                amount: 3
            }
        );

        let alice = store.list_stacks("g1", "alice").expect("list");
        let bob = store.list_stacks("g1", "bob").expect("list");
        assert_eq!(stored_quantity(&alice, ItemKind::Corn), 1);
        assert_eq!(stored_quantity(&bob, ItemKind::Corn), 3);
        let alice_coins = alice
            .iter()
            .find(|s| s.kind == ItemKind::Coins)
            .expect("coins");
        let bob_coins = bob.iter().find(|s| s.kind == ItemKind::Coins).expect("coins");
        assert_eq!(alice_coins.quantity, 20);
        assert_eq!(bob_coins.quantity, 30);
        assert!(store.get_offer_record("g1", "alice").expect("raw").is_none());
    }

    #[test]
    fn transferred_units_keep_their_age() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Lemon, 2);
        let alice_ids: Vec<u64> = store
            .list_stacks("g1", "alice")
            .expect("list")
            .iter()
            .filter(|s| s.is_stored() && s.kind == ItemKind::Lemon)
            .map(|s| s.id)
            .collect();

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Lemon)
            .amount(OfferAmount::Exact(2))
            .request_nothing()
            .commit(&store)
            .expect("commit");
        accept_trade(&store, "g1", "alice", "bob").expect("accept");

        let bob = store.list_stacks("g1", "bob").expect("list");
        for id in alice_ids {
            assert!(
                bob.iter().any(|s| s.id == id && s.kind == ItemKind::Lemon),
                "row {} moved with its id intact",
                id
            );
        }
    }

    #[test]
    fn accept_by_the_wrong_user_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_garden(&store, "g1", "carol");
        seed_units(&store, "g1", "alice", ItemKind::Corn, 2);

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::User("bob".into()))
            .offer(ItemKind::Corn)
            .amount(OfferAmount::Exact(2))
            .request_nothing()
            .commit(&store)
            .expect("commit");

        let err = accept_trade(&store, "g1", "alice", "carol").expect_err("wrong target");
        assert!(matches!(err, GardenError::InvalidTarget(_)));
        assert!(
            store.get_offer_record("g1", "alice").expect("raw").is_some(),
            "a mistargeted accept does not purge the offer"
        );
    }

    #[test]
    fn accept_with_insufficient_stock_purges_and_changes_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Corn, 2);
        // Bob has no coins to pay with.

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Corn)
            .amount(OfferAmount::Exact(2))
            .request(ItemKind::Coins)
            .amount(20)
            .commit(&store)
            .expect("commit");

        let alice_before = store.list_stacks("g1", "alice").expect("list");
        let bob_before = store.list_stacks("g1", "bob").expect("list");

        let err = accept_trade(&store, "g1", "alice", "bob").expect_err("bob cannot pay");
        assert!(matches!(err, GardenError::StaleOffer));
        assert_eq!(alice_before, store.list_stacks("g1", "alice").expect("list"));
        assert_eq!(bob_before, store.list_stacks("g1", "bob").expect("list"));
        assert!(
            store.get_offer_record("g1", "alice").expect("raw").is_none(),
            "the unsatisfiable offer is purged"
        );
    }

    #[test]
    fn water_and_house_never_go_on_the_table() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);

        let err = TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Water)
            .amount(OfferAmount::Exact(5))
            .request_nothing()
            .commit(&store)
            .expect_err("water is not tradable");
        assert!(matches!(err, GardenError::InvalidTarget(_)));
        assert!(store.get_offer_record("g1", "alice").expect("raw").is_none());
    }

    #[test]
    fn one_way_gift_offers_work() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir);
        setup_two_gardens(&store);
        seed_units(&store, "g1", "alice", ItemKind::Cherries, 1);

        TradeDraft::for_player("g1", "alice")
            .target(TradeTarget::Anyone)
            .offer(ItemKind::Cherries)
            .amount(OfferAmount::Exact(1))
            .request_nothing()
            .commit(&store)
            .expect("commit");

        let receipt = accept_trade(&store, "g1", "alice", "bob").expect("accept");
        assert_eq!(receipt.delivered, TradeGood::Nothing);
        let bob = store.list_stacks("g1", "bob").expect("list");
        assert_eq!(stored_quantity(&bob, ItemKind::Cherries), 1);
    }
}
