use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::debug;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{IVec, Transactional};

use crate::garden::errors::GardenError;
use crate::garden::types::{
    GiftGrant, ItemKind, ItemStack, TradeOffer, GIFT_SCHEMA_VERSION, OFFER_SCHEMA_VERSION,
    STACK_SCHEMA_VERSION,
};

const TREE_STACKS: &str = "garden_stacks";
const TREE_TRADES: &str = "garden_trades";
const TREE_GIFTS: &str = "garden_gifts";
const TREE_META: &str = "garden_meta";

const TALLY_KEY: &[u8] = b"tallies";

fn next_timestamp_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000)
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct GardenStoreBuilder {
    path: PathBuf,
}

impl GardenStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<GardenStore, GardenError> {
        GardenStore::open(self.path)
    }
}

/// Sled-backed persistence for garden inventory, trade offers, and gift
/// grants.
///
/// Every balance change is a conditional compare-and-swap (a decrement that
/// would go negative fails with [`GardenError::InsufficientFunds`] instead
/// of applying), and every multi-row invariant — a purchase, a sale, both
/// legs of a trade, a gift award — runs inside a single sled transaction.
pub struct GardenStore {
    _db: sled::Db,
    stacks: sled::Tree,
    trades: sled::Tree,
    gifts: sled::Tree,
    meta: sled::Tree,
    last_id: AtomicU64,
}

/// How one leg of a committed trade moves between two inventories.
#[derive(Debug, Clone)]
pub enum TransferPlan {
    /// Nothing moves on this leg.
    Nothing,
    /// Adjust the two summed coin rows by `amount`.
    Coins {
        payer_row: u64,
        payee_row: u64,
        amount: i64,
    },
    /// Reassign ownership of these unit rows, oldest first. Row ids (and
    /// with them creation times) survive the move so FIFO age is preserved.
    Units { kind: ItemKind, ids: Vec<u64> },
}

impl GardenStore {
    /// Open (or create) the garden store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GardenError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let stacks = db.open_tree(TREE_STACKS)?;
        let trades = db.open_tree(TREE_TRADES)?;
        let gifts = db.open_tree(TREE_GIFTS)?;
        let meta = db.open_tree(TREE_META)?;
        Ok(Self {
            _db: db,
            stacks,
            trades,
            gifts,
            meta,
            last_id: AtomicU64::new(0),
        })
    }

    fn garden_prefix(guild_id: &str, user_id: &str) -> Vec<u8> {
        format!("{}:{}:", guild_id, user_id).into_bytes()
    }

    fn stack_key(guild_id: &str, user_id: &str, id: u64) -> Vec<u8> {
        format!("{}:{}:{:020}", guild_id, user_id, id).into_bytes()
    }

    fn trade_key(guild_id: &str, user_id: &str) -> Vec<u8> {
        format!("{}:{}", guild_id, user_id).into_bytes()
    }

    fn gift_key(guild_id: &str, user_id: &str, id: u64) -> Vec<u8> {
        format!("{}:{}:{:020}", guild_id, user_id, id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GardenError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode_stack(bytes: &IVec) -> Result<ItemStack, GardenError> {
        let record: ItemStack = bincode::deserialize(bytes)?;
        if record.schema_version != STACK_SCHEMA_VERSION {
            return Err(GardenError::SchemaMismatch {
                entity: "stack",
                expected: STACK_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn decode_offer(bytes: &IVec) -> Result<TradeOffer, GardenError> {
        let record: TradeOffer = bincode::deserialize(bytes)?;
        if record.schema_version != OFFER_SCHEMA_VERSION {
            return Err(GardenError::SchemaMismatch {
                entity: "trade_offer",
                expected: OFFER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn decode_gift(bytes: &IVec) -> Result<GiftGrant, GardenError> {
        let record: GiftGrant = bincode::deserialize(bytes)?;
        if record.schema_version != GIFT_SCHEMA_VERSION {
            return Err(GardenError::SchemaMismatch {
                entity: "gift_grant",
                expected: GIFT_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Ids are creation-time nanoseconds, bumped when two calls land in the
    /// same nanosecond so ordering by id is ordering by creation time.
    fn next_stack_id(&self) -> u64 {
        let nanos = next_timestamp_nanos() as u64;
        let mut prev = self.last_id.load(Ordering::Relaxed);
        loop {
            let candidate = nanos.max(prev + 1);
            match self.last_id.compare_exchange(
                prev,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Stamp a drafted stack with a fresh id and timestamps, without
    /// writing it. Used to pre-build rows for transactional inserts.
    pub fn new_stack(
        &self,
        guild_id: &str,
        user_id: &str,
        kind: ItemKind,
        x: u8,
        y: u8,
        quantity: i64,
    ) -> ItemStack {
        let mut stack = ItemStack::draft(guild_id, user_id, kind, x, y, quantity);
        stack.id = self.next_stack_id();
        stack
    }

    fn unwrap_txn<T>(res: Result<T, TransactionError<GardenError>>) -> Result<T, GardenError> {
        res.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => GardenError::Sled(err),
        })
    }

    fn abort<T>(err: GardenError) -> Result<T, ConflictableTransactionError<GardenError>> {
        Err(ConflictableTransactionError::Abort(err))
    }

    // ========================================================================
    // Stacks
    // ========================================================================

    /// Every stack for one (guild, user), oldest first.
    pub fn list_stacks(&self, guild_id: &str, user_id: &str) -> Result<Vec<ItemStack>, GardenError> {
        let mut out = Vec::new();
        for entry in self.stacks.scan_prefix(Self::garden_prefix(guild_id, user_id)) {
            let (_key, bytes) = entry?;
            out.push(Self::decode_stack(&bytes)?);
        }
        Ok(out)
    }

    /// Fetch one stack row.
    pub fn get_stack(&self, guild_id: &str, user_id: &str, id: u64) -> Result<ItemStack, GardenError> {
        let key = Self::stack_key(guild_id, user_id, id);
        let Some(bytes) = self.stacks.get(&key)? else {
            return Err(GardenError::NotFound(format!("stack: {}", id)));
        };
        Self::decode_stack(&bytes)
    }

    /// Insert drafted stacks, assigning fresh ids to any with `id == 0`.
    /// Returns the rows as written.
    pub fn insert_stacks(&self, drafts: Vec<ItemStack>) -> Result<Vec<ItemStack>, GardenError> {
        let mut written = Vec::with_capacity(drafts.len());
        for mut stack in drafts {
            if stack.id == 0 {
                stack.id = self.next_stack_id();
            }
            stack.schema_version = STACK_SCHEMA_VERSION;
            let key = Self::stack_key(&stack.guild_id, &stack.user_id, stack.id);
            let bytes = Self::serialize(&stack)?;
            self.stacks.insert(key, bytes)?;
            written.push(stack);
        }
        self.stacks.flush()?;
        Ok(written)
    }

    /// Overwrite an existing row as given. Callers are responsible for
    /// calling [`ItemStack::touch`] when the change should refresh
    /// `updated_at` (the growth engine relies on controlling this).
    pub fn put_stack(&self, stack: &ItemStack) -> Result<(), GardenError> {
        let key = Self::stack_key(&stack.guild_id, &stack.user_id, stack.id);
        let bytes = Self::serialize(stack)?;
        self.stacks.insert(key, bytes)?;
        self.stacks.flush()?;
        Ok(())
    }

    /// Delete the named rows. Missing ids are ignored.
    pub fn delete_stacks(&self, guild_id: &str, user_id: &str, ids: &[u64]) -> Result<(), GardenError> {
        for id in ids {
            self.stacks.remove(Self::stack_key(guild_id, user_id, *id))?;
        }
        self.stacks.flush()?;
        Ok(())
    }

    /// Set the watered flag on the named rows, touching `updated_at`.
    pub fn set_watered(
        &self,
        guild_id: &str,
        user_id: &str,
        ids: &[u64],
        watered: bool,
    ) -> Result<(), GardenError> {
        for id in ids {
            let mut stack = self.get_stack(guild_id, user_id, *id)?;
            stack.watered = watered;
            stack.touch();
            self.put_stack(&stack)?;
        }
        Ok(())
    }

    /// The unique summed balance row for `kind` at (0, 0), with its raw bytes
    /// so callers can compare-and-swap against it.
    fn find_balance_row(
        &self,
        guild_id: &str,
        user_id: &str,
        kind: ItemKind,
    ) -> Result<(Vec<u8>, ItemStack, IVec), GardenError> {
        for entry in self.stacks.scan_prefix(Self::garden_prefix(guild_id, user_id)) {
            let (key, bytes) = entry?;
            let stack = Self::decode_stack(&bytes)?;
            if stack.is_stored() && stack.kind == kind {
                return Ok((key.to_vec(), stack, bytes));
            }
        }
        Err(GardenError::NotFound(format!(
            "{} balance for {}:{}",
            kind, guild_id, user_id
        )))
    }

    /// Atomically adjust a summed balance row (coins or water) by `delta`.
    /// A decrement that would take the balance negative fails with
    /// `InsufficientFunds` and changes nothing. Returns the new balance.
    pub fn adjust_quantity(
        &self,
        guild_id: &str,
        user_id: &str,
        kind: ItemKind,
        delta: i64,
    ) -> Result<i64, GardenError> {
        loop {
            let (key, stack, raw) = self.find_balance_row(guild_id, user_id, kind)?;
            let next = stack.quantity + delta;
            if next < 0 {
                return Err(GardenError::InsufficientFunds);
            }
            let mut updated = stack;
            updated.quantity = next;
            updated.touch();
            let bytes = Self::serialize(&updated)?;
            match self.stacks.compare_and_swap(&key, Some(&raw), Some(bytes))? {
                Ok(()) => {
                    self.stacks.flush()?;
                    return Ok(next);
                }
                Err(_) => continue,
            }
        }
    }

    /// Credit the water bank, clamping the balance to `cap`. Returns the
    /// amount actually banked (zero when the bank was already full).
    pub fn add_water_capped(
        &self,
        guild_id: &str,
        user_id: &str,
        amount: i64,
        cap: i64,
    ) -> Result<i64, GardenError> {
        loop {
            let (key, stack, raw) = self.find_balance_row(guild_id, user_id, ItemKind::Water)?;
            let next = (stack.quantity + amount).min(cap);
            let banked = next - stack.quantity;
            if banked <= 0 {
                return Ok(0);
            }
            let mut updated = stack;
            updated.quantity = next;
            updated.touch();
            let bytes = Self::serialize(&updated)?;
            match self.stacks.compare_and_swap(&key, Some(&raw), Some(bytes))? {
                Ok(()) => {
                    self.stacks.flush()?;
                    return Ok(banked);
                }
                Err(_) => continue,
            }
        }
    }

    /// Every (guild, user) pair owning a seeded garden, i.e. holding a
    /// house row. Used by the growth engine to walk gardens one at a time.
    pub fn garden_owners(&self) -> Result<Vec<(String, String)>, GardenError> {
        let mut owners = BTreeSet::new();
        for entry in self.stacks.iter() {
            let (_key, bytes) = entry?;
            let stack = Self::decode_stack(&bytes)?;
            if stack.kind == ItemKind::House {
                owners.insert((stack.guild_id, stack.user_id));
            }
        }
        Ok(owners.into_iter().collect())
    }

    // ========================================================================
    // Transactional exchanges
    // ========================================================================

    /// Insert and delete unit rows and optionally adjust the coin balance,
    /// all-or-nothing. `coins` names the balance row and the signed delta;
    /// a decrement past zero aborts with `InsufficientFunds`. Deleting a
    /// row that has vanished since the caller read it aborts with
    /// `StaleOffer`.
    pub fn exchange_units(
        &self,
        guild_id: &str,
        user_id: &str,
        inserts: &[ItemStack],
        delete_ids: &[u64],
        coins: Option<(u64, i64)>,
    ) -> Result<Option<i64>, GardenError> {
        let mut prepared = Vec::with_capacity(inserts.len());
        for stack in inserts {
            let key = Self::stack_key(&stack.guild_id, &stack.user_id, stack.id);
            prepared.push((key, Self::serialize(stack)?));
        }
        let res = self.stacks.transaction(|tx| {
            for (key, bytes) in &prepared {
                tx.insert(key.clone(), bytes.clone())?;
            }
            for id in delete_ids {
                let key = Self::stack_key(guild_id, user_id, *id);
                if tx.get(&key)?.is_none() {
                    return Self::abort(GardenError::StaleOffer);
                }
                tx.remove(key)?;
            }
            let mut balance = None;
            if let Some((row_id, delta)) = coins {
                let key = Self::stack_key(guild_id, user_id, row_id);
                let Some(bytes) = tx.get(&key)? else {
                    return Self::abort(GardenError::NotFound(format!("stack: {}", row_id)));
                };
                let mut row = match Self::decode_stack(&bytes) {
                    Ok(row) => row,
                    Err(err) => return Self::abort(err),
                };
                row.quantity += delta;
                if row.quantity < 0 {
                    return Self::abort(GardenError::InsufficientFunds);
                }
                row.touch();
                let updated = match Self::serialize(&row) {
                    Ok(bytes) => bytes,
                    Err(err) => return Self::abort(err),
                };
                tx.insert(key, updated)?;
                balance = Some(row.quantity);
            }
            Ok(balance)
        });
        let balance = Self::unwrap_txn(res)?;
        self.stacks.flush()?;
        Ok(balance)
    }

    fn transfer_leg(
        tx: &TransactionalTree,
        guild_id: &str,
        payer: &str,
        payee: &str,
        plan: &TransferPlan,
    ) -> Result<(), ConflictableTransactionError<GardenError>> {
        match plan {
            TransferPlan::Nothing => Ok(()),
            TransferPlan::Coins {
                payer_row,
                payee_row,
                amount,
            } => {
                for (owner, row_id, delta) in
                    [(payer, *payer_row, -*amount), (payee, *payee_row, *amount)]
                {
                    let key = Self::stack_key(guild_id, owner, row_id);
                    let Some(bytes) = tx.get(&key)? else {
                        return Self::abort(GardenError::StaleOffer);
                    };
                    let mut row = match Self::decode_stack(&bytes) {
                        Ok(row) => row,
                        Err(err) => return Self::abort(err),
                    };
                    row.quantity += delta;
                    if row.quantity < 0 {
                        return Self::abort(GardenError::StaleOffer);
                    }
                    row.touch();
                    let updated = match Self::serialize(&row) {
                        Ok(bytes) => bytes,
                        Err(err) => return Self::abort(err),
                    };
                    tx.insert(key, updated)?;
                }
                Ok(())
            }
            TransferPlan::Units { kind, ids } => {
                for id in ids {
                    let old_key = Self::stack_key(guild_id, payer, *id);
                    let Some(bytes) = tx.get(&old_key)? else {
                        return Self::abort(GardenError::StaleOffer);
                    };
                    let mut row = match Self::decode_stack(&bytes) {
                        Ok(row) => row,
                        Err(err) => return Self::abort(err),
                    };
                    if !row.is_stored() || row.kind != *kind {
                        return Self::abort(GardenError::StaleOffer);
                    }
                    row.user_id = payee.to_string();
                    row.touch();
                    let updated = match Self::serialize(&row) {
                        Ok(bytes) => bytes,
                        Err(err) => return Self::abort(err),
                    };
                    tx.remove(old_key)?;
                    tx.insert(Self::stack_key(guild_id, payee, *id), updated)?;
                }
                Ok(())
            }
        }
    }

    /// Execute both legs of an accepted trade and delete the offer record,
    /// as one transaction. The offered leg moves offerer → accepter, the
    /// requested leg accepter → offerer. Any row that changed since the
    /// legs were planned aborts the whole exchange with `StaleOffer`.
    pub fn execute_trade(
        &self,
        guild_id: &str,
        offerer: &str,
        accepter: &str,
        offered: &TransferPlan,
        requested: &TransferPlan,
    ) -> Result<(), GardenError> {
        let res = (&self.stacks, &self.trades).transaction(|(stacks_tx, trades_tx)| {
            Self::transfer_leg(stacks_tx, guild_id, offerer, accepter, offered)?;
            Self::transfer_leg(stacks_tx, guild_id, accepter, offerer, requested)?;
            trades_tx.remove(Self::trade_key(guild_id, offerer))?;
            Ok(())
        });
        Self::unwrap_txn(res)?;
        self.stacks.flush()?;
        self.trades.flush()?;
        debug!("trade executed: {} -> {} in guild {}", offerer, accepter, guild_id);
        Ok(())
    }

    // ========================================================================
    // Trade offers
    // ========================================================================

    /// Raw offer lookup; no staleness checks (see `trade::get_offer`).
    pub fn get_offer_record(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<TradeOffer>, GardenError> {
        let Some(bytes) = self.trades.get(Self::trade_key(guild_id, user_id))? else {
            return Ok(None);
        };
        Ok(Some(Self::decode_offer(&bytes)?))
    }

    /// Insert or overwrite the offer for its (guild, user) key.
    pub fn upsert_offer(&self, mut offer: TradeOffer) -> Result<(), GardenError> {
        offer.schema_version = OFFER_SCHEMA_VERSION;
        let key = Self::trade_key(&offer.guild_id, &offer.user_id);
        let bytes = Self::serialize(&offer)?;
        self.trades.insert(key, bytes)?;
        self.trades.flush()?;
        Ok(())
    }

    pub fn delete_offer(&self, guild_id: &str, user_id: &str) -> Result<(), GardenError> {
        self.trades.remove(Self::trade_key(guild_id, user_id))?;
        self.trades.flush()?;
        Ok(())
    }

    // ========================================================================
    // Gift grants
    // ========================================================================

    /// Record an achievement grant that can later be opened as a gift.
    pub fn insert_gift(&self, mut grant: GiftGrant) -> Result<GiftGrant, GardenError> {
        if grant.id == 0 {
            grant.id = self.next_stack_id();
        }
        grant.schema_version = GIFT_SCHEMA_VERSION;
        let key = Self::gift_key(&grant.guild_id, &grant.user_id, grant.id);
        let bytes = Self::serialize(&grant)?;
        self.gifts.insert(key, bytes)?;
        self.gifts.flush()?;
        Ok(grant)
    }

    /// Unopened grants for the given achievement ids, oldest first.
    pub fn unopened_gifts(
        &self,
        guild_id: &str,
        user_id: &str,
        grant_ids: &[u32],
    ) -> Result<Vec<GiftGrant>, GardenError> {
        let mut out = Vec::new();
        for entry in self.gifts.scan_prefix(Self::garden_prefix(guild_id, user_id)) {
            let (_key, bytes) = entry?;
            let grant = Self::decode_gift(&bytes)?;
            if !grant.opened && grant_ids.contains(&grant.achievement_id) {
                out.push(grant);
            }
        }
        Ok(out)
    }

    /// Award the crop rows for an opened gift and mark its grants opened,
    /// all-or-nothing. A grant already opened by a concurrent call aborts
    /// the transaction, so a gift can never pay out twice.
    pub fn award_gifts(
        &self,
        guild_id: &str,
        user_id: &str,
        grant_row_ids: &[u64],
        inserts: &[ItemStack],
    ) -> Result<(), GardenError> {
        let mut prepared = Vec::with_capacity(inserts.len());
        for stack in inserts {
            let key = Self::stack_key(&stack.guild_id, &stack.user_id, stack.id);
            prepared.push((key, Self::serialize(stack)?));
        }
        let res = (&self.stacks, &self.gifts).transaction(|(stacks_tx, gifts_tx)| {
            for row_id in grant_row_ids {
                let key = Self::gift_key(guild_id, user_id, *row_id);
                let Some(bytes) = gifts_tx.get(&key)? else {
                    return Self::abort(GardenError::NotFound(format!("gift grant: {}", row_id)));
                };
                let mut grant = match Self::decode_gift(&bytes) {
                    Ok(grant) => grant,
                    Err(err) => return Self::abort(err),
                };
                if grant.opened {
                    return Self::abort(GardenError::NotFound(format!(
                        "gift grant already opened: {}",
                        row_id
                    )));
                }
                grant.opened = true;
                let updated = match Self::serialize(&grant) {
                    Ok(bytes) => bytes,
                    Err(err) => return Self::abort(err),
                };
                gifts_tx.insert(key, updated)?;
            }
            for (key, bytes) in &prepared {
                stacks_tx.insert(key.clone(), bytes.clone())?;
            }
            Ok(())
        });
        Self::unwrap_txn(res)?;
        self.stacks.flush()?;
        self.gifts.flush()?;
        Ok(())
    }

    // ========================================================================
    // Character tallies
    // ========================================================================

    /// Persisted character counters, keyed by (guild, user).
    pub fn load_tally(
        &self,
    ) -> Result<std::collections::HashMap<(String, String), u64>, GardenError> {
        let Some(bytes) = self.meta.get(TALLY_KEY)? else {
            return Ok(Default::default());
        };
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn save_tally(
        &self,
        counts: &std::collections::HashMap<(String, String), u64>,
    ) -> Result<(), GardenError> {
        let bytes = Self::serialize(counts)?;
        self.meta.insert(TALLY_KEY, bytes)?;
        self.meta.flush()?;
        Ok(())
    }
}
