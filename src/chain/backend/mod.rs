// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::disk::DB;
use crate::consensus::Money;
use crate::primitives::{
    Address, Block, BlockVerifyErr, Hash256, Receipt, Word, ADDRESS_BYTES, WORD_BYTES,
};
use bincode::error::{DecodeError as BincodeDecodeErr, EncodeError as BincodeEncodeErr};
use bincode::{Decode, Encode};
use rocksdb::Error as RocksDBErr;
use rocksdb::{ColumnFamilyDescriptor, LogLevel, Options, TransactionDBOptions};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use triomphe::Arc;

const VERSION_BYTES: usize = 8;

/// Versioned key/value store holding account state, contract storage, blocks
/// and receipts.
///
/// Every account and storage write is kept as a new version tagged with the
/// height of the block that made it, so reads at any committed height see
/// the state as it was right after that block.
pub trait StateBackend: Sized + Clone + Send + Sync {
    /// Height of the last committed block. `None` before genesis
    fn height(&self) -> Result<Option<u64>, StateBackendErr>;

    /// Returns the account as of `height`
    fn get_account(
        &self,
        address: &Address,
        height: u64,
    ) -> Result<Option<Account>, StateBackendErr>;

    /// Returns the storage slot as of `height`. Missing slots read as zero
    fn get_slot(
        &self,
        address: &Address,
        slot: &Hash256,
        height: u64,
    ) -> Result<Word, StateBackendErr>;

    /// Returns up to `max_results` non-zero slots of `address` as of `height`,
    /// in slot order, starting at `start`
    fn storage_range(
        &self,
        address: &Address,
        height: u64,
        start: &Hash256,
        max_results: usize,
    ) -> Result<StorageRange, StateBackendErr>;

    /// Returns up to `max_results` non-empty accounts as of `height`, in
    /// address order, starting at `start`
    fn account_range(
        &self,
        height: u64,
        start: &Address,
        max_results: usize,
    ) -> Result<AccountRange, StateBackendErr>;

    fn get_block(&self, height: u64) -> Result<Option<Block>, StateBackendErr>;

    fn get_block_height_by_hash(&self, hash: &Hash256) -> Result<Option<u64>, StateBackendErr>;

    fn get_receipts(&self, height: u64) -> Result<Option<Vec<Receipt>>, StateBackendErr>;

    fn get_changeset(&self, height: u64) -> Result<Option<ChangeSet>, StateBackendErr>;

    /// Commits a block with its receipts and state changes atomically.
    ///
    /// Assumes validations have passed. The block must extend the tip.
    fn write_block(
        &self,
        block: &Block,
        receipts: &[Receipt],
        changeset: &ChangeSet,
    ) -> Result<(), StateBackendErr>;

    /// Returns the last committed block
    fn tip(&self) -> Result<Option<Block>, StateBackendErr> {
        match self.height()? {
            None => Ok(None),
            Some(h) => self
                .get_block(h)?
                .map(Some)
                .ok_or(StateBackendErr::CorruptData),
        }
    }

    fn get_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StateBackendErr> {
        match self.get_block_height_by_hash(hash)? {
            None => Ok(None),
            Some(h) => self.get_block(h),
        }
    }

    /// Accounts whose state was changed by the block at `height`
    fn get_modified_accounts(&self, height: u64) -> Result<Option<Vec<Address>>, StateBackendErr> {
        Ok(self
            .get_changeset(height)?
            .map(|changeset| changeset.modified_accounts()))
    }

    /// Checks that `block` can be written on top of the current tip
    fn check_next_height(&self, block: &Block) -> Result<(), StateBackendErr> {
        let expected = self.height()?.map_or(0, |h| h + 1);

        if block.height() != expected {
            return Err(StateBackendErr::InvalidHeight);
        }

        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: Money,
}

/// State written by a single block. Ordered so that its encoding, and
/// therefore the state root, is the same on every node.
#[derive(PartialEq, Eq, Debug, Clone, Default, Encode, Decode)]
pub struct ChangeSet {
    pub accounts: BTreeMap<Address, Account>,
    pub storage: BTreeMap<(Address, Hash256), Word>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty()
    }

    #[must_use]
    pub fn modified_accounts(&self) -> Vec<Address> {
        let mut out: BTreeSet<Address> = self.accounts.keys().copied().collect();
        out.extend(self.storage.keys().map(|(address, _)| *address));
        out.into_iter().collect()
    }

    /// `H(prev_root || encode(changeset))`
    pub fn state_root(&self, prev_root: &Hash256) -> Result<Hash256, BincodeEncodeErr> {
        let encoded = crate::codec::encode_to_vec(self)?;
        let buf = [prev_root.as_bytes(), encoded.as_slice()].concat();
        Ok(Hash256::hash_from_slice(buf, "state"))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageRange {
    pub storage: Vec<(Hash256, Word)>,

    /// First slot after the returned range, if there are more
    pub next_key: Option<Hash256>,
}

#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRange {
    pub accounts: Vec<(Address, Account)>,

    /// First address after the returned range, if there are more
    pub next_key: Option<Address>,
}

/// Heights are stored inverted so that a forward seek from
/// `prefix || version(h)` lands on the newest version at or below `h`.
#[inline]
#[must_use]
pub fn version(height: u64) -> [u8; VERSION_BYTES] {
    (u64::MAX - height).to_be_bytes()
}

#[must_use]
pub fn account_key(address: &Address) -> Vec<u8> {
    address.as_bytes().to_vec()
}

#[must_use]
pub fn slot_key(address: &Address, slot: &Hash256) -> Vec<u8> {
    [address.as_bytes(), slot.as_bytes()].concat()
}

#[must_use]
pub fn versioned_key(prefix: &[u8], height: u64) -> Vec<u8> {
    [prefix, &version(height)].concat()
}

#[must_use]
pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

pub const TIP_KEY: &[u8] = b"tip";

/// Given the entries at and after `versioned_key(prefix, h)` in key order,
/// returns the value of the newest version of `prefix` at or below `h`.
pub fn latest_version<I>(prefix: &[u8], mut iter: I) -> Result<Option<Vec<u8>>, StateBackendErr>
where
    I: Iterator<Item = Result<(Vec<u8>, Vec<u8>), StateBackendErr>>,
{
    match iter.next() {
        Some(Ok((k, v))) if k.len() == prefix.len() + VERSION_BYTES && k.starts_with(prefix) => {
            Ok(Some(v))
        }
        Some(Err(err)) => Err(err),
        _ => Ok(None),
    }
}

/// Collects a storage range out of the storage entries of `address` starting
/// at `start`, in key order.
pub fn collect_storage_range<I>(
    address: &Address,
    height: u64,
    max_results: usize,
    iter: I,
) -> Result<StorageRange, StateBackendErr>
where
    I: Iterator<Item = Result<(Vec<u8>, Vec<u8>), StateBackendErr>>,
{
    let at = version(height);
    let mut out = StorageRange::default();
    let mut last_slot: Option<Hash256> = None;

    for entry in iter {
        let (k, v) = entry?;

        if !k.starts_with(address.as_bytes()) {
            break;
        }

        if k.len() != ADDRESS_BYTES + WORD_BYTES + VERSION_BYTES {
            return Err(StateBackendErr::CorruptData);
        }

        let mut slot = Hash256::zero();
        slot.0.copy_from_slice(&k[ADDRESS_BYTES..ADDRESS_BYTES + WORD_BYTES]);

        // Already resolved this slot, skip older versions
        if last_slot == Some(slot) {
            continue;
        }

        // Version newer than `height`
        if k[ADDRESS_BYTES + WORD_BYTES..] < at[..] {
            continue;
        }

        last_slot = Some(slot);
        let value = decode_word(&v)?;

        if value.is_zero() {
            continue;
        }

        if out.storage.len() == max_results {
            out.next_key = Some(slot);
            break;
        }

        out.storage.push((slot, value));
    }

    Ok(out)
}

/// Collects an account range out of the account entries starting at `start`,
/// in key order.
pub fn collect_account_range<I>(
    height: u64,
    max_results: usize,
    iter: I,
) -> Result<AccountRange, StateBackendErr>
where
    I: Iterator<Item = Result<(Vec<u8>, Vec<u8>), StateBackendErr>>,
{
    let at = version(height);
    let mut out = AccountRange::default();
    let mut last_address: Option<Address> = None;

    for entry in iter {
        let (k, v) = entry?;

        if k.len() != ADDRESS_BYTES + VERSION_BYTES {
            return Err(StateBackendErr::CorruptData);
        }

        let mut address = Address::zero();
        address.0.copy_from_slice(&k[..ADDRESS_BYTES]);

        if last_address == Some(address) {
            continue;
        }

        if k[ADDRESS_BYTES..] < at[..] {
            continue;
        }

        last_address = Some(address);
        let account: Account = crate::codec::decode(&v)?;

        if account == Account::default() {
            continue;
        }

        if out.accounts.len() == max_results {
            out.next_key = Some(address);
            break;
        }

        out.accounts.push((address, account));
    }

    Ok(out)
}

pub fn decode_word(bytes: &[u8]) -> Result<Word, StateBackendErr> {
    if bytes.len() != WORD_BYTES {
        return Err(StateBackendErr::CorruptData);
    }

    let mut out = Word::zero();
    out.0.copy_from_slice(bytes);
    Ok(out)
}

pub fn decode_height(bytes: &[u8]) -> Result<u64, StateBackendErr> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| StateBackendErr::CorruptData)?;
    Ok(u64::from_be_bytes(bytes))
}

/// Versioned account and storage entries of a changeset committed at `height`
pub fn versioned_entries(
    changeset: &ChangeSet,
    height: u64,
) -> Result<(Vec<(Vec<u8>, Vec<u8>)>, Vec<(Vec<u8>, Vec<u8>)>), StateBackendErr> {
    let mut accounts = Vec::with_capacity(changeset.accounts.len());
    let mut storage = Vec::with_capacity(changeset.storage.len());

    for (address, account) in &changeset.accounts {
        accounts.push((
            versioned_key(&account_key(address), height),
            crate::codec::encode_to_vec(account)?,
        ));
    }

    for ((address, slot), value) in &changeset.storage {
        storage.push((
            versioned_key(&slot_key(address, slot), height),
            value.0.to_vec(),
        ));
    }

    Ok((accounts, storage))
}

#[derive(Debug)]
pub enum StateBackendErr {
    /// Backend data is corrupted
    CorruptData,

    /// Given height is invalid
    InvalidHeight,

    /// Block verify error
    Block(BlockVerifyErr),

    /// Rocksdb error
    RocksDB(RocksDBErr),

    /// Bincode encode error
    BincodeEncode(BincodeEncodeErr),

    /// Bincode decode error
    BincodeDecode(BincodeDecodeErr),

    /// Generic error
    Error(&'static str),
}

impl From<BlockVerifyErr> for StateBackendErr {
    fn from(other: BlockVerifyErr) -> Self {
        Self::Block(other)
    }
}

impl From<RocksDBErr> for StateBackendErr {
    fn from(other: RocksDBErr) -> Self {
        Self::RocksDB(other)
    }
}

impl From<BincodeEncodeErr> for StateBackendErr {
    fn from(other: BincodeEncodeErr) -> Self {
        Self::BincodeEncode(other)
    }
}

impl From<BincodeDecodeErr> for StateBackendErr {
    fn from(other: BincodeDecodeErr) -> Self {
        Self::BincodeDecode(other)
    }
}

pub fn create_rocksdb_backend() -> Result<Arc<DB>, StateBackendErr> {
    #[cfg(not(test))]
    let mut path = PathBuf::from_str(&crate::settings::SETTINGS.node.data_dir)
        .map_err(|_| StateBackendErr::Error("invalid data dir"))?;

    #[cfg(test)]
    let mut path = {
        use rand::Rng;
        let mut path = std::env::temp_dir();
        path.push(hex::encode(rand::thread_rng().gen::<[u8; 32]>()));
        path.push("StaminaNode");
        path
    };

    path.push(&crate::settings::SETTINGS.network.network_name);
    path.push("data");
    open_rocksdb(path)
}

/// Opens or creates the database at `path` with all column families
pub fn open_rocksdb(path: PathBuf) -> Result<Arc<DB>, StateBackendErr> {
    let mut cf_opts = Options::default();
    cf_opts.set_max_write_buffer_number(3);
    let cfs = crate::chain::backend::disk::COLUMN_FAMILIES
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, cf_opts.clone()))
        .collect::<Vec<_>>();

    let mut db_opts = Options::default();
    db_opts.create_missing_column_families(true);
    db_opts.create_if_missing(true);
    db_opts.set_log_level(LogLevel::Warn);
    db_opts.set_keep_log_file_num(1);
    let db = DB::open_cf_descriptors(&db_opts, &TransactionDBOptions::default(), path, cfs)?;
    Ok(Arc::new(db))
}

pub mod disk;
pub mod memory;
pub mod memory_store;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(items: Vec<(Vec<u8>, Word)>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut items: Vec<_> = items.into_iter().map(|(k, v)| (k, v.0.to_vec())).collect();
        items.sort();
        items
    }

    #[test]
    fn versions_sort_newest_first() {
        let prefix = account_key(&Address::zero());
        assert!(versioned_key(&prefix, 10) < versioned_key(&prefix, 9));
        assert!(versioned_key(&prefix, 1) < versioned_key(&prefix, 0));
    }

    #[test]
    fn latest_version_stops_at_prefix() {
        let a = account_key(&Address::zero());
        let mut other = Address::zero();
        other.0[19] = 1;
        let b = account_key(&other);
        let items = vec![(versioned_key(&b, 3), vec![1])];
        assert_eq!(
            latest_version(&a, items.clone().into_iter().map(Ok)).unwrap(),
            None
        );
        assert_eq!(
            latest_version(&b, items.into_iter().map(Ok)).unwrap(),
            Some(vec![1])
        );
    }

    #[test]
    fn storage_range_picks_version_at_height() {
        let address = Address::zero();
        let s1 = Hash256::from_u64(1);
        let s2 = Hash256::from_u64(2);
        let s3 = Hash256::from_u64(3);
        let items = entries(vec![
            (versioned_key(&slot_key(&address, &s1), 1), Word::from_u64(10)),
            (versioned_key(&slot_key(&address, &s1), 5), Word::from_u64(50)),
            (versioned_key(&slot_key(&address, &s2), 2), Word::from_u64(20)),
            (versioned_key(&slot_key(&address, &s2), 4), Word::zero()),
            (versioned_key(&slot_key(&address, &s3), 6), Word::from_u64(60)),
        ]);

        let at_3 = collect_storage_range(&address, 3, 10, items.clone().into_iter().map(Ok)).unwrap();
        assert_eq!(
            at_3.storage,
            vec![(s1, Word::from_u64(10)), (s2, Word::from_u64(20))]
        );

        let at_6 = collect_storage_range(&address, 6, 1, items.into_iter().map(Ok)).unwrap();
        assert_eq!(at_6.storage, vec![(s1, Word::from_u64(50))]);
        assert_eq!(at_6.next_key, Some(s3));
    }

    #[test]
    fn account_range_skips_newer_and_empty_accounts() {
        let address = |i: u8| {
            let mut out = Address::zero();
            out.0[19] = i;
            out
        };
        let account = |nonce, balance| Account { nonce, balance };
        let encoded = |a: Account| crate::codec::encode_to_vec(&a).unwrap();
        let mut items = vec![
            (versioned_key(&account_key(&address(1)), 0), encoded(account(0, 10))),
            (versioned_key(&account_key(&address(1)), 4), encoded(account(1, 5))),
            (versioned_key(&account_key(&address(2)), 3), encoded(account(0, 7))),
            (versioned_key(&account_key(&address(2)), 5), encoded(Account::default())),
            (versioned_key(&account_key(&address(3)), 6), encoded(account(2, 1))),
            (versioned_key(&account_key(&address(4)), 1), encoded(account(0, 4))),
        ];
        items.sort();

        let at_3 = collect_account_range(3, 10, items.clone().into_iter().map(Ok)).unwrap();
        assert_eq!(
            at_3.accounts,
            vec![
                (address(1), account(0, 10)),
                (address(2), account(0, 7)),
                (address(4), account(0, 4)),
            ]
        );
        assert_eq!(at_3.next_key, None);

        // Address 2 was emptied at height 5
        let at_6 = collect_account_range(6, 2, items.into_iter().map(Ok)).unwrap();
        assert_eq!(
            at_6.accounts,
            vec![(address(1), account(1, 5)), (address(3), account(2, 1))]
        );
        assert_eq!(at_6.next_key, Some(address(4)));
    }

    #[test]
    fn state_root_chains() {
        let mut changeset = ChangeSet::default();
        let root_a = changeset.state_root(&Hash256::zero()).unwrap();
        changeset.accounts.insert(
            Address::zero(),
            Account {
                nonce: 1,
                balance: 1,
            },
        );
        let root_b = changeset.state_root(&Hash256::zero()).unwrap();
        let root_c = changeset.state_root(&root_a).unwrap();
        assert_ne!(root_a, root_b);
        assert_ne!(root_b, root_c);
    }
}
