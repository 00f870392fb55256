// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::*;
use crate::primitives::{Address, Block, Hash256, Receipt, Word};
use rocksdb::{BoundColumnFamily, Direction, IteratorMode};
use rocksdb::{MultiThreaded, TransactionDB, WriteBatchWithTransaction};
use triomphe::Arc;

pub type DB = TransactionDB<MultiThreaded>;
pub type WriteBatch = WriteBatchWithTransaction<true>;

pub const ACCOUNTS_CF: &str = "accounts";
pub const STORAGE_CF: &str = "storage";
pub const BLOCKS_CF: &str = "blocks";
pub const BLOCK_INDEX_CF: &str = "block_index";
pub const RECEIPTS_CF: &str = "receipts";
pub const CHANGESETS_CF: &str = "changesets";
pub const META_CF: &str = "meta";

pub const COLUMN_FAMILIES: [&str; 7] = [
    ACCOUNTS_CF,
    STORAGE_CF,
    BLOCKS_CF,
    BLOCK_INDEX_CF,
    RECEIPTS_CF,
    CHANGESETS_CF,
    META_CF,
];

/// RocksDB state backend
#[derive(Clone)]
pub struct DiskBackend {
    db: Arc<DB>,
}

impl DiskBackend {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    fn cf(&self, name: &'static str) -> Result<std::sync::Arc<BoundColumnFamily<'_>>, StateBackendErr> {
        self.db
            .cf_handle(name)
            .ok_or(StateBackendErr::Error("missing column family"))
    }

    fn get(&self, cf: &'static str, k: &[u8]) -> Result<Option<Vec<u8>>, StateBackendErr> {
        let cf = self.cf(cf)?;
        Ok(self.db.get_cf(&cf, k)?)
    }

    fn get_decoded<T: bincode::Decode<()>>(
        &self,
        cf: &'static str,
        k: &[u8],
    ) -> Result<Option<T>, StateBackendErr> {
        match self.get(cf, k)? {
            Some(bytes) => Ok(Some(crate::codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Iterates `cf` in key order starting at `from`
    fn seek<'a>(
        &'a self,
        cf: &'static str,
        from: &[u8],
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), StateBackendErr>> + 'a, StateBackendErr>
    {
        let cf = self.cf(cf)?;
        Ok(self
            .db
            .iterator_cf(&cf, IteratorMode::From(from, Direction::Forward))
            .map(|entry| {
                entry
                    .map(|(k, v)| (k.into_vec(), v.into_vec()))
                    .map_err(StateBackendErr::from)
            }))
    }
}

impl StateBackend for DiskBackend {
    fn height(&self) -> Result<Option<u64>, StateBackendErr> {
        match self.get(META_CF, TIP_KEY)? {
            Some(bytes) => Ok(Some(decode_height(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_account(
        &self,
        address: &Address,
        height: u64,
    ) -> Result<Option<Account>, StateBackendErr> {
        let prefix = account_key(address);
        let iter = self.seek(ACCOUNTS_CF, &versioned_key(&prefix, height))?;

        match latest_version(&prefix, iter)? {
            Some(bytes) => Ok(Some(crate::codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_slot(
        &self,
        address: &Address,
        slot: &Hash256,
        height: u64,
    ) -> Result<Word, StateBackendErr> {
        let prefix = slot_key(address, slot);
        let iter = self.seek(STORAGE_CF, &versioned_key(&prefix, height))?;

        match latest_version(&prefix, iter)? {
            Some(bytes) => decode_word(&bytes),
            None => Ok(Word::zero()),
        }
    }

    fn storage_range(
        &self,
        address: &Address,
        height: u64,
        start: &Hash256,
        max_results: usize,
    ) -> Result<StorageRange, StateBackendErr> {
        let iter = self.seek(STORAGE_CF, &slot_key(address, start))?;
        collect_storage_range(address, height, max_results, iter)
    }

    fn account_range(
        &self,
        height: u64,
        start: &Address,
        max_results: usize,
    ) -> Result<AccountRange, StateBackendErr> {
        let iter = self.seek(ACCOUNTS_CF, &account_key(start))?;
        collect_account_range(height, max_results, iter)
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StateBackendErr> {
        self.get_decoded(BLOCKS_CF, &height_key(height))
    }

    fn get_block_height_by_hash(&self, hash: &Hash256) -> Result<Option<u64>, StateBackendErr> {
        match self.get(BLOCK_INDEX_CF, hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode_height(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_receipts(&self, height: u64) -> Result<Option<Vec<Receipt>>, StateBackendErr> {
        self.get_decoded(RECEIPTS_CF, &height_key(height))
    }

    fn get_changeset(&self, height: u64) -> Result<Option<ChangeSet>, StateBackendErr> {
        self.get_decoded(CHANGESETS_CF, &height_key(height))
    }

    fn write_block(
        &self,
        block: &Block,
        receipts: &[Receipt],
        changeset: &ChangeSet,
    ) -> Result<(), StateBackendErr> {
        self.check_next_height(block)?;
        let height = block.height();
        let hkey = height_key(height);
        let (accounts, storage) = versioned_entries(changeset, height)?;

        let accounts_cf = self.cf(ACCOUNTS_CF)?;
        let storage_cf = self.cf(STORAGE_CF)?;
        let blocks_cf = self.cf(BLOCKS_CF)?;
        let block_index_cf = self.cf(BLOCK_INDEX_CF)?;
        let receipts_cf = self.cf(RECEIPTS_CF)?;
        let changesets_cf = self.cf(CHANGESETS_CF)?;
        let meta_cf = self.cf(META_CF)?;

        let mut batch = WriteBatch::default();

        for (k, v) in accounts {
            batch.put_cf(&accounts_cf, k, v);
        }

        for (k, v) in storage {
            batch.put_cf(&storage_cf, k, v);
        }

        batch.put_cf(&blocks_cf, hkey, crate::codec::encode_to_vec(block)?);
        batch.put_cf(&block_index_cf, block.hash()?.as_bytes(), hkey);
        batch.put_cf(
            &receipts_cf,
            hkey,
            crate::codec::encode_to_vec(&receipts.to_vec())?,
        );
        batch.put_cf(
            &changesets_cf,
            hkey,
            crate::codec::encode_to_vec(changeset)?,
        );
        batch.put_cf(&meta_cf, TIP_KEY, hkey);

        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::STAMINA_ADDRESS;
    use crate::primitives::BlockHeader;
    use rand::Rng;

    fn backend() -> DiskBackend {
        let mut path = std::env::temp_dir();
        path.push(hex::encode(rand::thread_rng().gen::<[u8; 32]>()));
        DiskBackend::new(open_rocksdb(path).unwrap())
    }

    fn block(height: u64) -> Block {
        Block {
            header: BlockHeader {
                height,
                prev_hash: Hash256::zero(),
                timestamp: 0,
                coinbase: Address::zero(),
                tx_root: Hash256::zero(),
                receipts_root: Hash256::zero(),
                state_root: Hash256::from_u64(height),
            },
            txs: vec![],
        }
    }

    #[test]
    fn it_writes_and_reads_versions() {
        let backend = backend();
        let address = Address::random();
        let slot = Hash256::from_u64(7);
        assert_eq!(backend.height().unwrap(), None);

        let mut changeset = ChangeSet::default();
        changeset.accounts.insert(
            address,
            Account {
                nonce: 1,
                balance: 100,
            },
        );
        changeset
            .storage
            .insert((STAMINA_ADDRESS, slot), Word::from_u64(5));
        backend.write_block(&block(0), &[], &changeset).unwrap();

        let mut changeset = ChangeSet::default();
        changeset.accounts.insert(
            address,
            Account {
                nonce: 2,
                balance: 50,
            },
        );
        backend.write_block(&block(1), &[], &changeset).unwrap();

        assert_eq!(backend.height().unwrap(), Some(1));
        assert_eq!(backend.get_account(&address, 0).unwrap().unwrap().balance, 100);
        assert_eq!(backend.get_account(&address, 1).unwrap().unwrap().balance, 50);
        assert_eq!(
            backend.get_slot(&STAMINA_ADDRESS, &slot, 1).unwrap(),
            Word::from_u64(5)
        );

        let range = backend
            .storage_range(&STAMINA_ADDRESS, 1, &Hash256::zero(), 10)
            .unwrap();
        assert_eq!(range.storage, vec![(slot, Word::from_u64(5))]);
        assert_eq!(range.next_key, None);

        let accounts = backend.account_range(0, &Address::zero(), 10).unwrap();
        assert_eq!(
            accounts.accounts,
            vec![(
                address,
                Account {
                    nonce: 1,
                    balance: 100,
                }
            )]
        );
        assert_eq!(
            backend.account_range(1, &Address::zero(), 10).unwrap().accounts[0]
                .1
                .balance,
            50
        );

        let genesis = block(0);
        assert_eq!(
            backend
                .get_block_height_by_hash(&genesis.hash().unwrap())
                .unwrap(),
            Some(0)
        );
        assert_eq!(backend.get_block(0).unwrap(), Some(genesis));
        assert_eq!(backend.get_receipts(1).unwrap(), Some(vec![]));
        assert_eq!(backend.get_modified_accounts(1).unwrap(), Some(vec![address]));
    }

    #[test]
    fn it_rejects_wrong_height() {
        let backend = backend();
        assert!(matches!(
            backend.write_block(&block(3), &[], &ChangeSet::default()),
            Err(StateBackendErr::InvalidHeight)
        ));
    }
}
