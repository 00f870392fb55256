// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::memory_store::MemoryStore;
use crate::chain::backend::*;
use crate::primitives::{Address, Block, Hash256, Receipt, Word};
use parking_lot::RwLock;
use triomphe::Arc;

/// In memory state backend. Used in tests and when running in memory only mode.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn height(&self) -> Result<Option<u64>, StateBackendErr> {
        Ok(self.store.read().height)
    }

    fn get_account(
        &self,
        address: &Address,
        height: u64,
    ) -> Result<Option<Account>, StateBackendErr> {
        let prefix = account_key(address);
        let store = self.store.read();
        let iter = MemoryStore::seek(&store.accounts, &versioned_key(&prefix, height));

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
        let store = self.store.read();
        let iter = MemoryStore::seek(&store.storage, &versioned_key(&prefix, height));

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
        let store = self.store.read();
        let iter = MemoryStore::seek(&store.storage, &slot_key(address, start));
        collect_storage_range(address, height, max_results, iter)
    }

    fn account_range(
        &self,
        height: u64,
        start: &Address,
        max_results: usize,
    ) -> Result<AccountRange, StateBackendErr> {
        let store = self.store.read();
        let iter = MemoryStore::seek(&store.accounts, &account_key(start));
        collect_account_range(height, max_results, iter)
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StateBackendErr> {
        Ok(self.store.read().blocks.get(&height).cloned())
    }

    fn get_block_height_by_hash(&self, hash: &Hash256) -> Result<Option<u64>, StateBackendErr> {
        Ok(self.store.read().block_index.get(hash).copied())
    }

    fn get_receipts(&self, height: u64) -> Result<Option<Vec<Receipt>>, StateBackendErr> {
        Ok(self.store.read().receipts.get(&height).cloned())
    }

    fn get_changeset(&self, height: u64) -> Result<Option<ChangeSet>, StateBackendErr> {
        Ok(self.store.read().changesets.get(&height).cloned())
    }

    fn write_block(
        &self,
        block: &Block,
        receipts: &[Receipt],
        changeset: &ChangeSet,
    ) -> Result<(), StateBackendErr> {
        self.check_next_height(block)?;
        let height = block.height();
        let hash = block.hash()?;
        let (accounts, storage) = versioned_entries(changeset, height)?;

        let mut store = self.store.write();
        store.accounts.extend(accounts);
        store.storage.extend(storage);
        store.blocks.insert(height, block.clone());
        store.block_index.insert(hash, height);
        store.receipts.insert(height, receipts.to_vec());
        store.changesets.insert(height, changeset.clone());
        store.height = Some(height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::STAMINA_ADDRESS;
    use crate::primitives::BlockHeader;

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

    fn account(balance: u128) -> Account {
        Account { nonce: 0, balance }
    }

    #[test]
    fn reads_are_versioned() {
        let backend = MemoryBackend::new();
        let address = Address::random();
        let slot = Hash256::from_u64(1);
        assert_eq!(backend.height().unwrap(), None);

        let mut changeset = ChangeSet::default();
        changeset.accounts.insert(address, account(10));
        changeset
            .storage
            .insert((STAMINA_ADDRESS, slot), Word::from_u64(1));
        backend.write_block(&block(0), &[], &changeset).unwrap();

        backend
            .write_block(&block(1), &[], &ChangeSet::default())
            .unwrap();

        let mut changeset = ChangeSet::default();
        changeset.accounts.insert(address, account(20));
        changeset
            .storage
            .insert((STAMINA_ADDRESS, slot), Word::zero());
        backend.write_block(&block(2), &[], &changeset).unwrap();

        assert_eq!(backend.height().unwrap(), Some(2));
        assert_eq!(backend.get_account(&address, 0).unwrap(), Some(account(10)));
        assert_eq!(backend.get_account(&address, 1).unwrap(), Some(account(10)));
        assert_eq!(backend.get_account(&address, 2).unwrap(), Some(account(20)));
        assert_eq!(
            backend.get_slot(&STAMINA_ADDRESS, &slot, 1).unwrap(),
            Word::from_u64(1)
        );
        assert_eq!(
            backend.get_slot(&STAMINA_ADDRESS, &slot, 2).unwrap(),
            Word::zero()
        );
        assert_eq!(backend.get_account(&Address::random(), 2).unwrap(), None);
    }

    #[test]
    fn account_range_pages_by_address() {
        let backend = MemoryBackend::new();
        let mut addresses: Vec<_> = (0..3).map(|_| Address::random()).collect();
        addresses.sort();

        let mut changeset = ChangeSet::default();
        for (i, address) in addresses.iter().enumerate() {
            changeset.accounts.insert(*address, account(i as u128 + 1));
        }
        backend.write_block(&block(0), &[], &changeset).unwrap();

        let mut changeset = ChangeSet::default();
        changeset.accounts.insert(addresses[0], account(100));
        backend.write_block(&block(1), &[], &changeset).unwrap();

        let first = backend.account_range(0, &Address::zero(), 2).unwrap();
        assert_eq!(
            first.accounts,
            vec![(addresses[0], account(1)), (addresses[1], account(2))]
        );
        assert_eq!(first.next_key, Some(addresses[2]));

        let rest = backend.account_range(0, &addresses[2], 2).unwrap();
        assert_eq!(rest.accounts, vec![(addresses[2], account(3))]);
        assert_eq!(rest.next_key, None);

        let latest = backend.account_range(1, &Address::zero(), 1).unwrap();
        assert_eq!(latest.accounts, vec![(addresses[0], account(100))]);
    }

    #[test]
    fn it_rejects_gaps() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.write_block(&block(1), &[], &ChangeSet::default()),
            Err(StateBackendErr::InvalidHeight)
        ));
        backend
            .write_block(&block(0), &[], &ChangeSet::default())
            .unwrap();
        assert!(matches!(
            backend.write_block(&block(0), &[], &ChangeSet::default()),
            Err(StateBackendErr::InvalidHeight)
        ));
    }

    #[test]
    fn it_indexes_blocks_and_changes() {
        let backend = MemoryBackend::new();
        let address = Address::random();
        let mut changeset = ChangeSet::default();
        changeset.accounts.insert(address, account(1));
        changeset
            .storage
            .insert((STAMINA_ADDRESS, Hash256::zero()), Word::from_u64(1));
        let genesis = block(0);
        backend.write_block(&genesis, &[], &changeset).unwrap();

        let hash = genesis.hash().unwrap();
        assert_eq!(backend.get_block_height_by_hash(&hash).unwrap(), Some(0));
        assert_eq!(backend.get_block_by_hash(&hash).unwrap(), Some(genesis.clone()));
        assert_eq!(backend.tip().unwrap(), Some(genesis));

        let mut expected = vec![address, STAMINA_ADDRESS];
        expected.sort();
        assert_eq!(backend.get_modified_accounts(0).unwrap(), Some(expected));
        assert_eq!(backend.get_modified_accounts(1).unwrap(), None);
    }
}
