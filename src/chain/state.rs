// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Views over the versioned store used while executing and querying blocks.

use crate::chain::backend::{Account, ChangeSet, StateBackend, StateBackendErr};
use crate::consensus::Money;
use crate::primitives::{Address, Hash256, Word};
use std::collections::BTreeMap;

/// Read access to contract storage at a fixed block
pub trait SlotReader {
    fn get_slot(&self, account: &Address, slot: &Hash256) -> Result<Word, StateBackendErr>;

    /// Number of the block the reads are evaluated at
    fn block_number(&self) -> u64;
}

pub trait SlotStore: SlotReader {
    /// Writes a slot. Writing zero clears it.
    fn set_slot(
        &mut self,
        account: &Address,
        slot: &Hash256,
        value: Word,
    ) -> Result<(), StateBackendErr>;
}

/// Native currency balances
pub trait BalanceStore {
    fn balance(&self, account: &Address) -> Result<Money, StateBackendErr>;
    fn debit(&mut self, account: &Address, amount: Money) -> Result<(), StateErr>;
    fn credit(&mut self, account: &Address, amount: Money) -> Result<(), StateErr>;

    /// Moves `amount` from `from` to `to`. Nothing is written on failure.
    fn transfer(&mut self, from: &Address, to: &Address, amount: Money) -> Result<(), StateErr> {
        if from == to {
            if self.balance(from)? < amount {
                return Err(StateErr::InsufficientFunds);
            }
            return Ok(());
        }

        if self.balance(from)? < amount {
            return Err(StateErr::InsufficientFunds);
        }

        self.balance(to)?
            .checked_add(amount)
            .ok_or(StateErr::Overflow)?;
        self.debit(from, amount)?;
        self.credit(to, amount)
    }
}

#[derive(Debug)]
pub enum StateErr {
    InsufficientFunds,
    Overflow,
    Backend(StateBackendErr),
}

impl From<StateBackendErr> for StateErr {
    fn from(other: StateBackendErr) -> Self {
        Self::Backend(other)
    }
}

/// Journal entry holding the value a key had in the overlay before a write
#[derive(Debug, Clone)]
enum JournalEntry {
    Account(Address, Option<Account>),
    Slot(Address, Hash256, Option<Word>),
}

/// Mutable view used to execute a block on top of the committed state at
/// `parent`. Writes stay in an overlay until turned into a [`ChangeSet`].
///
/// Checkpoints let a transaction's writes be reverted without touching what
/// earlier transactions in the same block wrote.
pub struct StateView<'a, B: StateBackend> {
    backend: &'a B,
    parent: Option<u64>,
    block_number: u64,
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<(Address, Hash256), Word>,
    journal: Vec<JournalEntry>,
}

impl<'a, B: StateBackend> StateView<'a, B> {
    /// View for executing block `block_number` on top of `parent`. `parent` is
    /// `None` for genesis.
    pub fn new(backend: &'a B, parent: Option<u64>, block_number: u64) -> Self {
        Self {
            backend,
            parent,
            block_number,
            accounts: BTreeMap::new(),
            storage: BTreeMap::new(),
            journal: vec![],
        }
    }

    pub fn account(&self, address: &Address) -> Result<Account, StateBackendErr> {
        if let Some(account) = self.accounts.get(address) {
            return Ok(*account);
        }

        match self.parent {
            Some(h) => Ok(self.backend.get_account(address, h)?.unwrap_or_default()),
            None => Ok(Account::default()),
        }
    }

    pub fn set_account(&mut self, address: &Address, account: Account) {
        let prev = self.accounts.insert(*address, account);
        self.journal.push(JournalEntry::Account(*address, prev));
    }

    pub fn nonce(&self, address: &Address) -> Result<u64, StateBackendErr> {
        Ok(self.account(address)?.nonce)
    }

    pub fn increment_nonce(&mut self, address: &Address) -> Result<(), StateErr> {
        let mut account = self.account(address)?;
        account.nonce = account.nonce.checked_add(1).ok_or(StateErr::Overflow)?;
        self.set_account(address, account);
        Ok(())
    }

    #[must_use]
    pub fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    /// Undoes every write made after `checkpoint`
    pub fn revert_to(&mut self, checkpoint: usize) {
        while self.journal.len() > checkpoint {
            match self.journal.pop() {
                Some(JournalEntry::Account(address, Some(prev))) => {
                    self.accounts.insert(address, prev);
                }
                Some(JournalEntry::Account(address, None)) => {
                    self.accounts.remove(&address);
                }
                Some(JournalEntry::Slot(address, slot, Some(prev))) => {
                    self.storage.insert((address, slot), prev);
                }
                Some(JournalEntry::Slot(address, slot, None)) => {
                    self.storage.remove(&(address, slot));
                }
                None => break,
            }
        }
    }

    #[must_use]
    pub fn into_changeset(self) -> ChangeSet {
        ChangeSet {
            accounts: self.accounts,
            storage: self.storage,
        }
    }
}

impl<'a, B: StateBackend> SlotReader for StateView<'a, B> {
    fn get_slot(&self, account: &Address, slot: &Hash256) -> Result<Word, StateBackendErr> {
        if let Some(value) = self.storage.get(&(*account, *slot)) {
            return Ok(*value);
        }

        match self.parent {
            Some(h) => self.backend.get_slot(account, slot, h),
            None => Ok(Word::zero()),
        }
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }
}

impl<'a, B: StateBackend> SlotStore for StateView<'a, B> {
    fn set_slot(
        &mut self,
        account: &Address,
        slot: &Hash256,
        value: Word,
    ) -> Result<(), StateBackendErr> {
        let prev = self.storage.insert((*account, *slot), value);
        self.journal.push(JournalEntry::Slot(*account, *slot, prev));
        Ok(())
    }
}

impl<'a, B: StateBackend> BalanceStore for StateView<'a, B> {
    fn balance(&self, account: &Address) -> Result<Money, StateBackendErr> {
        Ok(self.account(account)?.balance)
    }

    fn debit(&mut self, address: &Address, amount: Money) -> Result<(), StateErr> {
        let mut account = self.account(address)?;
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or(StateErr::InsufficientFunds)?;
        self.set_account(address, account);
        Ok(())
    }

    fn credit(&mut self, address: &Address, amount: Money) -> Result<(), StateErr> {
        let mut account = self.account(address)?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(StateErr::Overflow)?;
        self.set_account(address, account);
        Ok(())
    }
}

/// Read only view of the committed state at `height`. Reads evaluate at
/// block `height`.
pub struct StateSnapshot<'a, B: StateBackend> {
    backend: &'a B,
    height: u64,
}

impl<'a, B: StateBackend> StateSnapshot<'a, B> {
    pub fn new(backend: &'a B, height: u64) -> Self {
        Self { backend, height }
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn account(&self, address: &Address) -> Result<Account, StateBackendErr> {
        Ok(self
            .backend
            .get_account(address, self.height)?
            .unwrap_or_default())
    }

    pub fn balance(&self, address: &Address) -> Result<Money, StateBackendErr> {
        Ok(self.account(address)?.balance)
    }
}

impl<'a, B: StateBackend> SlotReader for StateSnapshot<'a, B> {
    fn get_slot(&self, account: &Address, slot: &Hash256) -> Result<Word, StateBackendErr> {
        self.backend.get_slot(account, slot, self.height)
    }

    fn block_number(&self) -> u64 {
        self.height
    }
}

/// Self contained slot and balance store. Backs ledger unit tests and benches.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MemorySlots {
    block_number: u64,
    slots: BTreeMap<(Address, Hash256), Word>,
    balances: BTreeMap<Address, Money>,
}

impl MemorySlots {
    #[must_use]
    pub fn at_block(block_number: u64) -> Self {
        Self {
            block_number,
            ..Self::default()
        }
    }

    pub fn set_block_number(&mut self, block_number: u64) {
        self.block_number = block_number;
    }
}

impl SlotReader for MemorySlots {
    fn get_slot(&self, account: &Address, slot: &Hash256) -> Result<Word, StateBackendErr> {
        Ok(self
            .slots
            .get(&(*account, *slot))
            .copied()
            .unwrap_or_default())
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }
}

impl SlotStore for MemorySlots {
    fn set_slot(
        &mut self,
        account: &Address,
        slot: &Hash256,
        value: Word,
    ) -> Result<(), StateBackendErr> {
        if value.is_zero() {
            self.slots.remove(&(*account, *slot));
        } else {
            self.slots.insert((*account, *slot), value);
        }
        Ok(())
    }
}

impl BalanceStore for MemorySlots {
    fn balance(&self, account: &Address) -> Result<Money, StateBackendErr> {
        Ok(self.balances.get(account).copied().unwrap_or(0))
    }

    fn debit(&mut self, account: &Address, amount: Money) -> Result<(), StateErr> {
        let balance = self
            .balance(account)?
            .checked_sub(amount)
            .ok_or(StateErr::InsufficientFunds)?;
        self.balances.insert(*account, balance);
        Ok(())
    }

    fn credit(&mut self, account: &Address, amount: Money) -> Result<(), StateErr> {
        let balance = self
            .balance(account)?
            .checked_add(amount)
            .ok_or(StateErr::Overflow)?;
        self.balances.insert(*account, balance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryBackend;
    use crate::primitives::{Block, BlockHeader};

    fn commit(backend: &MemoryBackend, height: u64, changeset: &ChangeSet) {
        let block = Block {
            header: BlockHeader {
                height,
                prev_hash: Hash256::zero(),
                timestamp: 0,
                coinbase: Address::zero(),
                tx_root: Hash256::zero(),
                receipts_root: Hash256::zero(),
                state_root: Hash256::zero(),
            },
            txs: vec![],
        };
        backend.write_block(&block, &[], changeset).unwrap();
    }

    #[test]
    fn view_reads_through_to_parent() {
        let backend = MemoryBackend::new();
        let address = Address::random();
        let slot = Hash256::from_u64(3);

        let mut genesis = StateView::new(&backend, None, 0);
        genesis.credit(&address, 100).unwrap();
        genesis
            .set_slot(&address, &slot, Word::from_u64(9))
            .unwrap();
        commit(&backend, 0, &genesis.into_changeset());

        let view = StateView::new(&backend, Some(0), 1);
        assert_eq!(view.balance(&address).unwrap(), 100);
        assert_eq!(view.get_slot(&address, &slot).unwrap(), Word::from_u64(9));
        assert_eq!(view.block_number(), 1);
    }

    #[test]
    fn revert_restores_checkpoint() {
        let backend = MemoryBackend::new();
        let a = Address::random();
        let b = Address::random();
        let slot = Hash256::from_u64(1);
        let mut view = StateView::new(&backend, None, 0);

        view.credit(&a, 100).unwrap();
        view.set_slot(&a, &slot, Word::from_u64(1)).unwrap();
        let cp = view.checkpoint();

        view.transfer(&a, &b, 60).unwrap();
        view.set_slot(&a, &slot, Word::from_u64(2)).unwrap();
        view.increment_nonce(&a).unwrap();
        view.revert_to(cp);

        assert_eq!(view.balance(&a).unwrap(), 100);
        assert_eq!(view.balance(&b).unwrap(), 0);
        assert_eq!(view.nonce(&a).unwrap(), 0);
        assert_eq!(view.get_slot(&a, &slot).unwrap(), Word::from_u64(1));

        let changeset = view.into_changeset();
        assert!(!changeset.accounts.contains_key(&b));
    }

    #[test]
    fn transfer_checks_before_writing() {
        let backend = MemoryBackend::new();
        let a = Address::random();
        let b = Address::random();
        let mut view = StateView::new(&backend, None, 0);
        view.credit(&a, 10).unwrap();
        view.credit(&b, Money::MAX).unwrap();
        let cp = view.checkpoint();

        assert!(matches!(
            view.transfer(&a, &b, 11),
            Err(StateErr::InsufficientFunds)
        ));
        assert!(matches!(view.transfer(&a, &b, 1), Err(StateErr::Overflow)));
        assert_eq!(view.checkpoint(), cp);
    }

    #[test]
    fn snapshot_is_pinned() {
        let backend = MemoryBackend::new();
        let address = Address::random();

        let mut view = StateView::new(&backend, None, 0);
        view.credit(&address, 1).unwrap();
        commit(&backend, 0, &view.into_changeset());

        let mut view = StateView::new(&backend, Some(0), 1);
        view.credit(&address, 1).unwrap();
        commit(&backend, 1, &view.into_changeset());

        assert_eq!(StateSnapshot::new(&backend, 0).balance(&address).unwrap(), 1);
        assert_eq!(StateSnapshot::new(&backend, 1).balance(&address).unwrap(), 2);
        assert_eq!(StateSnapshot::new(&backend, 1).block_number(), 1);
    }
}
