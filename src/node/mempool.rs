// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::*;
use crate::primitives::*;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use triomphe::Arc;

pub type SharedMempool = Arc<RwLock<Mempool>>;

/// Transaction waiting to be included in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub tx: SignedTransaction,
    pub hash: Hash256,
    pub sender: Address,
}

#[derive(Debug)]
pub enum MempoolErr {
    /// The pool holds its maximum number of transactions
    Full,

    /// Another transaction with the same sender and nonce is pending
    NonceTaken,

    Tx(TxVerifyErr),
}

impl From<TxVerifyErr> for MempoolErr {
    fn from(other: TxVerifyErr) -> Self {
        Self::Tx(other)
    }
}

/// Pending transactions, ordered by sender then nonce
#[derive(Debug)]
pub struct Mempool {
    pub(crate) tx_map: HashMap<Hash256, PendingTx>,
    pub(crate) tx_list: BTreeMap<(Address, u64), Hash256>,
    max_txs: usize,
}

impl Mempool {
    #[must_use]
    pub fn new(max_txs: usize) -> Self {
        Self {
            tx_map: HashMap::new(),
            tx_list: BTreeMap::new(),
            max_txs,
        }
    }

    #[must_use]
    pub fn shared(max_txs: usize) -> SharedMempool {
        Arc::new(RwLock::new(Self::new(max_txs)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx_map.is_empty()
    }

    #[must_use]
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.tx_map.contains_key(hash)
    }

    /// Verifies and adds a transaction. Returns its hash.
    pub fn append(&mut self, tx: SignedTransaction, chain_id: u64) -> Result<Hash256, MempoolErr> {
        let tx_hash = tx.hash()?;

        // First check if we have the transaction present
        if self.tx_map.contains_key(&tx_hash) {
            return Ok(tx_hash);
        }

        let sender = tx.verify(chain_id)?;
        let key = (sender, tx.tx.nonce);

        if self.tx_list.contains_key(&key) {
            return Err(MempoolErr::NonceTaken);
        }

        if self.tx_map.len() >= self.max_txs {
            return Err(MempoolErr::Full);
        }

        self.tx_list.insert(key, tx_hash);
        self.tx_map.insert(
            tx_hash,
            PendingTx {
                tx,
                hash: tx_hash,
                sender,
            },
        );

        Ok(tx_hash)
    }

    /// Returns up to `max` pending transactions in inclusion order without
    /// removing them
    #[must_use]
    pub fn select(&self, max: usize) -> Vec<SignedTransaction> {
        self.tx_list
            .values()
            .filter_map(|hash| self.tx_map.get(hash))
            .take(max)
            .map(|pending| pending.tx.clone())
            .collect()
    }

    pub fn remove(&mut self, hash: &Hash256) -> Option<PendingTx> {
        let pending = self.tx_map.remove(hash)?;
        self.tx_list.remove(&(pending.sender, pending.tx.tx.nonce));
        Some(pending)
    }

    /// Drops every transaction whose nonce is below the account nonce
    /// returned by `nonce_of`
    pub fn prune<F>(&mut self, mut nonce_of: F)
    where
        F: FnMut(&Address) -> Option<u64>,
    {
        let stale: Vec<_> = self
            .tx_map
            .values()
            .filter(|pending| match nonce_of(&pending.sender) {
                Some(nonce) => pending.tx.tx.nonce < nonce,
                None => false,
            })
            .map(|pending| pending.hash)
            .collect();

        for hash in &stale {
            self.remove(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Secp256k1, SecretKey};

    fn key() -> (SecretKey, Address) {
        let (sk, pk) = Secp256k1::new().generate_keypair(&mut rand::thread_rng());
        (sk, Address::from_public_key(&pk))
    }

    fn tx(key: &SecretKey, nonce: u64, value: Money) -> SignedTransaction {
        Transaction {
            chain_id: 1,
            nonce,
            gas_price: 1,
            gas_limit: TX_GAS,
            to: Address::zero(),
            value,
            payload: TxPayload::Transfer,
        }
        .sign(key)
        .unwrap()
    }

    #[test]
    fn append_batch() {
        let (sk, sender) = key();
        let txs: Vec<_> = (0..30).rev().map(|nonce| tx(&sk, nonce, 1)).collect();
        let mut mempool = Mempool::new(100);

        for tx in &txs {
            mempool.append(tx.clone(), 1).unwrap();
        }

        assert_eq!(mempool.len(), 30);
        let selected = mempool.select(10);
        let nonces: Vec<_> = selected.iter().map(|tx| tx.tx.nonce).collect();
        assert_eq!(nonces, (0..10).collect::<Vec<_>>());
        assert!(selected.iter().all(|tx| tx.sender().unwrap() == sender));
    }

    #[test]
    fn it_rejects_duplicates_and_overflow() {
        let (sk, _) = key();
        let mut mempool = Mempool::new(2);

        let first = tx(&sk, 0, 1);
        let hash = mempool.append(first.clone(), 1).unwrap();
        assert_eq!(mempool.append(first, 1).unwrap(), hash);
        assert!(matches!(
            mempool.append(tx(&sk, 0, 2), 1),
            Err(MempoolErr::NonceTaken)
        ));
        mempool.append(tx(&sk, 1, 1), 1).unwrap();
        assert!(matches!(
            mempool.append(tx(&sk, 2, 1), 1),
            Err(MempoolErr::Full)
        ));
        assert!(matches!(
            mempool.append(tx(&sk, 5, 1), 2),
            Err(MempoolErr::Tx(TxVerifyErr::InvalidChainId))
        ));
    }

    #[test]
    fn it_prunes_stale_nonces() {
        let (sk, sender) = key();
        let mut mempool = Mempool::new(10);
        let hashes: Vec<_> = (0..4)
            .map(|nonce| mempool.append(tx(&sk, nonce, 1), 1).unwrap())
            .collect();

        mempool.prune(|address| (*address == sender).then_some(2));

        assert_eq!(mempool.len(), 2);
        assert!(!mempool.contains(&hashes[0]));
        assert!(!mempool.contains(&hashes[1]));
        assert!(mempool.contains(&hashes[2]));
        assert_eq!(mempool.remove(&hashes[3]).unwrap().hash, hashes[3]);
        assert_eq!(mempool.select(10).len(), 1);
    }
}
