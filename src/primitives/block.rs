// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{Money, BLOCK_TIMESTAMP_MAX, MAX_TXS_PER_BLOCK};
use crate::primitives::{Address, Hash256, SignedTransaction, TxVerifyErr};
use crate::stamina::{GasPayer, StaminaErr};
use bincode::error::EncodeError as BincodeEncodeErr;
use bincode::{Decode, Encode};
use chrono::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Height of the block. Genesis is at 0
    pub height: u64,

    /// Hash of the parent header. Zero for genesis
    pub prev_hash: Hash256,

    /// Block timestamp in seconds
    pub timestamp: i64,

    /// Receiver of native transaction fees
    pub coinbase: Address,

    /// Commitment to the ordered transaction hashes
    pub tx_root: Hash256,

    /// Commitment to the receipts
    pub receipts_root: Hash256,

    /// `H(parent_state_root || changeset)`
    pub state_root: Hash256,
}

impl BlockHeader {
    pub fn hash(&self) -> Result<Hash256, BlockVerifyErr> {
        let encoded = crate::codec::encode_to_vec(self)?;
        Ok(Hash256::hash_from_slice(encoded, "block"))
    }

    /// Validates the header against its parent. Does not check the state root,
    /// which can only be known by executing the block.
    pub fn validate(&self, prev: &BlockHeader) -> Result<(), BlockVerifyErr> {
        if self.height != prev.height + 1 {
            return Err(BlockVerifyErr::InvalidHeight);
        }

        if self.prev_hash != prev.hash()? {
            return Err(BlockVerifyErr::InvalidPrevHash);
        }

        if self.timestamp < prev.timestamp {
            return Err(BlockVerifyErr::InvalidTimestamp);
        }

        if self.timestamp > Utc::now().timestamp() + BLOCK_TIMESTAMP_MAX {
            return Err(BlockVerifyErr::InvalidTimestamp);
        }

        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<SignedTransaction>,
}

impl Block {
    pub fn hash(&self) -> Result<Hash256, BlockVerifyErr> {
        self.header.hash()
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Validates the block body against the header and the header against `prev`
    pub fn validate(&self, prev: &BlockHeader) -> Result<(), BlockVerifyErr> {
        self.header.validate(prev)?;

        if self.txs.len() > MAX_TXS_PER_BLOCK {
            return Err(BlockVerifyErr::TooManyTxs);
        }

        if self.header.tx_root != Self::compute_tx_root(&self.txs)? {
            return Err(BlockVerifyErr::InvalidTxRoot);
        }

        Ok(())
    }

    pub fn compute_tx_root(txs: &[SignedTransaction]) -> Result<Hash256, BlockVerifyErr> {
        let mut buf = Vec::with_capacity(txs.len() * 32);
        for tx in txs {
            buf.extend_from_slice(tx.hash()?.as_bytes());
        }
        Ok(Hash256::hash_from_slice(buf, "txroot"))
    }

    pub fn compute_receipts_root(receipts: &[Receipt]) -> Result<Hash256, BlockVerifyErr> {
        let encoded = crate::codec::encode_to_vec(&receipts.to_vec())?;
        Ok(Hash256::hash_from_slice(encoded, "receipts"))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Encode, Decode, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,

    /// The payload was reverted. Fee and nonce are still taken.
    Failed(StaminaErr),
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash256,
    pub sender: Address,
    pub payer: GasPayer,
    pub gas_used: u64,
    pub fee: Money,
    pub status: ReceiptStatus,
}

impl Receipt {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[derive(Debug)]
pub enum BlockVerifyErr {
    InvalidHeight,
    InvalidPrevHash,
    InvalidTimestamp,
    InvalidTxRoot,
    InvalidReceiptsRoot,
    InvalidStateRoot,
    TooManyTxs,

    /// The block contains a transaction that cannot pay for itself
    UnpayableTx(Hash256),
    Tx(TxVerifyErr),
    BincodeEncode(BincodeEncodeErr),
}

impl From<TxVerifyErr> for BlockVerifyErr {
    fn from(other: TxVerifyErr) -> Self {
        Self::Tx(other)
    }
}

impl From<BincodeEncodeErr> for BlockVerifyErr {
    fn from(other: BincodeEncodeErr) -> Self {
        Self::BincodeEncode(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64, prev_hash: Hash256, timestamp: i64) -> BlockHeader {
        BlockHeader {
            height,
            prev_hash,
            timestamp,
            coinbase: Address::zero(),
            tx_root: Block::compute_tx_root(&[]).unwrap(),
            receipts_root: Block::compute_receipts_root(&[]).unwrap(),
            state_root: Hash256::zero(),
        }
    }

    #[test]
    fn it_validates_against_parent() {
        let now = Utc::now().timestamp();
        let genesis = header(0, Hash256::zero(), now);
        let next = header(1, genesis.hash().unwrap(), now);
        assert!(next.validate(&genesis).is_ok());

        let wrong_height = header(2, genesis.hash().unwrap(), now);
        assert!(matches!(
            wrong_height.validate(&genesis),
            Err(BlockVerifyErr::InvalidHeight)
        ));

        let wrong_prev = header(1, Hash256::zero(), now);
        assert!(matches!(
            wrong_prev.validate(&genesis),
            Err(BlockVerifyErr::InvalidPrevHash)
        ));

        let in_past = header(1, genesis.hash().unwrap(), now - 1);
        assert!(matches!(
            in_past.validate(&genesis),
            Err(BlockVerifyErr::InvalidTimestamp)
        ));

        let in_future = header(1, genesis.hash().unwrap(), now + BLOCK_TIMESTAMP_MAX + 100);
        assert!(matches!(
            in_future.validate(&genesis),
            Err(BlockVerifyErr::InvalidTimestamp)
        ));
    }

    #[test]
    fn it_checks_tx_root() {
        let now = Utc::now().timestamp();
        let genesis = header(0, Hash256::zero(), now);
        let mut block = Block {
            header: header(1, genesis.hash().unwrap(), now),
            txs: vec![],
        };
        assert!(block.validate(&genesis).is_ok());

        block.header.tx_root = Hash256::zero();
        assert!(matches!(
            block.validate(&genesis),
            Err(BlockVerifyErr::InvalidTxRoot)
        ));
    }

    #[test]
    fn header_hash_commits_to_state_root() {
        let a = header(0, Hash256::zero(), 0);
        let mut b = a.clone();
        b.state_root = Hash256::from_u64(1);
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }
}
