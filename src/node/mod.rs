// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{Chain, ChainErr, ProducedBlock, StateBackend};
use crate::consensus::MAX_TXS_PER_BLOCK;
use crate::primitives::Address;
use chrono::prelude::*;
use log::*;
pub use mempool::*;
pub use rpc::*;
use std::time::Duration;
use tokio::time::sleep;

/// Single producer node. Drains the mempool into a new block every interval.
pub struct Node<B: StateBackend> {
    chain: Chain<B>,
    mempool: SharedMempool,
    coinbase: Address,
    block_interval: Duration,
}

impl<B: StateBackend + 'static> Node<B> {
    pub fn new(
        chain: Chain<B>,
        mempool: SharedMempool,
        coinbase: Address,
        block_interval: Duration,
    ) -> Self {
        Self {
            chain,
            mempool,
            coinbase,
            block_interval,
        }
    }

    /// Produces one block out of the pending transactions and removes them
    /// from the pool, along with any the block could not include.
    pub fn produce_once(&self) -> Result<ProducedBlock, ChainErr> {
        let txs = self.mempool.read().select(MAX_TXS_PER_BLOCK);
        let produced = self
            .chain
            .produce_block(txs, self.coinbase, Utc::now().timestamp())?;

        let snapshot = self.chain.snapshot(Some(produced.block.height()))?;
        let mut mempool = self.mempool.write();

        for tx in &produced.block.txs {
            if let Ok(hash) = tx.hash() {
                mempool.remove(&hash);
            }
        }

        for (hash, err) in &produced.rejected {
            debug!("Evicting transaction {hash}: {err:?}");
            mempool.remove(hash);
        }

        mempool.prune(|address| snapshot.account(address).ok().map(|a| a.nonce));
        Ok(produced)
    }

    /// Runs until the exit signal is set
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Producing blocks every {}ms to coinbase {}",
            self.block_interval.as_millis(),
            self.coinbase
        );

        while !crate::global::exit_requested() {
            sleep(self.block_interval).await;

            let node = self.clone_handle();
            let result = tokio::task::spawn_blocking(move || node.produce_once()).await?;

            match result {
                Ok(produced) => {
                    if !produced.rejected.is_empty() {
                        warn!(
                            "Block {} left out {} transactions",
                            produced.block.height(),
                            produced.rejected.len()
                        );
                    }
                }
                Err(err) => {
                    error!("Block production failed: {err:?}");
                    return Err(anyhow::anyhow!("block production failed: {err:?}"));
                }
            }
        }

        Ok(())
    }

    fn clone_handle(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            mempool: self.mempool.clone(),
            coinbase: self.coinbase,
            block_interval: self.block_interval,
        }
    }
}

mod mempool;
mod rpc;
