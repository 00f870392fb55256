// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{
    BalanceStore, ChainConfig, ChangeSet, StateBackend, StateBackendErr, StateErr, StateSnapshot,
    StateView,
};
use crate::consensus::{Money, MAX_TXS_PER_BLOCK, STAMINA_ADDRESS};
use crate::primitives::{
    Address, Block, BlockHeader, BlockVerifyErr, Hash256, Receipt, ReceiptStatus,
    SignedTransaction, TxPayload, TxVerifyErr,
};
use crate::stamina::{
    resolve_gas_payer, write_genesis, GasPayer, LedgerErr, ResolveErr, StaminaLedger,
};
use bincode::error::EncodeError as BincodeEncodeErr;
use log::*;
use parking_lot::Mutex;
use rayon::prelude::*;
use triomphe::Arc;

/// The execution engine. Builds genesis, produces and imports blocks, and
/// gives read access to the committed state.
#[derive(Clone)]
pub struct Chain<B: StateBackend> {
    pub backend: B,
    pub config: Arc<ChainConfig>,
    ledger: StaminaLedger,

    /// Held while a block is executed and committed
    exec_lock: Arc<Mutex<()>>,
}

/// Reason a transaction cannot be included in a block
#[derive(Debug)]
pub enum ApplyErr {
    /// Fails stateless verification or carries the wrong nonce
    Invalid(TxVerifyErr),

    /// Neither the delegatee nor the sender can pay the fee
    Unpayable,

    Backend(StateBackendErr),
}

impl From<StateBackendErr> for ApplyErr {
    fn from(other: StateBackendErr) -> Self {
        Self::Backend(other)
    }
}

impl From<TxVerifyErr> for ApplyErr {
    fn from(other: TxVerifyErr) -> Self {
        Self::Invalid(other)
    }
}

#[derive(Debug)]
pub enum ChainErr {
    /// The backend holds no genesis block
    NoGenesis,

    Backend(StateBackendErr),
    Block(BlockVerifyErr),
}

impl From<StateBackendErr> for ChainErr {
    fn from(other: StateBackendErr) -> Self {
        Self::Backend(other)
    }
}

impl From<BlockVerifyErr> for ChainErr {
    fn from(other: BlockVerifyErr) -> Self {
        Self::Block(other)
    }
}

impl From<BincodeEncodeErr> for ChainErr {
    fn from(other: BincodeEncodeErr) -> Self {
        Self::Backend(StateBackendErr::BincodeEncode(other))
    }
}

/// Result of producing a block
#[derive(Debug)]
pub struct ProducedBlock {
    pub block: Block,
    pub receipts: Vec<Receipt>,

    /// Transactions left out of the block
    pub rejected: Vec<(Hash256, ApplyErr)>,
}

struct Execution {
    txs: Vec<SignedTransaction>,
    receipts: Vec<Receipt>,
    rejected: Vec<(Hash256, ApplyErr)>,
    changeset: ChangeSet,
}

impl<B: StateBackend> Chain<B> {
    pub fn new(backend: B, config: ChainConfig) -> Self {
        let ledger = StaminaLedger::new(
            *config.owner(),
            *config.operator(),
            config.operator_stamina(),
        );

        Self {
            backend,
            config: Arc::new(config),
            ledger,
            exec_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &StaminaLedger {
        &self.ledger
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id()
    }

    /// Height of the latest committed block
    pub fn height(&self) -> Result<u64, ChainErr> {
        self.backend.height()?.ok_or(ChainErr::NoGenesis)
    }

    pub fn tip(&self) -> Result<Block, ChainErr> {
        self.backend.tip()?.ok_or(ChainErr::NoGenesis)
    }

    /// Read only view of the state at `height`, or at the tip if `None`
    pub fn snapshot(&self, height: Option<u64>) -> Result<StateSnapshot<'_, B>, ChainErr> {
        let tip = self.height()?;
        let height = height.unwrap_or(tip);

        if height > tip {
            return Err(StateBackendErr::InvalidHeight.into());
        }

        Ok(StateSnapshot::new(&self.backend, height))
    }

    /// Writes the genesis block if the backend is empty. Returns the genesis block.
    pub fn init_genesis(&self) -> Result<Block, ChainErr> {
        let _guard = self.exec_lock.lock();

        if let Some(genesis) = self.backend.get_block(0)? {
            debug!("Genesis block already present");
            return Ok(genesis);
        }

        let mut view = StateView::new(&self.backend, None, 0);

        for (address, amount) in self.config.alloc() {
            view.credit(address, *amount).map_err(|err| match err {
                StateErr::Backend(err) => err,
                _ => StateBackendErr::Error("invalid genesis allocation"),
            })?;
        }

        if let Some(genesis) = self.config.stamina_genesis() {
            write_genesis(&mut view, genesis, self.config.operator())?;
        }

        let changeset = view.into_changeset();
        let header = BlockHeader {
            height: 0,
            prev_hash: Hash256::zero(),
            timestamp: self.config.genesis_timestamp(),
            coinbase: Address::zero(),
            tx_root: Block::compute_tx_root(&[])?,
            receipts_root: Block::compute_receipts_root(&[])?,
            state_root: changeset.state_root(&Hash256::zero())?,
        };
        let block = Block {
            header,
            txs: vec![],
        };

        self.backend.write_block(&block, &[], &changeset)?;
        info!(
            "Wrote genesis block {} for {}",
            block.hash()?,
            self.config.network_name()
        );
        Ok(block)
    }

    /// Executes `txs` on top of the tip and commits the result as a new block.
    /// Transactions that cannot be included are skipped.
    pub fn produce_block(
        &self,
        txs: Vec<SignedTransaction>,
        coinbase: Address,
        timestamp: i64,
    ) -> Result<ProducedBlock, ChainErr> {
        let _guard = self.exec_lock.lock();
        let parent = self.tip()?.header;
        let height = parent.height + 1;
        let execution = self.execute(&parent, &coinbase, txs, false)?;

        let header = BlockHeader {
            height,
            prev_hash: parent.hash()?,
            timestamp: timestamp.max(parent.timestamp),
            coinbase,
            tx_root: Block::compute_tx_root(&execution.txs)?,
            receipts_root: Block::compute_receipts_root(&execution.receipts)?,
            state_root: execution.changeset.state_root(&parent.state_root)?,
        };
        let block = Block {
            header,
            txs: execution.txs,
        };

        self.backend
            .write_block(&block, &execution.receipts, &execution.changeset)?;
        info!(
            "Produced block {} at height {height} with {} transactions",
            block.hash()?,
            block.txs.len()
        );

        Ok(ProducedBlock {
            block,
            receipts: execution.receipts,
            rejected: execution.rejected,
        })
    }

    /// Validates and re-executes a block produced elsewhere, then commits it
    pub fn import_block(&self, block: &Block) -> Result<Vec<Receipt>, ChainErr> {
        let _guard = self.exec_lock.lock();
        let parent = self.tip()?.header;
        block.validate(&parent)?;

        // Signatures are checked up front, in parallel
        let chain_id = self.chain_id();
        block
            .txs
            .par_iter()
            .try_for_each(|tx| tx.verify(chain_id).map(|_| ()))
            .map_err(BlockVerifyErr::Tx)?;

        let execution = self.execute(&parent, &block.header.coinbase, block.txs.clone(), true)?;

        if Block::compute_receipts_root(&execution.receipts)? != block.header.receipts_root {
            return Err(BlockVerifyErr::InvalidReceiptsRoot.into());
        }

        if execution.changeset.state_root(&parent.state_root)? != block.header.state_root {
            return Err(BlockVerifyErr::InvalidStateRoot.into());
        }

        self.backend
            .write_block(block, &execution.receipts, &execution.changeset)?;
        info!("Imported block {} at height {}", block.hash()?, block.height());
        Ok(execution.receipts)
    }

    /// Runs `txs` in order on a view over `parent`. In strict mode any
    /// transaction that cannot be included fails the whole block.
    fn execute(
        &self,
        parent: &BlockHeader,
        coinbase: &Address,
        txs: Vec<SignedTransaction>,
        strict: bool,
    ) -> Result<Execution, ChainErr> {
        let mut view = StateView::new(&self.backend, Some(parent.height), parent.height + 1);
        let mut included = Vec::with_capacity(txs.len().min(MAX_TXS_PER_BLOCK));
        let mut receipts = Vec::with_capacity(included.capacity());
        let mut rejected = vec![];

        for tx in txs {
            if included.len() == MAX_TXS_PER_BLOCK {
                if strict {
                    return Err(BlockVerifyErr::TooManyTxs.into());
                }
                break;
            }

            match self.apply_transaction(&mut view, &tx, coinbase) {
                Ok(receipt) => {
                    receipts.push(receipt);
                    included.push(tx);
                }
                Err(ApplyErr::Backend(err)) => return Err(err.into()),
                Err(err) if strict => {
                    let hash = tx.hash().map_err(BlockVerifyErr::Tx)?;
                    return Err(match err {
                        ApplyErr::Invalid(err) => BlockVerifyErr::Tx(err),
                        _ => BlockVerifyErr::UnpayableTx(hash),
                    }
                    .into());
                }
                Err(err) => {
                    let hash = tx.hash().map_err(BlockVerifyErr::Tx)?;
                    debug!("Dropping transaction {hash}: {err:?}");
                    rejected.push((hash, err));
                }
            }
        }

        Ok(Execution {
            txs: included,
            receipts,
            rejected,
            changeset: view.into_changeset(),
        })
    }

    /// Applies a single transaction to `view`. Nothing is written when the
    /// transaction cannot be included. A failing payload is reverted but its
    /// fee and nonce bump are kept.
    pub fn apply_transaction(
        &self,
        view: &mut StateView<'_, B>,
        tx: &SignedTransaction,
        coinbase: &Address,
    ) -> Result<Receipt, ApplyErr> {
        let sender = tx.verify(self.chain_id())?;

        if view.nonce(&sender)? != tx.tx.nonce {
            return Err(TxVerifyErr::InvalidNonce.into());
        }

        let tx_hash = tx.hash()?;
        let fee = tx.tx.fee()?;
        let start = view.checkpoint();

        let payer = match resolve_gas_payer(&self.ledger, view, &sender, fee) {
            Ok(payer) => payer,
            Err(ResolveErr::InsufficientFunds) => return Err(ApplyErr::Unpayable),
            Err(ResolveErr::Backend(err)) => return Err(err.into()),
        };

        if let Err(err) = self.settle_fee(view, &sender, payer, fee, coinbase) {
            view.revert_to(start);
            return Err(err);
        }

        let payload_start = view.checkpoint();
        let status = match self.execute_payload(view, &sender, tx) {
            Ok(()) => ReceiptStatus::Success,
            Err(LedgerErr::Stamina(kind)) => {
                view.revert_to(payload_start);
                debug!("Transaction {tx_hash} from {sender} failed: {kind}");
                ReceiptStatus::Failed(kind)
            }
            Err(LedgerErr::Backend(err)) => return Err(err.into()),
        };

        Ok(Receipt {
            tx_hash,
            sender,
            payer,
            gas_used: tx.tx.intrinsic_gas(),
            fee,
            status,
        })
    }

    /// Bumps the sender nonce and hands a natively paid fee to the coinbase.
    /// Stamina paid fees are not credited anywhere.
    fn settle_fee(
        &self,
        view: &mut StateView<'_, B>,
        sender: &Address,
        payer: GasPayer,
        fee: Money,
        coinbase: &Address,
    ) -> Result<(), ApplyErr> {
        match view.increment_nonce(sender) {
            Ok(()) => {}
            Err(StateErr::Backend(err)) => return Err(err.into()),
            Err(_) => return Err(TxVerifyErr::InvalidNonce.into()),
        }

        if payer == GasPayer::Native && fee > 0 {
            match view.credit(coinbase, fee) {
                Ok(()) => {}
                Err(StateErr::Backend(err)) => return Err(err.into()),
                Err(_) => warn!("Coinbase {coinbase} balance is full, burning fee of {fee}"),
            }
        }

        Ok(())
    }

    fn execute_payload(
        &self,
        view: &mut StateView<'_, B>,
        sender: &Address,
        tx: &SignedTransaction,
    ) -> Result<(), LedgerErr> {
        let tx = &tx.tx;

        match &tx.payload {
            TxPayload::Transfer => Ok(view.transfer(sender, &tx.to, tx.value)?),
            TxPayload::Stamina(call) => {
                if tx.value > 0 {
                    view.transfer(sender, &STAMINA_ADDRESS, tx.value)?;
                }

                self.ledger.dispatch(view, sender, tx.value, call)
            }
        }
    }
}
