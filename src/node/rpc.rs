// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{
    AccountRange, Chain, ChainErr, StateBackend, StateBackendErr, StateSnapshot, StorageRange,
};
use crate::consensus::Money;
use crate::node::{MempoolErr, SharedMempool};
use crate::primitives::{Address, Block, Hash256, Receipt, SignedTransaction, TxVerifyErr};
use crate::stamina::{LedgerErr, StaminaConfig, StaminaLedger, WithdrawalRequest};
use futures::future::{self, Ready};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tarpc::context;

/// Upper bound on `debug_storage_range_at` and `debug_account_range` results
pub const MAX_STORAGE_RANGE_RESULTS: u64 = 1024;

/// Upper bound on the number of blocks the modified accounts queries scan
pub const MAX_MODIFIED_ACCOUNTS_RANGE: u64 = 1024;

pub type RpcRequest = tarpc::ClientMessage<RpcServerDefinitionRequest>;
pub type RpcResponse = tarpc::Response<RpcServerDefinitionResponse>;
pub type RpcChannel = tarpc::transport::channel::UnboundedChannel<RpcResponse, RpcRequest>;

#[tarpc::service]
pub trait RpcServerDefinition {
    /// Returns the height of the latest block
    async fn get_block_number() -> Result<u64, RpcErr>;

    /// Returns the block at height
    async fn get_block(height: u64) -> Result<Option<Block>, RpcErr>;

    /// Returns the receipts of the block at height
    async fn get_receipts(height: u64) -> Result<Option<Vec<Receipt>>, RpcErr>;

    /// Returns the native balance of an account at height, or at the latest block
    async fn get_balance(address: Address, height: Option<u64>) -> Result<Money, RpcErr>;

    /// Returns the nonce of an account at height, or at the latest block
    async fn get_nonce(address: Address, height: Option<u64>) -> Result<u64, RpcErr>;

    /// Submits a hex encoded signed transaction. Returns its hash.
    async fn send_raw_transaction(payload: String) -> Result<Hash256, RpcErr>;

    /// Returns true if the stamina ledger is initialized
    async fn stamina_initialized(height: Option<u64>) -> Result<bool, RpcErr>;

    /// Returns the stamina ledger configuration
    async fn stamina_get_config(height: Option<u64>) -> Result<StaminaConfig, RpcErr>;

    /// Returns the amount `depositor` has deposited for `delegatee`
    async fn stamina_get_deposit(
        depositor: Address,
        delegatee: Address,
        height: Option<u64>,
    ) -> Result<Money, RpcErr>;

    /// Returns the delegatee paying for `spender`, if any
    async fn stamina_get_delegatee(
        spender: Address,
        height: Option<u64>,
    ) -> Result<Option<Address>, RpcErr>;

    /// Returns the remaining stamina of `delegatee`
    async fn stamina_get_stamina(delegatee: Address, height: Option<u64>) -> Result<Money, RpcErr>;

    /// Returns the sum of the deposits backing `delegatee`
    async fn stamina_get_total_deposit(
        delegatee: Address,
        height: Option<u64>,
    ) -> Result<Money, RpcErr>;

    /// Returns the pending withdrawal of the pair, if any
    async fn stamina_get_withdrawal(
        depositor: Address,
        delegatee: Address,
        height: Option<u64>,
    ) -> Result<Option<WithdrawalRequest>, RpcErr>;

    /// Returns the number of times the stamina of `delegatee` was refilled
    async fn stamina_get_num_recovery(delegatee: Address, height: Option<u64>) -> Result<u64, RpcErr>;

    /// Returns the non zero storage slots of `account` at height, starting at `start`
    async fn debug_storage_range_at(
        account: Address,
        height: u64,
        start: Hash256,
        max_results: u64,
    ) -> Result<StorageRange, RpcErr>;

    /// Returns the accounts modified by the blocks in `start..=end`. `end`
    /// defaults to `start`.
    async fn debug_get_modified_accounts_by_number(
        start: u64,
        end: Option<u64>,
    ) -> Result<Vec<Address>, RpcErr>;

    /// Returns the non empty accounts at height in address order, starting at `start`
    async fn debug_account_range(
        height: u64,
        start: Address,
        max_results: u64,
    ) -> Result<AccountRange, RpcErr>;

    /// Same as `debug_get_modified_accounts_by_number` with blocks given by hash
    async fn debug_get_modified_accounts_by_hash(
        start: Hash256,
        end: Option<Hash256>,
    ) -> Result<Vec<Address>, RpcErr>;

    /// Attempts to gracefully shutdown the node
    async fn stop() -> String;

    /// Returns the number of seconds the server has been running
    async fn uptime() -> u64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErr {
    NoGenesis,
    InvalidHeight,
    InvalidRange,
    UnknownBlock,
    InvalidPayload,
    InvalidTransaction,
    InvalidSignature,
    InvalidChainId,
    InvalidNonce,
    MempoolFull,
    Internal,
}

impl From<ChainErr> for RpcErr {
    fn from(other: ChainErr) -> Self {
        match other {
            ChainErr::NoGenesis => Self::NoGenesis,
            ChainErr::Backend(StateBackendErr::InvalidHeight) => Self::InvalidHeight,
            err => {
                error!("RPC request failed: {err:?}");
                Self::Internal
            }
        }
    }
}

impl From<StateBackendErr> for RpcErr {
    fn from(other: StateBackendErr) -> Self {
        ChainErr::Backend(other).into()
    }
}

impl From<LedgerErr> for RpcErr {
    fn from(other: LedgerErr) -> Self {
        match other {
            LedgerErr::Backend(err) => err.into(),
            LedgerErr::Stamina(err) => {
                error!("Stamina read failed: {err}");
                Self::Internal
            }
        }
    }
}

impl From<TxVerifyErr> for RpcErr {
    fn from(other: TxVerifyErr) -> Self {
        match other {
            TxVerifyErr::InvalidSignature => Self::InvalidSignature,
            TxVerifyErr::InvalidChainId => Self::InvalidChainId,
            TxVerifyErr::InvalidNonce => Self::InvalidNonce,
            TxVerifyErr::BincodeDecode(_) => Self::InvalidPayload,
            _ => Self::InvalidTransaction,
        }
    }
}

impl From<MempoolErr> for RpcErr {
    fn from(other: MempoolErr) -> Self {
        match other {
            MempoolErr::Full => Self::MempoolFull,
            MempoolErr::NonceTaken => Self::InvalidNonce,
            MempoolErr::Tx(err) => err.into(),
        }
    }
}

/// RPC server
#[derive(Clone)]
pub struct RpcServer<B: StateBackend> {
    pub chain: Chain<B>,
    pub mempool: SharedMempool,
}

impl<B: StateBackend> RpcServer<B> {
    pub fn new(chain: Chain<B>, mempool: SharedMempool) -> Self {
        Self { chain, mempool }
    }

    fn balance(&self, address: &Address, height: Option<u64>) -> Result<Money, RpcErr> {
        Ok(self.chain.snapshot(height)?.balance(address)?)
    }

    fn nonce(&self, address: &Address, height: Option<u64>) -> Result<u64, RpcErr> {
        Ok(self.chain.snapshot(height)?.account(address)?.nonce)
    }

    /// Runs a ledger read against the state at `height`
    fn stamina_read<T, F>(&self, height: Option<u64>, read: F) -> Result<T, RpcErr>
    where
        F: FnOnce(&StaminaLedger, &StateSnapshot<'_, B>) -> Result<T, LedgerErr>,
    {
        let snapshot = self.chain.snapshot(height)?;
        Ok(read(self.chain.ledger(), &snapshot)?)
    }

    fn submit(&self, payload: &str) -> Result<Hash256, RpcErr> {
        let stripped = payload.strip_prefix("0x").unwrap_or(payload);
        let bytes = hex::decode(stripped).map_err(|_| RpcErr::InvalidPayload)?;
        let tx = SignedTransaction::from_bytes(&bytes)?;
        let sender = tx.verify(self.chain.chain_id())?;

        if tx.tx.nonce < self.nonce(&sender, None)? {
            return Err(RpcErr::InvalidNonce);
        }

        let hash = self.mempool.write().append(tx, self.chain.chain_id())?;
        debug!("Accepted transaction {hash} from {sender}");
        Ok(hash)
    }

    fn storage_range(
        &self,
        account: &Address,
        height: u64,
        start: &Hash256,
        max_results: u64,
    ) -> Result<StorageRange, RpcErr> {
        if height > self.chain.height()? {
            return Err(RpcErr::InvalidHeight);
        }

        let max_results = max_results.min(MAX_STORAGE_RANGE_RESULTS) as usize;
        Ok(self
            .chain
            .backend
            .storage_range(account, height, start, max_results)?)
    }

    fn account_range(
        &self,
        height: u64,
        start: &Address,
        max_results: u64,
    ) -> Result<AccountRange, RpcErr> {
        if height > self.chain.height()? {
            return Err(RpcErr::InvalidHeight);
        }

        let max_results = max_results.min(MAX_STORAGE_RANGE_RESULTS) as usize;
        Ok(self
            .chain
            .backend
            .account_range(height, start, max_results)?)
    }

    fn block_height(&self, hash: &Hash256) -> Result<u64, RpcErr> {
        self.chain
            .backend
            .get_block_height_by_hash(hash)?
            .ok_or(RpcErr::UnknownBlock)
    }

    fn modified_accounts_by_hash(
        &self,
        start: &Hash256,
        end: Option<&Hash256>,
    ) -> Result<Vec<Address>, RpcErr> {
        let start = self.block_height(start)?;
        let end = end.map(|hash| self.block_height(hash)).transpose()?;
        self.modified_accounts(start, end)
    }

    fn modified_accounts(&self, start: u64, end: Option<u64>) -> Result<Vec<Address>, RpcErr> {
        let end = end.unwrap_or(start);

        if end < start || end - start >= MAX_MODIFIED_ACCOUNTS_RANGE {
            return Err(RpcErr::InvalidRange);
        }

        if end > self.chain.height()? {
            return Err(RpcErr::InvalidHeight);
        }

        let mut out = BTreeSet::new();
        for height in start..=end {
            if let Some(accounts) = self.chain.backend.get_modified_accounts(height)? {
                out.extend(accounts);
            }
        }

        Ok(out.into_iter().collect())
    }
}

impl<B: StateBackend + 'static> RpcServerDefinition for RpcServer<B> {
    type GetBlockNumberFut = Ready<Result<u64, RpcErr>>;
    type GetBlockFut = Ready<Result<Option<Block>, RpcErr>>;
    type GetReceiptsFut = Ready<Result<Option<Vec<Receipt>>, RpcErr>>;
    type GetBalanceFut = Ready<Result<Money, RpcErr>>;
    type GetNonceFut = Ready<Result<u64, RpcErr>>;
    type SendRawTransactionFut = Ready<Result<Hash256, RpcErr>>;
    type StaminaInitializedFut = Ready<Result<bool, RpcErr>>;
    type StaminaGetConfigFut = Ready<Result<StaminaConfig, RpcErr>>;
    type StaminaGetDepositFut = Ready<Result<Money, RpcErr>>;
    type StaminaGetDelegateeFut = Ready<Result<Option<Address>, RpcErr>>;
    type StaminaGetStaminaFut = Ready<Result<Money, RpcErr>>;
    type StaminaGetTotalDepositFut = Ready<Result<Money, RpcErr>>;
    type StaminaGetWithdrawalFut = Ready<Result<Option<WithdrawalRequest>, RpcErr>>;
    type StaminaGetNumRecoveryFut = Ready<Result<u64, RpcErr>>;
    type DebugStorageRangeAtFut = Ready<Result<StorageRange, RpcErr>>;
    type DebugGetModifiedAccountsByNumberFut = Ready<Result<Vec<Address>, RpcErr>>;
    type DebugAccountRangeFut = Ready<Result<AccountRange, RpcErr>>;
    type DebugGetModifiedAccountsByHashFut = Ready<Result<Vec<Address>, RpcErr>>;
    type StopFut = Ready<String>;
    type UptimeFut = Ready<u64>;

    fn get_block_number(self, _: context::Context) -> Self::GetBlockNumberFut {
        future::ready(self.chain.height().map_err(RpcErr::from))
    }

    fn get_block(self, _: context::Context, height: u64) -> Self::GetBlockFut {
        future::ready(self.chain.backend.get_block(height).map_err(RpcErr::from))
    }

    fn get_receipts(self, _: context::Context, height: u64) -> Self::GetReceiptsFut {
        future::ready(self.chain.backend.get_receipts(height).map_err(RpcErr::from))
    }

    fn get_balance(
        self,
        _: context::Context,
        address: Address,
        height: Option<u64>,
    ) -> Self::GetBalanceFut {
        future::ready(self.balance(&address, height))
    }

    fn get_nonce(
        self,
        _: context::Context,
        address: Address,
        height: Option<u64>,
    ) -> Self::GetNonceFut {
        future::ready(self.nonce(&address, height))
    }

    fn send_raw_transaction(
        self,
        _: context::Context,
        payload: String,
    ) -> Self::SendRawTransactionFut {
        future::ready(self.submit(&payload))
    }

    fn stamina_initialized(
        self,
        _: context::Context,
        height: Option<u64>,
    ) -> Self::StaminaInitializedFut {
        future::ready(self.stamina_read(height, |ledger, s| ledger.initialized(s)))
    }

    fn stamina_get_config(
        self,
        _: context::Context,
        height: Option<u64>,
    ) -> Self::StaminaGetConfigFut {
        future::ready(self.stamina_read(height, |ledger, s| ledger.config(s)))
    }

    fn stamina_get_deposit(
        self,
        _: context::Context,
        depositor: Address,
        delegatee: Address,
        height: Option<u64>,
    ) -> Self::StaminaGetDepositFut {
        future::ready(self.stamina_read(height, |ledger, s| {
            ledger.get_deposit(s, &depositor, &delegatee)
        }))
    }

    fn stamina_get_delegatee(
        self,
        _: context::Context,
        spender: Address,
        height: Option<u64>,
    ) -> Self::StaminaGetDelegateeFut {
        future::ready(self.stamina_read(height, |ledger, s| ledger.get_delegatee(s, &spender)))
    }

    fn stamina_get_stamina(
        self,
        _: context::Context,
        delegatee: Address,
        height: Option<u64>,
    ) -> Self::StaminaGetStaminaFut {
        future::ready(self.stamina_read(height, |ledger, s| ledger.get_stamina(s, &delegatee)))
    }

    fn stamina_get_total_deposit(
        self,
        _: context::Context,
        delegatee: Address,
        height: Option<u64>,
    ) -> Self::StaminaGetTotalDepositFut {
        future::ready(self.stamina_read(height, |ledger, s| {
            ledger.get_total_deposit(s, &delegatee)
        }))
    }

    fn stamina_get_withdrawal(
        self,
        _: context::Context,
        depositor: Address,
        delegatee: Address,
        height: Option<u64>,
    ) -> Self::StaminaGetWithdrawalFut {
        future::ready(self.stamina_read(height, |ledger, s| {
            ledger.get_withdrawal(s, &depositor, &delegatee)
        }))
    }

    fn stamina_get_num_recovery(
        self,
        _: context::Context,
        delegatee: Address,
        height: Option<u64>,
    ) -> Self::StaminaGetNumRecoveryFut {
        future::ready(self.stamina_read(height, |ledger, s| {
            ledger.get_num_recovery(s, &delegatee)
        }))
    }

    fn debug_storage_range_at(
        self,
        _: context::Context,
        account: Address,
        height: u64,
        start: Hash256,
        max_results: u64,
    ) -> Self::DebugStorageRangeAtFut {
        future::ready(self.storage_range(&account, height, &start, max_results))
    }

    fn debug_get_modified_accounts_by_number(
        self,
        _: context::Context,
        start: u64,
        end: Option<u64>,
    ) -> Self::DebugGetModifiedAccountsByNumberFut {
        future::ready(self.modified_accounts(start, end))
    }

    fn debug_account_range(
        self,
        _: context::Context,
        height: u64,
        start: Address,
        max_results: u64,
    ) -> Self::DebugAccountRangeFut {
        future::ready(self.account_range(height, &start, max_results))
    }

    fn debug_get_modified_accounts_by_hash(
        self,
        _: context::Context,
        start: Hash256,
        end: Option<Hash256>,
    ) -> Self::DebugGetModifiedAccountsByHashFut {
        future::ready(self.modified_accounts_by_hash(&start, end.as_ref()))
    }

    fn stop(self, _: context::Context) -> Self::StopFut {
        crate::global::request_exit();
        future::ready("Stamina node shutting down".to_string())
    }

    fn uptime(self, _: context::Context) -> Self::UptimeFut {
        future::ready(crate::global::uptime())
    }
}

pub async fn dispatch_rpc_request(
    request: tarpc::Request<RpcServerDefinitionRequest>,
    client: RpcServerDefinitionClient,
) -> Result<RpcServerDefinitionResponse, String> {
    client
        .0
        .call(
            tarpc::context::current(),
            &request.id.to_string(),
            request.message,
        )
        .await
        .map_err(|err| err.to_string())
}

/// Checks a `Basic` authorization header against the given credentials.
/// Both sides are hashed so the comparison runs in constant time.
#[must_use]
pub fn check_authorization_header(auth: &str, username: &str, password: &str) -> bool {
    let split: Vec<_> = auth.split(' ').collect();

    if split.len() != 2 {
        return false;
    }

    if split[0] != "Basic" {
        return false;
    }

    let decoded = match base64::decode(split[1]) {
        Ok(decoded) => decoded,
        Err(_) => return false,
    };

    let hash_key = "staminanode.basic_auth";
    let oracle_key = format!("{username}:{password}");
    let oracle_hash = Hash256::hash_from_slice(oracle_key.as_bytes(), hash_key);
    let hash = Hash256::hash_from_slice(decoded, hash_key);

    constant_time_eq::constant_time_eq_32(&oracle_hash.0, &hash.0)
}
