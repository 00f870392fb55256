// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Stamina is a fee delegation resource. A delegatee backs it with native
//! deposits and names the spenders whose transaction fees it pays. The
//! balance is rate limited: consumption inside a recovery epoch adds up and
//! the balance refills to full capacity once a whole epoch has passed
//! without a refill or a consumption.
//!
//! The ledger is a plain state transition over contract storage. It is
//! called synchronously by the execution engine and never calls out, so it
//! cannot be re-entered.

use crate::chain::{StateBackendErr, StateErr};
use crate::consensus::Money;
use crate::primitives::Address;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

mod genesis;
pub mod keys;
mod ledger;
mod recovery;
mod resolver;
mod withdrawal;

pub use genesis::*;
pub use ledger::*;
pub use recovery::*;
pub use resolver::*;
pub use withdrawal::*;

/// Administrative operations of the ledger. Sent as transaction payloads to
/// the stamina address.
#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
pub enum StaminaCall {
    /// Owner only. Sets the configuration and seeds the operator.
    Init {
        min_deposit: Money,
        recovery_epoch_length: u64,
        withdrawal_delay: u64,
    },

    /// Payable. The attached value is deposited for `delegatee`.
    Deposit { delegatee: Address },

    /// The caller becomes the delegatee of `spender`
    SetDelegator { spender: Address },

    RequestWithdrawal { delegatee: Address, amount: Money },

    FinalizeWithdrawal { delegatee: Address },
}

/// Failure kinds of ledger operations. These end up in receipts.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Encode, Decode, Serialize, Deserialize)]
pub enum StaminaErr {
    Unauthorized,
    AlreadyInitialized,
    NotInitialized,
    BelowMinimum,
    InsufficientDeposit,
    InsufficientStamina,
    InsufficientFunds,
    TooEarly,
    NoPendingWithdrawal,
    Overflow,
}

impl fmt::Display for StaminaErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Unauthorized => "caller is not the owner",
            Self::AlreadyInitialized => "already initialized",
            Self::NotInitialized => "not initialized",
            Self::BelowMinimum => "deposit below minimum",
            Self::InsufficientDeposit => "insufficient deposit",
            Self::InsufficientStamina => "insufficient stamina",
            Self::InsufficientFunds => "insufficient funds",
            Self::TooEarly => "withdrawal is not released yet",
            Self::NoPendingWithdrawal => "no pending withdrawal",
            Self::Overflow => "amount overflow",
        };

        write!(f, "{msg}")
    }
}

#[derive(Debug)]
pub enum LedgerErr {
    /// The operation was refused. The enclosing transaction is reverted.
    Stamina(StaminaErr),

    /// The store failed. Execution of the block cannot continue.
    Backend(StateBackendErr),
}

impl LedgerErr {
    #[must_use]
    pub fn kind(&self) -> Option<StaminaErr> {
        match self {
            Self::Stamina(kind) => Some(*kind),
            Self::Backend(_) => None,
        }
    }
}

impl From<StaminaErr> for LedgerErr {
    fn from(other: StaminaErr) -> Self {
        Self::Stamina(other)
    }
}

impl From<StateBackendErr> for LedgerErr {
    fn from(other: StateBackendErr) -> Self {
        Self::Backend(other)
    }
}

impl From<StateErr> for LedgerErr {
    fn from(other: StateErr) -> Self {
        match other {
            StateErr::InsufficientFunds => Self::Stamina(StaminaErr::InsufficientFunds),
            StateErr::Overflow => Self::Stamina(StaminaErr::Overflow),
            StateErr::Backend(err) => Self::Backend(err),
        }
    }
}

/// Ledger configuration written by `Init` or at genesis
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StaminaConfig {
    pub initialized: bool,
    pub min_deposit: Money,
    pub recovery_epoch_length: u64,
    pub withdrawal_delay: u64,
}

/// Stamina of a delegatee as seen at a given block
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DelegateeAccount {
    /// Sum of the deposits backing the delegatee, plus any operator grant
    pub capacity: Money,
    pub remaining: Money,
    pub last_update_block: u64,
    pub num_recovery: u64,
}
