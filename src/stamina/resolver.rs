// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{BalanceStore, SlotStore, StateBackendErr, StateErr};
use crate::consensus::Money;
use crate::primitives::Address;
use crate::stamina::{LedgerErr, StaminaLedger};
use bincode::{Decode, Encode};
use log::*;
use serde::{Deserialize, Serialize};

/// Source that paid the execution cost of a transaction
#[derive(PartialEq, Eq, Debug, Clone, Copy, Encode, Decode, Serialize, Deserialize)]
pub enum GasPayer {
    /// Paid out of the stamina of the given delegatee
    Stamina(Address),

    /// Paid out of the sender's native balance
    Native,
}

#[derive(Debug)]
pub enum ResolveErr {
    /// Neither stamina nor native balance can pay. The transaction is not executed.
    InsufficientFunds,

    /// Store failure
    Backend(StateBackendErr),
}

impl From<StateBackendErr> for ResolveErr {
    fn from(other: StateBackendErr) -> Self {
        Self::Backend(other)
    }
}

/// Charges `cost` for a transaction sent by `sender`.
///
/// The delegatee of the sender pays when it has enough stamina. Otherwise the
/// sender pays from its native balance. The cost is never split between the
/// two, and when neither can pay nothing is written.
pub fn resolve_gas_payer<S: SlotStore + BalanceStore>(
    ledger: &StaminaLedger,
    store: &mut S,
    sender: &Address,
    cost: Money,
) -> Result<GasPayer, ResolveErr> {
    let delegatee = match ledger.get_delegatee(store, sender) {
        Ok(delegatee) => delegatee,
        Err(LedgerErr::Backend(err)) => return Err(err.into()),
        Err(LedgerErr::Stamina(_)) => None,
    };

    if let Some(delegatee) = delegatee {
        match ledger.consume(store, &delegatee, cost) {
            Ok(()) => {
                trace!("Fee of {cost} for {sender} paid by delegatee {delegatee}");
                return Ok(GasPayer::Stamina(delegatee));
            }
            Err(LedgerErr::Stamina(err)) => {
                debug!("Delegatee {delegatee} cannot pay for {sender}: {err}, falling back to native balance");
            }
            Err(LedgerErr::Backend(err)) => return Err(err.into()),
        }
    }

    match store.debit(sender, cost) {
        Ok(()) => Ok(GasPayer::Native),
        Err(StateErr::InsufficientFunds | StateErr::Overflow) => Err(ResolveErr::InsufficientFunds),
        Err(StateErr::Backend(err)) => Err(err.into()),
    }
}
