// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{SlotReader, SlotStore};
use crate::consensus::{Money, STAMINA_ADDRESS};
use crate::primitives::{Address, Word};
use crate::stamina::keys::withdrawal_keys;
use crate::stamina::{read_money, read_u64, LedgerErr, StaminaErr};
use serde::{Deserialize, Serialize};

/// Pending withdrawal of a `(depositor, delegatee)` pair. There is at most one
/// per pair.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Money,
    pub release_block: u64,
}

impl WithdrawalRequest {
    /// Adds `amount` to the request and moves its release to `release_block`.
    /// Funds already waiting are not stranded by a second request.
    pub fn accumulate(self, amount: Money, release_block: u64) -> Result<Self, StaminaErr> {
        Ok(Self {
            amount: self
                .amount
                .checked_add(amount)
                .ok_or(StaminaErr::Overflow)?,
            release_block,
        })
    }

    #[must_use]
    pub fn is_released(&self, current_block: u64) -> bool {
        current_block >= self.release_block
    }
}

/// Reads the pending request of the pair. A request is pending when its
/// release block is set. Blocks carrying transactions start at height 1 so
/// a stored release block is never zero.
pub fn read_withdrawal<S: SlotReader>(
    store: &S,
    depositor: &Address,
    delegatee: &Address,
) -> Result<Option<WithdrawalRequest>, LedgerErr> {
    let (amount_key, release_key) = withdrawal_keys(depositor, delegatee);
    let release_block = read_u64(store, &release_key)?;

    if release_block == 0 {
        return Ok(None);
    }

    Ok(Some(WithdrawalRequest {
        amount: read_money(store, &amount_key)?,
        release_block,
    }))
}

pub fn write_withdrawal<S: SlotStore>(
    store: &mut S,
    depositor: &Address,
    delegatee: &Address,
    request: &WithdrawalRequest,
) -> Result<(), LedgerErr> {
    let (amount_key, release_key) = withdrawal_keys(depositor, delegatee);
    store.set_slot(&STAMINA_ADDRESS, &amount_key, Word::from_money(request.amount))?;
    store.set_slot(
        &STAMINA_ADDRESS,
        &release_key,
        Word::from_u64(request.release_block),
    )?;
    Ok(())
}

pub fn remove_withdrawal<S: SlotStore>(
    store: &mut S,
    depositor: &Address,
    delegatee: &Address,
) -> Result<(), LedgerErr> {
    let (amount_key, release_key) = withdrawal_keys(depositor, delegatee);
    store.set_slot(&STAMINA_ADDRESS, &amount_key, Word::zero())?;
    store.set_slot(&STAMINA_ADDRESS, &release_key, Word::zero())?;
    Ok(())
}
