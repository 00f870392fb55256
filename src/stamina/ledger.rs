// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{BalanceStore, SlotReader, SlotStore, StateBackendErr};
use crate::consensus::{Money, DEFAULT_OPERATOR_STAMINA, STAMINA_ADDRESS};
use crate::primitives::{Address, Hash256, Word};
use crate::stamina::keys::*;
use crate::stamina::{
    read_withdrawal, remove_withdrawal, write_withdrawal, DelegateeAccount, LedgerErr,
    StaminaCall, StaminaConfig, StaminaErr, WithdrawalRequest,
};
use log::*;

pub fn read_word<S: SlotReader>(store: &S, slot: &Hash256) -> Result<Word, LedgerErr> {
    Ok(store.get_slot(&STAMINA_ADDRESS, slot)?)
}

pub fn read_money<S: SlotReader>(store: &S, slot: &Hash256) -> Result<Money, LedgerErr> {
    read_word(store, slot)?
        .to_money()
        .ok_or(LedgerErr::Backend(StateBackendErr::CorruptData))
}

pub fn read_u64<S: SlotReader>(store: &S, slot: &Hash256) -> Result<u64, LedgerErr> {
    read_word(store, slot)?
        .to_u64()
        .ok_or(LedgerErr::Backend(StateBackendErr::CorruptData))
}

fn write<S: SlotStore>(store: &mut S, slot: &Hash256, value: Word) -> Result<(), LedgerErr> {
    Ok(store.set_slot(&STAMINA_ADDRESS, slot, value)?)
}

/// The stamina ledger. Holds no state of its own, every call reads and
/// writes the store it is given.
#[derive(Debug, Clone)]
pub struct StaminaLedger {
    /// Only account allowed to call `Init`
    owner: Address,

    /// Account seeded with stamina on `Init`
    operator: Address,

    /// Stamina granted to the operator on `Init`
    operator_stamina: Money,
}

impl StaminaLedger {
    #[must_use]
    pub fn new(owner: Address, operator: Address, operator_stamina: Money) -> Self {
        Self {
            owner,
            operator,
            operator_stamina,
        }
    }

    /// Ledger where the operator is also the owner
    #[must_use]
    pub fn with_operator(operator: Address) -> Self {
        Self::new(operator, operator, DEFAULT_OPERATOR_STAMINA)
    }

    #[must_use]
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    #[must_use]
    pub fn operator(&self) -> &Address {
        &self.operator
    }

    pub fn initialized<S: SlotReader>(&self, store: &S) -> Result<bool, LedgerErr> {
        Ok(read_word(store, &initialized_key())?.to_bool())
    }

    pub fn config<S: SlotReader>(&self, store: &S) -> Result<StaminaConfig, LedgerErr> {
        Ok(StaminaConfig {
            initialized: self.initialized(store)?,
            min_deposit: read_money(store, &min_deposit_key())?,
            recovery_epoch_length: read_u64(store, &recover_epoch_length_key())?,
            withdrawal_delay: read_u64(store, &withdrawal_delay_key())?,
        })
    }

    pub fn get_deposit<S: SlotReader>(
        &self,
        store: &S,
        depositor: &Address,
        delegatee: &Address,
    ) -> Result<Money, LedgerErr> {
        read_money(store, &deposit_key(depositor, delegatee))
    }

    /// Returns the delegatee paying for `spender`, if any
    pub fn get_delegatee<S: SlotReader>(
        &self,
        store: &S,
        spender: &Address,
    ) -> Result<Option<Address>, LedgerErr> {
        let word = read_word(store, &delegatee_key(spender))?;

        if word.is_zero() {
            return Ok(None);
        }

        Ok(Some(word.to_address()))
    }

    /// Remaining stamina of `delegatee` at the store's block, recovery included
    pub fn get_stamina<S: SlotReader>(
        &self,
        store: &S,
        delegatee: &Address,
    ) -> Result<Money, LedgerErr> {
        Ok(self.get_delegatee_account(store, delegatee)?.remaining)
    }

    pub fn get_total_deposit<S: SlotReader>(
        &self,
        store: &S,
        delegatee: &Address,
    ) -> Result<Money, LedgerErr> {
        read_money(store, &total_deposit_key(delegatee))
    }

    pub fn get_num_recovery<S: SlotReader>(
        &self,
        store: &S,
        delegatee: &Address,
    ) -> Result<u64, LedgerErr> {
        Ok(self.get_delegatee_account(store, delegatee)?.num_recovery)
    }

    pub fn get_withdrawal<S: SlotReader>(
        &self,
        store: &S,
        depositor: &Address,
        delegatee: &Address,
    ) -> Result<Option<WithdrawalRequest>, LedgerErr> {
        read_withdrawal(store, depositor, delegatee)
    }

    /// Account of `delegatee` as of the store's block. Recovery is applied
    /// on read, nothing is written.
    pub fn get_delegatee_account<S: SlotReader>(
        &self,
        store: &S,
        delegatee: &Address,
    ) -> Result<DelegateeAccount, LedgerErr> {
        let epoch = read_u64(store, &recover_epoch_length_key())?;
        Ok(self
            .read_account(store, delegatee)?
            .recovered(store.block_number(), epoch))
    }

    fn read_account<S: SlotReader>(
        &self,
        store: &S,
        delegatee: &Address,
    ) -> Result<DelegateeAccount, LedgerErr> {
        Ok(DelegateeAccount {
            capacity: read_money(store, &total_deposit_key(delegatee))?,
            remaining: read_money(store, &stamina_key(delegatee))?,
            last_update_block: read_u64(store, &last_recovery_block_key(delegatee))?,
            num_recovery: read_u64(store, &num_recovery_key(delegatee))?,
        })
    }

    fn write_account<S: SlotStore>(
        &self,
        store: &mut S,
        delegatee: &Address,
        account: &DelegateeAccount,
    ) -> Result<(), LedgerErr> {
        write(
            store,
            &total_deposit_key(delegatee),
            Word::from_money(account.capacity),
        )?;
        write(
            store,
            &stamina_key(delegatee),
            Word::from_money(account.remaining),
        )?;
        write(
            store,
            &last_recovery_block_key(delegatee),
            Word::from_u64(account.last_update_block),
        )?;
        write(
            store,
            &num_recovery_key(delegatee),
            Word::from_u64(account.num_recovery),
        )
    }

    fn ensure_initialized<S: SlotReader>(&self, store: &S) -> Result<StaminaConfig, LedgerErr> {
        let config = self.config(store)?;

        if !config.initialized {
            return Err(StaminaErr::NotInitialized.into());
        }

        Ok(config)
    }

    pub fn init<S: SlotStore>(
        &self,
        store: &mut S,
        caller: &Address,
        min_deposit: Money,
        recovery_epoch_length: u64,
        withdrawal_delay: u64,
    ) -> Result<(), LedgerErr> {
        if self.initialized(store)? {
            return Err(StaminaErr::AlreadyInitialized.into());
        }

        if caller != &self.owner {
            return Err(StaminaErr::Unauthorized.into());
        }

        let operator = self.read_account(store, &self.operator)?;
        let grant = DelegateeAccount {
            capacity: operator
                .capacity
                .checked_add(self.operator_stamina)
                .ok_or(StaminaErr::Overflow)?,
            remaining: operator
                .remaining
                .checked_add(self.operator_stamina)
                .ok_or(StaminaErr::Overflow)?,
            last_update_block: store.block_number(),
            num_recovery: operator.num_recovery,
        };

        write(store, &initialized_key(), Word::from_bool(true))?;
        write(store, &min_deposit_key(), Word::from_money(min_deposit))?;
        write(
            store,
            &recover_epoch_length_key(),
            Word::from_u64(recovery_epoch_length),
        )?;
        write(
            store,
            &withdrawal_delay_key(),
            Word::from_u64(withdrawal_delay),
        )?;
        self.write_account(store, &self.operator, &grant)?;

        info!(
            "Stamina initialized by {caller}: min deposit {min_deposit}, epoch {recovery_epoch_length}, withdrawal delay {withdrawal_delay}"
        );
        Ok(())
    }

    /// Credits `amount` of stamina to `delegatee`. The native value has
    /// already been moved to the stamina address by the caller.
    pub fn deposit<S: SlotStore>(
        &self,
        store: &mut S,
        depositor: &Address,
        delegatee: &Address,
        amount: Money,
    ) -> Result<(), LedgerErr> {
        let config = self.ensure_initialized(store)?;
        let prior = self.get_deposit(store, depositor, delegatee)?;

        // Only the first deposit of a pair is checked against the minimum
        if prior == 0 && amount < config.min_deposit {
            return Err(StaminaErr::BelowMinimum.into());
        }

        let deposit = prior.checked_add(amount).ok_or(StaminaErr::Overflow)?;
        let mut account = self
            .read_account(store, delegatee)?
            .recovered(store.block_number(), config.recovery_epoch_length);
        account.capacity = account
            .capacity
            .checked_add(amount)
            .ok_or(StaminaErr::Overflow)?;
        account.remaining = account
            .remaining
            .checked_add(amount)
            .ok_or(StaminaErr::Overflow)?;

        write(
            store,
            &deposit_key(depositor, delegatee),
            Word::from_money(deposit),
        )?;
        self.write_account(store, delegatee, &account)?;

        debug!("Deposit of {amount} from {depositor} to {delegatee}");
        Ok(())
    }

    /// `delegatee` claims `spender`, replacing any previous delegatee
    pub fn set_delegator<S: SlotStore>(
        &self,
        store: &mut S,
        delegatee: &Address,
        spender: &Address,
    ) -> Result<(), LedgerErr> {
        self.ensure_initialized(store)?;
        write(store, &delegatee_key(spender), delegatee.to_word())?;
        debug!("{delegatee} is now the delegatee of {spender}");
        Ok(())
    }

    /// Takes `amount` from the stamina of `delegatee`
    pub fn consume<S: SlotStore>(
        &self,
        store: &mut S,
        delegatee: &Address,
        amount: Money,
    ) -> Result<(), LedgerErr> {
        let config = self.ensure_initialized(store)?;
        let current = store.block_number();
        let mut account = self
            .read_account(store, delegatee)?
            .recovered(current, config.recovery_epoch_length);

        if account.remaining < amount {
            return Err(StaminaErr::InsufficientStamina.into());
        }

        account.remaining -= amount;
        account.last_update_block = current;
        self.write_account(store, delegatee, &account)?;

        trace!("Consumed {amount} stamina of {delegatee}");
        Ok(())
    }

    /// Removes `amount` from the deposit of the pair and queues it for
    /// release after the withdrawal delay. The funds stop backing stamina
    /// immediately.
    pub fn request_withdrawal<S: SlotStore>(
        &self,
        store: &mut S,
        depositor: &Address,
        delegatee: &Address,
        amount: Money,
    ) -> Result<(), LedgerErr> {
        let config = self.ensure_initialized(store)?;
        let current = store.block_number();
        let prior = self.get_deposit(store, depositor, delegatee)?;

        // An empty request would only push back the release of a pending one
        if amount == 0 || amount > prior {
            return Err(StaminaErr::InsufficientDeposit.into());
        }

        let mut account = self
            .read_account(store, delegatee)?
            .recovered(current, config.recovery_epoch_length);
        account.capacity = account
            .capacity
            .checked_sub(amount)
            .ok_or(LedgerErr::Backend(StateBackendErr::CorruptData))?;
        account.remaining = account.remaining.min(account.capacity);

        let release_block = current
            .checked_add(config.withdrawal_delay)
            .ok_or(StaminaErr::Overflow)?;
        let request = read_withdrawal(store, depositor, delegatee)?
            .unwrap_or(WithdrawalRequest {
                amount: 0,
                release_block,
            })
            .accumulate(amount, release_block)?;

        write(
            store,
            &deposit_key(depositor, delegatee),
            Word::from_money(prior - amount),
        )?;
        self.write_account(store, delegatee, &account)?;
        write_withdrawal(store, depositor, delegatee, &request)?;

        debug!(
            "Withdrawal of {amount} from {delegatee} requested by {depositor}, release at {}",
            request.release_block
        );
        Ok(())
    }

    /// Pays a released withdrawal back to `depositor`. Returns the amount paid.
    pub fn finalize_withdrawal<S: SlotStore + BalanceStore>(
        &self,
        store: &mut S,
        depositor: &Address,
        delegatee: &Address,
    ) -> Result<Money, LedgerErr> {
        self.ensure_initialized(store)?;
        let request = read_withdrawal(store, depositor, delegatee)?
            .ok_or(StaminaErr::NoPendingWithdrawal)?;

        if !request.is_released(store.block_number()) {
            return Err(StaminaErr::TooEarly.into());
        }

        if store.balance(&STAMINA_ADDRESS)? < request.amount {
            return Err(LedgerErr::Backend(StateBackendErr::CorruptData));
        }

        store
            .balance(depositor)?
            .checked_add(request.amount)
            .ok_or(StaminaErr::Overflow)?;

        store.debit(&STAMINA_ADDRESS, request.amount)?;
        store.credit(depositor, request.amount)?;
        remove_withdrawal(store, depositor, delegatee)?;

        debug!(
            "Withdrawal of {} from {delegatee} paid to {depositor}",
            request.amount
        );
        Ok(request.amount)
    }

    /// Executes a ledger call sent by `caller` with `value` attached. The
    /// value has already been transferred to the stamina address.
    pub fn dispatch<S: SlotStore + BalanceStore>(
        &self,
        store: &mut S,
        caller: &Address,
        value: Money,
        call: &StaminaCall,
    ) -> Result<(), LedgerErr> {
        match call {
            StaminaCall::Init {
                min_deposit,
                recovery_epoch_length,
                withdrawal_delay,
            } => self.init(
                store,
                caller,
                *min_deposit,
                *recovery_epoch_length,
                *withdrawal_delay,
            ),
            StaminaCall::Deposit { delegatee } => self.deposit(store, caller, delegatee, value),
            StaminaCall::SetDelegator { spender } => self.set_delegator(store, caller, spender),
            StaminaCall::RequestWithdrawal { delegatee, amount } => {
                self.request_withdrawal(store, caller, delegatee, *amount)
            }
            StaminaCall::FinalizeWithdrawal { delegatee } => self
                .finalize_withdrawal(store, caller, delegatee)
                .map(|_| ()),
        }
    }
}
