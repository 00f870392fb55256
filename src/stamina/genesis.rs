// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::{SlotStore, StateBackendErr};
use crate::consensus::{
    Money, DEFAULT_MIN_DEPOSIT, DEFAULT_OPERATOR_STAMINA, DEFAULT_RECOVER_EPOCH_LENGTH,
    DEFAULT_WITHDRAWAL_DELAY, STAMINA_ADDRESS,
};
use crate::primitives::{Address, Word};
use crate::stamina::keys::*;
use log::*;
use serde::{Deserialize, Serialize};

/// Stamina state written into the genesis block
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct StaminaGenesis {
    pub min_deposit: Money,
    pub recovery_epoch_length: u64,
    pub withdrawal_delay: u64,

    /// Capacity and remaining stamina of the operator
    pub operator_stamina: Money,
}

impl Default for StaminaGenesis {
    fn default() -> Self {
        Self {
            min_deposit: DEFAULT_MIN_DEPOSIT,
            recovery_epoch_length: DEFAULT_RECOVER_EPOCH_LENGTH,
            withdrawal_delay: DEFAULT_WITHDRAWAL_DELAY,
            operator_stamina: DEFAULT_OPERATOR_STAMINA,
        }
    }
}

/// Writes an initialized ledger directly into the stamina slots, with no
/// transaction behind it. The operator starts with a funded account.
pub fn write_genesis<S: SlotStore>(
    store: &mut S,
    genesis: &StaminaGenesis,
    operator: &Address,
) -> Result<(), StateBackendErr> {
    let block = store.block_number();
    let slots = [
        (initialized_key(), Word::from_bool(true)),
        (min_deposit_key(), Word::from_money(genesis.min_deposit)),
        (
            recover_epoch_length_key(),
            Word::from_u64(genesis.recovery_epoch_length),
        ),
        (
            withdrawal_delay_key(),
            Word::from_u64(genesis.withdrawal_delay),
        ),
        (
            total_deposit_key(operator),
            Word::from_money(genesis.operator_stamina),
        ),
        (
            stamina_key(operator),
            Word::from_money(genesis.operator_stamina),
        ),
        (last_recovery_block_key(operator), Word::from_u64(block)),
    ];

    for (slot, value) in &slots {
        store.set_slot(&STAMINA_ADDRESS, slot, *value)?;
    }

    info!(
        "Wrote stamina genesis: operator {operator} with {} stamina",
        genesis.operator_stamina
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MemorySlots, SlotReader};
    use crate::stamina::StaminaLedger;

    fn operator() -> Address {
        Address::from_hex("0x71562b71999873db5b286df957af199ec94617f7").unwrap()
    }

    #[test]
    fn it_writes_genesis_slots() {
        let genesis = StaminaGenesis {
            min_deposit: 100,
            recovery_epoch_length: 10,
            withdrawal_delay: 50,
            operator_stamina: 5_000_000_000,
        };
        let mut store = MemorySlots::at_block(0);
        write_genesis(&mut store, &genesis, &operator()).unwrap();

        let read = |slot| store.get_slot(&STAMINA_ADDRESS, &slot).unwrap();
        assert_eq!(read(initialized_key()), Word::from_bool(true));
        assert_eq!(read(min_deposit_key()).to_money(), Some(100));
        assert_eq!(read(recover_epoch_length_key()).to_u64(), Some(10));
        assert_eq!(read(withdrawal_delay_key()).to_u64(), Some(50));
        assert_eq!(read(stamina_key(&operator())).to_money(), Some(5_000_000_000));
        assert_eq!(
            read(total_deposit_key(&operator())).to_money(),
            Some(5_000_000_000)
        );
    }

    #[test]
    fn genesis_ledger_is_initialized() {
        let ledger = StaminaLedger::with_operator(operator());
        let mut store = MemorySlots::at_block(0);
        write_genesis(&mut store, &StaminaGenesis::default(), &operator()).unwrap();
        store.set_block_number(1);

        assert!(ledger.initialized(&store).unwrap());
        assert_eq!(
            ledger.get_stamina(&store, &operator()).unwrap(),
            DEFAULT_OPERATOR_STAMINA
        );

        let res = ledger.init(&mut store, &operator(), 1, 1, 1);
        assert_eq!(
            res.unwrap_err().kind(),
            Some(crate::stamina::StaminaErr::AlreadyInitialized)
        );
    }
}
