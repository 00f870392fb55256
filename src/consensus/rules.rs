// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::Address;
use static_assertions::*;

/// Money type. Amounts are unsigned and persisted as 32 byte big-endian words.
pub type Money = u128;

/// Smallest units per coin
pub const COIN: Money = 1_000_000_000_000_000_000;

/// Gas charged for every transaction
pub const TX_GAS: u64 = 21_000;

/// Additional gas charged for a call into the stamina ledger
pub const STAMINA_CALL_GAS: u64 = 20_000;

/// Upper bound on the gas limit of a single transaction
pub const MAX_TX_GAS: u64 = 10_000_000;

/// Max number of transactions included in a block
pub const MAX_TXS_PER_BLOCK: usize = 4_096;

/// New blocks with timestamps greater than `current_time + n` will be rejected. Expressed in seconds
pub const BLOCK_TIMESTAMP_MAX: i64 = 60;

/// Account whose storage holds the stamina ledger and whose native balance
/// escrows deposits.
pub const STAMINA_ADDRESS: Address = Address([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xde, 0xad,
]);

/// Default minimum first deposit for a (depositor, delegatee) pair
pub const DEFAULT_MIN_DEPOSIT: Money = COIN / 2;

/// Default number of blocks after which a delegatee's stamina refills
pub const DEFAULT_RECOVER_EPOCH_LENGTH: u64 = 120_960;

/// Default number of blocks between requesting and finalizing a withdrawal
pub const DEFAULT_WITHDRAWAL_DELAY: u64 = DEFAULT_RECOVER_EPOCH_LENGTH * 3;

/// Stamina granted to the chain operator at genesis or on `Init`, so the
/// network has a working sponsor before any deposit happens.
pub const DEFAULT_OPERATOR_STAMINA: Money = COIN * 1_000_000;

/// Money check
pub fn money_check(amount: Money) -> bool {
    amount <= Money::MAX / 2
}

/// Intrinsic gas of a transaction
pub fn intrinsic_gas(is_stamina_call: bool) -> u64 {
    if is_stamina_call {
        TX_GAS + STAMINA_CALL_GAS
    } else {
        TX_GAS
    }
}

/// Total cost of `gas` at `gas_price`. Returns `None` on overflow.
pub fn gas_cost(gas: u64, gas_price: Money) -> Option<Money> {
    Money::from(gas).checked_mul(gas_price)
}

const_assert!(COIN > 0);
const_assert!(TX_GAS == 21_000);
const_assert!(MAX_TX_GAS > TX_GAS + STAMINA_CALL_GAS);
const_assert!(DEFAULT_MIN_DEPOSIT > 0);
const_assert!(DEFAULT_RECOVER_EPOCH_LENGTH > 0);
const_assert!(DEFAULT_WITHDRAWAL_DELAY >= DEFAULT_RECOVER_EPOCH_LENGTH);
const_assert!(DEFAULT_OPERATOR_STAMINA < Money::MAX / 2);
