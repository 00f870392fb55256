// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Storage layout of the stamina ledger.
//!
//! Every field lives in the storage of [`STAMINA_ADDRESS`] and is addressed
//! the same way a Solidity compiler lays out state variables:
//!
//! * a scalar at index `p` sits at slot `p`
//! * `mapping(address => T)` at `p` puts `key` at `keccak256(pad32(key) || p)`
//! * `mapping(address => mapping(address => T))` at `p` puts `(outer, inner)` at
//!   `keccak256(pad32(inner) || keccak256(pad32(outer) || p))`
//! * struct members follow consecutively from the derived slot
//!
//! These slots are part of the persisted state, so changing anything here is
//! a hard fork.
//!
//! [`STAMINA_ADDRESS`]: crate::consensus::STAMINA_ADDRESS

use crate::primitives::{keccak256, Address, Hash256, WORD_BYTES};

/// Field indices of the stamina ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Field {
    /// `spender => delegatee`
    Delegatee = 0,

    /// `delegatee => remaining stamina`
    Stamina = 1,

    /// `delegatee => capacity`
    TotalDeposit = 2,

    /// `depositor => delegatee => amount`
    Deposit = 3,

    /// `delegatee => block of the last consumption or refill`
    LastRecoveryBlock = 4,

    /// `delegatee => number of refills`
    NumRecovery = 5,

    /// `depositor => delegatee => { amount, release_block }`
    Withdrawal = 6,

    Initialized = 8,
    MinDeposit = 9,
    RecoverEpochLength = 10,
    WithdrawalDelay = 11,
}

impl Field {
    #[must_use]
    pub fn index(self) -> u64 {
        self as u64
    }
}

/// Offset of `WithdrawalRequest.amount` from the request's base slot
pub const WITHDRAWAL_AMOUNT_OFFSET: u64 = 0;

/// Offset of `WithdrawalRequest.release_block` from the request's base slot
pub const WITHDRAWAL_RELEASE_OFFSET: u64 = 1;

#[must_use]
pub fn scalar_key(field: Field) -> Hash256 {
    Hash256::from_u64(field.index())
}

#[must_use]
pub fn mapping_key(field: Field, key: &Address) -> Hash256 {
    derive(key, &scalar_key(field))
}

#[must_use]
pub fn nested_mapping_key(field: Field, outer: &Address, inner: &Address) -> Hash256 {
    derive(inner, &mapping_key(field, outer))
}

#[inline]
fn derive(key: &Address, base: &Hash256) -> Hash256 {
    let mut buf = [0; WORD_BYTES * 2];
    buf[..WORD_BYTES].copy_from_slice(&key.to_word().0);
    buf[WORD_BYTES..].copy_from_slice(base.as_bytes());
    Hash256(keccak256(buf))
}

#[must_use]
pub fn initialized_key() -> Hash256 {
    scalar_key(Field::Initialized)
}

#[must_use]
pub fn min_deposit_key() -> Hash256 {
    scalar_key(Field::MinDeposit)
}

#[must_use]
pub fn recover_epoch_length_key() -> Hash256 {
    scalar_key(Field::RecoverEpochLength)
}

#[must_use]
pub fn withdrawal_delay_key() -> Hash256 {
    scalar_key(Field::WithdrawalDelay)
}

#[must_use]
pub fn delegatee_key(spender: &Address) -> Hash256 {
    mapping_key(Field::Delegatee, spender)
}

#[must_use]
pub fn stamina_key(delegatee: &Address) -> Hash256 {
    mapping_key(Field::Stamina, delegatee)
}

#[must_use]
pub fn total_deposit_key(delegatee: &Address) -> Hash256 {
    mapping_key(Field::TotalDeposit, delegatee)
}

#[must_use]
pub fn last_recovery_block_key(delegatee: &Address) -> Hash256 {
    mapping_key(Field::LastRecoveryBlock, delegatee)
}

#[must_use]
pub fn num_recovery_key(delegatee: &Address) -> Hash256 {
    mapping_key(Field::NumRecovery, delegatee)
}

#[must_use]
pub fn deposit_key(depositor: &Address, delegatee: &Address) -> Hash256 {
    nested_mapping_key(Field::Deposit, depositor, delegatee)
}

/// Returns the `(amount, release_block)` slots of a withdrawal request
#[must_use]
pub fn withdrawal_keys(depositor: &Address, delegatee: &Address) -> (Hash256, Hash256) {
    let base = nested_mapping_key(Field::Withdrawal, depositor, delegatee);
    (
        base.offset(WITHDRAWAL_AMOUNT_OFFSET),
        base.offset(WITHDRAWAL_RELEASE_OFFSET),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::*;

    fn operator() -> Address {
        Address::from_hex("0x71562b71999873db5b286df957af199ec94617f7").unwrap()
    }

    fn delegatee() -> Address {
        Address::from_hex("0x0d3ab14bbad3d99f4203bd7a11acb94882050e7e").unwrap()
    }

    #[test]
    fn scalar_keys_are_indices() {
        assert_eq!(initialized_key(), Hash256::from_u64(8));
        assert_eq!(min_deposit_key(), Hash256::from_u64(9));
        assert_eq!(recover_epoch_length_key(), Hash256::from_u64(10));
        assert_eq!(withdrawal_delay_key(), Hash256::from_u64(11));
    }

    #[test]
    fn mapping_key_matches_solidity_layout() {
        // mapping(address => T) at slot 0 with the zero address as key
        assert_eq!(
            delegatee_key(&Address::zero()).to_hex(),
            "0xad3228b676f7d3cd4284a5443f17f1962b36e491b30a40b2405849e597ba5fb5"
        );
        assert_eq!(
            stamina_key(&operator()).to_hex(),
            "0x9541d803110b392ecde8e03af7ae34d4457eb4934dac09903ccee819bec4a355"
        );
        assert_eq!(
            delegatee_key(&operator()).to_hex(),
            "0x78b708b837682e6270dbef34cca5b6d3a3fb2b6c6b8bd38a36a62bed9cf03033"
        );
    }

    #[test]
    fn nested_mapping_key_matches_solidity_layout() {
        assert_eq!(
            deposit_key(&operator(), &delegatee()).to_hex(),
            "0x8242baba288fc4a79c6658ad2ecc4cd272ad18fc68e8acde5b8ad44b46ada102"
        );
    }

    #[test]
    fn withdrawal_struct_fields_are_consecutive() {
        let (amount, release) = withdrawal_keys(&operator(), &delegatee());
        assert_eq!(
            amount.to_hex(),
            "0x4df65681f4c14c654971a8d59bf07c3370b85aa3e9af82493a0a2b49f75cc554"
        );
        assert_eq!(
            release.to_hex(),
            "0x4df65681f4c14c654971a8d59bf07c3370b85aa3e9af82493a0a2b49f75cc555"
        );
    }

    quickcheck! {
        fn nested_key_is_ordered(a: Address, b: Address) -> TestResult {
            if a == b {
                return TestResult::discard();
            }

            TestResult::from_bool(deposit_key(&a, &b) != deposit_key(&b, &a))
        }

        fn fields_do_not_collide(a: Address) -> bool {
            let keys = [
                delegatee_key(&a),
                stamina_key(&a),
                total_deposit_key(&a),
                last_recovery_block_key(&a),
                num_recovery_key(&a),
            ];

            keys.iter()
                .enumerate()
                .all(|(i, k)| keys.iter().skip(i + 1).all(|o| o != k))
        }
    }
}
