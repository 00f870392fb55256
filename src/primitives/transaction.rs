// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{
    gas_cost, intrinsic_gas, money_check, Money, MAX_TX_GAS, STAMINA_ADDRESS,
};
use crate::primitives::{keccak256, Address, Hash256};
use crate::stamina::StaminaCall;
use bincode::error::{DecodeError as BincodeDecodeErr, EncodeError as BincodeEncodeErr};
use bincode::{Decode, Encode};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

pub const SIGNATURE_BYTES: usize = 65;

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
/// What a transaction does once its gas has been paid for
pub enum TxPayload {
    /// Moves `value` to `to`
    Transfer,

    /// Call into the stamina ledger. `to` must be the stamina address.
    Stamina(StaminaCall),
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
pub struct Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: Money,
    pub gas_limit: u64,
    pub to: Address,
    pub value: Money,
    pub payload: TxPayload,
}

impl Transaction {
    /// Hash that is signed by the sender
    pub fn signing_hash(&self) -> Result<[u8; 32], TxVerifyErr> {
        let encoded = crate::codec::encode_to_vec(self)?;
        Ok(keccak256(encoded))
    }

    pub fn sign(self, key: &SecretKey) -> Result<SignedTransaction, TxVerifyErr> {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest_slice(&self.signing_hash()?)
            .map_err(|_| TxVerifyErr::InvalidSignature)?;
        let (recid, compact) = secp.sign_ecdsa_recoverable(&msg, key).serialize_compact();
        let mut signature = Vec::with_capacity(SIGNATURE_BYTES);
        signature.extend_from_slice(&compact);
        signature.push(recid.to_i32() as u8);

        Ok(SignedTransaction {
            tx: self,
            signature,
        })
    }

    #[must_use]
    pub fn is_stamina_call(&self) -> bool {
        matches!(self.payload, TxPayload::Stamina(_))
    }

    #[must_use]
    pub fn intrinsic_gas(&self) -> u64 {
        intrinsic_gas(self.is_stamina_call())
    }

    /// Execution cost charged to whoever pays for the transaction. Gas is
    /// fixed per transaction kind so the cost is known before execution.
    pub fn fee(&self) -> Result<Money, TxVerifyErr> {
        gas_cost(self.intrinsic_gas(), self.gas_price).ok_or(TxVerifyErr::InvalidAmount)
    }

    /// Checks that do not depend on chain state
    pub fn verify_stateless(&self, chain_id: u64) -> Result<(), TxVerifyErr> {
        if self.chain_id != chain_id {
            return Err(TxVerifyErr::InvalidChainId);
        }

        if self.gas_limit < self.intrinsic_gas() {
            return Err(TxVerifyErr::IntrinsicGasTooLow);
        }

        if self.gas_limit > MAX_TX_GAS {
            return Err(TxVerifyErr::GasLimitTooHigh);
        }

        if !money_check(self.value) || !money_check(self.gas_price) {
            return Err(TxVerifyErr::InvalidAmount);
        }

        self.fee()?;

        match &self.payload {
            TxPayload::Transfer if self.to == STAMINA_ADDRESS => Err(TxVerifyErr::InvalidTarget),
            TxPayload::Transfer => Ok(()),
            TxPayload::Stamina(_) if self.to != STAMINA_ADDRESS => Err(TxVerifyErr::InvalidTarget),
            TxPayload::Stamina(StaminaCall::Deposit { .. }) => Ok(()),
            TxPayload::Stamina(_) if self.value != 0 => Err(TxVerifyErr::NonPayable),
            TxPayload::Stamina(StaminaCall::Init {
                recovery_epoch_length: 0,
                ..
            }) => Err(TxVerifyErr::ZeroRecoveryEpoch),
            TxPayload::Stamina(_) => Ok(()),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,

    /// Compact recoverable ECDSA signature followed by the recovery id
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    /// Recovers the address that signed the transaction
    pub fn sender(&self) -> Result<Address, TxVerifyErr> {
        if self.signature.len() != SIGNATURE_BYTES {
            return Err(TxVerifyErr::InvalidSignature);
        }

        let recid = RecoveryId::from_i32(i32::from(self.signature[64]))
            .map_err(|_| TxVerifyErr::InvalidSignature)?;
        let signature = RecoverableSignature::from_compact(&self.signature[..64], recid)
            .map_err(|_| TxVerifyErr::InvalidSignature)?;
        let msg = Message::from_digest_slice(&self.tx.signing_hash()?)
            .map_err(|_| TxVerifyErr::InvalidSignature)?;
        let public_key = Secp256k1::verification_only()
            .recover_ecdsa(&msg, &signature)
            .map_err(|_| TxVerifyErr::InvalidSignature)?;

        Ok(Address::from_public_key(&public_key))
    }

    pub fn hash(&self) -> Result<Hash256, TxVerifyErr> {
        Ok(Hash256::hash_from_slice(self.to_bytes()?, "tx"))
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, TxVerifyErr> {
        Ok(crate::codec::encode_to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TxVerifyErr> {
        Ok(crate::codec::decode(bytes)?)
    }

    /// Stateless verification. Returns the sender on success
    pub fn verify(&self, chain_id: u64) -> Result<Address, TxVerifyErr> {
        self.tx.verify_stateless(chain_id)?;
        self.sender()
    }
}

#[derive(Debug)]
pub enum TxVerifyErr {
    InvalidSignature,
    InvalidChainId,
    InvalidNonce,
    IntrinsicGasTooLow,
    GasLimitTooHigh,
    InvalidAmount,
    InvalidTarget,
    NonPayable,

    /// Stamina cannot be initialized with an empty recovery epoch
    ZeroRecoveryEpoch,
    BincodeEncode(BincodeEncodeErr),
    BincodeDecode(BincodeDecodeErr),
}

impl From<BincodeEncodeErr> for TxVerifyErr {
    fn from(other: BincodeEncodeErr) -> Self {
        Self::BincodeEncode(other)
    }
}

impl From<BincodeDecodeErr> for TxVerifyErr {
    fn from(other: BincodeDecodeErr) -> Self {
        Self::BincodeDecode(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::COIN;
    use secp256k1::PublicKey;

    fn transfer(to: Address, value: Money) -> Transaction {
        Transaction {
            chain_id: 1,
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            to,
            value,
            payload: TxPayload::Transfer,
        }
    }

    fn stamina_call(call: StaminaCall, value: Money) -> Transaction {
        Transaction {
            chain_id: 1,
            nonce: 0,
            gas_price: 1,
            gas_limit: 41_000,
            to: STAMINA_ADDRESS,
            value,
            payload: TxPayload::Stamina(call),
        }
    }

    #[test]
    fn it_recovers_sender() {
        let secp = Secp256k1::new();
        let key = SecretKey::new(&mut rand::thread_rng());
        let expected = Address::from_public_key(&PublicKey::from_secret_key(&secp, &key));
        let signed = transfer(Address::random(), 10).sign(&key).unwrap();
        assert_eq!(signed.signature.len(), SIGNATURE_BYTES);
        assert_eq!(signed.sender().unwrap(), expected);
        assert_eq!(signed.verify(1).unwrap(), expected);
    }

    #[test]
    fn tampering_changes_sender() {
        let key = SecretKey::new(&mut rand::thread_rng());
        let signed = transfer(Address::random(), 10).sign(&key).unwrap();
        let sender = signed.sender().unwrap();
        let mut tampered = signed.clone();
        tampered.tx.value = 11;
        assert_ne!(tampered.sender().ok(), Some(sender));
    }

    #[test]
    fn it_rejects_short_signature() {
        let key = SecretKey::new(&mut rand::thread_rng());
        let mut signed = transfer(Address::random(), 10).sign(&key).unwrap();
        signed.signature.pop();
        assert!(matches!(signed.sender(), Err(TxVerifyErr::InvalidSignature)));
    }

    #[test]
    fn bytes_roundtrip_keeps_hash() {
        let key = SecretKey::new(&mut rand::thread_rng());
        let signed = transfer(Address::random(), 10).sign(&key).unwrap();
        let decoded = SignedTransaction::from_bytes(&signed.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.hash().unwrap(), signed.hash().unwrap());
    }

    #[test]
    fn it_computes_fee() {
        assert_eq!(transfer(Address::random(), 0).fee().unwrap(), 21_000);
        let call = stamina_call(
            StaminaCall::SetDelegator {
                spender: Address::random(),
            },
            0,
        );
        assert_eq!(call.fee().unwrap(), 41_000);
    }

    #[test]
    fn it_verifies_chain_id_and_gas() {
        let tx = transfer(Address::random(), 0);
        assert!(tx.verify_stateless(1).is_ok());
        assert!(matches!(
            tx.verify_stateless(2),
            Err(TxVerifyErr::InvalidChainId)
        ));

        let mut low = tx.clone();
        low.gas_limit = 20_999;
        assert!(matches!(
            low.verify_stateless(1),
            Err(TxVerifyErr::IntrinsicGasTooLow)
        ));

        let mut high = tx;
        high.gas_limit = MAX_TX_GAS + 1;
        assert!(matches!(
            high.verify_stateless(1),
            Err(TxVerifyErr::GasLimitTooHigh)
        ));
    }

    #[test]
    fn stamina_calls_target_stamina_address() {
        let mut call = stamina_call(
            StaminaCall::Deposit {
                delegatee: Address::random(),
            },
            COIN,
        );
        assert!(call.verify_stateless(1).is_ok());
        call.to = Address::random();
        assert!(matches!(
            call.verify_stateless(1),
            Err(TxVerifyErr::InvalidTarget)
        ));

        let transfer = transfer(STAMINA_ADDRESS, 1);
        assert!(matches!(
            transfer.verify_stateless(1),
            Err(TxVerifyErr::InvalidTarget)
        ));
    }

    #[test]
    fn only_deposit_is_payable() {
        let call = stamina_call(
            StaminaCall::FinalizeWithdrawal {
                delegatee: Address::random(),
            },
            1,
        );
        assert!(matches!(
            call.verify_stateless(1),
            Err(TxVerifyErr::NonPayable)
        ));
    }

    #[test]
    fn init_needs_recovery_epoch() {
        let init = |recovery_epoch_length| {
            stamina_call(
                StaminaCall::Init {
                    min_deposit: COIN,
                    recovery_epoch_length,
                    withdrawal_delay: 10,
                },
                0,
            )
        };

        assert!(matches!(
            init(0).verify_stateless(1),
            Err(TxVerifyErr::ZeroRecoveryEpoch)
        ));
        assert!(init(1).verify_stateless(1).is_ok());
    }
}
