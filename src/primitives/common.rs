// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::Money;
use bincode::{Decode, Encode};
use lazy_static::lazy_static;
use rand::Rng;
use secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::hash::Hash as HashTrait;
use std::str;

pub const ADDRESS_BYTES: usize = 20;
pub const WORD_BYTES: usize = 32;

const HASH_KEY_PREFIX: &str = "stamina.hash.";

lazy_static! {
    static ref HASH_KEY256_OWNED: String = format!("{}", 32);
    static ref HASH_KEY256: &'static str = &HASH_KEY256_OWNED;
}

/// Keccak-256 of the given bytes. Used wherever the persisted format has to
/// match EVM-style tooling: storage slot derivation, addresses and signing hashes.
#[inline]
#[must_use]
pub fn keccak256<T: AsRef<[u8]>>(bytes: T) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes.as_ref());
    let mut out = [0; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, HashTrait, Default, Encode, Decode)]
pub struct Address(pub [u8; ADDRESS_BYTES]);

impl Address {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn zero() -> Self {
        Self([0; ADDRESS_BYTES])
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; ADDRESS_BYTES]
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(hexstr: &str) -> Result<Self, &'static str> {
        let stripped = hexstr.strip_prefix("0x").unwrap_or(hexstr);
        let bytes = hex::decode(stripped).map_err(|_| "invalid address")?;

        if bytes.len() != ADDRESS_BYTES {
            return Err("invalid address length");
        }

        let mut out = Self::zero();
        out.0.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Address of a secp256k1 public key: the last 20 bytes of the keccak
    /// hash of the uncompressed key without its tag byte.
    #[must_use]
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let serialized = public_key.serialize_uncompressed();
        let hash = keccak256(&serialized[1..]);
        let mut out = Self::zero();
        out.0.copy_from_slice(&hash[12..]);
        out
    }

    /// Left-pads the address to a 32 byte word
    #[must_use]
    pub fn to_word(&self) -> Word {
        let mut out = Word::zero();
        out.0[WORD_BYTES - ADDRESS_BYTES..].copy_from_slice(&self.0);
        out
    }

    #[cfg(test)]
    #[must_use]
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        String::serialize(&self.to_hex(), serializer)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Address::from_hex(&string).map_err(|err| serde::de::Error::custom(err.to_owned()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Address {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        // Small address space so generated operations collide on the same accounts
        let idx = u8::arbitrary(g) % 4 + 1;
        let mut out = Self::zero();
        out.0[ADDRESS_BYTES - 1] = idx;
        out
    }
}

/// A 32 byte storage value. Integers are stored big-endian, addresses
/// left-padded and booleans in the last byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, HashTrait, Default, Encode, Decode)]
pub struct Word(pub [u8; WORD_BYTES]);

impl Word {
    #[must_use]
    pub fn zero() -> Self {
        Self([0; WORD_BYTES])
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; WORD_BYTES]
    }

    #[must_use]
    pub fn from_money(amount: Money) -> Self {
        let mut out = Self::zero();
        out.0[16..].copy_from_slice(&amount.to_be_bytes());
        out
    }

    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        let mut out = Self::zero();
        out.0[24..].copy_from_slice(&v.to_be_bytes());
        out
    }

    #[must_use]
    pub fn from_bool(v: bool) -> Self {
        let mut out = Self::zero();
        out.0[WORD_BYTES - 1] = u8::from(v);
        out
    }

    /// Decodes the word as an amount. Returns `None` if the value does not fit.
    #[must_use]
    pub fn to_money(&self) -> Option<Money> {
        if self.0[..16] != [0; 16] {
            return None;
        }

        let mut buf = [0; 16];
        buf.copy_from_slice(&self.0[16..]);
        Some(Money::from_be_bytes(buf))
    }

    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[..24] != [0; 24] {
            return None;
        }

        let mut buf = [0; 8];
        buf.copy_from_slice(&self.0[24..]);
        Some(u64::from_be_bytes(buf))
    }

    #[must_use]
    pub fn to_bool(&self) -> bool {
        self.0[WORD_BYTES - 1] != 0
    }

    /// Interprets the low 20 bytes as an address
    #[must_use]
    pub fn to_address(&self) -> Address {
        let mut out = Address::zero();
        out.0.copy_from_slice(&self.0[WORD_BYTES - ADDRESS_BYTES..]);
        out
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl Serialize for Word {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        String::serialize(&self.to_hex(), serializer)
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D>(deserializer: D) -> Result<Word, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        let hash = Hash256::from_hex(&string)
            .map_err(|err| serde::de::Error::custom(err.to_owned()))?;
        Ok(Word(hash.0))
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Word").field(&self.to_hex()).finish()
    }
}

#[derive(PartialEq, Eq, Encode, Decode, Clone, HashTrait, PartialOrd, Ord, Default, Copy)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn zero() -> Self {
        Self([0; 32])
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(hexstr: &str) -> Result<Self, &'static str> {
        let stripped = hexstr.strip_prefix("0x").unwrap_or(hexstr);
        let bytes = hex::decode(stripped).map_err(|_| "invalid hexstr")?;

        if bytes.len() != 32 {
            return Err("invalid hash length");
        }

        let mut out = Self::zero();
        out.0.copy_from_slice(&bytes);
        Ok(out)
    }

    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        Self(Word::from_u64(v).0)
    }

    /// Adds `n` to the hash interpreted as a big-endian 256 bit integer,
    /// wrapping on overflow. Used to address consecutive struct fields.
    #[must_use]
    pub fn offset(&self, n: u64) -> Self {
        let mut out = *self;
        let mut carry = n as u128;
        for byte in out.0.iter_mut().rev() {
            if carry == 0 {
                break;
            }
            let sum = u128::from(*byte) + (carry & 0xff);
            *byte = (sum & 0xff) as u8;
            carry = (carry >> 8) + (sum >> 8);
        }
        out
    }

    #[inline]
    pub fn hash_from_slice<T: AsRef<[u8]>>(slice: T, key: &str) -> Self {
        let mut out_hash = Hash256([0; 32]);
        let key = &[
            HASH_KEY_PREFIX.as_bytes(),
            HASH_KEY256.as_bytes(),
            ".".as_bytes(),
            key.as_bytes(),
        ]
        .concat();
        let key = str::from_utf8(key).unwrap_or(HASH_KEY_PREFIX);
        let mut hasher = blake3::Hasher::new_derive_key(key);
        hasher.update(slice.as_ref());
        let mut out = hasher.finalize_xof();
        out.fill(&mut out_hash.0);
        out_hash
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(v: [u8; 32]) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        String::serialize(&self.to_hex(), serializer)
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> Result<Hash256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Hash256::from_hex(&string).map_err(|err| serde::de::Error::custom(err.to_owned()))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash256").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Secp256k1, SecretKey};

    #[test]
    fn keccak256_test_vector() {
        assert_eq!(
            hex::encode(keccak256("")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            hex::encode(keccak256("abc")),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn address_from_public_key() {
        let secp = Secp256k1::new();
        let key = SecretKey::from_slice(
            &hex::decode("b71c71a67e1177ad4e901695e1b4b9ee17ae16c6668d313eac2f96dbcda3f291")
                .unwrap(),
        )
        .unwrap();
        let address = Address::from_public_key(&PublicKey::from_secret_key(&secp, &key));
        assert_eq!(
            address,
            Address::from_hex("0x71562b71999873DB5b286dF957af199Ec94617F7").unwrap()
        );
    }

    #[test]
    fn address_hex_roundtrip_is_lowercase() {
        let address = Address::from_hex("0x000000000000000000000000000000000000dEaD").unwrap();
        assert_eq!(address.to_hex(), "0x000000000000000000000000000000000000dead");
        assert!(Address::from_hex("0xdead").is_err());
    }

    #[test]
    fn address_word_is_left_padded() {
        let address = Address::from_hex("0x71562b71999873db5b286df957af199ec94617f7").unwrap();
        let word = address.to_word();
        assert_eq!(&word.0[..12], &[0; 12]);
        assert_eq!(word.to_address(), address);
    }

    #[test]
    fn word_money_is_big_endian() {
        let word = Word::from_money(21_000);
        assert_eq!(word.0[30], 0x52);
        assert_eq!(word.0[31], 0x08);
        assert_eq!(word.to_money(), Some(21_000));
        assert_eq!(Word::from_u64(7).to_u64(), Some(7));
    }

    #[test]
    fn word_with_high_bits_is_not_money() {
        let mut word = Word::zero();
        word.0[0] = 1;
        assert_eq!(word.to_money(), None);
        assert_eq!(word.to_u64(), None);
    }

    #[test]
    fn word_bool() {
        assert!(Word::from_bool(true).to_bool());
        assert!(!Word::from_bool(false).to_bool());
        assert!(Word::from_bool(false).is_zero());
    }

    #[test]
    fn hash_offset_carries() {
        let mut h = Hash256::zero();
        h.0[31] = 0xff;
        let next = h.offset(1);
        assert_eq!(next.0[31], 0);
        assert_eq!(next.0[30], 1);

        let max = Hash256([0xff; 32]);
        assert_eq!(max.offset(1), Hash256::zero());
    }

    #[test]
    fn hash256_is_keyed() {
        let a = Hash256::hash_from_slice("", "block");
        let b = Hash256::hash_from_slice("", "tx");
        assert_ne!(a, b);
        assert_eq!(a, Hash256::hash_from_slice("", "block"));
    }
}
