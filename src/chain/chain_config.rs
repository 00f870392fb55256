// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::*;
use crate::primitives::Address;
use crate::settings::Settings;
use crate::stamina::StaminaGenesis;

pub const DEVNET_CHAIN_ID: u64 = 1337;

/// Parameters fixing the genesis and the rules of a network
#[derive(Debug, Clone)]
pub struct ChainConfig {
    network_name: String,

    /// Transactions signed for another chain id are rejected
    chain_id: u64,

    /// Only account allowed to call `Init` on the stamina ledger
    owner: Address,

    /// Account seeded with stamina on init or at genesis
    operator: Address,

    /// Native balances at genesis
    alloc: Vec<(Address, Money)>,

    /// When set, the stamina ledger is initialized at genesis instead of
    /// through an `Init` transaction
    stamina: Option<StaminaGenesis>,

    genesis_timestamp: i64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::new("devnet", DEVNET_CHAIN_ID, Address::zero(), Address::zero())
    }
}

impl ChainConfig {
    #[must_use]
    pub fn new(network_name: &str, chain_id: u64, owner: Address, operator: Address) -> Self {
        Self {
            network_name: network_name.to_owned(),
            chain_id,
            owner,
            operator,
            alloc: vec![],
            stamina: None,
            genesis_timestamp: 0,
        }
    }

    #[must_use]
    pub fn with_alloc(mut self, alloc: Vec<(Address, Money)>) -> Self {
        self.alloc = alloc;
        self
    }

    #[must_use]
    pub fn with_stamina_genesis(mut self, genesis: StaminaGenesis) -> Self {
        self.stamina = Some(genesis);
        self
    }

    #[must_use]
    pub fn with_genesis_timestamp(mut self, timestamp: i64) -> Self {
        self.genesis_timestamp = timestamp;
        self
    }

    /// Builds the config from the `network` and `stamina` settings sections
    pub fn from_settings(settings: &Settings) -> Result<Self, &'static str> {
        let stamina = &settings.stamina;
        let owner = Address::from_hex(&stamina.owner)?;
        let operator = Address::from_hex(&stamina.operator)?;
        let alloc = match &stamina.alloc {
            Some(entries) => entries
                .iter()
                .map(|entry| parse_alloc_entry(entry))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![],
        };

        let mut config = Self::new(
            &settings.network.network_name,
            settings.network.chain_id,
            owner,
            operator,
        )
        .with_alloc(alloc)
        .with_genesis_timestamp(settings.network.genesis_timestamp);

        if stamina.genesis_enabled {
            config = config.with_stamina_genesis(StaminaGenesis {
                min_deposit: parse_amount(&stamina.min_deposit)?,
                recovery_epoch_length: stamina.recovery_epoch_length,
                withdrawal_delay: stamina.withdrawal_delay,
                operator_stamina: parse_amount(&stamina.operator_stamina)?,
            });
        }

        Ok(config)
    }

    #[must_use]
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[must_use]
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    #[must_use]
    pub fn operator(&self) -> &Address {
        &self.operator
    }

    #[must_use]
    pub fn alloc(&self) -> &[(Address, Money)] {
        &self.alloc
    }

    #[must_use]
    pub fn stamina_genesis(&self) -> Option<&StaminaGenesis> {
        self.stamina.as_ref()
    }

    #[must_use]
    pub fn genesis_timestamp(&self) -> i64 {
        self.genesis_timestamp
    }

    /// Stamina granted to the operator on `Init`
    #[must_use]
    pub fn operator_stamina(&self) -> Money {
        self.stamina
            .as_ref()
            .map_or(DEFAULT_OPERATOR_STAMINA, |genesis| genesis.operator_stamina)
    }
}

/// Parses a decimal amount in the smallest unit
pub fn parse_amount(amount: &str) -> Result<Money, &'static str> {
    let amount: Money = amount.trim().parse().map_err(|_| "invalid amount")?;

    if !money_check(amount) {
        return Err("amount out of range");
    }

    Ok(amount)
}

/// Parses an `<address>:<amount>` genesis allocation
fn parse_alloc_entry(entry: &str) -> Result<(Address, Money), &'static str> {
    let (address, amount) = entry.split_once(':').ok_or("invalid alloc entry")?;
    Ok((Address::from_hex(address)?, parse_amount(amount)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_alloc_entries() {
        let address = Address::random();
        let entry = format!("{}:{}", address.to_hex(), 5 * COIN);
        assert_eq!(parse_alloc_entry(&entry).unwrap(), (address, 5 * COIN));
        assert!(parse_alloc_entry("0x00:1").is_err());
        assert!(parse_alloc_entry(&address.to_hex()).is_err());
        assert!(parse_alloc_entry(&format!("{}:abc", address.to_hex())).is_err());
    }

    #[test]
    fn it_rejects_out_of_range_amounts() {
        assert_eq!(parse_amount(" 42 ").unwrap(), 42);
        assert!(parse_amount(&Money::MAX.to_string()).is_err());
        assert!(parse_amount("-1").is_err());
    }

    #[test]
    fn operator_stamina_falls_back_to_default() {
        let config = ChainConfig::default();
        assert_eq!(config.operator_stamina(), DEFAULT_OPERATOR_STAMINA);

        let config = config.with_stamina_genesis(StaminaGenesis {
            operator_stamina: 7,
            ..StaminaGenesis::default()
        });
        assert_eq!(config.operator_stamina(), 7);
    }
}
