// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{
    DEFAULT_MIN_DEPOSIT, DEFAULT_OPERATOR_STAMINA, DEFAULT_RECOVER_EPOCH_LENGTH,
    DEFAULT_WITHDRAWAL_DELAY,
};
use config::{Config, ConfigError, File};
use lazy_static::*;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, metadata, File as FsFile};
use std::io::Write;
use std::path::PathBuf;
use struct_field_names_as_array::FieldNamesAsArray;

const ENV_PREFIX: &str = "staminanode";

lazy_static! {
    pub static ref SETTINGS: Settings = match Settings::new() {
        Ok(settings) => settings,
        Err(err) => panic!("Invalid configuration: {err}"),
    };
}

#[derive(Debug, Serialize, Deserialize, Default, FieldNamesAsArray)]
pub struct Settings {
    /// Network settings.
    pub network: Network,

    /// Node settings.
    pub node: Node,

    /// Stamina ledger and genesis settings.
    pub stamina: Stamina,
}

fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("StaminaNode");
    path
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut config_path = config_dir();
        config_path.push("config.toml");
        let default_settings = Settings::default();

        if metadata(&config_path).is_err() {
            // Create default configuration
            let settings_str = toml::ser::to_string_pretty(&default_settings)
                .map_err(|err| ConfigError::Message(err.to_string()))?;

            let created = create_dir_all(config_dir())
                .and_then(|_| FsFile::create(&config_path))
                .and_then(|mut file| file.write_all(settings_str.as_bytes()));

            if let Err(err) = created {
                // Fall back to defaults and environment variables
                error!("Failed to create configuration! Reason: {:#?}", err);
            }
        }

        let env_source: Vec<_> = std::env::vars().collect();
        let config_path = config_path
            .into_os_string()
            .into_string()
            .map_err(|_| ConfigError::Message("invalid config path".to_owned()))?;
        let mut s = Config::builder().add_source(File::with_name(&config_path).required(false));

        // Set defaults
        let defaults: HashMap<String, HashMap<String, DynamicConfVal>> = serde_yaml::to_value(
            &default_settings,
        )
        .and_then(serde_yaml::from_value)
        .map_err(|err| ConfigError::Message(err.to_string()))?;

        for (k1, inner) in &defaults {
            for (k2, v) in inner {
                let key = format!("{k1}.{k2}");

                match v {
                    DynamicConfVal::String(v) => {
                        s = s.set_default(key, v.as_str())?;
                    }

                    DynamicConfVal::Bool(v) => {
                        s = s.set_default(key, v.to_string())?;
                    }

                    DynamicConfVal::U16(v) => {
                        s = s.set_default(key, v.to_string())?;
                    }

                    DynamicConfVal::U64(v) => {
                        s = s.set_default(key, v.to_string())?;
                    }

                    DynamicConfVal::I64(v) => {
                        s = s.set_default(key, v.to_string())?;
                    }

                    DynamicConfVal::Sequence(v) => {
                        s = s.set_default(key, v.clone())?;
                    }

                    DynamicConfVal::Option(v) => {
                        if let Some(v) = v {
                            s = s.set_default(key, v.as_str())?;
                        }
                    }

                    DynamicConfVal::OptionSequence(v) => {
                        if let Some(v) = v {
                            s = s.set_default(key, v.clone())?;
                        }
                    }
                }
            }
        }

        // Make sure to list these in order
        let settings_modules: Vec<_> = vec![
            Network::FIELD_NAMES_AS_ARRAY,
            Node::FIELD_NAMES_AS_ARRAY,
            Stamina::FIELD_NAMES_AS_ARRAY,
        ];

        for (k, v) in &env_source {
            // Filter empty values
            if v.is_empty() {
                continue;
            }

            if let Some(key) = env_override_key(&settings_modules, k) {
                s = s.set_override(key, v.as_str())?;
            }
        }

        s.build()?.try_deserialize()
    }

    /// Checks values that deserialize fine but make no sense
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.stamina.recovery_epoch_length == 0 {
            return Err("stamina.recovery_epoch_length must be greater than 0");
        }

        if self.node.block_interval_ms == 0 {
            return Err("node.block_interval_ms must be greater than 0");
        }

        if self.network.rpc_enabled && self.network.rpc_password.is_empty() {
            return Err("network.rpc_password cannot be empty when rpc is enabled");
        }

        Ok(())
    }
}

/// Maps `staminanode_<section>_<key>` to `<section>.<key>`. Underscores in
/// the key part are optional.
///
/// The `config` crate `Environment` source does not cope with keys that
/// contain underscores so overrides are resolved manually.
fn env_override_key(settings_modules: &[&[&str]], var: &str) -> Option<String> {
    let var = var.to_lowercase();
    let rest = var.strip_prefix(ENV_PREFIX)?.strip_prefix('_')?;

    Settings::FIELD_NAMES_AS_ARRAY
        .iter()
        .enumerate()
        .find_map(|(i, section)| {
            let field = rest.strip_prefix(section)?.strip_prefix('_')?;
            let field = field.replace('_', "");
            settings_modules[i]
                .iter()
                .find(|nested| nested.replace('_', "") == field)
                .map(|nested| format!("{section}.{nested}"))
        })
}

#[derive(Debug, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Network {
    /// The network name the node runs on.
    #[serde(alias = "networkname")]
    pub network_name: String,

    /// Chain id transactions must be signed for.
    #[serde(alias = "chainid")]
    pub chain_id: u64,

    /// Timestamp of the genesis block.
    #[serde(alias = "genesistimestamp")]
    pub genesis_timestamp: i64,

    /// Enable RPC.
    #[serde(alias = "rpcenabled")]
    pub rpc_enabled: bool,

    /// RPC listen address.
    #[serde(alias = "rpclistenaddr")]
    pub rpc_listen_addr: String,

    /// RPC listen port.
    #[serde(alias = "rpclistenport")]
    pub rpc_listen_port: u16,

    /// RPC username.
    #[serde(alias = "rpcusername")]
    pub rpc_username: String,

    /// RPC password.
    #[serde(alias = "rpcpassword")]
    pub rpc_password: String,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            network_name: "devnet".to_owned(),
            chain_id: crate::chain::DEVNET_CHAIN_ID,
            genesis_timestamp: 0,
            rpc_enabled: true,
            rpc_listen_addr: "127.0.0.1".to_owned(),
            rpc_listen_port: 8045,
            rpc_username: "staminanode".to_owned(),
            rpc_password: "staminanode".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Node {
    /// Node data directory
    #[serde(alias = "datadir")]
    pub data_dir: String,

    /// If specified, we won't be storing anything to disk.
    #[serde(alias = "memoryonly")]
    pub memory_only: bool,

    /// Number of threads used for block production and the RPC interface.
    ///
    /// Default is 0 which means the number of cores of the system
    #[serde(alias = "networkthreads")]
    pub network_threads: u16,

    /// Maximum number of pending transactions
    #[serde(alias = "mempoolsize")]
    pub mempool_size: u16,

    /// Produce blocks.
    #[serde(alias = "produceblocks")]
    pub produce_blocks: bool,

    /// Milliseconds between produced blocks
    #[serde(alias = "blockintervalms")]
    pub block_interval_ms: u64,

    /// Receiver of natively paid fees in produced blocks
    #[serde(alias = "coinbaseaddress")]
    pub coinbase_address: Option<String>,

    /// Export traces to a local Jaeger agent.
    #[serde(alias = "jaegerenabled")]
    pub jaeger_enabled: bool,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            data_dir: config_dir().to_string_lossy().into_owned(),
            memory_only: false,
            network_threads: 0,
            mempool_size: 8192,
            produce_blocks: true,
            block_interval_ms: 2000,
            coinbase_address: None,
            jaeger_enabled: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Stamina {
    /// Only account allowed to initialize the ledger.
    pub owner: String,

    /// Account seeded with stamina on initialization.
    pub operator: String,

    /// Initialize the ledger in the genesis block.
    #[serde(alias = "genesisenabled")]
    pub genesis_enabled: bool,

    /// Minimum first deposit, in the smallest unit.
    #[serde(alias = "mindeposit")]
    pub min_deposit: String,

    /// Blocks between stamina refills.
    #[serde(alias = "recoveryepochlength")]
    pub recovery_epoch_length: u64,

    /// Blocks between requesting and finalizing a withdrawal.
    #[serde(alias = "withdrawaldelay")]
    pub withdrawal_delay: u64,

    /// Stamina granted to the operator, in the smallest unit.
    #[serde(alias = "operatorstamina")]
    pub operator_stamina: String,

    /// Genesis balances as `<address>:<amount>`.
    pub alloc: Option<Vec<String>>,
}

impl Default for Stamina {
    fn default() -> Self {
        let zero = crate::primitives::Address::zero().to_hex();

        Self {
            owner: zero.clone(),
            operator: zero,
            genesis_enabled: true,
            min_deposit: DEFAULT_MIN_DEPOSIT.to_string(),
            recovery_epoch_length: DEFAULT_RECOVER_EPOCH_LENGTH,
            withdrawal_delay: DEFAULT_WITHDRAWAL_DELAY,
            operator_stamina: DEFAULT_OPERATOR_STAMINA.to_string(),
            alloc: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DynamicConfVal {
    String(String),
    Sequence(Vec<String>),
    Option(Option<String>),
    OptionSequence(Option<Vec<String>>),
    Bool(bool),
    U16(u16),
    U64(u64),
    I64(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modules() -> Vec<&'static [&'static str]> {
        vec![
            Network::FIELD_NAMES_AS_ARRAY,
            Node::FIELD_NAMES_AS_ARRAY,
            Stamina::FIELD_NAMES_AS_ARRAY,
        ]
    }

    #[test]
    fn it_resolves_env_overrides() {
        let modules = modules();
        assert_eq!(
            env_override_key(&modules, "STAMINANODE_STAMINA_MIN_DEPOSIT"),
            Some("stamina.min_deposit".to_owned())
        );
        assert_eq!(
            env_override_key(&modules, "staminanode_node_blockintervalms"),
            Some("node.block_interval_ms".to_owned())
        );
        assert_eq!(
            env_override_key(&modules, "staminanode_network_rpc_password"),
            Some("network.rpc_password".to_owned())
        );
        assert_eq!(env_override_key(&modules, "staminanode_node_unknown"), None);
        assert_eq!(env_override_key(&modules, "PATH"), None);
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(
            crate::chain::parse_amount(&settings.stamina.min_deposit).unwrap(),
            DEFAULT_MIN_DEPOSIT
        );
    }

    #[test]
    fn defaults_fit_dynamic_values() {
        let value = serde_yaml::to_value(Settings::default()).unwrap();
        let defaults: HashMap<String, HashMap<String, DynamicConfVal>> =
            serde_yaml::from_value(value).unwrap();
        assert_eq!(defaults.len(), 3);
        assert!(matches!(
            defaults["stamina"]["recovery_epoch_length"],
            DynamicConfVal::U64(_)
        ));
        assert!(matches!(
            defaults["node"]["produce_blocks"],
            DynamicConfVal::Bool(true)
        ));
    }
}
