// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! # Stamina node
//! Account based chain node with stamina fee delegation.
//!
//! ## Stamina
//! Any account can deposit native coins for a *delegatee*. The delegatee's
//! stamina is capped by the sum of the deposits backing it and is spent to pay
//! transaction fees on behalf of its *delegators*. Spent stamina is refilled
//! once per recovery epoch. Depositors get their coins back through a two step
//! withdrawal that only completes after a fixed number of blocks.
//!
//! The ledger lives in the storage of a reserved account and is driven by
//! regular transactions sent to that account, so its state is versioned and
//! committed together with balances in every block.
//!
//! ## Layout
//! * [`stamina`]: Ledger, recovery, withdrawals and gas payer resolution
//! * [`chain`]: Versioned state backends, block execution and import
//! * [`node`]: Mempool, block producer and the JSON RPC server
//! * [`settings`]: Configuration file and environment overrides

#![allow(dead_code, unused)]

pub mod chain;
pub mod codec;
pub mod consensus;
pub mod global;
pub mod node;
pub mod primitives;
pub mod settings;
pub mod stamina;
