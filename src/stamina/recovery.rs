// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::Money;
use crate::stamina::DelegateeAccount;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Recovered {
    pub remaining: Money,
    pub last_update_block: u64,

    /// True if a spent balance was refilled to capacity
    pub refilled: bool,
}

/// Step function recovery. Once `epoch` blocks have passed since
/// `last_update_block` the balance refills to the current `capacity`,
/// otherwise it stays where it is.
///
/// A `current_block` below `last_update_block` counts as no time passed.
/// Only a balance below capacity counts as refilled, so accounts that
/// never spent anything do not accumulate recoveries.
#[must_use]
pub fn recover(
    capacity: Money,
    remaining: Money,
    last_update_block: u64,
    current_block: u64,
    epoch: u64,
) -> Recovered {
    let elapsed = current_block.saturating_sub(last_update_block);

    if elapsed >= epoch {
        return Recovered {
            remaining: capacity,
            last_update_block: current_block,
            refilled: remaining < capacity,
        };
    }

    Recovered {
        remaining: remaining.min(capacity),
        last_update_block,
        refilled: false,
    }
}

impl DelegateeAccount {
    /// Returns the account as of `current_block`
    #[must_use]
    pub fn recovered(self, current_block: u64, epoch: u64) -> Self {
        let r = recover(
            self.capacity,
            self.remaining,
            self.last_update_block,
            current_block,
            epoch,
        );

        Self {
            capacity: self.capacity,
            remaining: r.remaining,
            last_update_block: r.last_update_block,
            num_recovery: if r.refilled {
                self.num_recovery.saturating_add(1)
            } else {
                self.num_recovery
            },
        }
    }
}
