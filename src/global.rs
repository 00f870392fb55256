// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use chrono::prelude::*;
use lazy_static::*;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

lazy_static! {
    /// Set when the node should shut down. Shared with the signal handlers.
    pub static ref EXIT_SIGNAL: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    /// Unix timestamp of node startup
    pub static ref STARTUP_TIME: AtomicI64 = AtomicI64::new(0);
}

/// Initialize globals
pub fn init() {
    STARTUP_TIME.store(Utc::now().timestamp(), Ordering::Relaxed);
}

/// Seconds since `init` was called
pub fn uptime() -> u64 {
    let elapsed = Utc::now().timestamp() - STARTUP_TIME.load(Ordering::Relaxed);
    u64::try_from(elapsed).unwrap_or(0)
}

pub fn request_exit() {
    EXIT_SIGNAL.store(true, Ordering::Relaxed);
}

pub fn exit_requested() -> bool {
    EXIT_SIGNAL.load(Ordering::Relaxed)
}
