// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

mod block;
mod common;
mod transaction;

pub use crate::primitives::block::*;
pub use crate::primitives::common::*;
pub use crate::primitives::transaction::*;
