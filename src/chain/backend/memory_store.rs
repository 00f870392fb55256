// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::StateBackendErr;
use crate::chain::ChangeSet;
use crate::primitives::{Block, Hash256, Receipt};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered tables mirroring the column families of the disk backend
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub accounts: Table,
    pub storage: Table,
    pub blocks: BTreeMap<u64, Block>,
    pub block_index: HashMap<Hash256, u64>,
    pub receipts: BTreeMap<u64, Vec<Receipt>>,
    pub changesets: BTreeMap<u64, ChangeSet>,
    pub height: Option<u64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates `table` in key order starting at `from`
    pub fn seek<'a>(
        table: &'a Table,
        from: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), StateBackendErr>> + 'a {
        table
            .range::<[u8], _>((Bound::Included(from), Bound::Unbounded))
            .map(|(k, v)| Ok((k.clone(), v.clone())))
    }
}
