// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Canonical binary encoding. Everything that is hashed or persisted goes
//! through these functions so that every node produces the same bytes.

use bincode::config::{Configuration, Limit, LittleEndian, Varint};

pub const CODEC_BYTES_LIMIT: usize = 4_000_000;

type CodecConfig = Configuration<LittleEndian, Varint, Limit<CODEC_BYTES_LIMIT>>;

#[inline]
fn config() -> CodecConfig {
    bincode::config::standard()
        .with_little_endian()
        .with_variable_int_encoding()
        .with_limit::<CODEC_BYTES_LIMIT>()
}

pub fn encode_to_vec<T: bincode::Encode>(val: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::encode_to_vec(val, config())
}

pub fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, bincode::error::DecodeError> {
    bincode::decode_from_slice(bytes, config()).map(|r| r.0)
}
