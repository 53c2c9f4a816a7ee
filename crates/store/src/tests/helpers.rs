use std::path::Path;

use crate::{Options, Store};

/// A documented FNV-1a 32-bit colliding pair; `router_tests` asserts the
/// hashes really are equal so every test relying on it fails loudly if
/// the hash function ever changes.
pub const COLLIDE_A: &[u8] = b"costarring";
pub const COLLIDE_B: &[u8] = b"liquid";

pub fn small_opts(dir: &Path) -> Options {
    Options::default()
        .dir(dir)
        .total_chunks(8)
        .collision_chunks(2)
}

pub fn open_small(dir: &Path) -> Store {
    Store::open(small_opts(dir)).unwrap()
}

/// One shard, no overflow pool: every key lands in file `0`, which makes
/// file-size and hole-reuse assertions deterministic.
pub fn single_shard_opts(dir: &Path) -> Options {
    Options::default()
        .dir(dir)
        .total_chunks(1)
        .collision_chunks(0)
}

pub fn open_single(dir: &Path) -> Store {
    Store::open(single_shard_opts(dir)).unwrap()
}
