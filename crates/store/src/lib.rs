//! # BurrowKV: a sharded append-mostly key-value store
//!
//! An embedded persistent store for byte-string keys and values,
//! optimized for high-throughput single-node workloads whose working set
//! must survive restart. Point operations only: put, get, delete, touch,
//! and atomic counters, plus per-key expiration and whole-store
//! backup/restore.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌───────────────────────────────────────────────────┐
//! │                     STORE                         │
//! │                                                   │
//! │ hash32(key) → primary shard = (h % (N-C)) + C     │
//! │                    |                              │
//! │                    |  (stored key differs?)       │
//! │                    v          yes                 │
//! │        probe overflow shards 0, 1, .., C-1        │
//! │                                                   │
//! │ ┌─────────┐ ┌─────────┐       ┌─────────┐         │
//! │ │ shard 0 │ │ shard 1 │  ...  │ shard N │         │
//! │ │ RwLock  │ │ RwLock  │       │ RwLock  │         │
//! │ │ file    │ │ file    │       │ file    │         │
//! │ │ index   │ │ index   │       │ index   │         │
//! │ │ holes   │ │ holes   │       │ holes   │         │
//! │ └─────────┘ └─────────┘       └─────────┘         │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Each shard owns one slot file, an in-memory `hash → (offset, class,
//! expire)` index, and a map of reusable holes, all behind a single
//! reader/writer lock. Keys hitting distinct shards never contend.
//! Values live only in the files; a restart rebuilds every index with a
//! sequential scan.
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | `lib.rs`     | `Store` struct, open/close, routing, accessors      |
//! | [`config`]   | `Options` with defaults and consuming setters       |
//! | [`error`]    | `StoreError` / `Result`                             |
//! | `shard`      | slot allocation, hole reuse, per-shard operations   |
//! | `recovery`   | startup index scan, legacy layout migration         |
//! | `read.rs`    | `get()`, `walk()`                                   |
//! | `write.rs`   | `set()`, `delete()`, `touch()`, counters, expiry    |
//! | `backup.rs`  | packed backup stream writer and restorer            |
//! | `janitor`    | background fsync / expiration threads               |
//!
//! ## Crash Safety
//!
//! Slots are only overwritten in place when the replacement has the same
//! size class; otherwise the old slot is retired with a single-byte
//! tombstone write and the new record lands in a recycled hole or at the
//! end of the file. Recovery truncates a torn tail back to the last
//! cleanly written slot; earlier data is never touched.

pub mod config;
pub mod error;

mod backup;
mod janitor;
mod read;
mod recovery;
mod shard;
mod write;

pub use config::{Options, DEFAULT_COLLISION_CHUNKS, DEFAULT_TOTAL_CHUNKS};
pub use error::{Result, StoreError};

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use janitor::Janitor;
use shard::Shard;

/// A sharded key-value store rooted at one directory.
///
/// All operations take `&self`; the store is `Sync` and intended to be
/// shared across threads behind an `Arc`.
pub struct Store {
    shards: Arc<Vec<Shard>>,
    opts: Options,
    janitors: Vec<Janitor>,
    closed: bool,
}

impl Store {
    /// Opens (or creates) a store described by `opts`.
    ///
    /// Every shard file is opened, migrated from the legacy layout if
    /// necessary, and scanned to rebuild its in-memory index. Background
    /// maintenance threads are started for any nonzero interval.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] for invalid options, [`StoreError::Format`]
    /// for unreadable shard files, or any I/O error.
    pub fn open(opts: Options) -> Result<Store> {
        opts.validate()?;
        fs::create_dir_all(&opts.dir)?;

        let mut shards = Vec::with_capacity(opts.total_chunks as usize);
        for i in 0..opts.total_chunks {
            shards.push(Shard::open(opts.shard_path(i))?);
        }
        let shards = Arc::new(shards);

        let mut janitors = Vec::new();
        if !opts.sync_interval.is_zero() {
            janitors.push(Janitor::fsync(opts.sync_interval, Arc::clone(&shards))?);
        }
        if !opts.expire_interval.is_zero() {
            janitors.push(Janitor::expire(opts.expire_interval, Arc::clone(&shards))?);
        }

        Ok(Store {
            shards,
            opts,
            janitors,
            closed: false,
        })
    }

    /// Stops background maintenance and flushes every dirty shard.
    ///
    /// # Errors
    ///
    /// [`StoreError::Close`] carrying the joined messages of every shard
    /// that failed to sync.
    pub fn close(mut self) -> Result<()> {
        for janitor in &mut self.janitors {
            janitor.stop();
        }
        let mut failures = Vec::new();
        for shard in self.shards.iter() {
            if let Err(e) = shard.fsync_if_dirty() {
                failures.push(e.to_string());
            }
        }
        self.closed = true;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Close(failures.join("; ")))
        }
    }

    /// Number of live keys across all shards.
    ///
    /// Expired keys still count until they are swept or touched by a
    /// lookup.
    #[must_use]
    pub fn count(&self) -> usize {
        self.shards.iter().map(Shard::count).sum()
    }

    /// Total size in bytes of all shard files.
    ///
    /// # Errors
    ///
    /// Any I/O error while statting a shard file.
    pub fn file_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for shard in self.shards.iter() {
            total += shard.file_size()?;
        }
        Ok(total)
    }

    /// The shard a hash routes to first.
    fn primary(&self, h: u32) -> &Shard {
        let idx = primary_index(h, self.opts.total_chunks, self.opts.collision_chunks);
        &self.shards[idx as usize]
    }

    /// The collision overflow pool, shards `0..C`.
    fn overflow(&self) -> &[Shard] {
        &self.shards[..self.opts.collision_chunks as usize]
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.opts.dir)
            .field("total_chunks", &self.opts.total_chunks)
            .field("collision_chunks", &self.opts.collision_chunks)
            .field("keys", &self.count())
            .field("janitors", &self.janitors.len())
            .finish()
    }
}

/// Best-effort flush when the store is dropped without [`Store::close`].
///
/// Errors are ignored here; callers that care about durability must call
/// `close` (or `fsync_due`) themselves.
impl Drop for Store {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        for janitor in &mut self.janitors {
            janitor.stop();
        }
        for shard in self.shards.iter() {
            let _ = shard.fsync_if_dirty();
        }
    }
}

/// Removes a store directory and everything in it.
pub fn delete_store(dir: impl AsRef<Path>) -> io::Result<()> {
    fs::remove_dir_all(dir)
}

/// 32-bit FNV-1a over the key bytes.
///
/// Fixed forever: shard files hash keys with this function, so changing
/// it silently orphans every record in existing files. The version
/// prefix only guards the record layout, not hash compatibility.
pub(crate) fn hash32(key: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for &byte in key {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Primary shard for a hash: `(h mod (N - C)) + C`.
///
/// The first `collision` shards are never primary targets; they are
/// reserved for keys evicted by a hash collision.
pub(crate) fn primary_index(h: u32, total: u32, collision: u32) -> u32 {
    (h % (total - collision)) + collision
}

/// Seconds since the Unix epoch, for expiry comparisons.
pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
