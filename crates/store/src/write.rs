//! Write path: set, delete, touch, counters, expiration and fsync.
//!
//! Every mutation routes like a read: primary shard first, then, only
//! when the primary reports a Collision, the overflow pool in order,
//! stopping at the first shard that accepts the operation. With an
//! empty pool (`collision_chunks == 0`) the Collision surfaces to the
//! caller.

use std::time::Duration;

use crate::error::{Result, StoreError};
use crate::{hash32, Store};

impl Store {
    /// Stores `key` → `value` with an absolute expiry in Unix seconds
    /// (0 = never expires).
    ///
    /// # Errors
    ///
    /// [`StoreError::Format`] for keys over 65535 bytes or records that
    /// exceed the largest slot class (512 KiB);
    /// [`StoreError::Collision`] only when the overflow pool is
    /// disabled.
    pub fn set(&self, key: &[u8], value: &[u8], expire: u32) -> Result<()> {
        let h = hash32(key);
        let mut result = self.primary(h).set(key, value, h, expire);
        if matches!(result, Err(StoreError::Collision)) {
            for shard in self.overflow() {
                result = shard.set(key, value, h, expire);
                if matches!(result, Err(StoreError::Collision)) {
                    continue;
                }
                break;
            }
        }
        result
    }

    /// Deletes `key`, returning whether a record was actually removed.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let h = hash32(key);
        let mut result = self.primary(h).delete(key, h);
        if matches!(result, Err(StoreError::Collision)) {
            for shard in self.overflow() {
                result = shard.delete(key, h);
                match result {
                    Err(StoreError::Collision) | Ok(false) => continue,
                    _ => break,
                }
            }
        }
        result
    }

    /// Replaces the expiry of an existing record without rewriting its
    /// value.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the key is absent or already expired.
    pub fn touch(&self, key: &[u8], expire: u32) -> Result<()> {
        let h = hash32(key);
        let mut result = self.primary(h).touch(key, h, expire);
        if matches!(result, Err(StoreError::Collision)) {
            for shard in self.overflow() {
                result = shard.touch(key, h, expire);
                match result {
                    Err(StoreError::Collision) | Err(StoreError::NotFound) => continue,
                    _ => break,
                }
            }
        }
        result
    }

    /// Adds `delta` to the counter stored under `key`, initializing an
    /// absent counter to zero. Wraps on overflow.
    ///
    /// # Errors
    ///
    /// [`StoreError::Format`] if an existing value is not exactly 8
    /// bytes.
    pub fn incr(&self, key: &[u8], delta: u64) -> Result<u64> {
        self.incr_decr(key, delta, true)
    }

    /// Subtracts `delta` from the counter stored under `key`. Underflow
    /// wraps towards `u64::MAX`.
    pub fn decr(&self, key: &[u8], delta: u64) -> Result<u64> {
        self.incr_decr(key, delta, false)
    }

    fn incr_decr(&self, key: &[u8], delta: u64, increment: bool) -> Result<u64> {
        let h = hash32(key);
        let mut result = self.primary(h).incr_decr(key, h, delta, increment);
        if matches!(result, Err(StoreError::Collision)) {
            for shard in self.overflow() {
                result = shard.incr_decr(key, h, delta, increment);
                if matches!(result, Err(StoreError::Collision)) {
                    continue;
                }
                break;
            }
        }
        result
    }

    /// Sweeps every shard, tombstoning all expired records immediately
    /// (no pacing, no budget).
    pub fn expire_all(&self) -> Result<()> {
        for shard in self.shards.iter() {
            shard.expire_step(Duration::ZERO)?;
        }
        Ok(())
    }

    /// Flushes every shard that has unsynced writes. Cheap when nothing
    /// is dirty; intended to be driven by an external timer when no
    /// `sync_interval` is configured.
    pub fn fsync_due(&self) -> Result<()> {
        for shard in self.shards.iter() {
            shard.fsync_if_dirty()?;
        }
        Ok(())
    }
}
