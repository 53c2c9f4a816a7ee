//! Read path: point lookups and full walks.
//!
//! Lookups route to the primary shard; a Collision there means the slot
//! belongs to a different key, so the key (if it exists at all) was
//! rerouted to the overflow pool at write time and the probe sequence
//! `[primary, 0, 1, ..., C-1]` is followed. NotFound from an overflow
//! shard does not end the probe: the key may sit in a later pool shard.

use crate::error::{Result, StoreError};
use crate::{hash32, Store};

impl Store {
    /// Returns the value stored for `key`.
    ///
    /// An expired record is retired on the spot and reported as absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the key is absent or expired;
    /// [`StoreError::Collision`] only when the overflow pool is
    /// disabled.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let h = hash32(key);
        let mut result = self.primary(h).get(key, h);
        if matches!(result, Err(StoreError::Collision)) {
            for shard in self.overflow() {
                result = shard.get(key, h);
                match result {
                    Err(StoreError::Collision) | Err(StoreError::NotFound) => continue,
                    _ => break,
                }
            }
        }
        result
    }

    /// Calls `f` with every live, unexpired `(key, value)` pair.
    ///
    /// Iteration order is unspecified (shards in order, hash order
    /// within a shard). Each shard is walked under its shared lock, so
    /// concurrent writes to other shards proceed freely.
    pub fn walk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]),
    {
        for shard in self.shards.iter() {
            shard.walk(&mut f)?;
        }
        Ok(())
    }
}
