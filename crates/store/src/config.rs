//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Default number of shards.
pub const DEFAULT_TOTAL_CHUNKS: u32 = 256;

/// Default size of the collision overflow pool.
pub const DEFAULT_COLLISION_CHUNKS: u32 = 4;

/// Configuration for a [`Store`](crate::Store).
///
/// Built with consuming setters:
///
/// ```no_run
/// use std::time::Duration;
/// use store::{Options, Store};
///
/// let _store = Store::open(
///     Options::default()
///         .dir("/var/lib/burrowkv")
///         .total_chunks(64)
///         .sync_interval(Duration::from_secs(1)),
/// ).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding the shard files; created if missing.
    pub dir: PathBuf,

    /// Number of shards. Must be greater than `collision_chunks`.
    pub total_chunks: u32,

    /// Number of shards reserved for resolving hash collisions. These
    /// are never primary targets. 0 disables collision fallback, making
    /// [`StoreError::Collision`](crate::StoreError::Collision) surface
    /// to callers.
    pub collision_chunks: u32,

    /// Optional shard file name prefix: files are named `<prefix>-<i>`
    /// instead of `<i>`.
    pub chunks_prefix: Option<String>,

    /// Interval between background fsync sweeps over dirty shards.
    /// Zero disables the background thread; callers may invoke
    /// [`fsync_due`](crate::Store::fsync_due) themselves.
    pub sync_interval: Duration,

    /// Interval between background expiration ticks. Each tick advances
    /// a round-robin cursor by one shard. Zero disables the thread.
    pub expire_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            total_chunks: DEFAULT_TOTAL_CHUNKS,
            collision_chunks: DEFAULT_COLLISION_CHUNKS,
            chunks_prefix: None,
            sync_interval: Duration::ZERO,
            expire_interval: Duration::ZERO,
        }
    }
}

impl Options {
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn total_chunks(mut self, total: u32) -> Self {
        self.total_chunks = total;
        self
    }

    pub fn collision_chunks(mut self, collision: u32) -> Self {
        self.collision_chunks = collision;
        self
    }

    pub fn chunks_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.chunks_prefix = Some(prefix.into());
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn expire_interval(mut self, interval: Duration) -> Self {
        self.expire_interval = interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.total_chunks == 0 {
            return Err(StoreError::Config("total_chunks must be positive".into()));
        }
        if self.total_chunks <= self.collision_chunks {
            return Err(StoreError::Config(format!(
                "total_chunks ({}) must exceed collision_chunks ({})",
                self.total_chunks, self.collision_chunks
            )));
        }
        Ok(())
    }

    pub(crate) fn shard_path(&self, i: u32) -> PathBuf {
        match &self.chunks_prefix {
            Some(prefix) => self.dir.join(format!("{prefix}-{i}")),
            None => self.dir.join(i.to_string()),
        }
    }
}
