//! Background maintenance threads.
//!
//! Two optional janitors, one per configured interval: a periodic fsync
//! sweep over dirty shards and a round-robin expiration sweep that
//! advances one shard per tick. Both are plain OS threads parked on a
//! channel receive, so stopping is a send plus a join.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use tracing::{error, warn};

use crate::shard::Shard;

pub(crate) struct Janitor {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Janitor {
    /// Periodic fsync of every dirty shard.
    ///
    /// After a failed fsync the drive state is unknown; the janitor
    /// logs the error and panics instead of carrying on.
    pub(crate) fn fsync(interval: Duration, shards: Arc<Vec<Shard>>) -> io::Result<Janitor> {
        Self::spawn("fsync", interval, move || {
            for shard in shards.iter() {
                if let Err(e) = shard.fsync_if_dirty() {
                    error!(shard = %shard.path().display(), error = %e, "background fsync failed");
                    panic!("background fsync failed on {}: {e}", shard.path().display());
                }
            }
        })
    }

    /// Round-robin expiration: one shard per tick, with the tick
    /// interval doubling as the sweep's time budget.
    pub(crate) fn expire(interval: Duration, shards: Arc<Vec<Shard>>) -> io::Result<Janitor> {
        let mut cursor = 0usize;
        Self::spawn("expire", interval, move || {
            let shard = &shards[cursor % shards.len()];
            cursor = cursor.wrapping_add(1);
            if let Err(e) = shard.expire_step(interval) {
                warn!(shard = %shard.path().display(), error = %e, "expiration step failed");
            }
        })
    }

    fn spawn(
        name: &str,
        interval: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> io::Result<Janitor> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(format!("burrowkv-{name}"))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })?;
        Ok(Janitor {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Signals the thread and joins it. Safe to call more than once.
    pub(crate) fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.stop();
    }
}
