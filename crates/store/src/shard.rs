//! Shard: one slot file plus its in-memory index, behind one lock.
//!
//! The shard is the unit of both concurrency and recovery. Mutations
//! take the lock exclusively; lookups share it. File I/O is positional
//! (`read_at`/`write_at`), so concurrent readers never fight over a file
//! cursor.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use record::{Header, EXPIRE_OFFSET, FILE_MAGIC, FILE_PREFIX, FILE_VERSION, HEADER_BYTES};

use crate::error::{Result, StoreError};
use crate::now_unix;
use crate::recovery;

/// Sleep between tombstones during a budgeted expiration sweep, so the
/// sweep's wall-clock cost is amortized instead of bursty.
const EXPIRE_PACE: Duration = Duration::from_millis(1);

/// Index entry: where a live record lives and when it dies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    /// Byte offset of the slot within the shard file.
    pub addr: u32,
    /// Size class; the slot spans `1 << sizeb` bytes.
    pub sizeb: u8,
    /// Absolute expiry in Unix seconds; 0 = never.
    pub expire: u32,
}

pub(crate) struct Shard {
    path: PathBuf,
    state: RwLock<ShardState>,
}

pub(crate) struct ShardState {
    file: File,
    /// hash32(key) → slot. At most one live slot per hash; a second key
    /// with the same hash is rejected with `Collision` and rerouted by
    /// the store.
    index: HashMap<u32, Slot>,
    /// offset → size class of tombstoned slots available for reuse.
    holes: HashMap<u32, u8>,
    /// Current file length; appends land here.
    tail: u32,
    /// A write happened since the last fsync.
    dirty: bool,
}

impl Shard {
    /// Opens or creates the shard file at `path` and rebuilds the index.
    ///
    /// An empty file gets the two-byte version prefix. A legacy (v0)
    /// file is migrated in place before scanning. See [`recovery`].
    pub(crate) fn open(path: PathBuf) -> Result<Shard> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all_at(&FILE_PREFIX, 0)?;
            file.sync_all()?;
            return Ok(Shard {
                path,
                state: RwLock::new(ShardState {
                    file,
                    index: HashMap::new(),
                    holes: HashMap::new(),
                    tail: FILE_PREFIX.len() as u32,
                    dirty: false,
                }),
            });
        }
        if len < FILE_PREFIX.len() as u64 {
            return Err(StoreError::Format(format!(
                "shard {} is shorter than the file prefix",
                path.display()
            )));
        }

        let mut prefix = [0u8; 2];
        file.read_exact_at(&mut prefix, 0)?;
        let file = if prefix[0] != FILE_MAGIC {
            // No magic marker: this is a v0 file (its first byte is a
            // size class, which can never be 0xFF).
            recovery::migrate_legacy(&path, file)?
        } else if prefix[1] != FILE_VERSION {
            return Err(StoreError::Format(format!(
                "shard {}: unsupported layout version {}",
                path.display(),
                prefix[1]
            )));
        } else {
            file
        };

        let recovered = recovery::scan(&file, &path)?;
        Ok(Shard {
            path,
            state: RwLock::new(ShardState {
                file,
                index: recovered.index,
                holes: recovered.holes,
                tail: recovered.tail,
                dirty: false,
            }),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `key`/`value`, reusing the existing slot or a hole of the
    /// same class when possible.
    pub(crate) fn set(&self, key: &[u8], value: &[u8], h: u32, expire: u32) -> Result<()> {
        let (header, slot_bytes) = record::encode(key, value, expire)?;
        let mut st = self.state.write();
        st.dirty = true;
        st.set_inner(key, h, &header, &slot_bytes)
    }

    /// Returns the value for `key`, lazily retiring it if expired.
    pub(crate) fn get(&self, key: &[u8], h: u32) -> Result<Vec<u8>> {
        {
            let st = self.state.read();
            let (value, expire) = st.get_inner(key, h)?;
            if !is_expired(expire, now_unix()) {
                return Ok(value);
            }
        }
        // Expired: upgrade to an exclusive lock and retire the record.
        self.delete_expired(key, h)?;
        Err(StoreError::NotFound)
    }

    /// Tombstones `key`'s slot. Returns whether anything was deleted.
    pub(crate) fn delete(&self, key: &[u8], h: u32) -> Result<bool> {
        let mut st = self.state.write();
        let Some(slot) = st.index.get(&h).copied() else {
            return Ok(false);
        };
        let raw = st.read_slot(slot)?;
        let (header, stored_key, _) = record::decode(&raw)?;
        if stored_key != key {
            return Err(StoreError::Collision);
        }
        st.tombstone(slot.addr, header.sizeb)?;
        st.index.remove(&h);
        st.dirty = true;
        Ok(true)
    }

    /// Rewrites only the expire field of `key`'s record.
    pub(crate) fn touch(&self, key: &[u8], h: u32, expire: u32) -> Result<()> {
        let mut st = self.state.write();
        let Some(slot) = st.index.get(&h).copied() else {
            return Err(StoreError::NotFound);
        };
        let raw = st.read_slot(slot)?;
        let (header, stored_key, _) = record::decode(&raw)?;
        if stored_key != key {
            return Err(StoreError::Collision);
        }
        if is_expired(header.expire, now_unix()) {
            st.tombstone(slot.addr, header.sizeb)?;
            st.index.remove(&h);
            st.dirty = true;
            return Err(StoreError::NotFound);
        }
        st.file
            .write_all_at(&expire.to_be_bytes(), u64::from(slot.addr) + EXPIRE_OFFSET)?;
        st.index.insert(h, Slot { expire, ..slot });
        st.dirty = true;
        Ok(())
    }

    /// Adds or subtracts `delta` on an 8-byte big-endian counter,
    /// wrapping on overflow. A missing (or expired) key starts at zero;
    /// any other value length is a format error. The whole
    /// read-modify-write holds the exclusive lock, which is what makes
    /// per-key counters atomic.
    pub(crate) fn incr_decr(&self, key: &[u8], h: u32, delta: u64, increment: bool) -> Result<u64> {
        let mut st = self.state.write();
        let (old, expire) = match st.get_inner(key, h) {
            Ok((value, expire)) if !is_expired(expire, now_unix()) => (value, expire),
            Ok(_) | Err(StoreError::NotFound) => (vec![0u8; 8], 0),
            Err(e) => return Err(e),
        };
        let Ok(bytes) = <[u8; 8]>::try_from(old.as_slice()) else {
            return Err(StoreError::Format(format!(
                "counter value is {} bytes, want 8",
                old.len()
            )));
        };
        let current = u64::from_be_bytes(bytes);
        let next = if increment {
            current.wrapping_add(delta)
        } else {
            current.wrapping_sub(delta)
        };
        let (header, slot_bytes) = record::encode(key, &next.to_be_bytes(), expire)?;
        st.dirty = true;
        st.set_inner(key, h, &header, &slot_bytes)?;
        Ok(next)
    }

    /// Flushes the file if a write happened since the last flush.
    pub(crate) fn fsync_if_dirty(&self) -> Result<()> {
        let mut st = self.state.write();
        if st.dirty {
            st.dirty = false;
            st.file.sync_all()?;
        }
        Ok(())
    }

    /// Tombstones every record whose expiry has passed, spending at most
    /// `budget` of wall-clock time. Each victim's on-disk header is
    /// re-verified under the exclusive lock before it is retired, since
    /// a concurrent `set` or `touch` may have revived it after the
    /// snapshot. A zero budget sweeps everything without pacing.
    ///
    /// Returns the number of records retired.
    pub(crate) fn expire_step(&self, budget: Duration) -> Result<usize> {
        let started = Instant::now();
        let victims: Vec<u32> = {
            let now = now_unix();
            let st = self.state.read();
            st.index
                .iter()
                .filter(|(_, slot)| is_expired(slot.expire, now))
                .map(|(&h, _)| h)
                .collect()
        };

        let mut removed = 0usize;
        for (i, h) in victims.into_iter().enumerate() {
            if !budget.is_zero() {
                if started.elapsed() >= budget {
                    break;
                }
                if i > 0 {
                    thread::sleep(EXPIRE_PACE);
                }
            }
            let mut st = self.state.write();
            let Some(slot) = st.index.get(&h).copied() else {
                continue;
            };
            let mut head = [0u8; HEADER_BYTES];
            st.file.read_exact_at(&mut head, u64::from(slot.addr))?;
            let header = Header::parse(&head)?;
            if is_expired(header.expire, now_unix()) {
                st.tombstone(slot.addr, header.sizeb)?;
                st.index.remove(&h);
                st.dirty = true;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub(crate) fn count(&self) -> usize {
        self.state.read().index.len()
    }

    pub(crate) fn file_size(&self) -> Result<u64> {
        Ok(self.state.read().file.metadata()?.len())
    }

    /// Calls `f` for every live, unexpired record in this shard.
    pub(crate) fn walk<F>(&self, f: &mut F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let st = self.state.read();
        let now = now_unix();
        for slot in st.index.values() {
            if is_expired(slot.expire, now) {
                continue;
            }
            let raw = st.read_slot(*slot)?;
            let (_, key, value) = record::decode(&raw)?;
            f(key, value);
        }
        Ok(())
    }

    /// Access for the backup writer: exclusive lock for the duration of
    /// one shard's dump.
    pub(crate) fn locked(&self) -> parking_lot::RwLockWriteGuard<'_, ShardState> {
        self.state.write()
    }

    /// Retires an expired record found by a shared-lock `get`. The state
    /// is re-checked because another writer may have replaced the record
    /// between lock modes.
    fn delete_expired(&self, key: &[u8], h: u32) -> Result<()> {
        let mut st = self.state.write();
        let Some(slot) = st.index.get(&h).copied() else {
            return Ok(());
        };
        let raw = st.read_slot(slot)?;
        let (header, stored_key, _) = record::decode(&raw)?;
        if stored_key != key || !is_expired(header.expire, now_unix()) {
            return Ok(());
        }
        st.tombstone(slot.addr, header.sizeb)?;
        st.index.remove(&h);
        st.dirty = true;
        Ok(())
    }
}

impl ShardState {
    /// Core write path shared by `set` and the counters. The caller
    /// holds the exclusive lock and has already marked the shard dirty.
    fn set_inner(&mut self, key: &[u8], h: u32, header: &Header, slot_bytes: &[u8]) -> Result<()> {
        let mut target: Option<u32> = None;

        if let Some(existing) = self.index.get(&h).copied() {
            let raw = self.read_slot(existing)?;
            let (old_header, stored_key, _) = record::decode(&raw)?;
            if stored_key != key {
                return Err(StoreError::Collision);
            }
            if old_header.sizeb == header.sizeb {
                // Same class: safe to overwrite in place.
                target = Some(existing.addr);
            } else {
                self.tombstone(existing.addr, old_header.sizeb)?;
            }
        }

        if target.is_none() {
            target = self.take_hole(header.sizeb);
        }
        let (addr, appended) = match target {
            Some(addr) => (addr, false),
            None => (self.append_target(header.slot_len())?, true),
        };

        self.file.write_all_at(slot_bytes, u64::from(addr))?;
        if appended {
            self.tail = addr + header.slot_len();
        }
        self.index.insert(
            h,
            Slot {
                addr,
                sizeb: header.sizeb,
                expire: header.expire,
            },
        );
        Ok(())
    }

    /// Reads the record for `h` and verifies the stored key, returning
    /// the value and its expiry. Expiration policy is left to callers.
    fn get_inner(&self, key: &[u8], h: u32) -> Result<(Vec<u8>, u32)> {
        let slot = self.index.get(&h).copied().ok_or(StoreError::NotFound)?;
        let raw = self.read_slot(slot)?;
        let (header, stored_key, value) = record::decode(&raw)?;
        if stored_key != key {
            return Err(StoreError::Collision);
        }
        Ok((value.to_vec(), header.expire))
    }

    pub(crate) fn read_slot(&self, slot: Slot) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 1usize << slot.sizeb];
        self.file.read_exact_at(&mut buf, u64::from(slot.addr))?;
        Ok(buf)
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.index.values()
    }

    /// Flips the status byte to the tombstone and records the hole.
    fn tombstone(&mut self, addr: u32, sizeb: u8) -> Result<()> {
        self.file
            .write_all_at(&[record::STATUS_DELETED], u64::from(addr) + record::STATUS_OFFSET)?;
        self.holes.insert(addr, sizeb);
        Ok(())
    }

    /// Removes and returns any hole of the given class.
    fn take_hole(&mut self, sizeb: u8) -> Option<u32> {
        let addr = self
            .holes
            .iter()
            .find_map(|(&addr, &class)| (class == sizeb).then_some(addr))?;
        self.holes.remove(&addr);
        Some(addr)
    }

    /// Offset for an append, or an error if the 32-bit offset space of
    /// this shard file is exhausted.
    fn append_target(&self, slot_len: u32) -> Result<u32> {
        let end = u64::from(self.tail) + u64::from(slot_len);
        if end > u64::from(u32::MAX) {
            return Err(StoreError::Format(
                "shard file reached the 4 GiB offset limit".into(),
            ));
        }
        Ok(self.tail)
    }
}

pub(crate) fn is_expired(expire: u32, now: u64) -> bool {
    expire != 0 && u64::from(expire) < now
}
