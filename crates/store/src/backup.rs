//! Backup and restore: a packed stream of live records.
//!
//! ## Stream Format
//!
//! ```text
//! [version: u8]
//! repeated: [12-byte record header][value: vallen bytes][key: keylen bytes]
//! ```
//!
//! Unlike the slot files there is no padding: records are tightly
//! packed, so a backup of a fragmented store is smaller than the store
//! itself. Deleted and expired records are never written. Restore
//! replays records through [`Store::set`], so they route and shard like
//! fresh writes; a backup taken with one shard count restores cleanly
//! into a store with another.

use std::io::{self, Read, Write};

use record::{Header, FILE_VERSION, HEADER_BYTES, STATUS_DELETED};

use crate::error::{Result, StoreError};
use crate::shard::{is_expired, Shard};
use crate::{now_unix, Store};

impl Store {
    /// Streams every live, unexpired record to `w`, one shard at a
    /// time. Each shard is locked exclusively while it is dumped, so the
    /// per-shard snapshot is consistent; the stream as a whole is not a
    /// point-in-time snapshot of the entire store.
    pub fn backup<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[FILE_VERSION])?;
        for shard in self.shards.iter() {
            shard.backup_into(w)?;
        }
        Ok(())
    }

    /// Replays a backup stream into this store.
    ///
    /// The stream ends cleanly at a record boundary. A partial header or
    /// a body cut short is a [`StoreError::Format`]; records already
    /// restored stay in place.
    pub fn restore<R: Read>(&self, r: &mut R) -> Result<()> {
        let mut version = [0u8; 1];
        r.read_exact(&mut version)
            .map_err(|_| StoreError::Format("backup stream missing version byte".into()))?;
        if version[0] != FILE_VERSION {
            return Err(StoreError::Format(format!(
                "unsupported backup version {}",
                version[0]
            )));
        }

        loop {
            let Some(head) = read_record_header(r)? else {
                return Ok(());
            };
            let header = Header::parse(&head)?;
            header.validate()?;

            let mut body = vec![0u8; header.vallen as usize + header.keylen as usize];
            r.read_exact(&mut body).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    StoreError::Format("truncated backup record body".into())
                } else {
                    StoreError::Io(e)
                }
            })?;

            if header.status == STATUS_DELETED {
                continue;
            }
            let (value, key) = body.split_at(header.vallen as usize);
            self.set(key, value, header.expire)?;
        }
    }
}

impl Shard {
    pub(crate) fn backup_into<W: Write>(&self, w: &mut W) -> Result<()> {
        let st = self.locked();
        let now = now_unix();
        for slot in st.slots() {
            if is_expired(slot.expire, now) {
                continue;
            }
            let raw = st.read_slot(*slot)?;
            let (header, key, value) = record::decode(&raw)?;
            let mut head = [0u8; HEADER_BYTES];
            header.write_to(&mut head);
            w.write_all(&head)?;
            w.write_all(value)?;
            w.write_all(key)?;
        }
        Ok(())
    }
}

/// Reads the next record header, distinguishing a clean end of stream
/// (no bytes at all) from a torn one (a partial header).
fn read_record_header<R: Read>(r: &mut R) -> Result<Option<[u8; HEADER_BYTES]>> {
    let mut buf = [0u8; HEADER_BYTES];
    let mut filled = 0usize;
    while filled < HEADER_BYTES {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(StoreError::Format("truncated backup record header".into()));
        }
        filled += n;
    }
    Ok(Some(buf))
}
