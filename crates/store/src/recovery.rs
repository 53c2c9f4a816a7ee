//! Cold-start path: scanning a shard file to rebuild its index, and
//! migrating legacy (v0) files to the current layout.
//!
//! The scan walks slot boundaries sequentially: header, skip the value,
//! read the key, skip the padding. Live unexpired records go to the
//! index; tombstones and already-expired records become holes. A record
//! cut short by a crash mid-append is truncated away so later appends
//! overwrite the torn bytes; earlier slots are never touched.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use record::{Header, LegacyHeader, FILE_PREFIX, HEADER_BYTES, LEGACY_HEADER_BYTES, STATUS_DELETED};
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::shard::{is_expired, Slot};
use crate::{hash32, now_unix};

pub(crate) struct Recovered {
    pub index: HashMap<u32, Slot>,
    pub holes: HashMap<u32, u8>,
    pub tail: u32,
}

/// Rebuilds the index and hole map from a current-version shard file.
///
/// A slot that extends past the end of the file (including a partial
/// header) is a torn tail: the file is truncated back to the last clean
/// boundary. A header that is structurally invalid *within* the file is
/// corruption and fails the open.
pub(crate) fn scan(file: &File, path: &Path) -> Result<Recovered> {
    let len = file.metadata()?.len();
    if len > u64::from(u32::MAX) {
        return Err(StoreError::Format(format!(
            "shard {} exceeds the 4 GiB offset limit",
            path.display()
        )));
    }

    let mut index = HashMap::new();
    let mut holes = HashMap::new();
    let now = now_unix();
    let mut offset = FILE_PREFIX.len() as u64;
    let mut torn = false;

    {
        let mut rdr = BufReader::new(file);
        rdr.seek(SeekFrom::Start(offset))?;

        while offset < len {
            if offset + HEADER_BYTES as u64 > len {
                torn = true;
                break;
            }
            let mut head = [0u8; HEADER_BYTES];
            rdr.read_exact(&mut head)?;
            let header = Header::parse(&head)?;
            header.validate().map_err(|e| {
                StoreError::Format(format!(
                    "shard {} at offset {offset}: {e}",
                    path.display()
                ))
            })?;

            let slot_len = u64::from(header.slot_len());
            if offset + slot_len > len {
                torn = true;
                break;
            }

            rdr.seek_relative(header.vallen as i64)?;
            let mut key = vec![0u8; header.keylen as usize];
            rdr.read_exact(&mut key)?;
            rdr.seek_relative((slot_len - header.used_len()) as i64)?;

            let addr = offset as u32;
            if header.status != STATUS_DELETED && !is_expired(header.expire, now) {
                index.insert(
                    hash32(&key),
                    Slot {
                        addr,
                        sizeb: header.sizeb,
                        expire: header.expire,
                    },
                );
            } else {
                holes.insert(addr, header.sizeb);
            }
            offset += slot_len;
        }
    }

    if torn {
        warn!(
            shard = %path.display(),
            offset,
            len,
            "truncating torn tail left by an interrupted append"
        );
        file.set_len(offset)?;
        file.sync_all()?;
    }

    Ok(Recovered {
        index,
        holes,
        tail: offset as u32,
    })
}

/// Rewrites a legacy (v0) shard file in the current layout.
///
/// v0 files have no prefix and an 8-byte header with no expire field.
/// Live records are re-encoded (classes recomputed for the wider
/// header); tombstones are dropped. The replacement is written to
/// `<name>.new`, fsynced, and renamed over the original, so a crash
/// mid-migration leaves the old file intact.
pub(crate) fn migrate_legacy(path: &Path, old: File) -> Result<File> {
    let tmp_path = path.with_extension("new");
    let mut out = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    out.write_all(&FILE_PREFIX)?;

    let len = old.metadata()?.len();
    let mut rdr = BufReader::new(&old);
    let mut offset = 0u64;
    let mut kept = 0usize;
    let mut dropped = 0usize;

    while offset < len {
        if offset + LEGACY_HEADER_BYTES as u64 > len {
            warn!(shard = %path.display(), offset, "legacy file has a torn tail; dropping it");
            break;
        }
        let mut head = [0u8; LEGACY_HEADER_BYTES];
        rdr.read_exact(&mut head)?;
        let header = LegacyHeader::parse(&head).map_err(|e| {
            StoreError::Format(format!(
                "legacy shard {} at offset {offset}: {e}",
                path.display()
            ))
        })?;

        let slot_len = u64::from(header.slot_len());
        if offset + slot_len > len {
            warn!(shard = %path.display(), offset, "legacy file has a torn tail; dropping it");
            break;
        }

        if header.status == STATUS_DELETED {
            rdr.seek_relative((slot_len - LEGACY_HEADER_BYTES as u64) as i64)?;
            dropped += 1;
        } else {
            let mut value = vec![0u8; header.vallen as usize];
            rdr.read_exact(&mut value)?;
            let mut key = vec![0u8; header.keylen as usize];
            rdr.read_exact(&mut key)?;
            let used = LEGACY_HEADER_BYTES as u64 + header.vallen as u64 + header.keylen as u64;
            rdr.seek_relative((slot_len - used) as i64)?;

            let (_, slot) = record::encode(&key, &value, 0)?;
            out.write_all(&slot)?;
            kept += 1;
        }
        offset += slot_len;
    }

    out.sync_all()?;
    drop(rdr);
    drop(old);
    fs::rename(&tmp_path, path)?;
    info!(
        shard = %path.display(),
        kept,
        dropped,
        "migrated legacy shard file to the current layout"
    );
    Ok(out)
}
