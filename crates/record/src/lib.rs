//! # Record: BurrowKV on-disk record codec
//!
//! Pure byte-level encoding for the slot files of the BurrowKV storage
//! engine. A record is stored in a *slot*: a power-of-two-sized region
//! holding a fixed header, the value, the key, and zero padding up to the
//! slot boundary. Rounding every record up to a size class is what makes
//! hole reuse tractable: only a few dozen distinct classes exist, so a
//! freed slot can be recycled by any later record of the same class.
//!
//! ## Binary Slot Format
//!
//! ```text
//! [sizeb: u8][status: u8][keylen: u16 BE][vallen: u32 BE][expire: u32 BE]
//! [value: vallen bytes][key: keylen bytes][padding up to 1 << sizeb]
//! ```
//!
//! `sizeb` is the base-2 logarithm of the total slot size, header
//! included. `status` is 0 for a live record and 42 for a tombstone.
//! `expire` is an absolute Unix timestamp in seconds; 0 means the record
//! never expires.
//!
//! A non-empty slot file starts with the two-byte prefix `0xFF 0x01`
//! (magic marker + layout version). Files written before the prefix was
//! introduced use an 8-byte header with no `expire` field; see
//! [`LegacyHeader`]. `0xFF` can never be a legacy `sizeb`, which is what
//! makes version sniffing on the first byte sound.
//!
//! ## Example
//!
//! ```rust
//! use record::{decode, encode};
//!
//! let (header, slot) = encode(b"hello", b"world", 0).unwrap();
//! assert_eq!(slot.len(), 1 << header.sizeb);
//!
//! let (_, key, value) = decode(&slot).unwrap();
//! assert_eq!(key, b"hello");
//! assert_eq!(value, b"world");
//! ```

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// Size of the current record header in bytes.
pub const HEADER_BYTES: usize = 12;

/// Size of the legacy (v0) record header in bytes.
pub const LEGACY_HEADER_BYTES: usize = 8;

/// Byte offset of the `expire` field within a slot. `touch` rewrites
/// only these four bytes.
pub const EXPIRE_OFFSET: u64 = 8;

/// Byte offset of the `status` field within a slot. Tombstoning flips
/// only this single byte, which keeps retirement atomic.
pub const STATUS_OFFSET: u64 = 1;

/// Status byte of a live record.
pub const STATUS_LIVE: u8 = 0;

/// Status byte of a tombstoned record. The value is a tribute to dBASE.
pub const STATUS_DELETED: u8 = 42;

/// Magic marker at offset 0 of a non-empty slot file.
pub const FILE_MAGIC: u8 = 0xFF;

/// Current on-disk layout version, stored at offset 1.
pub const FILE_VERSION: u8 = 1;

/// The two-byte prefix of a non-empty current-version slot file.
pub const FILE_PREFIX: [u8; 2] = [FILE_MAGIC, FILE_VERSION];

/// Largest supported size class: slots are at most `1 << 19` = 512 KiB.
pub const MAX_SIZEB: u8 = 19;

/// Largest supported slot in bytes.
pub const MAX_SLOT_BYTES: u32 = 1 << MAX_SIZEB;

/// Errors produced while encoding or decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The key exceeds the 16-bit length field.
    #[error("key too large: {0} bytes (max 65535)")]
    KeyTooLarge(usize),

    /// Header plus payload does not fit the largest supported size class.
    #[error("record too large: {0} bytes (max slot 524288)")]
    TooLarge(u64),

    /// A slot's bytes cannot be parsed as a record.
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}

/// The fixed 12-byte header at the start of every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Base-2 logarithm of the total slot size.
    pub sizeb: u8,
    /// [`STATUS_LIVE`] or [`STATUS_DELETED`].
    pub status: u8,
    /// Length of the key in bytes.
    pub keylen: u16,
    /// Length of the value in bytes.
    pub vallen: u32,
    /// Absolute expiry in Unix seconds; 0 = never.
    pub expire: u32,
}

impl Header {
    /// Builds a live header for `key`/`value`, computing the size class.
    ///
    /// # Errors
    ///
    /// [`RecordError::KeyTooLarge`] if the key exceeds 65535 bytes,
    /// [`RecordError::TooLarge`] if header + payload exceeds the largest
    /// supported slot.
    pub fn new(key: &[u8], value: &[u8], expire: u32) -> Result<Header, RecordError> {
        if key.len() > u16::MAX as usize {
            return Err(RecordError::KeyTooLarge(key.len()));
        }
        let needed = HEADER_BYTES as u64 + key.len() as u64 + value.len() as u64;
        if needed > MAX_SLOT_BYTES as u64 {
            return Err(RecordError::TooLarge(needed));
        }
        let (sizeb, _) = next_pow2(needed as u32);
        Ok(Header {
            sizeb,
            status: STATUS_LIVE,
            keylen: key.len() as u16,
            vallen: value.len() as u32,
            expire,
        })
    }

    /// Parses a header from the first [`HEADER_BYTES`] of `b`.
    ///
    /// # Errors
    ///
    /// [`RecordError::Corrupt`] if `b` is shorter than a header.
    pub fn parse(b: &[u8]) -> Result<Header, RecordError> {
        if b.len() < HEADER_BYTES {
            return Err(RecordError::Corrupt("buffer shorter than header"));
        }
        Ok(Header {
            sizeb: b[0],
            status: b[1],
            keylen: BigEndian::read_u16(&b[2..4]),
            vallen: BigEndian::read_u32(&b[4..8]),
            expire: BigEndian::read_u32(&b[8..12]),
        })
    }

    /// Serializes the header into the first [`HEADER_BYTES`] of `b`.
    ///
    /// # Panics
    ///
    /// Panics if `b` is shorter than a header.
    pub fn write_to(&self, b: &mut [u8]) {
        b[0] = self.sizeb;
        b[1] = self.status;
        BigEndian::write_u16(&mut b[2..4], self.keylen);
        BigEndian::write_u32(&mut b[4..8], self.vallen);
        BigEndian::write_u32(&mut b[8..12], self.expire);
    }

    /// Total slot size in bytes, `1 << sizeb`.
    #[must_use]
    pub fn slot_len(&self) -> u32 {
        1u32 << self.sizeb
    }

    /// Bytes of payload actually used inside the slot, header included.
    #[must_use]
    pub fn used_len(&self) -> u64 {
        HEADER_BYTES as u64 + self.keylen as u64 + self.vallen as u64
    }

    /// Checks that the header describes a slot this codec can hold:
    /// the class is within bounds and header + payload fit the slot.
    ///
    /// # Errors
    ///
    /// [`RecordError::Corrupt`] on any violation.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.sizeb > MAX_SIZEB {
            return Err(RecordError::Corrupt("size class out of range"));
        }
        if self.used_len() > self.slot_len() as u64 {
            return Err(RecordError::Corrupt("lengths exceed slot size"));
        }
        Ok(())
    }
}

/// The 8-byte header used by v0 files (no `expire`, no file prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyHeader {
    pub sizeb: u8,
    pub status: u8,
    pub keylen: u16,
    pub vallen: u32,
}

impl LegacyHeader {
    /// Parses a legacy header from the first [`LEGACY_HEADER_BYTES`] of `b`.
    ///
    /// v0 never wrote empty keys, so `keylen == 0` is rejected along with
    /// lengths that cannot fit the slot.
    ///
    /// # Errors
    ///
    /// [`RecordError::Corrupt`] on a short buffer or invalid lengths.
    pub fn parse(b: &[u8]) -> Result<LegacyHeader, RecordError> {
        if b.len() < LEGACY_HEADER_BYTES {
            return Err(RecordError::Corrupt("buffer shorter than legacy header"));
        }
        let header = LegacyHeader {
            sizeb: b[0],
            status: b[1],
            keylen: BigEndian::read_u16(&b[2..4]),
            vallen: BigEndian::read_u32(&b[4..8]),
        };
        if header.keylen == 0 {
            return Err(RecordError::Corrupt("legacy record with empty key"));
        }
        if header.sizeb > 31 {
            return Err(RecordError::Corrupt("legacy size class out of range"));
        }
        let used =
            LEGACY_HEADER_BYTES as u64 + header.keylen as u64 + header.vallen as u64;
        if used > (1u64 << header.sizeb) {
            return Err(RecordError::Corrupt("legacy lengths exceed slot size"));
        }
        Ok(header)
    }

    /// Total slot size in bytes, `1 << sizeb`.
    #[must_use]
    pub fn slot_len(&self) -> u32 {
        1u32 << self.sizeb
    }
}

/// Encodes a live record into a freshly allocated, zero-padded slot.
///
/// # Errors
///
/// Propagates the size-limit errors of [`Header::new`].
pub fn encode(key: &[u8], value: &[u8], expire: u32) -> Result<(Header, Vec<u8>), RecordError> {
    let header = Header::new(key, value, expire)?;
    let mut slot = vec![0u8; header.slot_len() as usize];
    header.write_to(&mut slot);
    slot[HEADER_BYTES..HEADER_BYTES + value.len()].copy_from_slice(value);
    let key_off = HEADER_BYTES + value.len();
    slot[key_off..key_off + key.len()].copy_from_slice(key);
    Ok((header, slot))
}

/// Decodes a slot, returning the header and key/value slices.
///
/// Decoding never reads past the declared lengths, so a buffer holding
/// exactly `1 << sizeb` bytes (or any prefix covering the payload) is
/// sufficient.
///
/// # Errors
///
/// [`RecordError::Corrupt`] if the buffer is shorter than the header or
/// the declared payload.
pub fn decode(slot: &[u8]) -> Result<(Header, &[u8], &[u8]), RecordError> {
    let header = Header::parse(slot)?;
    header.validate()?;
    let val_end = HEADER_BYTES + header.vallen as usize;
    let key_end = val_end + header.keylen as usize;
    if key_end > slot.len() {
        return Err(RecordError::Corrupt("slot truncated"));
    }
    Ok((header, &slot[val_end..key_end], &slot[HEADER_BYTES..val_end]))
}

/// Returns the smallest power of two ≥ `n` as `(sizeb, 1 << sizeb)`.
///
/// `n == 0` yields `(0, 0)`; values above 2³¹ saturate to
/// `(32, u32::MAX)`.
#[must_use]
pub fn next_pow2(n: u32) -> (u8, u32) {
    if n == 0 {
        return (0, 0);
    }
    match n.checked_next_power_of_two() {
        Some(p) => (p.trailing_zeros() as u8, p),
        None => (32, u32::MAX),
    }
}
