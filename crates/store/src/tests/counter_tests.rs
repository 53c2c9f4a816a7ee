use anyhow::Result;
use tempfile::tempdir;

use super::helpers::*;
use crate::StoreError;

// --------------------- Increment / decrement ---------------------

#[test]
fn counter_starts_at_zero_and_wraps() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    assert_eq!(store.incr(b"c", 1)?, 1);
    assert_eq!(store.incr(b"c", 42)?, 43);
    assert_eq!(store.decr(b"c", 2)?, 41);
    // underflow wraps towards the top of the range
    assert_eq!(store.decr(b"c", 42)?, u64::MAX);
    Ok(())
}

#[test]
fn counter_value_is_big_endian_u64() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.incr(b"c", 0x0102_0304)?;
    let raw = store.get(b"c")?;
    assert_eq!(raw, 0x0102_0304u64.to_be_bytes());
    Ok(())
}

#[test]
fn incr_on_a_non_counter_value_is_a_format_error() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.set(b"c", b"12345", 0)?;
    assert!(matches!(store.incr(b"c", 1), Err(StoreError::Format(_))));
    assert!(matches!(store.decr(b"c", 1), Err(StoreError::Format(_))));
    // the stored value is untouched
    assert_eq!(store.get(b"c")?, b"12345");
    Ok(())
}

#[test]
fn incr_accepts_an_explicitly_set_counter() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.set(b"c", &7u64.to_be_bytes(), 0)?;
    assert_eq!(store.incr(b"c", 3)?, 10);
    Ok(())
}

#[test]
fn counter_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let store = open_small(dir.path());
        store.incr(b"c", 41)?;
        store.close()?;
    }

    let store = open_small(dir.path());
    assert_eq!(store.incr(b"c", 1)?, 42);
    Ok(())
}
