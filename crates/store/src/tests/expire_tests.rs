use std::thread;
use std::time::Duration;

use anyhow::Result;
use tempfile::tempdir;

use super::helpers::*;
use crate::{now_unix, Options, Store, StoreError};

fn now() -> u32 {
    now_unix() as u32
}

// --------------------- Lazy expiry on lookup ---------------------

#[test]
fn expired_key_disappears_on_get() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.set(b"short", b"lived", now() + 1)?;
    store.set(b"keeper", b"forever", 0)?;
    assert_eq!(store.get(b"short")?, b"lived");

    thread::sleep(Duration::from_secs(2));

    assert!(matches!(store.get(b"short"), Err(StoreError::NotFound)));
    // the lookup retired the record
    assert_eq!(store.count(), 1);
    assert_eq!(store.get(b"keeper")?, b"forever");
    Ok(())
}

#[test]
fn touch_extends_a_lifetime() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.set(b"k", b"v", now() + 1)?;
    store.touch(b"k", now() + 3)?;

    thread::sleep(Duration::from_secs(2));
    // past the original deadline, alive thanks to the touch
    assert_eq!(store.get(b"k")?, b"v");

    thread::sleep(Duration::from_secs(2));
    assert!(matches!(store.get(b"k"), Err(StoreError::NotFound)));
    Ok(())
}

#[test]
fn touch_missing_or_expired_is_not_found() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    assert!(matches!(
        store.touch(b"ghost", now() + 10),
        Err(StoreError::NotFound)
    ));

    store.set(b"k", b"v", now() + 1)?;
    thread::sleep(Duration::from_secs(2));
    assert!(matches!(
        store.touch(b"k", now() + 10),
        Err(StoreError::NotFound)
    ));
    Ok(())
}

#[test]
fn touch_can_clear_an_expiry() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.set(b"k", b"v", now() + 2)?;
    store.touch(b"k", 0)?;
    thread::sleep(Duration::from_secs(3));
    assert_eq!(store.get(b"k")?, b"v");
    Ok(())
}

#[test]
fn incr_preserves_the_expiry() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    store.set(b"c", &0u64.to_be_bytes(), now() + 1)?;
    store.incr(b"c", 1)?;

    thread::sleep(Duration::from_secs(2));
    assert!(matches!(store.get(b"c"), Err(StoreError::NotFound)));
    Ok(())
}

// --------------------- Active sweeps ---------------------

#[test]
fn expire_all_sweeps_without_lookups() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path());

    for i in 0..20 {
        store.set(format!("gone{}", i).as_bytes(), b"v", now() + 1)?;
    }
    for i in 0..5 {
        store.set(format!("kept{}", i).as_bytes(), b"v", 0)?;
    }

    thread::sleep(Duration::from_secs(2));
    store.expire_all()?;
    assert_eq!(store.count(), 5);
    Ok(())
}

#[test]
fn swept_slots_are_reused() -> Result<()> {
    let dir = tempdir()?;
    let store = open_single(dir.path());

    for i in 0..10 {
        store.set(format!("k{}", i).as_bytes(), b"payload", now() + 1)?;
    }
    let size = store.file_size()?;

    thread::sleep(Duration::from_secs(2));
    store.expire_all()?;
    assert_eq!(store.count(), 0);

    // identical keys and lengths land back in the freed slots
    for i in 0..10 {
        store.set(format!("k{}", i).as_bytes(), b"payload", 0)?;
    }
    assert_eq!(store.file_size()?, size);
    Ok(())
}

#[test]
fn expired_records_become_holes_on_reopen() -> Result<()> {
    let dir = tempdir()?;
    let size;
    {
        let store = open_single(dir.path());
        store.set(b"k", b"payload", now() + 1)?;
        size = store.file_size()?;
        store.close()?;
    }

    thread::sleep(Duration::from_secs(2));
    let store = open_single(dir.path());
    assert_eq!(store.count(), 0);

    // the expired slot was indexed as a hole and is reused
    store.set(b"x", b"payload", 0)?;
    assert_eq!(store.file_size()?, size);
    Ok(())
}

// --------------------- Background janitors ---------------------

#[test]
fn expire_janitor_sweeps_in_the_background() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(
        Options::default()
            .dir(dir.path())
            .total_chunks(4)
            .collision_chunks(1)
            .expire_interval(Duration::from_millis(25)),
    )?;

    for i in 0..5 {
        store.set(format!("k{}", i).as_bytes(), b"v", now() + 1)?;
    }

    // one shard advances per 25 ms tick; after the deadline a full
    // rotation needs at most 100 ms, leave generous slack
    thread::sleep(Duration::from_secs(3));
    assert_eq!(store.count(), 0);
    store.close()?;
    Ok(())
}

#[test]
fn sync_janitor_runs_and_shuts_down() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(
        small_opts(dir.path()).sync_interval(Duration::from_millis(10)),
    )?;
    store.set(b"k", b"v", 0)?;
    thread::sleep(Duration::from_millis(60));
    store.close()?;
    Ok(())
}
