use super::helpers::{count_files, tiny_options};
use crate::*;
use anyhow::Result;
use std::collections::HashSet;
use tempfile::tempdir;

#[test]
fn rotation_produces_multiple_segments() -> Result<()> {
    let dir = tempdir()?;
    // 20 KiB bound; each record is ~26 bytes, so a few thousand writes roll
    // the log several times.
    let db = Database::open(dir.path(), tiny_options(20 * 1024))?;

    for i in 0..5000u32 {
        db.put(format!("{}", i).as_bytes(), format!("value{}", i).as_bytes())?;
    }

    assert!(count_files(dir.path(), "df") >= 2);
    assert_eq!(db.sealed_count()?, count_files(dir.path(), "df") - 1);
    Ok(())
}

#[test]
fn keys_survive_rotation() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::open(dir.path(), tiny_options(128))?;

    db.put(b"early", b"bird")?;
    for i in 0..100u32 {
        db.put(format!("filler{}", i).as_bytes(), b"xxxxxxxxxxxxxxxx")?;
    }
    assert!(db.sealed_count()? > 0);

    assert_eq!(db.get(b"early")?.unwrap(), b"bird");
    Ok(())
}

#[test]
fn same_second_rotations_get_unique_ids() -> Result<()> {
    let dir = tempdir()?;
    // A 1-byte bound rotates on every put after the first, far faster than
    // the wall clock ticks.
    let db = Database::open(dir.path(), tiny_options(1))?;

    for i in 0..10u32 {
        db.put(format!("k{}", i).as_bytes(), b"v")?;
    }

    let mut seen = HashSet::new();
    for entry in std::fs::read_dir(dir.path())? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("df") {
            assert!(
                seen.insert(datafile::parse_file_id(&path)?),
                "duplicate file id at {}",
                path.display()
            );
        }
    }
    assert!(seen.len() >= 10);

    // Every key still resolves after the id churn.
    for i in 0..10u32 {
        assert_eq!(db.get(format!("k{}", i).as_bytes())?.unwrap(), b"v");
    }
    Ok(())
}

#[test]
fn overwrites_across_segments_read_newest() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::open(dir.path(), tiny_options(64))?;

    for i in 0..50u32 {
        db.put(b"shared", format!("v{}", i).as_bytes())?;
    }
    assert!(db.sealed_count()? > 0);

    assert_eq!(db.get(b"shared")?.unwrap(), b"v49");
    Ok(())
}

#[test]
fn delete_in_a_later_segment_shadows_an_earlier_value() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::open(dir.path(), tiny_options(64))?;

    db.put(b"doomed", b"value")?;
    for i in 0..20u32 {
        db.put(format!("filler{}", i).as_bytes(), b"xxxxxxxx")?;
    }
    assert!(db.sealed_count()? > 0);

    db.delete(b"doomed")?;
    assert!(db.get(b"doomed")?.is_none());
    Ok(())
}
