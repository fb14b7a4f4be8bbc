//! Database migration utilities
//!
//! Handles format migrations to preserve stored moments across versions.
//!
//! - v1: node records without a populated `tdf_hash`, bincode or JSON values
//! - v2: every node record is bincode with a current `tdf_hash`

use crate::error::{GraphError, Result};
use crate::node::Node;
use crate::storage::NODE_PREFIX;
use crate::tdf::{compute_tdf_hash, is_stale};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

/// Database version stored in metadata
pub const DB_VERSION_KEY: &[u8] = b"_db_version";
pub const CURRENT_VERSION: u32 = 2;

/// Read the stored version; stores that predate the key are v1
pub fn read_version(db: &DB) -> Result<u32> {
    match db.get(DB_VERSION_KEY)? {
        Some(bytes) => {
            let bytes_slice: &[u8] = bytes.as_ref();
            let version_bytes: [u8; 4] = bytes_slice
                .try_into()
                .map_err(|_| GraphError::other("Invalid version format"))?;
            Ok(u32::from_le_bytes(version_bytes))
        }
        None => Ok(1),
    }
}

/// Stamp a store that has no version key with the current version
///
/// Only called after `migrate_if_needed`, so an unversioned store at this
/// point is a fresh one.
pub fn ensure_version(db: &DB) -> Result<()> {
    if db.get(DB_VERSION_KEY)?.is_none() {
        db.put(DB_VERSION_KEY, CURRENT_VERSION.to_le_bytes())?;
        log::debug!("Stamped new database with version {}", CURRENT_VERSION);
    }
    Ok(())
}

/// Check if database needs migration and perform if needed
pub fn migrate_if_needed(db_path: impl AsRef<Path>) -> Result<()> {
    let path = db_path.as_ref();

    // CURRENT exists once RocksDB has initialized the directory
    if !path.join("CURRENT").exists() {
        log::debug!(
            "No existing database found at {}, skipping migration",
            path.display()
        );
        return Ok(());
    }

    let mut opts = Options::default();
    opts.create_if_missing(false);
    let db = DB::open(&opts, path)?;

    let current_version = read_version(&db)?;

    log::info!(
        "Database version: {} (current: {})",
        current_version,
        CURRENT_VERSION
    );

    if current_version > CURRENT_VERSION {
        return Err(GraphError::other(format!(
            "Unknown database version: {}",
            current_version
        )));
    }

    if current_version < CURRENT_VERSION {
        log::warn!(
            "Database needs migration from v{} to v{}",
            current_version,
            CURRENT_VERSION
        );
        perform_migration(&db, current_version)?;

        db.put(DB_VERSION_KEY, CURRENT_VERSION.to_le_bytes())?;
        db.flush()?;

        log::info!("Migration completed successfully");
    }

    Ok(())
}

/// Perform migration from old version to current
fn perform_migration(db: &DB, from_version: u32) -> Result<()> {
    match from_version {
        1 => {
            migrate_v1_to_v2(db)?;
        }
        _ => {
            return Err(GraphError::other(format!(
                "Unknown database version: {}",
                from_version
            )))
        }
    }
    Ok(())
}

/// Backfill `tdf_hash` and normalize every node record to bincode
///
/// Returns the number of rewritten records.
fn migrate_v1_to_v2(db: &DB) -> Result<usize> {
    log::info!("Migrating database from v1 to v2...");

    let mut batch = WriteBatch::default();
    let mut rewritten = 0;
    let mut skipped = 0;

    for item in db.iterator(IteratorMode::Start) {
        let (key, value) = item?;
        let key_str = String::from_utf8_lossy(&key);
        let Some(id) = key_str.strip_prefix(NODE_PREFIX) else {
            continue;
        };

        let (mut node, was_json) = match bincode::deserialize::<Node>(&value) {
            Ok(node) => (node, false),
            Err(bincode_err) => match serde_json::from_slice::<Node>(&value) {
                Ok(node) => (node, true),
                Err(json_err) => {
                    log::error!(
                        "Failed to deserialize node {}: bincode error: {}, JSON error: {}. Skipping.",
                        id,
                        bincode_err,
                        json_err
                    );
                    skipped += 1;
                    continue;
                }
            },
        };

        if was_json || is_stale(&node) {
            node.tdf_hash = compute_tdf_hash(&node);
            batch.put(&key[..], bincode::serialize(&node)?);
            rewritten += 1;
            log::debug!("Backfilled tdf_hash for {}", id);
        }
    }

    db.write(batch)?;

    log::info!(
        "Backfilled {} node records ({} skipped)",
        rewritten,
        skipped
    );
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_node() -> Node {
        Node::builder()
            .date(1969, 7, 20)
            .location("united-states", "florida", "cape-canaveral")
            .name("Apollo 11 Moon Landing")
            .build()
            .unwrap()
            .into_node(Utc::now())
            .unwrap()
    }

    fn stored_version(db: &DB) -> u32 {
        read_version(db).unwrap()
    }

    #[test]
    fn test_migration_backfills_tdf_hash() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path();
        let mut node = sample_node();
        let expected = node.tdf_hash.clone();
        node.tdf_hash.clear();
        let key = format!("{}{}", NODE_PREFIX, node.id);

        // v1 store: no version key, empty hash
        {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, db_path).unwrap();
            db.put(key.as_bytes(), bincode::serialize(&node).unwrap())
                .unwrap();
            db.flush().unwrap();
        }

        migrate_if_needed(db_path).unwrap();

        let db = DB::open_default(db_path).unwrap();
        assert_eq!(stored_version(&db), CURRENT_VERSION);
        let bytes = db.get(key.as_bytes()).unwrap().unwrap();
        let migrated: Node = bincode::deserialize(&bytes).unwrap();
        assert_eq!(migrated.tdf_hash, expected);
    }

    #[test]
    fn test_migration_converts_json_records() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path();
        let node = sample_node();
        let key = format!("{}{}", NODE_PREFIX, node.id);

        {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, db_path).unwrap();
            db.put(key.as_bytes(), serde_json::to_vec(&node).unwrap())
                .unwrap();
            db.put(b"node:/corrupt", b"not a node").unwrap();
        }

        migrate_if_needed(db_path).unwrap();

        let db = DB::open_default(db_path).unwrap();
        let bytes = db.get(key.as_bytes()).unwrap().unwrap();
        let migrated: Node = bincode::deserialize(&bytes).unwrap();
        assert_eq!(migrated.id, node.id);
    }

    #[test]
    fn test_unknown_version_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path();
        {
            let db = DB::open_default(db_path).unwrap();
            db.put(DB_VERSION_KEY, 99u32.to_le_bytes()).unwrap();
        }
        assert!(migrate_if_needed(db_path).is_err());
    }

    #[test]
    fn test_fresh_directory_skips_migration() {
        let temp_dir = TempDir::new().unwrap();
        migrate_if_needed(temp_dir.path().join("missing")).unwrap();
    }

    #[test]
    fn test_ensure_version_stamps_once() {
        let temp_dir = TempDir::new().unwrap();
        let db = DB::open_default(temp_dir.path()).unwrap();
        ensure_version(&db).unwrap();
        assert_eq!(stored_version(&db), CURRENT_VERSION);

        db.put(DB_VERSION_KEY, 1u32.to_le_bytes()).unwrap();
        ensure_version(&db).unwrap();
        assert_eq!(stored_version(&db), 1);
    }
}
