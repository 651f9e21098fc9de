// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based store of candidate embeddings.
//!
//! Each row holds one embedding of one record: a whole-structure vector or a
//! single window. Vectors are kept in their comma-separated text form and the
//! record metadata as an opaque JSON object.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::codec::{format_vector, parse_vector};
use super::orchestrator::Embedding;
use crate::errors::{Error, Result};
use crate::utils::{DATA_DIR, STORE_FILE};

const SCHEMA_VERSION: &str = "1";

/// A candidate embedding with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    /// Record identifier (several rows share it when windows are stored)
    pub id: String,
    /// Dot-bracket structure the embedding was computed from
    pub structure: String,
    /// Window start, or `None` for a whole-structure embedding
    pub window_start: Option<usize>,
    /// Embedding vector
    #[serde(skip)]
    pub vector: Vec<f32>,
    /// Caller-supplied metadata, passed through unchanged
    pub metadata: Value,
}

impl CandidateRecord {
    /// Builds a record from an embedding. The sentinel has no vector and
    /// yields `None`.
    pub fn from_embedding(
        id: &str,
        structure: &str,
        embedding: &Embedding,
        metadata: Value,
    ) -> Option<Self> {
        let vector = embedding.vector()?.to_vec();
        let window_start = match embedding {
            Embedding::Window { start, .. } => Some(*start),
            _ => None,
        };
        Some(Self {
            id: id.to_string(),
            structure: structure.to_string(),
            window_start,
            vector,
            metadata,
        })
    }
}

/// SQLite-based candidate store.
///
/// Stores candidates in `.rnasim/candidates.sqlite` by default.
pub struct CandidateStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl CandidateStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens the store in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(DATA_DIR).join(STORE_FILE))
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS candidate_embeddings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT NOT NULL,
                structure TEXT NOT NULL,
                window_start INTEGER,
                metadata TEXT NOT NULL,
                embedding_vector TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_candidate_embeddings_record
                ON candidate_embeddings(record_id);
            "#,
        )?;

        if self.get_meta("schema_version")?.is_none() {
            self.set_meta("schema_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// Returns the path to the database file (`None` when in memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the storage connection explicitly.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    /// Vector dimension shared by all stored rows, once anything was stored.
    pub fn dimension(&self) -> Result<Option<usize>> {
        match self.get_meta("dimension")? {
            Some(raw) => raw
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::config(format!("Corrupt stored dimension: {}", raw))),
            None => Ok(None),
        }
    }

    /// Inserts records in a single transaction.
    ///
    /// Every vector must match the stored dimension (the first insert fixes
    /// it). Nothing is written when any record mismatches.
    pub fn insert_records(&mut self, records: &[CandidateRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let expected = match self.dimension()? {
            Some(dim) => dim,
            None => records[0].vector.len(),
        };
        let bad = records
            .iter()
            .find(|r| r.vector.len() != expected || r.vector.is_empty());
        if let Some(bad) = bad {
            return Err(Error::DimensionMismatch {
                expected,
                got: bad.vector.len(),
            });
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO candidate_embeddings (
                    record_id, structure, window_start, metadata, embedding_vector, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;

            for record in records {
                stmt.execute(params![
                    record.id,
                    record.structure,
                    record.window_start.map(|s| s as i64),
                    serde_json::to_string(&record.metadata)?,
                    format_vector(&record.vector),
                    created_at
                ])?;
            }
        }
        tx.execute(
            r#"
            INSERT INTO meta (key, value) VALUES ('dimension', ?1)
            ON CONFLICT(key) DO NOTHING
            "#,
            params![expected.to_string()],
        )?;
        tx.commit()?;

        debug!(count = records.len(), dimension = expected, "stored candidates");
        Ok(records.len())
    }

    /// Reads every candidate, in insertion order.
    ///
    /// The result is a snapshot; later writes do not affect it.
    pub fn load_candidates(&self) -> Result<Vec<CandidateRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT record_id, structure, window_start, metadata, embedding_vector
            FROM candidate_embeddings
            ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, structure, window_start, metadata, vector)| -> Result<CandidateRecord> {
                Ok(CandidateRecord {
                    id,
                    structure,
                    window_start: window_start.map(|s| s as usize),
                    vector: parse_vector(&vector)?,
                    metadata: serde_json::from_str(&metadata)?,
                })
            })
            .collect()
    }

    /// Counts stored rows.
    pub fn count_records(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM candidate_embeddings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Deletes every row of a record.
    pub fn delete_record(&self, record_id: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM candidate_embeddings WHERE record_id = ?1",
            params![record_id],
        )?;
        Ok(deleted)
    }

    /// Deletes all candidates and forgets the stored dimension and model.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM candidate_embeddings;
            DELETE FROM meta WHERE key IN ('dimension', 'model_id');
            "#,
        )?;
        Ok(())
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: &str, vector: Vec<f32>) -> CandidateRecord {
        CandidateRecord {
            id: id.to_string(),
            structure: "(...)".to_string(),
            window_start: None,
            vector,
            metadata: json!({"gene_name": id}),
        }
    }

    #[test]
    fn test_store_create_and_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("candidates.sqlite");

        let store = CandidateStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.get_meta("schema_version").unwrap().as_deref(), Some("1"));
        store.close().unwrap();

        let store = CandidateStore::open(&db_path).unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
    }

    #[test]
    fn test_insert_and_load_preserves_order_and_metadata() {
        let mut store = CandidateStore::open_in_memory().unwrap();
        let mut windowed = record("b", vec![0.25, -1.0]);
        windowed.window_start = Some(7);
        windowed.metadata = json!({"chr": "1", "exon_number": 3, "nested": {"x": [1, 2]}});

        store
            .insert_records(&[record("a", vec![1.0, 2.0]), windowed.clone()])
            .unwrap();

        let loaded = store.load_candidates().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a");
        assert_eq!(loaded[0].window_start, None);
        assert_eq!(loaded[1], windowed);
        assert_eq!(store.dimension().unwrap(), Some(2));
    }

    #[test]
    fn test_dimension_enforced() {
        let mut store = CandidateStore::open_in_memory().unwrap();
        store.insert_records(&[record("a", vec![1.0, 2.0])]).unwrap();

        let err = store
            .insert_records(&[record("b", vec![1.0, 2.0]), record("c", vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, got: 1 }));
        // Nothing from the rejected batch was written.
        assert_eq!(store.count_records().unwrap(), 1);
    }

    #[test]
    fn test_sentinel_is_not_a_record() {
        let sentinel = CandidateRecord::from_embedding("x", ".", &Embedding::TooShort, Value::Null);
        assert!(sentinel.is_none());
        let r = CandidateRecord::from_embedding(
            "x",
            "((..))",
            &Embedding::Window {
                start: 2,
                vector: vec![1.0],
            },
            Value::Null,
        )
        .unwrap();
        assert_eq!(r.window_start, Some(2));
    }

    #[test]
    fn test_delete_and_clear() {
        let mut store = CandidateStore::open_in_memory().unwrap();
        store
            .insert_records(&[
                record("a", vec![1.0]),
                record("a", vec![2.0]),
                record("b", vec![3.0]),
            ])
            .unwrap();
        store.set_meta("model_id", "dummy").unwrap();

        assert_eq!(store.delete_record("a").unwrap(), 2);
        assert_eq!(store.count_records().unwrap(), 1);

        store.clear_all().unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
        assert_eq!(store.dimension().unwrap(), None);
        assert_eq!(store.get_meta("model_id").unwrap(), None);
        store.insert_records(&[record("c", vec![1.0, 1.0, 1.0])]).unwrap();
        assert_eq!(store.dimension().unwrap(), Some(3));
    }
}
