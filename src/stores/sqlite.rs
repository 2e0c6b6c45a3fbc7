//! Per-document similarity index backed by SQLite + `sqlite-vec`.
//!
//! One index artifact is one SQLite database holding a single `embeddings`
//! table. Row ids are assigned in insertion order, which makes them the rank
//! ids the metadata's chunk order maps back to pages. Similarity search is a
//! brute-force `vec_distance_cosine` scan ordered by distance with row id as
//! the tie break, so equal scores resolve to the earliest-inserted chunk.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use tokio_rusqlite::{Connection, ffi};

use crate::types::RagError;

/// Open handle to one document's vector index artifact.
pub struct DocumentIndex {
    conn: Connection,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex").finish_non_exhaustive()
    }
}

impl DocumentIndex {
    /// Creates a fresh index database at `path`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let index = Self::open(path).await?;
        index
            .conn
            .call(|conn| -> Result<(), tokio_rusqlite::rusqlite::Error> {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS embeddings (
                         id INTEGER PRIMARY KEY,
                         embedding BLOB NOT NULL
                     )",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(index)
    }

    /// Opens an existing index database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        // Fail fast if the extension did not load.
        conn.call(|conn| -> Result<(), tokio_rusqlite::rusqlite::Error> {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }

    /// Appends vectors in order; their row ids become the rank ids.
    pub async fn add_vectors(&self, vectors: &[Vec<f32>]) -> Result<(), RagError> {
        if vectors.is_empty() {
            return Ok(());
        }
        let encoded: Result<Vec<String>, RagError> = vectors
            .iter()
            .map(|vector| {
                serde_json::to_string(vector).map_err(|err| RagError::Storage(err.to_string()))
            })
            .collect();
        let encoded = encoded?;
        self.conn
            .call(move |conn| -> Result<(), tokio_rusqlite::rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("INSERT INTO embeddings (embedding) VALUES (vec_f32(?))")?;
                    for vector in &encoded {
                        stmt.execute([vector])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    /// Number of vectors stored in this index.
    pub async fn vector_count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| -> Result<usize, tokio_rusqlite::rusqlite::Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    /// Returns up to `k` `(rank_id, score)` pairs, best first.
    ///
    /// Score is `1 - cosine_distance`, which on unit vectors equals the
    /// inner-product similarity the index was built for.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let encoded =
            serde_json::to_string(query).map_err(|err| RagError::Storage(err.to_string()))?;
        self.conn
            .call(
                move |conn| -> Result<Vec<(usize, f32)>, tokio_rusqlite::rusqlite::Error> {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, vec_distance_cosine(embedding, vec_f32(?)) AS distance \
                         FROM embeddings \
                         ORDER BY distance ASC, id ASC \
                         LIMIT {k}"
                    ))?;
                    let rows = stmt.query_map([&encoded], |row| {
                        let id: i64 = row.get(0)?;
                        let distance: f32 = row.get(1)?;
                        Ok(((id - 1) as usize, 1.0 - distance))
                    })?;
                    let mut results = Vec::new();
                    for row in rows {
                        results.push(row?);
                    }
                    Ok(results)
                },
            )
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    /// Closes the underlying connection, flushing the database file.
    pub async fn close(self) -> Result<(), RagError> {
        self.conn
            .close()
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

/// Registers `sqlite-vec` as an auto extension, once per process.
fn register_sqlite_vec() -> Result<(), RagError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(RagError::Storage)
}
