use rusqlite::{Connection, Result};

/// Initialise the index schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            path        TEXT    NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_line  INTEGER NOT NULL,
            end_line    INTEGER NOT NULL,
            text        TEXT    NOT NULL,
            embedding   BLOB    NOT NULL,   -- little-endian f32 vector
            source_date TEXT,               -- YYYY-MM-DD or NULL
            PRIMARY KEY (path, chunk_index)
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);

        CREATE TABLE IF NOT EXISTS fingerprints (
            path      TEXT    NOT NULL PRIMARY KEY,
            mtime_ms  INTEGER NOT NULL,
            size      INTEGER NOT NULL,
            last_line INTEGER NOT NULL DEFAULT 0  -- tail cursor for chat logs
        );

        -- Resumable filesystem-listing walks: one cursor per configured root.
        CREATE TABLE IF NOT EXISTS sync_progress (
            source TEXT NOT NULL PRIMARY KEY,
            cursor TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT NOT NULL PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
}

/// f32 slice → little-endian blob.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Little-endian blob → f32 vector. Trailing partial floats are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let vec = vec![0.5f32, -1.25, 3.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
