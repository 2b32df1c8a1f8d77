//! SQLite-backed [`CxnStore`].

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CxnStore, StoreError};
use crate::types::ConnectionRecord;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cxn (
        cxn_id TEXT PRIMARY KEY NOT NULL,
        app_id TEXT NOT NULL,
        record TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS cxn_app_id_idx ON cxn(app_id);
";

/// Connection records in one SQLite table, one JSON document per row.
pub struct SqliteCxnStore {
    conn: Mutex<Connection>,
}

impl SqliteCxnStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn decode_row(cxn_id: String, json: String) -> Result<ConnectionRecord, StoreError> {
    serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
        cxn_id,
        reason: e.to_string(),
    })
}

impl CxnStore for SqliteCxnStore {
    fn add(&self, cxn: &ConnectionRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(cxn).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.conn.lock().execute(
            "INSERT INTO cxn (cxn_id, app_id, record) VALUES (?1, ?2, ?3)
             ON CONFLICT(cxn_id) DO UPDATE SET app_id = excluded.app_id, record = excluded.record",
            params![cxn.cxn_id, cxn.app_id, json],
        )?;
        Ok(())
    }

    fn remove(&self, cxn_id: &str) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM cxn WHERE cxn_id = ?1", params![cxn_id])?;
        Ok(())
    }

    fn get_by_cxn_id(&self, cxn_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT cxn_id, record FROM cxn WHERE cxn_id = ?1",
                params![cxn_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(id, json)| decode_row(id, json)).transpose()
    }

    fn get_by_app_id(&self, app_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT cxn_id, record FROM cxn WHERE app_id = ?1 ORDER BY cxn_id LIMIT 1",
                params![app_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(id, json)| decode_row(id, json)).transpose()
    }

    fn get_all(&self) -> Result<Vec<ConnectionRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT cxn_id, record FROM cxn ORDER BY cxn_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, json)| decode_row(id, json))
            .collect()
    }
}
