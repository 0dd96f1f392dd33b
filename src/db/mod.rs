use rusqlite::{Connection, params};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Last observed activity of one chat member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberActivity {
    pub member_id: u64,
    /// Unix timestamp, seconds.
    pub last_activity: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store connection poisoned")]
    Poisoned,
}

/// Persistent last-activity table shared by the recorder and the scanner.
///
/// Each call is atomic on its own; callers never hold a transaction across calls.
pub trait ActivityStore: Send + Sync {
    /// Create the record or overwrite its `last_activity`.
    fn upsert(&self, member_id: u64, timestamp: i64) -> Result<(), StoreError>;

    /// Delete the record. Returns whether a record existed.
    fn remove(&self, member_id: u64) -> Result<bool, StoreError>;

    /// Records with `last_activity < threshold`.
    fn find_stale(&self, threshold: i64) -> Result<Vec<MemberActivity>, StoreError>;

    /// Number of records with `last_activity >= threshold`.
    fn count_active(&self, threshold: i64) -> Result<u64, StoreError>;

    /// All records, least recently active first.
    fn list_all_sorted_by_activity(&self) -> Result<Vec<MemberActivity>, StoreError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS member_activity (
                member_id INTEGER PRIMARY KEY,
                last_activity INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS member_activity_last_activity
                ON member_activity(last_activity);
            ",
        )?;

        info!("Database initialized: {path}");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        p: impl rusqlite::Params,
    ) -> Result<Vec<MemberActivity>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(p, |row| {
            Ok(MemberActivity {
                member_id: row.get::<_, i64>(0)? as u64,
                last_activity: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl ActivityStore for Database {
    fn upsert(&self, member_id: u64, timestamp: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO member_activity (member_id, last_activity) VALUES (?1, ?2)
             ON CONFLICT(member_id) DO UPDATE SET last_activity = excluded.last_activity",
            params![member_id as i64, timestamp],
        )?;
        Ok(())
    }

    fn remove(&self, member_id: u64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM member_activity WHERE member_id = ?1",
            params![member_id as i64],
        )?;
        Ok(affected > 0)
    }

    fn find_stale(&self, threshold: i64) -> Result<Vec<MemberActivity>, StoreError> {
        let conn = self.conn()?;
        Self::query_records(
            &conn,
            "SELECT member_id, last_activity FROM member_activity
             WHERE last_activity < ?1 ORDER BY last_activity ASC, member_id ASC",
            params![threshold],
        )
    }

    fn count_active(&self, threshold: i64) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM member_activity WHERE last_activity >= ?1",
            params![threshold],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_all_sorted_by_activity(&self) -> Result<Vec<MemberActivity>, StoreError> {
        let conn = self.conn()?;
        Self::query_records(
            &conn,
            "SELECT member_id, last_activity FROM member_activity
             ORDER BY last_activity ASC, member_id ASC",
            params![],
        )
    }
}
