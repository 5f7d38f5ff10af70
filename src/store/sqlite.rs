//! SQLite-backed notification store
//!
//! # Invariants
//! - Connections have the schema fully migrated before they are used.
//! - A bulk insert runs in one transaction; a failure rolls back every row.
//! - Ids come from `AUTOINCREMENT`, so they never get reused and always grow with
//!   insertion order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::notification::{NewNotification, Notification, NotificationId, NotificationType, UserId};

use super::{ListQuery, NotificationStore, StoreError, StoreResult};

/// Schema migrations, applied in order. `PRAGMA user_version` records progress.
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        origin_user_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        type_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        recipient_user_id INTEGER NOT NULL,
        opened INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_notifications_recipient
        ON notifications (recipient_user_id, id);",
];

const SELECT_SQL: &str = "SELECT
    id,
    origin_user_id,
    kind,
    type_id,
    title,
    recipient_user_id,
    opened
FROM notifications";

/// Schema version after all migrations
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Notification store persisted in a SQLite database
pub struct SqliteNotificationStore {
    conn: Mutex<Connection>,
}

impl SqliteNotificationStore {
    /// Open (or create) a database file and apply pending migrations
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let started_at = Instant::now();

        let conn = Connection::open(path).map_err(|e| {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to open notification store"
            );
            StoreError::from(e)
        })?;
        let store = Self::bootstrap(conn)?;

        tracing::info!(
            path = %path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "Notification store opened"
        );
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    /// Current schema version of the underlying database
    pub fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.conn();
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn bootstrap(mut conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_migrations(conn: &mut Connection) -> StoreResult<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let version = index as u32 + 1;
        if version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;

        tracing::debug!(version = version, "Applied notification store migration");
    }

    Ok(())
}

/// Raw column values, converted outside the row closure so bad data maps to
/// `StoreError::InvalidData` instead of a generic SQLite error.
type RawRow = (i64, i64, String, i64, String, i64, i64);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn from_raw(raw: RawRow) -> StoreResult<Notification> {
    let (id, origin_user_id, kind, type_id, title, recipient_user_id, opened) = raw;
    let kind = NotificationType::parse(&kind)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown kind {:?} for id {}", kind, id)))?;

    let opened = match opened {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "opened flag {} for id {}",
                other, id
            )))
        }
    };

    Ok(Notification {
        id,
        origin_user_id,
        kind,
        type_id,
        title,
        recipient_user_id,
        opened,
    })
}

impl NotificationStore for SqliteNotificationStore {
    fn bulk_create(&self, batch: &[NewNotification]) -> StoreResult<Vec<NotificationId>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO notifications
                    (origin_user_id, kind, type_id, title, recipient_user_id, opened)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for n in batch {
                stmt.execute(params![
                    n.origin_user_id,
                    n.kind.as_str(),
                    n.type_id,
                    n.title,
                    n.recipient_user_id,
                    n.opened,
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;

        Ok(ids)
    }

    fn fetch_page(&self, recipient: UserId, query: &ListQuery) -> StoreResult<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_SQL}
             WHERE recipient_user_id = ?1 AND (?2 IS NULL OR id < ?2)
             ORDER BY id DESC
             LIMIT ?3"
        ))?;

        let raw = stmt
            .query_map(params![recipient, query.before, query.limit], read_raw)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(from_raw).collect()
    }

    fn get(&self, id: NotificationId) -> StoreResult<Option<Notification>> {
        let conn = self.conn();
        let raw = conn
            .query_row(&format!("{SELECT_SQL} WHERE id = ?1"), params![id], read_raw)
            .optional()?;

        raw.map(from_raw).transpose()
    }

    fn mark_opened(&self, id: NotificationId, recipient: UserId, opened: bool) -> StoreResult<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE notifications SET opened = ?1 WHERE id = ?2 AND recipient_user_id = ?3",
            params![opened, id, recipient],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn count_for(&self, recipient: UserId) -> StoreResult<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_user_id = ?1",
            params![recipient],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
