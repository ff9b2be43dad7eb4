//! Database module for switchboard
//!
//! Provides persistence for threads, messages, their image attachments and
//! the supervisor's per-thread checkpoints.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        // Databases created before the step log existed lack these columns
        for statement in MIGRATION_ADD_COLUMNS {
            let _ = conn.execute(statement, []);
        }

        Ok(())
    }

    // ==================== Thread Operations ====================

    /// Create a new thread owned by `user_id`
    pub fn create_thread(&self, id: &str, user_id: &str, title: &str) -> DbResult<Thread> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO threads (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, title, now.to_rfc3339()],
        )?;

        Ok(Thread {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
        })
    }

    /// List the threads owned by a user, oldest first
    pub fn list_threads(&self, user_id: &str) -> DbResult<Vec<Thread>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, created_at FROM threads
             WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![user_id], parse_thread_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get a thread, failing unless it belongs to `user_id`
    pub fn get_thread_for_user(&self, id: &str, user_id: &str) -> DbResult<Thread> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, title, created_at FROM threads WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            parse_thread_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::ThreadNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// Rename a thread owned by `user_id`, returning the stored title
    pub fn rename_thread(&self, id: &str, user_id: &str, title: Option<&str>) -> DbResult<String> {
        let conn = self.conn.lock().unwrap();
        let title = normalize_title(title);

        let updated = conn.execute(
            "UPDATE threads SET title = ?1 WHERE id = ?2 AND user_id = ?3",
            params![title, id, user_id],
        )?;

        if updated == 0 {
            return Err(DbError::ThreadNotFound(id.to_string()));
        }
        Ok(title)
    }

    /// Delete a thread with its messages, attachments and checkpoint
    pub fn delete_thread(&self, id: &str, user_id: &str) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Messages and attachments are deleted by CASCADE
        let deleted = tx.execute(
            "DELETE FROM threads WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;

        if deleted == 0 {
            return Err(DbError::ThreadNotFound(id.to_string()));
        }

        tx.execute("DELETE FROM checkpoints WHERE thread_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Persist one user/assistant exchange atomically.
    ///
    /// Both messages and their attachments are written in a single
    /// transaction; readers never observe the user message alone.
    pub fn commit_turn(
        &self,
        thread_id: &str,
        user: &NewMessage,
        assistant: &NewMessage,
    ) -> DbResult<(Message, Message)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM threads WHERE id = ?1)",
            params![thread_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::ThreadNotFound(thread_id.to_string()));
        }

        let sequence_id: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;

        let now = Utc::now();
        let user_msg = insert_message(&tx, thread_id, sequence_id, user, now)?;
        let assistant_msg = insert_message(&tx, thread_id, sequence_id + 1, assistant, now)?;

        tx.commit()?;
        Ok((user_msg, assistant_msg))
    }

    /// Get messages for a thread in the order they were written
    pub fn get_messages(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.thread_id, m.sequence_id, m.role, m.content, m.steps, m.created_at,
                    (SELECT i.url FROM message_images i WHERE i.message_id = m.id
                     ORDER BY i.rowid ASC LIMIT 1) AS image
             FROM messages m WHERE m.thread_id = ?1 ORDER BY m.sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![thread_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Checkpoint Operations ====================

    /// Load the serialized supervisor state for a thread
    pub fn load_checkpoint(&self, thread_id: &str) -> DbResult<Option<Value>> {
        let conn = self.conn.lock().unwrap();
        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?;

        state
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    /// Replace the serialized supervisor state for a thread
    pub fn save_checkpoint(&self, thread_id: &str, state: &Value) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let state_json = serde_json::to_string(state)?;

        conn.execute(
            "INSERT INTO checkpoints (thread_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(thread_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![thread_id, state_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn insert_message(
    conn: &Connection,
    thread_id: &str,
    sequence_id: i64,
    message: &NewMessage,
    now: DateTime<Utc>,
) -> DbResult<Message> {
    let message_id = uuid::Uuid::new_v4().to_string();
    let steps_json = message
        .steps
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO messages (id, thread_id, sequence_id, role, content, steps, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message_id,
            thread_id,
            sequence_id,
            message.role.as_str(),
            message.content,
            steps_json,
            now.to_rfc3339(),
        ],
    )?;

    if let Some(url) = &message.image {
        conn.execute(
            "INSERT INTO message_images (id, message_id, url) VALUES (?1, ?2, ?3)",
            params![uuid::Uuid::new_v4().to_string(), message_id, url],
        )?;
    }

    Ok(Message {
        message_id,
        thread_id: thread_id.to_string(),
        sequence_id,
        role: message.role,
        content: message.content.clone(),
        image: message.image.clone(),
        steps: message.steps.clone().unwrap_or_default(),
        created_at: now,
    })
}

fn parse_thread_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let steps = row
        .get::<_, Option<String>>(5)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(Message {
        message_id: row.get(0)?,
        thread_id: row.get(1)?,
        sequence_id: row.get(2)?,
        role: Role::parse(&row.get::<_, String>(3)?),
        content: row.get(4)?,
        steps,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        image: row.get(7)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
