//! Persisted sighting store with a live change feed.
//!
//! [`SightingStore`] owns the SQLite pool and exposes CRUD over the
//! `sightings` table. Every committed write emits exactly one
//! [`ChangeEvent`] onto an unbounded, ordered feed; the feed's single
//! receiver is handed out once via [`SightingStore::take_changes`] and
//! drained by the change bridge.
//!
//! All methods are synchronous rusqlite calls; async callers wrap them in
//! `tokio::task::spawn_blocking`.

use cryptid_db::DbPool;
use cryptid_types::{ChangeEvent, Sighting};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sighting not found: {0}")]
    NotFound(String),
    #[error("sighting already exists: {0}")]
    Duplicate(String),
}

/// Parameters for creating a new sighting. The public id is assigned by the
/// store, never supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSightingParams {
    pub state: String,
    pub description: String,
    pub location: Option<String>,
    pub sighted_at: Option<String>,
}

/// Parameters for a partial update. Only `Some` fields are modified; the id
/// is not updatable (there is deliberately no id field here).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSightingParams {
    pub state: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub sighted_at: Option<String>,
}

impl UpdateSightingParams {
    fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.sighted_at.is_none()
    }
}

/// The sighting store: CRUD plus the mutation change feed.
pub struct SightingStore {
    pool: DbPool,
    changes_tx: mpsc::UnboundedSender<ChangeEvent>,
    changes_rx: Mutex<Option<mpsc::UnboundedReceiver<ChangeEvent>>>,
    /// Held across (SQL write → confirming read → feed send) so events enter
    /// the feed in commit order even when writers run on multiple blocking
    /// threads. Never held across an await point; all callers are sync.
    feed_lock: Mutex<()>,
}

impl SightingStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        Self {
            pool,
            changes_tx,
            changes_rx: Mutex::new(Some(changes_rx)),
            feed_lock: Mutex::new(()),
        }
    }

    /// Hands out the change-feed receiver. Returns `None` on every call after
    /// the first — the feed has exactly one consumer, and duplicating it
    /// would double-publish every event.
    pub fn take_changes(&self) -> Option<mpsc::UnboundedReceiver<ChangeEvent>> {
        self.changes_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Creates a sighting, assigning a fresh UUID, and returns the committed
    /// record read back from the database. Emits one creation event.
    pub fn create(&self, params: &CreateSightingParams) -> Result<Sighting, StoreError> {
        let conn = self.pool.get()?;
        let id = Uuid::new_v4().to_string();

        let _feed = self.feed_lock.lock().unwrap_or_else(|e| e.into_inner());

        conn.execute(
            "INSERT INTO sightings (sighting_id, state, description, location, sighted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                params.state,
                params.description,
                params.location,
                params.sighted_at,
            ],
        )
        .map_err(|e| map_duplicate(e, &id))?;

        // Confirming read: the response reflects the committed row, not the
        // caller's input echoed back.
        let current = get_by_id(&conn, &id)?;
        self.emit(ChangeEvent {
            previous: None,
            current: Some(current.clone()),
        });
        Ok(current)
    }

    /// Retrieves a sighting by its public id.
    pub fn get(&self, id: &str) -> Result<Sighting, StoreError> {
        let conn = self.pool.get()?;
        get_by_id(&conn, id)
    }

    /// Lists all sightings for a state. Order is not part of the contract.
    pub fn list_by_state(&self, state: &str) -> Result<Vec<Sighting>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT sighting_id, state, description, location, sighted_at, created_at
             FROM sightings WHERE state = ?1",
        )?;
        let rows = stmt.query_map([state], map_row_to_sighting)?;
        let mut sightings = Vec::new();
        for row in rows {
            sightings.push(row?);
        }
        Ok(sightings)
    }

    /// Applies a partial update in a single UPDATE statement and returns the
    /// committed record. Emits one update event carrying both snapshots.
    ///
    /// An update with no fields set verifies existence and returns the
    /// current record without emitting an event (nothing was committed).
    pub fn update(&self, id: &str, updates: &UpdateSightingParams) -> Result<Sighting, StoreError> {
        let conn = self.pool.get()?;

        let _feed = self.feed_lock.lock().unwrap_or_else(|e| e.into_inner());

        let previous = get_by_id(&conn, id)?;

        if updates.is_empty() {
            return Ok(previous);
        }

        let mut set_parts: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1usize;

        if let Some(state) = &updates.state {
            set_parts.push(format!("state = ?{}", idx));
            values.push(Box::new(state.clone()));
            idx += 1;
        }
        if let Some(description) = &updates.description {
            set_parts.push(format!("description = ?{}", idx));
            values.push(Box::new(description.clone()));
            idx += 1;
        }
        if let Some(location) = &updates.location {
            set_parts.push(format!("location = ?{}", idx));
            values.push(Box::new(location.clone()));
            idx += 1;
        }
        if let Some(sighted_at) = &updates.sighted_at {
            set_parts.push(format!("sighted_at = ?{}", idx));
            values.push(Box::new(sighted_at.clone()));
            idx += 1;
        }

        let sql = format!(
            "UPDATE sightings SET {} WHERE sighting_id = ?{}",
            set_parts.join(", "),
            idx
        );
        values.push(Box::new(id.to_string()));

        let sql_params: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let count = conn.execute(&sql, sql_params.as_slice())?;
        if count == 0 {
            // Row vanished between the read above and the write; treat as
            // missing rather than pretending the update landed.
            return Err(StoreError::NotFound(id.to_string()));
        }

        let current = get_by_id(&conn, id)?;
        self.emit(ChangeEvent {
            previous: Some(previous),
            current: Some(current.clone()),
        });
        Ok(current)
    }

    /// Deletes a sighting and returns the removed record. Deleting an
    /// unknown id is `NotFound` (strict semantics, consistent with get and
    /// update) and emits nothing. Emits one destruction event otherwise.
    pub fn delete(&self, id: &str) -> Result<Sighting, StoreError> {
        let conn = self.pool.get()?;

        let _feed = self.feed_lock.lock().unwrap_or_else(|e| e.into_inner());

        let previous = get_by_id(&conn, id)?;
        let count = conn.execute("DELETE FROM sightings WHERE sighting_id = ?1", [id])?;
        if count == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        self.emit(ChangeEvent {
            previous: Some(previous.clone()),
            current: None,
        });
        Ok(previous)
    }

    fn emit(&self, event: ChangeEvent) {
        // A missing receiver means the bridge is gone; writes still succeed.
        if self.changes_tx.send(event).is_err() {
            tracing::debug!("change feed receiver dropped; event not delivered");
        }
    }
}

fn get_by_id(conn: &Connection, id: &str) -> Result<Sighting, StoreError> {
    conn.query_row(
        "SELECT sighting_id, state, description, location, sighted_at, created_at
         FROM sightings WHERE sighting_id = ?1",
        [id],
        map_row_to_sighting,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn map_duplicate(e: rusqlite::Error, id: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(error_code, _) = &e {
        if error_code.code == rusqlite::ffi::ErrorCode::ConstraintViolation {
            return StoreError::Duplicate(id.to_string());
        }
    }
    StoreError::Database(e)
}

fn map_row_to_sighting(row: &Row) -> rusqlite::Result<Sighting> {
    Ok(Sighting {
        id: row.get(0)?,
        state: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        sighted_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}
