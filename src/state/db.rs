//! SQLite-backed persistent store for swarms, workers and their event log.
//!
//! One [`Connection`] behind a [`Mutex`] — `rusqlite::Connection` is `Send` but
//! not `Sync`, and every operation here is a short transaction, so a mutex is
//! simpler than a connection pool for a single-process coordination service.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::models::{
    CompleteOutcome, Event, EventKind, RegisterOutcome, Swarm, SwarmStatus, SwarmStatusView,
    Worker, WorkerStatus,
};

const MIGRATIONS: &str = "
CREATE TABLE IF NOT EXISTS swarms (
    swarm_id            TEXT PRIMARY KEY,
    feature             TEXT NOT NULL,
    manifest_path       TEXT NOT NULL,
    status              TEXT NOT NULL CHECK (status IN ('created','running','complete','failed')),
    auto_merge          INTEGER NOT NULL,
    notify_on_complete  INTEGER NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    completed_at        TEXT
);

CREATE TABLE IF NOT EXISTS workers (
    worker_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    swarm_id        TEXT NOT NULL REFERENCES swarms(swarm_id),
    packet_id       INTEGER NOT NULL,
    packet_name     TEXT NOT NULL,
    worktree        TEXT NOT NULL,
    status          TEXT NOT NULL CHECK (status IN ('registered','running','complete','failed')),
    tasks_total     INTEGER NOT NULL,
    tasks_completed INTEGER NOT NULL DEFAULT 0,
    final_commit    TEXT,
    tests_passed    INTEGER,
    review_passed   INTEGER,
    registered_at   TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    completed_at    TEXT,
    UNIQUE (swarm_id, packet_id)
);

CREATE TABLE IF NOT EXISTS events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    swarm_id    TEXT NOT NULL REFERENCES swarms(swarm_id),
    event_type  TEXT NOT NULL,
    packet_id   INTEGER,
    task_id     TEXT,
    task_name   TEXT,
    commit_hash TEXT,
    error_type  TEXT,
    error_message TEXT,
    recoverable INTEGER,
    event_data  TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workers_swarm ON workers(swarm_id);
CREATE INDEX IF NOT EXISTS idx_events_swarm ON events(swarm_id, event_id);
";

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn new_swarm_id() -> String {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = &Uuid::new_v4().simple().to_string()[..6];
    format!("swarm-{stamp}-{suffix}")
}

pub struct StateManager {
    conn: Mutex<Connection>,
}

impl StateManager {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign_keys")?;
        conn.execute_batch(MIGRATIONS)
            .context("failed to run schema migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_swarm(
        &self,
        feature: &str,
        manifest_path: &str,
        auto_merge: bool,
        notify_on_complete: bool,
    ) -> Result<Swarm> {
        let conn = self.conn.lock().unwrap();
        let now = now_iso();
        let swarm_id = new_swarm_id();
        conn.execute(
            "INSERT INTO swarms (swarm_id, feature, manifest_path, status, auto_merge, notify_on_complete, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, 'created', ?4, ?5, ?6, ?6, NULL)",
            params![swarm_id, feature, manifest_path, auto_merge, notify_on_complete, now],
        )
        .context("failed to insert swarm")?;

        Ok(Swarm {
            swarm_id,
            feature: feature.to_string(),
            manifest_path: manifest_path.to_string(),
            status: SwarmStatus::Created,
            auto_merge,
            notify_on_complete,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn get_swarm(&self, swarm_id: &str) -> Result<Option<Swarm>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT swarm_id, feature, manifest_path, status, auto_merge, notify_on_complete, created_at, updated_at, completed_at
             FROM swarms WHERE swarm_id = ?1",
            params![swarm_id],
            row_to_swarm,
        )
        .optional()
        .context("failed to look up swarm")
    }

    pub fn register_worker(
        &self,
        swarm_id: &str,
        packet_id: i64,
        packet_name: &str,
        tasks_total: i64,
        worktree: &str,
    ) -> Result<RegisterOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("failed to start transaction")?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM workers WHERE swarm_id = ?1 AND packet_id = ?2)",
                params![swarm_id, packet_id],
                |row| row.get(0),
            )
            .context("failed to check for existing worker")?;
        if exists {
            return Ok(RegisterOutcome::Conflict);
        }

        let now = now_iso();
        tx.execute(
            "INSERT INTO workers (swarm_id, packet_id, packet_name, worktree, status, tasks_total, tasks_completed, registered_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'registered', ?5, 0, ?6, ?6)",
            params![swarm_id, packet_id, packet_name, worktree, tasks_total, now],
        )
        .context("failed to insert worker")?;
        let worker_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE swarms SET status = 'running', updated_at = ?1 WHERE swarm_id = ?2",
            params![now, swarm_id],
        )
        .context("failed to mark swarm running")?;

        tx.execute(
            "INSERT INTO events (swarm_id, event_type, packet_id, task_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                swarm_id,
                EventKind::WorkerRegistered.to_string(),
                packet_id,
                packet_name,
                now
            ],
        )
        .context("failed to record worker_registered event")?;

        tx.commit().context("failed to commit registration")?;

        Ok(RegisterOutcome::Registered(Worker {
            worker_id,
            swarm_id: swarm_id.to_string(),
            packet_id,
            packet_name: packet_name.to_string(),
            worktree: worktree.to_string(),
            status: WorkerStatus::Registered,
            tasks_total,
            tasks_completed: 0,
            final_commit: None,
            tests_passed: None,
            review_passed: None,
            registered_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_progress(
        &self,
        swarm_id: &str,
        packet_id: i64,
        task_id: &str,
        task_name: &str,
        task_status: &str,
        tasks_completed: i64,
        tasks_total: i64,
        commit: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("failed to start transaction")?;
        let now = now_iso();

        tx.execute(
            "UPDATE workers SET status = 'running', tasks_completed = ?1, tasks_total = ?2, updated_at = ?3
             WHERE swarm_id = ?4 AND packet_id = ?5",
            params![tasks_completed, tasks_total, now, swarm_id, packet_id],
        )
        .context("failed to update worker progress")?;

        let event_data = serde_json::json!({ "task_status": task_status }).to_string();
        tx.execute(
            "INSERT INTO events (swarm_id, event_type, packet_id, task_id, task_name, commit_hash, event_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                swarm_id,
                EventKind::Progress.to_string(),
                packet_id,
                task_id,
                task_name,
                commit,
                event_data,
                now
            ],
        )
        .context("failed to record progress event")?;

        tx.commit().context("failed to commit progress update")?;
        Ok(())
    }

    pub fn mark_complete(
        &self,
        swarm_id: &str,
        packet_id: i64,
        final_commit: &str,
        tests_passed: bool,
        review_passed: bool,
    ) -> Result<CompleteOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("failed to start transaction")?;
        let now = now_iso();

        tx.execute(
            "UPDATE workers SET status = 'complete', final_commit = ?1, tests_passed = ?2, review_passed = ?3,
                completed_at = ?4, updated_at = ?4, tasks_completed = tasks_total
             WHERE swarm_id = ?5 AND packet_id = ?6",
            params![final_commit, tests_passed, review_passed, now, swarm_id, packet_id],
        )
        .context("failed to mark worker complete")?;

        tx.execute(
            "INSERT INTO events (swarm_id, event_type, packet_id, commit_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                swarm_id,
                EventKind::WorkerComplete.to_string(),
                packet_id,
                final_commit,
                now
            ],
        )
        .context("failed to record worker_complete event")?;

        let (total, completed): (i64, i64) = tx
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(status = 'complete'), 0) FROM workers WHERE swarm_id = ?1",
                params![swarm_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to aggregate worker completion")?;

        let remaining_workers = total - completed;
        let swarm_complete = total > 0 && remaining_workers == 0;

        if swarm_complete {
            tx.execute(
                "UPDATE swarms SET status = 'complete', completed_at = ?1, updated_at = ?1 WHERE swarm_id = ?2",
                params![now, swarm_id],
            )
            .context("failed to mark swarm complete")?;

            tx.execute(
                "INSERT INTO events (swarm_id, event_type, created_at) VALUES (?1, ?2, ?3)",
                params![swarm_id, EventKind::AllComplete.to_string(), now],
            )
            .context("failed to record all_complete event")?;
        }

        tx.commit().context("failed to commit completion")?;

        Ok(CompleteOutcome {
            swarm_complete,
            remaining_workers,
        })
    }

    pub fn record_error(
        &self,
        swarm_id: &str,
        packet_id: i64,
        task_id: &str,
        error_type: &str,
        message: &str,
        recoverable: bool,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("failed to start transaction")?;
        let now = now_iso();

        if !recoverable {
            tx.execute(
                "UPDATE workers SET status = 'failed', updated_at = ?1 WHERE swarm_id = ?2 AND packet_id = ?3",
                params![now, swarm_id, packet_id],
            )
            .context("failed to mark worker failed")?;
        }

        tx.execute(
            "INSERT INTO events (swarm_id, event_type, packet_id, task_id, error_type, error_message, recoverable, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                swarm_id,
                EventKind::WorkerError.to_string(),
                packet_id,
                task_id,
                error_type,
                message,
                recoverable,
                now
            ],
        )
        .context("failed to record worker_error event")?;

        tx.commit().context("failed to commit error report")?;
        Ok(())
    }

    pub fn get_events(&self, swarm_id: &str, since_event_id: i64) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT event_id, swarm_id, event_type, packet_id, task_id, task_name, commit_hash,
                        error_type, error_message, recoverable, event_data, created_at
                 FROM events WHERE swarm_id = ?1 AND event_id > ?2 ORDER BY event_id ASC",
            )
            .context("failed to prepare event query")?;
        let rows = stmt
            .query_map(params![swarm_id, since_event_id], row_to_event)
            .context("failed to query events")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to collect events")
    }

    pub fn get_status(&self, swarm_id: &str) -> Result<Option<SwarmStatusView>> {
        let conn = self.conn.lock().unwrap();
        let swarm = conn
            .query_row(
                "SELECT swarm_id, feature, manifest_path, status, auto_merge, notify_on_complete, created_at, updated_at, completed_at
                 FROM swarms WHERE swarm_id = ?1",
                params![swarm_id],
                row_to_swarm,
            )
            .optional()
            .context("failed to look up swarm")?;

        let Some(swarm) = swarm else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT worker_id, swarm_id, packet_id, packet_name, worktree, status, tasks_total, tasks_completed,
                        final_commit, tests_passed, review_passed, registered_at, updated_at, completed_at
                 FROM workers WHERE swarm_id = ?1 ORDER BY packet_id ASC",
            )
            .context("failed to prepare worker query")?;
        let workers: Vec<Worker> = stmt
            .query_map(params![swarm_id], row_to_worker)
            .context("failed to query workers")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to collect workers")?;

        let workers_registered = workers.len() as i64;
        let workers_complete = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Complete)
            .count() as i64;
        let workers_failed = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Failed)
            .count() as i64;

        Ok(Some(SwarmStatusView {
            swarm,
            workers_registered,
            workers_complete,
            workers_failed,
            workers,
        }))
    }

    /// Counts used by the health endpoint: swarms not yet complete/failed, and all workers.
    pub fn health_counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let active_swarms: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM swarms WHERE status IN ('created','running')",
                [],
                |row| row.get(0),
            )
            .context("failed to count active swarms")?;
        let total_workers: i64 = conn
            .query_row("SELECT COUNT(*) FROM workers", [], |row| row.get(0))
            .context("failed to count workers")?;
        Ok((active_swarms, total_workers))
    }

    /// Deletes swarms (and their workers/events, in the same transaction) whose
    /// `created_at` is older than `retention_days`, regardless of status — a
    /// swarm that never completed is just as stale as one that did. Returns
    /// the count removed.
    pub fn cleanup_old_swarms(&self, retention_days: i64) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("failed to start transaction")?;

        let cutoff = (Utc::now() - chrono::Duration::days(retention_days))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let stale_ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT swarm_id FROM swarms WHERE created_at < ?1")
                .context("failed to prepare cleanup query")?;
            stmt.query_map(params![cutoff], |row| row.get(0))
                .context("failed to query stale swarms")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to collect stale swarms")?
        };

        for swarm_id in &stale_ids {
            tx.execute("DELETE FROM events WHERE swarm_id = ?1", params![swarm_id])
                .context("failed to delete events")?;
            tx.execute("DELETE FROM workers WHERE swarm_id = ?1", params![swarm_id])
                .context("failed to delete workers")?;
            tx.execute("DELETE FROM swarms WHERE swarm_id = ?1", params![swarm_id])
                .context("failed to delete swarm")?;
        }

        tx.commit().context("failed to commit cleanup")?;
        Ok(stale_ids.len())
    }
}

fn row_to_swarm(row: &rusqlite::Row) -> rusqlite::Result<Swarm> {
    let status: String = row.get(3)?;
    Ok(Swarm {
        swarm_id: row.get(0)?,
        feature: row.get(1)?,
        manifest_path: row.get(2)?,
        status: status.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        auto_merge: row.get(4)?,
        notify_on_complete: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

fn row_to_worker(row: &rusqlite::Row) -> rusqlite::Result<Worker> {
    let status: String = row.get(5)?;
    Ok(Worker {
        worker_id: row.get(0)?,
        swarm_id: row.get(1)?,
        packet_id: row.get(2)?,
        packet_name: row.get(3)?,
        worktree: row.get(4)?,
        status: status.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
        })?,
        tasks_total: row.get(6)?,
        tasks_completed: row.get(7)?,
        final_commit: row.get(8)?,
        tests_passed: row.get(9)?,
        review_passed: row.get(10)?,
        registered_at: row.get(11)?,
        updated_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let event_type: String = row.get(2)?;
    Ok(Event {
        event_id: row.get(0)?,
        swarm_id: row.get(1)?,
        event_type: event_type.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        packet_id: row.get(3)?,
        task_id: row.get(4)?,
        task_name: row.get(5)?,
        commit: row.get(6)?,
        error_type: row.get(7)?,
        error_message: row.get(8)?,
        recoverable: row.get(9)?,
        event_data: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(11)?,
    })
}
