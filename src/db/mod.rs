use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub mod models;
use models::*;

/// The four cached snapshot kinds; one row each in the `snapshots` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Standings,
    Schedule,
    Roster,
    LiveGame,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Standings => "standings",
            SnapshotKind::Schedule => "schedule",
            SnapshotKind::Roster => "roster",
            SnapshotKind::LiveGame => "live_game",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe SQLite connection (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Generic snapshot access ──────────────────────────────────────────────

    /// Raw JSON body of a snapshot, for the HTTP endpoints
    pub fn load_json(&self, kind: SnapshotKind) -> Result<Option<String>> {
        let conn = self.lock()?;
        let body = conn
            .query_row(
                "SELECT body FROM snapshots WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    fn load<T: DeserializeOwned>(&self, kind: SnapshotKind) -> Result<Option<T>> {
        let Some(body) = self.load_json(kind)? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse cached {} snapshot", kind))?;
        Ok(Some(snapshot))
    }

    fn save<T: Serialize>(
        &self,
        kind: SnapshotKind,
        request_time: DateTime<Utc>,
        snapshot: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(snapshot)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO snapshots (kind, request_time, body, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind) DO UPDATE SET
                request_time=excluded.request_time,
                body=excluded.body,
                saved_at=excluded.saved_at",
            params![kind.as_str(), request_time, body, Utc::now()],
        )
        .with_context(|| format!("Failed to save {} snapshot", kind))?;
        debug!("Saved {} snapshot ({} bytes)", kind, body.len());
        Ok(())
    }

    // ── Standings ────────────────────────────────────────────────────────────

    pub fn load_standings(&self) -> Result<Option<StandingsSnapshot>> {
        self.load(SnapshotKind::Standings)
    }

    pub fn save_standings(&self, standings: &StandingsSnapshot) -> Result<()> {
        self.save(SnapshotKind::Standings, standings.request_time, standings)
    }

    // ── Schedule ─────────────────────────────────────────────────────────────

    pub fn load_schedule(&self) -> Result<Option<ScheduleSnapshot>> {
        self.load(SnapshotKind::Schedule)
    }

    pub fn save_schedule(&self, schedule: &ScheduleSnapshot) -> Result<()> {
        self.save(SnapshotKind::Schedule, schedule.request_time, schedule)
    }

    // ── Roster ───────────────────────────────────────────────────────────────

    pub fn load_roster(&self) -> Result<Option<RosterSnapshot>> {
        self.load(SnapshotKind::Roster)
    }

    pub fn save_roster(&self, roster: &RosterSnapshot) -> Result<()> {
        self.save(SnapshotKind::Roster, roster.request_time, roster)
    }

    // ── Live game ────────────────────────────────────────────────────────────

    pub fn load_live_game(&self) -> Result<Option<LiveGameSnapshot>> {
        self.load(SnapshotKind::LiveGame)
    }

    pub fn save_live_game(&self, game: &LiveGameSnapshot) -> Result<()> {
        self.save(SnapshotKind::LiveGame, game.request_time, game)
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    kind         TEXT PRIMARY KEY,
    request_time TEXT NOT NULL,
    body         TEXT NOT NULL,
    saved_at     TEXT NOT NULL
);
"#;
