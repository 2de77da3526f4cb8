use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::entities::{ActivityScope, PreferenceUpdate, Session, UserPreferences};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// The canonical timestamp encoding for the store: RFC3339 UTC with second
/// precision, so lexicographic and chronological order agree.
pub fn fmt_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid stored timestamp '{value}': {err}"))
}

/// Handle to the session store. All SQL runs on one dedicated worker thread
/// (WAL mode), which serializes writes while the tracker, the report queries
/// and the maintenance loop stay free to call in concurrently.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("focuslog-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result = init_schema(&mut conn).context("failed to initialize schema");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Session store ready at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Durable insert of a closed session. The icon cache is upserted first
    /// when the session carries icon bytes; icon failures are logged and
    /// swallowed so they can never cost the session row itself.
    pub async fn append_session(&self, session: Session) -> Result<()> {
        if !session.is_well_formed() {
            warn!(
                "Dropping malformed session for {:?}: start {} end {}",
                session.app_name, session.start_time, session.end_time
            );
            return Ok(());
        }

        self.execute(move |conn| {
            let icon_id = match upsert_icon(conn, &session.app_name, session.icon.as_deref()) {
                Ok(id) => id,
                Err(err) => {
                    warn!("Icon cache update failed for {:?}: {err:?}", session.app_name);
                    None
                }
            };

            conn.execute(
                "INSERT INTO sessions (app_name, window_title, start_time, end_time, duration_seconds, exe_path, icon_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.app_name,
                    session.window_title,
                    fmt_time(session.start_time),
                    fmt_time(session.end_time),
                    session.duration_seconds(),
                    if session.exe_path.is_empty() {
                        None
                    } else {
                        Some(session.exe_path.as_str())
                    },
                    icon_id,
                ],
            )
            .with_context(|| "failed to insert session")?;
            Ok(())
        })
        .await
    }

    /// Reads the singleton preferences row. Missing or NULL fields default
    /// rather than erroring, so a store created by an older version keeps
    /// working.
    pub async fn get_preferences(&self) -> Result<UserPreferences> {
        self.execute(|conn| {
            let row = conn
                .query_row(
                    "SELECT track_private_mode, track_vpn, break_interval,
                            notify_every_interval, activity_scope,
                            history_retention_days, last_retention_sweep
                     FROM preferences LIMIT 1",
                    [],
                    |row| {
                        Ok(UserPreferences {
                            track_private_mode: row
                                .get::<_, Option<i64>>(0)?
                                .map_or(true, |v| v != 0),
                            track_vpn: row.get::<_, Option<i64>>(1)?.map_or(true, |v| v != 0),
                            break_interval: row
                                .get::<_, Option<String>>(2)?
                                .unwrap_or_else(|| "00:00".into()),
                            notify_every_interval: row
                                .get::<_, Option<i64>>(3)?
                                .map_or(false, |v| v != 0),
                            scope: ActivityScope::from_i64(
                                row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                            ),
                            history_retention_days: row
                                .get::<_, Option<i64>>(5)?
                                .and_then(|v| u32::try_from(v).ok()),
                            last_retention_sweep: row
                                .get::<_, Option<String>>(6)?
                                .and_then(|v| v.parse().ok()),
                        })
                    },
                )
                .optional()?;
            Ok(row.unwrap_or_default())
        })
        .await
    }

    pub async fn update_preference(&self, update: PreferenceUpdate) -> Result<()> {
        self.execute(move |conn| {
            let affected = match update {
                PreferenceUpdate::TrackPrivateMode(v) => conn.execute(
                    "UPDATE preferences SET track_private_mode = ?1",
                    params![v as i64],
                )?,
                PreferenceUpdate::TrackVpn(v) => {
                    conn.execute("UPDATE preferences SET track_vpn = ?1", params![v as i64])?
                }
                PreferenceUpdate::BreakInterval(v) => {
                    conn.execute("UPDATE preferences SET break_interval = ?1", params![v])?
                }
                PreferenceUpdate::NotifyEveryInterval(v) => conn.execute(
                    "UPDATE preferences SET notify_every_interval = ?1",
                    params![v as i64],
                )?,
                PreferenceUpdate::Scope(v) => conn.execute(
                    "UPDATE preferences SET activity_scope = ?1",
                    params![v.to_i64()],
                )?,
                PreferenceUpdate::HistoryRetentionDays(v) => conn.execute(
                    "UPDATE preferences SET history_retention_days = ?1",
                    params![v.map(|d| d as i64)],
                )?,
                PreferenceUpdate::LastRetentionSweep(v) => conn.execute(
                    "UPDATE preferences SET last_retention_sweep = ?1",
                    params![v.to_string()],
                )?,
            };
            if affected == 0 {
                return Err(anyhow!("preferences row missing"));
            }
            Ok(())
        })
        .await
    }

    /// Cached icon for an app, used to backfill samples whose extraction
    /// failed.
    pub async fn icon_for(&self, app_name: String) -> Result<Option<Vec<u8>>> {
        self.execute(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT icon FROM app_icons WHERE app_name = ?1",
                    params![app_name],
                    |row| row.get::<_, Option<Vec<u8>>>(0),
                )
                .optional()?
                .flatten())
        })
        .await
    }
}

fn upsert_icon(conn: &Connection, app_name: &str, icon: Option<&[u8]>) -> Result<Option<i64>> {
    if let Some(icon) = icon {
        conn.execute(
            "INSERT INTO app_icons (app_name, icon) VALUES (?1, ?2)
             ON CONFLICT(app_name) DO UPDATE SET icon = excluded.icon",
            params![app_name, icon],
        )?;
    }
    let id = conn
        .query_row(
            "SELECT id FROM app_icons WHERE app_name = ?1",
            params![app_name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(id)
}

fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS app_icons (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             app_name TEXT UNIQUE,
             icon BLOB
         );
         CREATE TABLE IF NOT EXISTS sessions (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             app_name TEXT NOT NULL,
             window_title TEXT NOT NULL,
             start_time TEXT NOT NULL,
             end_time TEXT NOT NULL,
             duration_seconds INTEGER NOT NULL,
             exe_path TEXT,
             icon_id INTEGER REFERENCES app_icons(id)
         );
         CREATE TABLE IF NOT EXISTS preferences (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             track_private_mode INTEGER DEFAULT 1,
             track_vpn INTEGER DEFAULT 1
         );",
    )?;

    // Preference fields accreted over time; older stores gain them here.
    ensure_column(conn, "preferences", "break_interval", "TEXT DEFAULT '00:00'")?;
    ensure_column(conn, "preferences", "notify_every_interval", "INTEGER DEFAULT 0")?;
    ensure_column(conn, "preferences", "activity_scope", "INTEGER DEFAULT 0")?;
    ensure_column(conn, "preferences", "history_retention_days", "INTEGER")?;
    ensure_column(conn, "preferences", "last_retention_sweep", "TEXT")?;

    conn.execute(
        "INSERT INTO preferences (track_private_mode, track_vpn)
         SELECT 1, 1 WHERE NOT EXISTS (SELECT 1 FROM preferences)",
        [],
    )?;

    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, definition: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|v| v.ok())
        .any(|name| name.eq_ignore_ascii_case(column));
    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition};"))?;
    }
    Ok(())
}
