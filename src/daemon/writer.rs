//! Drains closed sessions from the tracker into the store. A failed write
//! is logged and dropped; the next boundary produces a fresh row. The task
//! finalizes once the channel closes, so everything queued before shutdown
//! still lands on disk.

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::storage::{db::Database, entities::Session};

pub async fn run(mut sessions: mpsc::Receiver<Session>, db: Database) {
    while let Some(session) = sessions.recv().await {
        debug!(
            "Persisting session {} [{} - {}]",
            session.app_name, session.start_time, session.end_time
        );
        if let Err(err) = db.append_session(session).await {
            error!("Failed to persist session: {err:?}");
        }
    }
    debug!("Session channel closed, writer finished");
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, Utc};

    use super::*;

    #[tokio::test]
    async fn writer_drains_queued_sessions_after_channel_close() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("usage.db"))?;
        let (tx, rx) = mpsc::channel(8);

        let start = Utc::now() - Duration::minutes(5);
        for i in 0..3 {
            tx.send(Session {
                app_name: "chrome".into(),
                window_title: format!("tab {i}"),
                exe_path: "C:\\apps\\chrome.exe".into(),
                start_time: start + Duration::seconds(i * 10),
                end_time: start + Duration::seconds(i * 10 + 5),
                icon: None,
            })
            .await?;
        }
        drop(tx);

        run(rx, db.clone()).await;

        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?))
            .await?;
        assert_eq!(count, 3);
        Ok(())
    }
}
