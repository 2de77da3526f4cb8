//! Consistency maintenance over the session table. Runs once at startup and
//! then at the top of every hour: collapses near-duplicate rows left behind
//! by crashes or double-started daemons, and applies the optional history
//! retention policy once per calendar day.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::params;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::utils::{clock::Clock, time::next_hour_start};

use super::{db::Database, entities::PreferenceUpdate};

/// Near-duplicate detection only looks at recently written rows; anything
/// older has already been through several passes.
const NEAR_DUP_WINDOW: Duration = Duration::hours(4);

pub async fn run(db: Database, clock: Arc<dyn Clock>, cancellation_token: CancellationToken) {
    loop {
        if let Err(err) = run_passes(&db, clock.as_ref()).await {
            warn!("Maintenance pass failed, will retry next hour: {err:?}");
        }

        let now = clock.time();
        let next_run = next_hour_start(now);
        let wait = (next_run - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60 * 60));

        select! {
            _ = cancellation_token.cancelled() => {
                debug!("Maintenance loop cancelled");
                return;
            }
            _ = clock.sleep(wait) => {}
        }
    }
}

async fn run_passes(db: &Database, clock: &dyn Clock) -> Result<()> {
    let now = clock.time();

    let near_dups = delete_near_duplicates(db, now).await?;
    let collapsed = collapse_same_start(db).await?;
    if near_dups + collapsed > 0 {
        info!("Maintenance removed {near_dups} near-duplicate and {collapsed} same-start rows");
    }

    retention_sweep(db, now).await?;
    Ok(())
}

/// Deletes the higher-id row of every near-duplicate pair: same app, title
/// and exe path (NULL-safe), start/end/duration each within one second.
/// Scoped to rows that ended inside [NEAR_DUP_WINDOW].
async fn delete_near_duplicates(db: &Database, now: chrono::DateTime<Utc>) -> Result<usize> {
    let window_start = (now - NEAR_DUP_WINDOW).timestamp();
    db.execute(move |conn| {
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE id IN (
                 SELECT b.id FROM sessions a
                 JOIN sessions b ON b.id > a.id
                  AND a.app_name = b.app_name
                  AND a.window_title = b.window_title
                  AND a.exe_path IS b.exe_path
                  AND ABS(CAST(strftime('%s', a.start_time) AS INTEGER)
                        - CAST(strftime('%s', b.start_time) AS INTEGER)) <= 1
                  AND ABS(CAST(strftime('%s', a.end_time) AS INTEGER)
                        - CAST(strftime('%s', b.end_time) AS INTEGER)) <= 1
                  AND ABS(a.duration_seconds - b.duration_seconds) <= 1
                 WHERE CAST(strftime('%s', b.end_time) AS INTEGER) >= ?1
             )",
            params![window_start],
        )?;
        Ok(deleted)
    })
    .await
}

/// Two rows can never share `(app_name, start_time)`; the one written last
/// (highest id) carries the final end time and wins.
async fn collapse_same_start(db: &Database) -> Result<usize> {
    db.execute(|conn| {
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE id NOT IN (
                 SELECT MAX(id) FROM sessions GROUP BY app_name, start_time
             )",
            [],
        )?;
        Ok(deleted)
    })
    .await
}

/// Applies the configured retention period, at most once per calendar day.
async fn retention_sweep(db: &Database, now: chrono::DateTime<Utc>) -> Result<()> {
    let prefs = db.get_preferences().await?;
    let Some(retention_days) = prefs.history_retention_days else {
        return Ok(());
    };
    let today = now.date_naive();
    if prefs.last_retention_sweep == Some(today) {
        return Ok(());
    }

    let cutoff = (now - Duration::days(retention_days as i64)).timestamp();
    let deleted = db
        .execute(move |conn| {
            Ok(conn.execute(
                "DELETE FROM sessions
                 WHERE CAST(strftime('%s', end_time) AS INTEGER) < ?1",
                params![cutoff],
            )?)
        })
        .await?;
    if deleted > 0 {
        info!("Retention sweep removed {deleted} sessions older than {retention_days} days");
    }

    db.update_preference(PreferenceUpdate::LastRetentionSweep(today)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone};

    use crate::daemon::storage::entities::Session;
    use crate::utils::clock::DefaultClock;

    use super::*;

    fn session(app: &str, start: DateTime<Utc>, secs: i64) -> Session {
        Session {
            app_name: app.into(),
            window_title: format!("{app} window"),
            exe_path: format!("C:\\apps\\{app}.exe"),
            start_time: start,
            end_time: start + Duration::seconds(secs),
            icon: None,
        }
    }

    async fn count(db: &Database) -> Result<i64> {
        db.execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?))
            .await
    }

    #[tokio::test]
    async fn near_duplicates_collapse_to_one_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("usage.db"))?;
        let now = Utc::now();

        let start = now - Duration::minutes(10);
        db.append_session(session("chrome", start, 30)).await?;
        // Same identity, one second off in both directions.
        db.append_session(session("chrome", start + Duration::seconds(1), 30)).await?;
        // Different title survives.
        let mut other = session("chrome", start + Duration::seconds(10), 30);
        other.window_title = "something else".into();
        db.append_session(other).await?;

        assert_eq!(count(&db).await?, 3);
        run_passes(&db, &DefaultClock).await?;
        assert_eq!(count(&db).await?, 2);

        // Idempotent.
        run_passes(&db, &DefaultClock).await?;
        assert_eq!(count(&db).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn near_duplicate_pass_only_touches_recent_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("usage.db"))?;
        let old = Utc::now() - Duration::hours(10);

        db.append_session(session("chrome", old, 30)).await?;
        db.append_session(session("chrome", old + Duration::seconds(1), 30)).await?;

        run_passes(&db, &DefaultClock).await?;
        assert_eq!(count(&db).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn same_start_keeps_latest_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("usage.db"))?;
        let start = Utc.with_ymd_and_hms(2024, 5, 11, 10, 0, 0).unwrap();

        db.append_session(session("code", start, 30)).await?;
        db.append_session(session("code", start, 90)).await?;

        run_passes(&db, &DefaultClock).await?;

        let (remaining, duration): (i64, i64) = db
            .execute(|conn| {
                let remaining =
                    conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
                let duration = conn.query_row(
                    "SELECT duration_seconds FROM sessions LIMIT 1",
                    [],
                    |r| r.get(0),
                )?;
                Ok((remaining, duration))
            })
            .await?;
        assert_eq!(remaining, 1);
        assert_eq!(duration, 90);
        Ok(())
    }

    #[tokio::test]
    async fn retention_sweep_runs_once_per_day() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("usage.db"))?;
        let now = Utc::now();

        db.update_preference(PreferenceUpdate::HistoryRetentionDays(Some(30))).await?;
        db.append_session(session("chrome", now - Duration::days(45), 30)).await?;
        db.append_session(session("chrome", now - Duration::minutes(5), 30)).await?;

        run_passes(&db, &DefaultClock).await?;
        assert_eq!(count(&db).await?, 1);
        assert_eq!(
            db.get_preferences().await?.last_retention_sweep,
            Some(now.date_naive())
        );

        // A second old row on the same day stays until tomorrow's sweep.
        db.append_session(session("chrome", now - Duration::days(60), 30)).await?;
        run_passes(&db, &DefaultClock).await?;
        assert_eq!(count(&db).await?, 2);
        Ok(())
    }
}
