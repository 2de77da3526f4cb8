//! Read-side aggregation over stored sessions: hourly histogram, per-app
//! totals with midnight splitting, open-event counts and per-app title
//! breakdowns. Queries load the overlapping rows and aggregate in Rust; the
//! pure helpers at the bottom carry the arithmetic and its tests.

use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use rusqlite::params;
use tracing::warn;

use crate::daemon::classify::tables::fallback_icon;
use crate::utils::time::next_day_start;

use super::db::{parse_time, Database};
use super::entities::StoredSession;

/// Title fragments excluded from every report, independent of preferences.
/// Private-mode markers plus adult-content terms, matched case-insensitively.
pub const BLOCKED_KEYWORDS: [&str; 8] = [
    "incognito",
    "inprivate",
    "private browsing",
    "porn",
    "xxx",
    "nsfw",
    "onlyfans",
    "hentai",
];

pub fn title_is_blocked(title: &str) -> bool {
    let lowered = title.to_lowercase();
    BLOCKED_KEYWORDS.iter().any(|k| lowered.contains(k))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTotal {
    pub app_name: String,
    pub date: NaiveDate,
    pub total_seconds: i64,
    pub icon: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOpenCount {
    pub app_name: String,
    pub open_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleDetail {
    pub window_title: String,
    pub first_start: DateTime<Utc>,
    pub last_end: DateTime<Utc>,
    pub total_seconds: i64,
}

/// Seconds of tracked activity per local hour of day within `[start, end)`.
/// Sessions are clipped to the window and distributed across every hour
/// bucket they span.
pub async fn hourly_histogram(db: &Database, start: DateTime<Utc>, end: DateTime<Utc>) -> [i64; 24] {
    let rows = load_overlapping(db, start, end).await;
    let mut buckets = [0i64; 24];
    for row in &rows {
        if title_is_blocked(&row.window_title) {
            continue;
        }
        let Some((from, to)) = clip(row.start_time, row.end_time, start, end) else {
            continue;
        };
        distribute_hours(from, to, &mut buckets);
    }
    buckets
}

/// Per-app totals within `[start, end)`. Every session is split at local
/// midnight first; a single-day window groups by `(app, date)` while a wider
/// window collapses each app to one row dated by its most recent active day.
pub async fn app_totals(db: &Database, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<AppTotal> {
    let rows = load_overlapping(db, start, end).await;

    let mut day_rows: Vec<AppTotal> = Vec::new();
    for row in &rows {
        if title_is_blocked(&row.window_title) {
            continue;
        }
        let Some((from, to)) = clip(row.start_time, row.end_time, start, end) else {
            continue;
        };
        for (date, seconds) in split_at_local_midnight(from, to) {
            match day_rows
                .iter_mut()
                .find(|r| r.app_name == row.app_name && r.date == date)
            {
                Some(existing) => existing.total_seconds += seconds,
                None => day_rows.push(AppTotal {
                    app_name: row.app_name.clone(),
                    date,
                    total_seconds: seconds,
                    icon: row
                        .icon
                        .clone()
                        .or_else(|| fallback_icon(&row.app_name).map(|v| v.to_vec())),
                }),
            }
        }
    }

    let single_day = start.with_timezone(&Local).date_naive()
        == (end - chrono::Duration::seconds(1)).with_timezone(&Local).date_naive();
    let mut result = if single_day {
        day_rows
    } else {
        collapse_multi_day(day_rows)
    };
    result.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds));
    result
}

/// Counts "open events" per app: runs of sessions whose end-to-start gap
/// stays within `gap_threshold_secs`. Sorted by count, descending.
pub async fn app_open_events(
    db: &Database,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    gap_threshold_secs: i64,
) -> Vec<AppOpenCount> {
    let mut rows = load_overlapping(db, start, end).await;
    rows.retain(|r| !title_is_blocked(&r.window_title));
    rows.sort_by(|a, b| {
        a.app_name
            .cmp(&b.app_name)
            .then(a.start_time.cmp(&b.start_time))
    });

    let mut counts: Vec<AppOpenCount> = Vec::new();
    let mut last: Option<(&str, DateTime<Utc>)> = None;
    for row in &rows {
        let merged = matches!(
            last,
            Some((app, prev_end)) if app == row.app_name
                && (row.start_time - prev_end).num_seconds() <= gap_threshold_secs
        );
        if !merged {
            match counts.iter_mut().find(|c| c.app_name == row.app_name) {
                Some(c) => c.open_count += 1,
                None => counts.push(AppOpenCount {
                    app_name: row.app_name.clone(),
                    open_count: 1,
                }),
            }
        }
        let end_seen = match last {
            Some((app, prev_end)) if app == row.app_name => prev_end.max(row.end_time),
            _ => row.end_time,
        };
        last = Some((row.app_name.as_str(), end_seen));
    }

    counts.sort_by(|a, b| b.open_count.cmp(&a.open_count));
    counts
}

/// Per-title breakdown for one app within `[start, end)`. Rows are split at
/// local midnight like [app_totals]; with private-mode tracking disabled the
/// blocked titles disappear from the report too.
pub async fn app_detail(
    db: &Database,
    app_name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    include_private: bool,
) -> Vec<TitleDetail> {
    let rows = load_overlapping(db, start, end).await;

    let mut details: Vec<TitleDetail> = Vec::new();
    for row in &rows {
        if row.app_name != app_name {
            continue;
        }
        if !include_private && title_is_blocked(&row.window_title) {
            continue;
        }
        let Some((from, to)) = clip(row.start_time, row.end_time, start, end) else {
            continue;
        };
        let seconds = (to - from).num_seconds();
        match details.iter_mut().find(|d| d.window_title == row.window_title) {
            Some(d) => {
                d.first_start = d.first_start.min(from);
                d.last_end = d.last_end.max(to);
                d.total_seconds += seconds;
            }
            None => details.push(TitleDetail {
                window_title: row.window_title.clone(),
                first_start: from,
                last_end: to,
                total_seconds: seconds,
            }),
        }
    }

    details.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds));
    details
}

/// Loads sessions overlapping `[start, end)` with their cached icons.
/// Malformed rows are skipped; a failed query is logged and reads as empty.
async fn load_overlapping(
    db: &Database,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<StoredSession> {
    let start_epoch = start.timestamp();
    let end_epoch = end.timestamp();

    let loaded = db
        .execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.app_name, s.window_title, s.exe_path,
                        s.start_time, s.end_time, s.duration_seconds, i.icon
                 FROM sessions s
                 LEFT JOIN app_icons i ON s.icon_id = i.id
                 WHERE CAST(strftime('%s', s.end_time) AS INTEGER) > ?1
                   AND CAST(strftime('%s', s.start_time) AS INTEGER) < ?2
                 ORDER BY s.start_time",
            )?;

            let rows = stmt.query_map(params![start_epoch, end_epoch], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<Vec<u8>>>(7)?,
                ))
            })?;

            let mut sessions = Vec::new();
            for row in rows {
                let (id, app_name, window_title, exe_path, start_raw, end_raw, duration, icon) =
                    row?;
                let (Ok(start_time), Ok(end_time)) = (parse_time(&start_raw), parse_time(&end_raw))
                else {
                    warn!("Skipping session {id} with malformed timestamps");
                    continue;
                };
                if end_time <= start_time {
                    continue;
                }
                sessions.push(StoredSession {
                    id,
                    app_name,
                    window_title,
                    exe_path,
                    start_time,
                    end_time,
                    duration_seconds: duration,
                    icon,
                });
            }
            Ok(sessions)
        })
        .await;

    match loaded {
        Ok(sessions) => sessions,
        Err(err) => {
            warn!("Session query failed, reporting empty range: {err:?}");
            Vec::new()
        }
    }
}

fn clip(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = start.max(window_start);
    let to = end.min(window_end);
    (to > from).then_some((from, to))
}

/// Splits `[from, to)` at local midnights into `(local date, seconds)` parts.
/// The part durations always sum to the whole interval.
fn split_at_local_midnight(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<(NaiveDate, i64)> {
    let mut parts = Vec::new();
    let mut cursor = from.with_timezone(&Local);
    let to = to.with_timezone(&Local);
    while cursor < to {
        let boundary = next_day_start(cursor).min(to.clone());
        parts.push((cursor.date_naive(), (boundary.clone() - cursor).num_seconds()));
        cursor = boundary;
    }
    parts
}

fn distribute_hours(from: DateTime<Utc>, to: DateTime<Utc>, buckets: &mut [i64; 24]) {
    let mut cursor = from.with_timezone(&Local);
    let to = to.with_timezone(&Local);
    while cursor < to {
        let boundary = crate::utils::time::next_hour_start(cursor.clone()).min(to.clone());
        buckets[cursor.hour() as usize] += (boundary.clone() - cursor).num_seconds();
        cursor = boundary;
    }
}

fn collapse_multi_day(day_rows: Vec<AppTotal>) -> Vec<AppTotal> {
    let mut collapsed: Vec<AppTotal> = Vec::new();
    for row in day_rows {
        match collapsed.iter_mut().find(|r| r.app_name == row.app_name) {
            Some(existing) => {
                // Most recent active day wins; on the same day the longer
                // contribution keeps its date.
                if row.date > existing.date
                    || (row.date == existing.date && row.total_seconds > existing.total_seconds)
                {
                    existing.date = row.date;
                }
                existing.total_seconds += row.total_seconds;
                if existing.icon.is_none() {
                    existing.icon = row.icon;
                }
            }
            None => collapsed.push(row),
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone};

    use crate::daemon::storage::entities::Session;

    use super::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn session(app: &str, title: &str, start: DateTime<Utc>, secs: i64) -> Session {
        Session {
            app_name: app.into(),
            window_title: title.into(),
            exe_path: format!("C:\\apps\\{app}.exe"),
            start_time: start,
            end_time: start + Duration::seconds(secs),
            icon: None,
        }
    }

    async fn test_db(sessions: Vec<Session>) -> Result<(tempfile::TempDir, Database)> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("usage.db"))?;
        for s in sessions {
            db.append_session(s).await?;
        }
        Ok((dir, db))
    }

    #[test]
    fn midnight_split_conserves_duration() {
        let from = local(2024, 5, 11, 23, 30, 0);
        let to = local(2024, 5, 13, 0, 30, 0);
        let parts = split_at_local_midnight(from, to);
        assert_eq!(parts.len(), 3);
        let total: i64 = parts.iter().map(|(_, s)| s).sum();
        assert_eq!(total, (to - from).num_seconds());
        assert_eq!(parts[0].1, 30 * 60);
        assert_eq!(parts[1].1, 24 * 60 * 60);
        assert_eq!(parts[2].1, 30 * 60);
    }

    #[test]
    fn hour_distribution_matches_clipped_duration() {
        let from = local(2024, 5, 11, 9, 45, 0);
        let to = local(2024, 5, 11, 11, 15, 0);
        let mut buckets = [0i64; 24];
        distribute_hours(from, to, &mut buckets);
        assert_eq!(buckets[9], 15 * 60);
        assert_eq!(buckets[10], 60 * 60);
        assert_eq!(buckets[11], 15 * 60);
        assert_eq!(buckets.iter().sum::<i64>(), (to - from).num_seconds());
    }

    #[test]
    fn blocked_titles_match_case_insensitively() {
        assert!(title_is_blocked("New Incognito Tab - Chromium"));
        assert!(title_is_blocked("shopping [InPrivate] - Edge"));
        assert!(!title_is_blocked("incognito.rs - code"));
        assert!(!title_is_blocked("Weekly report - Writer"));

        // Path-like titles from editors are a known false positive; the list
        // favors privacy over precision.
    }

    #[tokio::test]
    async fn histogram_sums_equal_tracked_seconds() -> Result<()> {
        let (_dir, db) = test_db(vec![
            session("chrome", "docs", local(2024, 5, 11, 9, 50, 0), 20 * 60),
            session("code", "main.rs", local(2024, 5, 11, 14, 0, 0), 90),
        ])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 12, 0, 0, 0);
        let buckets = hourly_histogram(&db, start, end).await;
        assert_eq!(buckets.iter().sum::<i64>(), 20 * 60 + 90);
        assert_eq!(buckets[9], 10 * 60);
        assert_eq!(buckets[10], 10 * 60);
        assert_eq!(buckets[14], 90);
        Ok(())
    }

    #[tokio::test]
    async fn totals_split_sessions_at_midnight() -> Result<()> {
        let (_dir, db) = test_db(vec![session(
            "chrome",
            "docs",
            local(2024, 5, 11, 23, 59, 0),
            2 * 60,
        )])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 13, 0, 0, 0);
        let totals = app_totals(&db, start, end).await;
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_seconds, 2 * 60);
        // Multi-day rows are dated by the most recent contributing day.
        assert_eq!(totals[0].date, local(2024, 5, 12, 12, 0, 0).with_timezone(&Local).date_naive());
        Ok(())
    }

    #[tokio::test]
    async fn single_day_totals_stay_per_date() -> Result<()> {
        let (_dir, db) = test_db(vec![
            session("chrome", "docs", local(2024, 5, 11, 9, 0, 0), 600),
            session("chrome", "mail", local(2024, 5, 11, 11, 0, 0), 300),
            session("code", "main.rs", local(2024, 5, 11, 10, 0, 0), 1200),
        ])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 12, 0, 0, 0);
        let totals = app_totals(&db, start, end).await;
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].app_name, "code");
        assert_eq!(totals[0].total_seconds, 1200);
        assert_eq!(totals[1].app_name, "chrome");
        assert_eq!(totals[1].total_seconds, 900);
        Ok(())
    }

    #[tokio::test]
    async fn blocked_titles_are_excluded_from_totals() -> Result<()> {
        let (_dir, db) = test_db(vec![
            session("chrome", "docs", local(2024, 5, 11, 9, 0, 0), 600),
            session("chrome", "New Incognito Tab", local(2024, 5, 11, 10, 0, 0), 600),
        ])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 12, 0, 0, 0);
        let totals = app_totals(&db, start, end).await;
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_seconds, 600);
        Ok(())
    }

    #[tokio::test]
    async fn open_events_merge_within_gap_threshold() -> Result<()> {
        let (_dir, db) = test_db(vec![
            session("slack", "general", local(2024, 5, 11, 9, 59, 50), 10),
            // ends 10:00:00; next starts 10:00:03, gap 3s -> same event
            session("slack", "general", local(2024, 5, 11, 10, 0, 3), 5),
            // gap 11s after 10:00:08 -> new event
            session("slack", "general", local(2024, 5, 11, 10, 0, 19), 5),
            session("chrome", "docs", local(2024, 5, 11, 10, 0, 0), 60),
        ])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 12, 0, 0, 0);
        let counts = app_open_events(&db, start, end, 10).await;
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0], AppOpenCount { app_name: "slack".into(), open_count: 2 });
        assert_eq!(counts[1], AppOpenCount { app_name: "chrome".into(), open_count: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn gap_exactly_at_threshold_still_merges() -> Result<()> {
        let (_dir, db) = test_db(vec![
            session("slack", "general", local(2024, 5, 11, 10, 0, 0), 5),
            session("slack", "general", local(2024, 5, 11, 10, 0, 15), 5),
        ])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 12, 0, 0, 0);
        let counts = app_open_events(&db, start, end, 10).await;
        assert_eq!(counts[0].open_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn detail_groups_by_title_and_can_hide_private_rows() -> Result<()> {
        let (_dir, db) = test_db(vec![
            session("chrome", "docs", local(2024, 5, 11, 9, 0, 0), 600),
            session("chrome", "docs", local(2024, 5, 11, 12, 0, 0), 300),
            session("chrome", "New Incognito Tab", local(2024, 5, 11, 13, 0, 0), 60),
        ])
        .await?;

        let start = local(2024, 5, 11, 0, 0, 0);
        let end = local(2024, 5, 12, 0, 0, 0);

        let all = app_detail(&db, "chrome", start, end, true).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].window_title, "docs");
        assert_eq!(all[0].total_seconds, 900);
        assert_eq!(all[0].first_start, local(2024, 5, 11, 9, 0, 0));
        assert_eq!(all[0].last_end, local(2024, 5, 11, 12, 5, 0));

        let filtered = app_detail(&db, "chrome", start, end, false).await;
        assert_eq!(filtered.len(), 1);
        Ok(())
    }
}
