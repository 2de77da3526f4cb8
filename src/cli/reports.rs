//! Read-side commands: parsing the date range the user asked about, running
//! the aggregation queries and printing the results as plain tables.

use std::fmt::Display;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{Parser, Subcommand, ValueEnum};
use now::DateTimeNow;

use crate::daemon::storage::{
    db::Database,
    entities::{ActivityScope, PreferenceUpdate},
    queries,
};
use crate::utils::time::{day_start, next_day_start};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option extracts the whole day"
    )]
    treat_as_days: bool,
}

impl RangeArgs {
    /// Resolves the textual range into UTC bounds. Missing bounds default to
    /// today: start of day through now.
    pub fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let now = Local::now();
        let dialect: chrono_english::Dialect = self.date_style.into();

        let mut start = match &self.start_date {
            Some(text) => parse_date_string(text, now, dialect)
                .with_context(|| format!("couldn't parse start date {text:?}"))?,
            None => now.beginning_of_day(),
        };
        let mut end = match &self.end_date {
            Some(text) => parse_date_string(text, now, dialect)
                .with_context(|| format!("couldn't parse end date {text:?}"))?,
            None => now,
        };

        if self.treat_as_days {
            start = day_start(start);
            end = next_day_start(end);
        }

        if end <= start {
            bail!("range is empty: {start} to {end}");
        }
        Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }
}

pub async fn print_hours(db: &Database, range: &RangeArgs) -> Result<()> {
    let (start, end) = range.resolve()?;
    let buckets = queries::hourly_histogram(db, start, end).await;

    let max = buckets.iter().copied().max().unwrap_or(0).max(1);
    println!("Activity by hour of day");
    for (hour, seconds) in buckets.iter().enumerate() {
        if *seconds == 0 {
            continue;
        }
        let bar = "#".repeat(((seconds * 40) / max) as usize);
        println!("{hour:02}:00  {:>9}  {bar}", format_duration(*seconds));
    }
    println!("Total: {}", format_duration(buckets.iter().sum()));
    Ok(())
}

pub async fn print_apps(db: &Database, range: &RangeArgs) -> Result<()> {
    let (start, end) = range.resolve()?;
    let totals = queries::app_totals(db, start, end).await;

    if totals.is_empty() {
        println!("No activity in range");
        return Ok(());
    }
    for row in totals {
        println!(
            "{:>9}  {}  {}",
            format_duration(row.total_seconds),
            row.date,
            row.app_name
        );
    }
    Ok(())
}

pub async fn print_opens(db: &Database, range: &RangeArgs, gap_seconds: i64) -> Result<()> {
    let (start, end) = range.resolve()?;
    let counts = queries::app_open_events(db, start, end, gap_seconds).await;

    if counts.is_empty() {
        println!("No activity in range");
        return Ok(());
    }
    for row in counts {
        println!("{:>5}  {}", row.open_count, row.app_name);
    }
    Ok(())
}

pub async fn print_detail(db: &Database, app: &str, range: &RangeArgs) -> Result<()> {
    let (start, end) = range.resolve()?;
    let include_private = db.get_preferences().await?.track_private_mode;
    let details = queries::app_detail(db, app, start, end, include_private).await;

    if details.is_empty() {
        println!("No activity for {app} in range");
        return Ok(());
    }
    for row in details {
        println!(
            "{:>9}  {} - {}  {}",
            format_duration(row.total_seconds),
            row.first_start.with_timezone(&Local).format("%H:%M:%S"),
            row.last_end.with_timezone(&Local).format("%H:%M:%S"),
            row.window_title
        );
    }
    Ok(())
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    #[command(about = "Print the current preferences")]
    Get,
    #[command(about = "Update one preference")]
    Set {
        key: PrefKey,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PrefKey {
    TrackPrivateMode,
    TrackVpn,
    BreakInterval,
    NotifyEveryInterval,
    Scope,
    HistoryRetentionDays,
}

pub async fn process_prefs(db: &Database, command: PrefsCommand) -> Result<()> {
    match command {
        PrefsCommand::Get => {
            let prefs = db.get_preferences().await?;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
        PrefsCommand::Set { key, value } => {
            let update = parse_update(key, &value)?;
            db.update_preference(update).await?;
            println!("Updated");
        }
    }
    Ok(())
}

fn parse_update(key: PrefKey, value: &str) -> Result<PreferenceUpdate> {
    Ok(match key {
        PrefKey::TrackPrivateMode => PreferenceUpdate::TrackPrivateMode(parse_bool(value)?),
        PrefKey::TrackVpn => PreferenceUpdate::TrackVpn(parse_bool(value)?),
        PrefKey::NotifyEveryInterval => PreferenceUpdate::NotifyEveryInterval(parse_bool(value)?),
        PrefKey::BreakInterval => {
            let valid = matches!(
                value.split_once(':'),
                Some((h, m)) if h.parse::<u32>().is_ok() && m.parse::<u32>().map_or(false, |m| m < 60)
            );
            if !valid {
                bail!("break interval must look like HH:MM, got {value:?}");
            }
            PreferenceUpdate::BreakInterval(value.to_string())
        }
        PrefKey::Scope => match value {
            "active-apps-only" => PreferenceUpdate::Scope(ActivityScope::ActiveAppsOnly),
            "entire-screen" => PreferenceUpdate::Scope(ActivityScope::EntireScreen),
            other => bail!("scope must be active-apps-only or entire-screen, got {other:?}"),
        },
        PrefKey::HistoryRetentionDays => {
            if value == "off" {
                PreferenceUpdate::HistoryRetentionDays(None)
            } else {
                let days: u32 = value
                    .parse()
                    .map_err(|_| anyhow!("retention must be a day count or \"off\", got {value:?}"))?;
                PreferenceUpdate::HistoryRetentionDays(Some(days))
            }
        }
    })
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "on" | "yes" => Ok(true),
        "false" | "off" | "no" => Ok(false),
        other => bail!("expected true/false, got {other:?}"),
    }
}

fn format_duration(seconds: i64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(65), "00:01:05");
        assert_eq!(format_duration(3 * 3600 + 25 * 60 + 9), "03:25:09");
    }

    #[test]
    fn range_defaults_to_today() {
        let args = RangeArgs {
            start_date: None,
            end_date: None,
            date_style: DateStyle::Uk,
            treat_as_days: false,
        };
        let (start, end) = args.resolve().unwrap();
        assert!(start < end);
        assert_eq!(
            start,
            Local::now().beginning_of_day().with_timezone(&Utc)
        );
    }

    #[test]
    fn whole_day_flag_widens_the_range() {
        let args = RangeArgs {
            start_date: Some("15/03/2025".into()),
            end_date: Some("15/03/2025".into()),
            date_style: DateStyle::Uk,
            treat_as_days: true,
        };
        let (start, end) = args.resolve().unwrap();
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    #[test]
    fn empty_range_is_an_error() {
        let args = RangeArgs {
            start_date: Some("16/03/2025".into()),
            end_date: Some("15/03/2025".into()),
            date_style: DateStyle::Uk,
            treat_as_days: false,
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn preference_updates_parse_and_validate() {
        assert_eq!(
            parse_update(PrefKey::TrackVpn, "off").unwrap(),
            PreferenceUpdate::TrackVpn(false)
        );
        assert_eq!(
            parse_update(PrefKey::BreakInterval, "01:30").unwrap(),
            PreferenceUpdate::BreakInterval("01:30".into())
        );
        assert!(parse_update(PrefKey::BreakInterval, "90 minutes").is_err());
        assert_eq!(
            parse_update(PrefKey::Scope, "entire-screen").unwrap(),
            PreferenceUpdate::Scope(ActivityScope::EntireScreen)
        );
        assert!(parse_update(PrefKey::Scope, "everything").is_err());
        assert_eq!(
            parse_update(PrefKey::HistoryRetentionDays, "off").unwrap(),
            PreferenceUpdate::HistoryRetentionDays(None)
        );
        assert_eq!(
            parse_update(PrefKey::HistoryRetentionDays, "90").unwrap(),
            PreferenceUpdate::HistoryRetentionDays(Some(90))
        );
    }
}
