use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike};

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}

/// Returns midnight of the day `date` belongs to.
pub fn day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    date.with_time(NaiveTime::MIN).unwrap()
}

/// Returns the top of the next hour. Used to schedule maintenance passes and
/// to chunk sessions into hour-of-day buckets.
pub fn next_hour_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let truncated = date
        .clone()
        .with_minute(0)
        .and_then(|v| v.with_second(0))
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(date);
    truncated + Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn hour_start_truncates_to_next_boundary() {
        let t = Utc.with_ymd_and_hms(2024, 5, 11, 13, 42, 17).unwrap();
        assert_eq!(
            next_hour_start(t),
            Utc.with_ymd_and_hms(2024, 5, 11, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn hour_start_on_exact_boundary_moves_forward() {
        let t = Utc.with_ymd_and_hms(2024, 5, 11, 13, 0, 0).unwrap();
        assert_eq!(
            next_hour_start(t),
            Utc.with_ymd_and_hms(2024, 5, 11, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn day_bounds() {
        let t = Utc.with_ymd_and_hms(2024, 5, 11, 13, 42, 17).unwrap();
        assert_eq!(day_start(t), Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap());
        assert_eq!(
            next_day_start(t),
            Utc.with_ymd_and_hms(2024, 5, 12, 0, 0, 0).unwrap()
        );
    }
}
