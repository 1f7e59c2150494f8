use chrono::{DateTime, SubsecRound as _, TimeZone, Utc};

/// The current time, truncated to the millisecond precision that submission
/// timestamps are stored with.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Formats a timestamp as an absolute date and time in the given time zone,
/// e.g. "Jan 5, 2024, 03:07 PM".
pub fn format_date<Tz: TimeZone>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(tz).format("%b %-d, %Y, %I:%M %p").to_string()
}

/// Formats a timestamp with full precision down to the second in the given
/// time zone, e.g. "1/5/2024, 3:07:09 PM".
pub fn format_date_time<Tz: TimeZone>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(tz).format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// Describes how long ago `timestamp` was relative to `now`, e.g.
/// "3 hours ago". Months are 30 days and years are 12 months, so long spans
/// are approximate. Timestamps less than a minute old (or in the future) are
/// "just now".
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - timestamp).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return ago(minutes, "minute", None);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return ago(hours, "hour", None);
    }

    let days = hours / 24;
    if days < 30 {
        return ago(days, "day", Some("yesterday"));
    }

    let months = days / 30;
    if months < 12 {
        return ago(months, "month", Some("last month"));
    }

    let years = months / 12;
    ago(years, "year", Some("last year"))
}

/// Same as `relative_time`, measured against the wall clock.
pub fn relative_time_from_now(timestamp: DateTime<Utc>) -> String {
    relative_time(timestamp, Utc::now())
}

// `previous` is the idiomatic phrase for a count of exactly one, if the unit
// has one ("yesterday" rather than "1 day ago").
fn ago(count: i64, unit: &str, previous: Option<&str>) -> String {
    match (count, previous) {
        (1, Some(phrase)) => phrase.to_string(),
        (1, None) => format!("1 {unit} ago"),
        _ => format!("{count} {unit}s ago"),
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Timelike as _};

    use super::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn rel(ago: Duration) -> String {
        relative_time(reference() - ago, reference())
    }

    #[test]
    fn relative_buckets() {
        assert_eq!(rel(Duration::seconds(0)), "just now");
        assert_eq!(rel(Duration::seconds(59)), "just now");
        assert_eq!(rel(Duration::seconds(90)), "1 minute ago");
        assert_eq!(rel(Duration::minutes(59)), "59 minutes ago");
        assert_eq!(rel(Duration::minutes(60)), "1 hour ago");
        assert_eq!(rel(Duration::hours(5)), "5 hours ago");
        assert_eq!(rel(Duration::hours(25)), "yesterday");
        assert_eq!(rel(Duration::days(2)), "2 days ago");
        assert_eq!(rel(Duration::days(29)), "29 days ago");
        assert_eq!(rel(Duration::days(30)), "last month");
        assert_eq!(rel(Duration::days(65)), "2 months ago");
        assert_eq!(rel(Duration::days(359)), "11 months ago");
        assert_eq!(rel(Duration::days(360)), "last year");
        assert_eq!(rel(Duration::days(800)), "2 years ago");
    }

    #[test]
    fn future_is_just_now() {
        assert_eq!(relative_time(reference() + Duration::hours(3), reference()), "just now");
    }

    #[test]
    fn absolute_formats() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 15, 7, 9).unwrap();
        assert_eq!(format_date(ts, &Utc), "Jan 5, 2024, 03:07 PM");
        assert_eq!(format_date_time(ts, &Utc), "1/5/2024, 3:07:09 PM");

        let morning = Utc.with_ymd_and_hms(2024, 11, 20, 0, 30, 0).unwrap();
        assert_eq!(format_date(morning, &Utc), "Nov 20, 2024, 12:30 AM");
    }

    #[test]
    fn formats_in_display_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 15, 7, 9).unwrap();
        assert_eq!(format_date(ts, &chrono_tz::Asia::Kolkata), "Jan 5, 2024, 08:37 PM");
        assert_eq!(format_date(ts, &chrono_tz::America::New_York), "Jan 5, 2024, 10:07 AM");
    }

    #[test]
    fn now_is_millisecond_precise() {
        assert_eq!(timestamp_now().nanosecond() % 1_000_000, 0);
    }
}
