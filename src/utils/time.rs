use chrono::{DateTime, Duration, NaiveTime, TimeZone};

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> Option<DateTime<Tz>> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).single()
}

/// Renders a duration the way reports print it, e.g. `1h2m3s`.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
