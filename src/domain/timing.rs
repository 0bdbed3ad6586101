//! Conversions between schedule wall-clock times and instants.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse "HH:MM" (seconds tolerated) as used by schedules.
pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn local_instant(date: NaiveDate, time: NaiveTime, tz: &FixedOffset) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn departure_at(date: NaiveDate, departure_time: &str, tz: &FixedOffset) -> Option<DateTime<Utc>> {
    local_instant(date, parse_hhmm(departure_time)?, tz)
}

/// Arrival instant of a trip leaving on `date`; an arrival clock time earlier
/// than the departure time lands on the next day.
pub fn arrival_at(
    date: NaiveDate,
    departure_time: &str,
    arrival_time: &str,
    tz: &FixedOffset,
) -> Option<DateTime<Utc>> {
    let arrival = parse_hhmm(arrival_time)?;
    let overnight = parse_hhmm(departure_time).is_some_and(|dep| arrival < dep);
    let date = if overnight { date.succ_opt()? } else { date };
    local_instant(date, arrival, tz)
}

pub fn payment_deadline(created_at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    created_at + window
}
