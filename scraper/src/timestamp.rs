use chrono::{DateTime, Utc};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_DAYS: usize = 7;

/// Upstream only publishes hourly aggregates, so the requested instant has to
/// sit on an hour boundary (milliseconds since the epoch).
pub fn compliant_timestamp(at: DateTime<Utc>) -> i64 {
  let ms = at.timestamp_millis();
  ms - ms.rem_euclid(HOUR_MS)
}

pub fn compliant_now() -> i64 {
  compliant_timestamp(Utc::now())
}

/// `now` on its hour boundary, then the same hour on each of the six days
/// before it. Newest first.
pub fn week_timestamps(now: DateTime<Utc>) -> Vec<i64> {
  let base = compliant_timestamp(now);
  (0..WEEK_DAYS as i64).map(|day| base - day * DAY_MS).collect()
}
