use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const SUNDAY: u8 = 6;
pub const MAX_HOUR: u8 = 23;
pub const MAX_MINUTE: u8 = 59;

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
  #[error("day range `{0}` must look like `D-D` with D in [0, 6]")]
  MalformedDays(String),
  #[error("day range starts after it ends ({from} > {to})")]
  InvertedDays { from: u8, to: u8 },
  #[error("hour `{0}` must be `*` or an integer in [0, 23]")]
  Hour(String),
  #[error("minute `{0}` must be `*` or an integer in [0, 59]")]
  Minute(String),
  #[error("cron expression `{expression}` rejected: {reason}")]
  Cron { expression: String, reason: String },
}

/// Inclusive weekday range, 0 = Monday ... 6 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
  from: u8,
  to: u8,
}

impl DayRange {
  pub fn new(from: u8, to: u8) -> Result<Self, ScheduleError> {
    if from > SUNDAY || to > SUNDAY {
      return Err(ScheduleError::MalformedDays(format!("{from}-{to}")));
    }
    if from > to {
      return Err(ScheduleError::InvertedDays { from, to });
    }
    Ok(Self { from, to })
  }

  fn cron_field(&self) -> String {
    (self.from..=self.to)
      .map(|d| DAY_NAMES[usize::from(d)])
      .collect::<Vec<_>>()
      .join(",")
  }
}

impl FromStr for DayRange {
  type Err = ScheduleError;

  /// Exactly two single digits separated by `-`.
  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let malformed = || ScheduleError::MalformedDays(raw.to_string());
    let bytes = raw.as_bytes();
    if bytes.len() != 3 || bytes[1] != b'-' {
      return Err(malformed());
    }
    let digit = |b: u8| match b {
      b'0'..=b'6' => Some(b - b'0'),
      _ => None,
    };
    let from = digit(bytes[0]).ok_or_else(malformed)?;
    let to = digit(bytes[2]).ok_or_else(malformed)?;
    DayRange::new(from, to)
  }
}

impl fmt::Display for DayRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.from, self.to)
  }
}

impl Serialize for DayRange {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// An hour or minute selector: `*` or one fixed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
  Every,
  At(u8),
}

impl TimeField {
  pub fn hour(value: i64) -> Result<Self, ScheduleError> {
    bounded(value, MAX_HOUR).ok_or_else(|| ScheduleError::Hour(value.to_string()))
  }

  pub fn minute(value: i64) -> Result<Self, ScheduleError> {
    bounded(value, MAX_MINUTE).ok_or_else(|| ScheduleError::Minute(value.to_string()))
  }

  pub fn parse_hour(raw: &str) -> Result<Self, ScheduleError> {
    parse_field(raw, MAX_HOUR).ok_or_else(|| ScheduleError::Hour(raw.to_string()))
  }

  pub fn parse_minute(raw: &str) -> Result<Self, ScheduleError> {
    parse_field(raw, MAX_MINUTE).ok_or_else(|| ScheduleError::Minute(raw.to_string()))
  }
}

fn bounded(value: i64, max: u8) -> Option<TimeField> {
  u8::try_from(value)
    .ok()
    .filter(|v| *v <= max)
    .map(TimeField::At)
}

fn parse_field(raw: &str, max: u8) -> Option<TimeField> {
  let raw = raw.trim();
  if raw == "*" {
    return Some(TimeField::Every);
  }
  raw.parse::<i64>().ok().and_then(|v| bounded(v, max))
}

impl fmt::Display for TimeField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TimeField::Every => f.write_str("*"),
      TimeField::At(v) => write!(f, "{v}"),
    }
  }
}

impl Serialize for TimeField {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Weekly reporting schedule; each field is interpreted independently and
/// firing times are their cross product, evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
  pub day_of_week: DayRange,
  pub hour: TimeField,
  pub minute: TimeField,
}

impl Schedule {
  pub fn parse(days: &str, hour: &str, minute: &str) -> Result<Self, ScheduleError> {
    let schedule = Self {
      day_of_week: days.trim().parse()?,
      hour: TimeField::parse_hour(hour)?,
      minute: TimeField::parse_minute(minute)?,
    };
    schedule.to_cron()?;
    Ok(schedule)
  }

  pub fn with_days(self, day_of_week: DayRange) -> Self {
    Self {
      day_of_week,
      ..self
    }
  }

  pub fn with_time(self, hour: TimeField, minute: TimeField) -> Self {
    Self {
      hour,
      minute,
      ..self
    }
  }

  pub fn cron_expression(&self) -> String {
    format!(
      "0 {} {} * * {}",
      self.minute,
      self.hour,
      self.day_of_week.cron_field()
    )
  }

  pub fn to_cron(&self) -> Result<cron::Schedule, ScheduleError> {
    let expression = self.cron_expression();
    cron::Schedule::from_str(&expression).map_err(|e| ScheduleError::Cron {
      expression,
      reason: e.to_string(),
    })
  }

  /// Next firing strictly after `after`, in UTC.
  pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    self.to_cron().ok()?.after(&after).next()
  }
}

impl fmt::Display for Schedule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "days={} hour={} minute={}",
      self.day_of_week, self.hour, self.minute
    )
  }
}
