use crate::{Reading, ScrapeError, Scraper, SensorKind, Snapshot};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const AGGREGATE_FILE: &str = "agg.json";

#[derive(Debug, Serialize)]
pub struct DailySnapshot {
  pub date: NaiveDate,
  pub timestamp: i64,
  pub readings: Vec<Reading>,
}

/// One quantity over the requested days, newest first.
#[derive(Debug, Serialize)]
pub struct WeeklyArchive {
  pub sensor_type: SensorKind,
  pub sensor_name: &'static str,
  pub unit: &'static str,
  pub days: Vec<DailySnapshot>,
}

impl WeeklyArchive {
  pub async fn collect(scraper: &Scraper, stamps: &[i64]) -> Result<Self, ScrapeError> {
    let kind = scraper.kind();
    let mut days = Vec::with_capacity(stamps.len());
    for &at in stamps {
      let date = DateTime::<Utc>::from_timestamp_millis(at)
        .ok_or_else(|| ScrapeError::Malformed(format!("timestamp {at} is out of range")))?
        .date_naive();
      let snapshot = scraper.scrape_at(at).await?;
      days.push(DailySnapshot {
        date,
        timestamp: snapshot.timestamp,
        readings: snapshot.readings,
      });
    }
    Ok(Self {
      sensor_type: kind,
      sensor_name: kind.label(),
      unit: kind.unit(),
      days,
    })
  }

  pub fn file_name(&self) -> String {
    format!("{}_weekly_data.json", self.sensor_name)
  }
}

/// Collects every quantity for each of `stamps`. Any failed request aborts
/// the whole archive.
pub async fn scrape_week(
  url: &str,
  timeout: Duration,
  stamps: &[i64],
) -> Result<Vec<WeeklyArchive>, ScrapeError> {
  let mut week = Vec::with_capacity(SensorKind::ALL.len());
  for kind in SensorKind::ALL {
    let scraper = Scraper::new(kind, url, timeout)?;
    week.push(WeeklyArchive::collect(&scraper, stamps).await?);
  }
  Ok(week)
}

/// One file per quantity plus [`AGGREGATE_FILE`] holding all of them.
pub fn write_week(dir: &Path, week: &[WeeklyArchive]) -> anyhow::Result<Vec<PathBuf>> {
  fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
  let mut written = Vec::with_capacity(week.len() + 1);
  for archive in week {
    written.push(write_json(&dir.join(archive.file_name()), archive)?);
  }
  written.push(write_json(&dir.join(AGGREGATE_FILE), week)?);
  Ok(written)
}

pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> anyhow::Result<PathBuf> {
  fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
  let name = format!("{}_{}_data.json", snapshot.kind.label(), snapshot.timestamp);
  write_json(&dir.join(name), snapshot)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<PathBuf> {
  let body = serde_json::to_string_pretty(value).context("serialize archive")?;
  fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
  tracing::info!(path = %path.display(), "archive written");
  Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::timestamp::{self, WEEK_DAYS};
  use chrono::TimeZone;
  use serde_json::{json, Value};
  use wiremock::matchers::{method, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn stamps() -> Vec<i64> {
    timestamp::week_timestamps(Utc.with_ymd_and_hms(2024, 3, 5, 14, 37, 0).unwrap())
  }

  fn read(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
  }

  #[tokio::test]
  async fn week_writes_one_file_per_quantity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        { "time": 1_709_647_200_000_i64 },
        { "nomestaz": "Sestola", "value": 281.3 }
      ])))
      .expect((WEEK_DAYS * SensorKind::ALL.len()) as u64)
      .mount(&server)
      .await;

    let week = scrape_week(&server.uri(), Duration::from_secs(5), &stamps())
      .await
      .unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("weekly_data");
    let written = write_week(&dir, &week).unwrap();
    assert_eq!(written.len(), SensorKind::ALL.len() + 1);

    let temp = read(&dir.join("temp_sensor_weekly_data.json"));
    assert_eq!(temp["sensor_type"], "temp");
    assert_eq!(temp["unit"], "K");
    let days = temp["days"].as_array().unwrap();
    assert_eq!(days.len(), WEEK_DAYS);
    assert_eq!(days[0]["date"], "2024-03-05");
    assert_eq!(days[6]["date"], "2024-02-28");
    assert_eq!(days[0]["readings"][0]["station"], "Sestola");

    let agg = read(&dir.join(AGGREGATE_FILE));
    assert_eq!(agg.as_array().unwrap().len(), SensorKind::ALL.len());
  }

  #[tokio::test]
  async fn failed_day_aborts_the_week() {
    let server = MockServer::start().await;
    let oldest = stamps()[WEEK_DAYS - 1].to_string();
    Mock::given(method("GET"))
      .and(query_param("time", oldest.as_str()))
      .respond_with(ResponseTemplate::new(503))
      .with_priority(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "time": 1 }])))
      .mount(&server)
      .await;

    let err = scrape_week(&server.uri(), Duration::from_secs(5), &stamps())
      .await
      .unwrap_err();
    assert!(matches!(err, ScrapeError::Status(503)));
  }

  #[test]
  fn snapshot_file_is_named_by_label_and_time() {
    let tmp = tempfile::tempdir().unwrap();
    let snapshot = Snapshot {
      kind: SensorKind::Humidity,
      timestamp: 1_709_647_200_000,
      unit: "%".to_string(),
      readings: vec![],
    };
    let path = write_snapshot(tmp.path(), &snapshot).unwrap();
    assert_eq!(
      path.file_name().unwrap().to_str().unwrap(),
      "humidity_sensor_1709647200000_data.json"
    );
    assert_eq!(read(&path)["kind"], "humidity");
  }
}
