use crate::{Reading, ScrapeError, SensorKind, Snapshot, Threshold};
use serde_json::{Map, Value};

const STATION_NAME_KEY: &str = "nomestaz";
const THRESHOLD_PREFIX: &str = "soglia";

/// The feed is a JSON array whose first element carries the sampling time and
/// every following element describes one station.
pub(crate) fn parse_snapshot(kind: SensorKind, body: &Value) -> Result<Snapshot, ScrapeError> {
  let items = body
    .as_array()
    .ok_or_else(|| ScrapeError::Malformed("expected a JSON array".to_string()))?;
  let (head, stations) = items
    .split_first()
    .ok_or_else(|| ScrapeError::Malformed("feed is empty".to_string()))?;

  let timestamp = head
    .get("time")
    .and_then(integer)
    .ok_or_else(|| ScrapeError::Malformed("first element has no usable `time`".to_string()))?;

  let mut readings = Vec::with_capacity(stations.len());
  for entry in stations {
    let Some(obj) = entry.as_object() else {
      tracing::debug!("skipping non-object station entry");
      continue;
    };
    match parse_station(obj, timestamp, kind.unit()) {
      Some(reading) => readings.push(reading),
      None => tracing::debug!("skipping station entry without a name"),
    }
  }

  Ok(Snapshot {
    kind,
    timestamp,
    unit: kind.unit().to_string(),
    readings,
  })
}

fn parse_station(obj: &Map<String, Value>, timestamp: i64, unit: &str) -> Option<Reading> {
  let station = obj
    .get(STATION_NAME_KEY)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())?
    .to_string();

  let mut thresholds: Vec<Threshold> = obj
    .iter()
    .filter(|(key, _)| key.starts_with(THRESHOLD_PREFIX))
    .filter_map(|(key, value)| {
      number(value).map(|limit| Threshold {
        name: key.clone(),
        limit,
      })
    })
    .collect();
  thresholds.sort_by(|a, b| a.name.cmp(&b.name));

  Some(Reading {
    station,
    timestamp,
    unit: unit.to_string(),
    longitude: obj.get("lon").and_then(number),
    latitude: obj.get("lat").and_then(number),
    value: obj.get("value").and_then(number),
    thresholds,
  })
}

/// Upstream mixes JSON numbers and numeric strings for the same fields.
fn number(value: &Value) -> Option<f64> {
  let n = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }?;
  n.is_finite().then_some(n)
}

fn integer(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => s.trim().parse::<i64>().ok(),
    _ => None,
  }
}
