use crate::types::SensorName;
use scraper::{Reading, SensorKind, Threshold};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
  NoAlert,
  Alert { threshold: String, limit: f64 },
}

/// Picks the most severe threshold the value meets or exceeds.
///
/// Thresholds are scanned in ascending name order and every satisfied one
/// replaces the previous candidate, so the last satisfied name wins. This
/// relies on tier names sorting in severity order (`soglia1` < `soglia2` <
/// `soglia3`), which is a convention of the upstream feed.
pub fn evaluate(value: Option<f64>, thresholds: &[Threshold]) -> AlertDecision {
  let Some(value) = value.filter(|v| v.is_finite()) else {
    return AlertDecision::NoAlert;
  };

  let mut sorted: Vec<&Threshold> = thresholds.iter().collect();
  sorted.sort_by(|a, b| a.name.cmp(&b.name));

  let mut candidate: Option<&Threshold> = None;
  for threshold in sorted {
    if value >= threshold.limit {
      candidate = Some(threshold);
    }
  }

  match candidate {
    Some(t) => AlertDecision::Alert {
      threshold: t.name.clone(),
      limit: t.limit,
    },
    None => AlertDecision::NoAlert,
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
  pub sensor_name: String,
  #[serde(rename = "type")]
  pub kind: SensorKind,
  pub value: f64,
  pub unit: String,
  pub timestamp: i64,
  pub threshold_name: String,
  pub threshold_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
  pub sensor_name: String,
  #[serde(rename = "type")]
  pub kind: SensorKind,
  pub unit: String,
  pub timestamp: i64,
  pub longitude: Option<f64>,
  pub latitude: Option<f64>,
  pub value: Option<f64>,
}

/// A reading attributed to a named sensor, with its alert decision.
#[derive(Debug, Clone)]
pub struct Detection {
  sensor_name: SensorName,
  kind: SensorKind,
  reading: Reading,
  decision: AlertDecision,
}

impl Detection {
  /// Only thresholds the sensor was configured to query take part in the
  /// decision; a sensor with no queries never alerts.
  pub fn new(sensor_name: SensorName, kind: SensorKind, queries: &[String], mut reading: Reading) -> Self {
    reading.thresholds.retain(|t| queries.iter().any(|q| q == &t.name));
    let decision = evaluate(reading.value, &reading.thresholds);
    Self {
      sensor_name,
      kind,
      reading,
      decision,
    }
  }

  pub fn decision(&self) -> &AlertDecision {
    &self.decision
  }

  pub fn sensor_name(&self) -> &SensorName {
    &self.sensor_name
  }

  pub fn alert(&self) -> Option<AlertPayload> {
    let AlertDecision::Alert { threshold, limit } = &self.decision else {
      return None;
    };
    Some(AlertPayload {
      sensor_name: self.sensor_name.to_string(),
      kind: self.kind,
      value: self.reading.value?,
      unit: self.reading.unit.clone(),
      timestamp: self.reading.timestamp,
      threshold_name: threshold.clone(),
      threshold_limit: *limit,
    })
  }

  pub fn record(&self) -> DetectionRecord {
    DetectionRecord {
      sensor_name: self.sensor_name.to_string(),
      kind: self.kind,
      unit: self.reading.unit.clone(),
      timestamp: self.reading.timestamp,
      longitude: self.reading.longitude,
      latitude: self.reading.latitude,
      value: self.reading.value,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tiers(pairs: &[(&str, f64)]) -> Vec<Threshold> {
    pairs
      .iter()
      .map(|(name, limit)| Threshold {
        name: name.to_string(),
        limit: *limit,
      })
      .collect()
  }

  fn reading(value: Option<f64>, thresholds: Vec<Threshold>) -> Reading {
    Reading {
      station: "Diga di Ridracoli".to_string(),
      timestamp: 1_709_647_200_000,
      unit: "m".to_string(),
      longitude: Some(11.8),
      latitude: Some(43.9),
      value,
      thresholds,
    }
  }

  fn queries() -> Vec<String> {
    vec!["soglia1".into(), "soglia2".into(), "soglia3".into()]
  }

  #[test]
  fn picks_highest_satisfied_tier() {
    let t = tiers(&[("tier1", 10.0), ("tier2", 40.0), ("tier3", 60.0)]);
    assert_eq!(
      evaluate(Some(50.0), &t),
      AlertDecision::Alert {
        threshold: "tier2".to_string(),
        limit: 40.0
      }
    );
  }

  #[test]
  fn order_of_input_does_not_matter() {
    let t = tiers(&[("tier3", 60.0), ("tier1", 10.0), ("tier2", 40.0)]);
    assert_eq!(
      evaluate(Some(75.0), &t),
      AlertDecision::Alert {
        threshold: "tier3".to_string(),
        limit: 60.0
      }
    );
  }

  #[test]
  fn equal_to_limit_counts_as_exceeded() {
    let t = tiers(&[("tier1", 10.0)]);
    assert!(matches!(evaluate(Some(10.0), &t), AlertDecision::Alert { .. }));
  }

  #[test]
  fn below_every_tier_is_no_alert() {
    let t = tiers(&[("tier1", 10.0), ("tier2", 40.0)]);
    assert_eq!(evaluate(Some(9.99), &t), AlertDecision::NoAlert);
  }

  #[test]
  fn missing_value_or_thresholds_is_no_alert() {
    let t = tiers(&[("tier1", 10.0)]);
    assert_eq!(evaluate(None, &t), AlertDecision::NoAlert);
    assert_eq!(evaluate(Some(f64::NAN), &t), AlertDecision::NoAlert);
    assert_eq!(evaluate(Some(1e9), &[]), AlertDecision::NoAlert);
  }

  #[test]
  fn last_satisfied_wins_even_when_later_tier_is_lower() {
    // Names drive the order, not the limits.
    let t = tiers(&[("a", 50.0), ("b", 5.0)]);
    assert_eq!(
      evaluate(Some(60.0), &t),
      AlertDecision::Alert {
        threshold: "b".to_string(),
        limit: 5.0
      }
    );
  }

  #[test]
  fn unqueried_thresholds_are_ignored() {
    let name = SensorName::parse("Rain Gauge").unwrap();
    let r = reading(Some(500.0), tiers(&[("soglia1", 1.0)]));
    let d = Detection::new(name, SensorKind::Rain, &[], r);
    assert_eq!(d.decision(), &AlertDecision::NoAlert);
    assert!(d.alert().is_none());
  }

  #[test]
  fn alert_payload_shape() {
    let name = SensorName::parse("Diga di Ridracoli").unwrap();
    let r = reading(Some(3.5), tiers(&[("soglia1", 2.0), ("soglia2", 3.0), ("soglia3", 4.0)]));
    let d = Detection::new(name, SensorKind::IdroLevel, &queries(), r);
    let alert = serde_json::to_value(d.alert().unwrap()).unwrap();
    assert_eq!(
      alert,
      serde_json::json!({
        "sensorName": "DigadiRidracoli",
        "type": "idro_level",
        "value": 3.5,
        "unit": "m",
        "timestamp": 1_709_647_200_000_i64,
        "thresholdName": "soglia2",
        "thresholdLimit": 3.0
      })
    );

    let record = serde_json::to_value(d.record()).unwrap();
    assert_eq!(record["longitude"], 11.8);
    assert_eq!(record["sensorName"], "DigadiRidracoli");
    assert!(record.get("thresholdName").is_none());
  }
}
