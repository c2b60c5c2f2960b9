use crate::schedule::{Schedule, ScheduleError};
use scraper::SensorKind;
use serde::Serialize;
use std::fmt;

pub const MAX_PORT: i64 = 65_535;

/// Input rejected by the control surface or the config loader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
  #[error("the sensor name must contain at least one non-whitespace character")]
  EmptyName,
  #[error("the gateway url must not be empty or contain only whitespace")]
  EmptyGatewayUrl,
  #[error("port {0} is outside [0, 65535]")]
  PortOutOfRange(i64),
  #[error("`{field}` must be an integer, got `{raw}`")]
  NotAnInteger { field: &'static str, raw: String },
  #[error(transparent)]
  Schedule(#[from] ScheduleError),
  #[error("malformed request body: {0}")]
  Malformed(String),
}

/// Whitespace-free sensor name, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SensorName(String);

impl SensorName {
  pub fn parse(raw: &str) -> Result<Self, ValidationError> {
    let name: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if name.is_empty() {
      return Err(ValidationError::EmptyName);
    }
    Ok(Self(name))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SensorName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The immutable part of a sensor's identity.
#[derive(Debug, Clone)]
pub struct Identity {
  pub kind: SensorKind,
  pub description: String,
  pub queries: Vec<String>,
}

/// Where this agent's control surface listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEndpoint {
  pub ip: String,
  pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayTarget {
  pub url: String,
  pub port: u16,
  #[serde(skip)]
  pub scheme: String,
}

impl GatewayTarget {
  pub fn detection_base(&self) -> String {
    format!(
      "{}://{}:{}/v0/api/detection",
      self.scheme, self.url, self.port
    )
  }
}

pub fn parse_gateway_url(raw: &str) -> Result<String, ValidationError> {
  let url = raw.trim();
  if url.is_empty() {
    return Err(ValidationError::EmptyGatewayUrl);
  }
  Ok(url.to_string())
}

pub fn parse_port(value: i64) -> Result<u16, ValidationError> {
  if !(0..=MAX_PORT).contains(&value) {
    return Err(ValidationError::PortOutOfRange(value));
  }
  u16::try_from(value).map_err(|_| ValidationError::PortOutOfRange(value))
}

/// Operator-mutable state. Lives behind one lock; dispatch cycles copy it.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub name: SensorName,
  pub gateway: GatewayTarget,
  pub schedule: Schedule,
}
