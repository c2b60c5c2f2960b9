use crate::registry::RetryPolicy;
use crate::schedule::{Schedule, ScheduleError};
use crate::types::{parse_gateway_url, parse_port, GatewayTarget, Identity, NetworkEndpoint, SensorName, Settings};
use anyhow::Context;
use scraper::SensorKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One agent's configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  pub sensor: SensorConfig,
  pub ethernet: EthernetConfig,
  pub registry: RegistryConfig,
  pub gateway: GatewayConfig,
  pub cronjob: CronjobConfig,

  #[serde(default)]
  pub scraper: ScraperConfig,

  #[serde(default)]
  pub registration: RegistrationConfig,

  #[serde(default)]
  pub dispatch: DispatchConfig,

  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
  pub name: String,

  #[serde(rename = "type")]
  pub kind: String,

  #[serde(default = "default_description")]
  pub description: String,

  #[serde(default)]
  pub queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthernetConfig {
  pub ip: String,
  pub port: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
  pub url: String,

  #[serde(alias = "registerPath")]
  pub register_path: String,

  #[serde(alias = "shutDownPath", alias = "shutdownPath")]
  pub shutdown_path: String,

  pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
  pub url: String,
  pub port: i64,

  #[serde(default = "default_scheme")]
  pub scheme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronjobConfig {
  pub day_of_week: String,
  pub hour: String,
  pub minute: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperConfig {
  #[serde(default = "default_source_url")]
  pub url: String,

  #[serde(default = "default_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for ScraperConfig {
  fn default() -> Self {
    Self {
      url: default_source_url(),
      timeout_seconds: default_timeout_seconds(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
  #[serde(default = "default_attempts")]
  pub attempts: u32,

  #[serde(default = "default_delay_seconds")]
  pub delay_seconds: u64,

  #[serde(default = "default_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for RegistrationConfig {
  fn default() -> Self {
    Self {
      attempts: default_attempts(),
      delay_seconds: default_delay_seconds(),
      timeout_seconds: default_timeout_seconds(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
  #[serde(default = "default_timeout_seconds")]
  pub timeout_seconds: u64,

  #[serde(default = "default_true")]
  pub skip_overlapping: bool,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      timeout_seconds: default_timeout_seconds(),
      skip_overlapping: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
      dir: None,
    }
  }
}

fn default_description() -> String {
  "General Sensor Description".to_string()
}

fn default_scheme() -> String {
  "https".to_string()
}

fn default_source_url() -> String {
  scraper::SENSOR_DATA_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
  10
}

fn default_attempts() -> u32 {
  10
}

fn default_delay_seconds() -> u64 {
  5
}

fn default_true() -> bool {
  true
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
  let raw = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
  let cfg: Config = toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
  cfg
    .validate()
    .with_context(|| format!("invalid config {}", path.display()))?;
  Ok(cfg)
}

impl Config {
  pub fn validate(&self) -> anyhow::Result<()> {
    let required = [
      ("sensor.name", self.sensor.name.as_str()),
      ("sensor.type", self.sensor.kind.as_str()),
      ("sensor.description", self.sensor.description.as_str()),
      ("ethernet.ip", self.ethernet.ip.as_str()),
      ("registry.url", self.registry.url.as_str()),
      ("registry.register_path", self.registry.register_path.as_str()),
      ("registry.shutdown_path", self.registry.shutdown_path.as_str()),
      ("registry.key", self.registry.key.as_str()),
      ("gateway.url", self.gateway.url.as_str()),
      ("gateway.scheme", self.gateway.scheme.as_str()),
      ("scraper.url", self.scraper.url.as_str()),
    ];
    for (field, value) in required {
      if value.trim().is_empty() {
        anyhow::bail!("`{field}` must not be empty");
      }
    }
    if self.sensor.queries.iter().any(|q| q.trim().is_empty()) {
      anyhow::bail!("`sensor.queries` must not contain empty entries");
    }

    SensorName::parse(&self.sensor.name)?;
    self.sensor_kind()?;
    parse_port(self.ethernet.port).context("ethernet.port")?;
    parse_port(self.gateway.port).context("gateway.port")?;
    self.schedule().context("cronjob")?;

    if self.registration.attempts == 0 {
      anyhow::bail!("`registration.attempts` must be > 0");
    }
    let timeouts = [
      ("scraper.timeout_seconds", self.scraper.timeout_seconds),
      ("registration.timeout_seconds", self.registration.timeout_seconds),
      ("dispatch.timeout_seconds", self.dispatch.timeout_seconds),
    ];
    for (field, secs) in timeouts {
      if secs == 0 {
        anyhow::bail!("`{field}` must be > 0");
      }
    }
    Ok(())
  }

  pub fn sensor_kind(&self) -> anyhow::Result<SensorKind> {
    self
      .sensor
      .kind
      .parse()
      .with_context(|| format!("unknown sensor type `{}`", self.sensor.kind))
  }

  pub fn schedule(&self) -> Result<Schedule, ScheduleError> {
    Schedule::parse(
      &self.cronjob.day_of_week,
      &self.cronjob.hour,
      &self.cronjob.minute,
    )
  }

  pub fn identity(&self) -> anyhow::Result<Identity> {
    Ok(Identity {
      kind: self.sensor_kind()?,
      description: self.sensor.description.clone(),
      queries: self.sensor.queries.clone(),
    })
  }

  pub fn endpoint(&self) -> anyhow::Result<NetworkEndpoint> {
    Ok(NetworkEndpoint {
      ip: self.ethernet.ip.trim().to_string(),
      port: parse_port(self.ethernet.port).context("ethernet.port")?,
    })
  }

  pub fn settings(&self) -> anyhow::Result<Settings> {
    Ok(Settings {
      name: SensorName::parse(&self.sensor.name)?,
      gateway: GatewayTarget {
        url: parse_gateway_url(&self.gateway.url)?,
        port: parse_port(self.gateway.port).context("gateway.port")?,
        scheme: self.gateway.scheme.trim().to_string(),
      },
      schedule: self.schedule()?,
    })
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      attempts: self.registration.attempts,
      delay: Duration::from_secs(self.registration.delay_seconds),
    }
  }
}

pub fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}
