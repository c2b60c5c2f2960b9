use super::error::ApiResult;
use super::SharedState;
use crate::schedule::{DayRange, Schedule, TimeField};
use crate::types::{parse_gateway_url, parse_port, NetworkEndpoint, SensorName, ValidationError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

pub const HEALTH_TEXT: &str = "Everything is OK.";
pub const SHUTDOWN_TEXT: &str = "Server shutting down...";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
  pub sensor_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DaysRequest {
  #[serde(alias = "sensorCronJobDays")]
  pub days: String,
}

/// Integers may arrive as JSON numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IntField {
  Int(i64),
  Text(String),
}

impl IntField {
  fn value(&self, field: &'static str) -> Result<i64, ValidationError> {
    match self {
      IntField::Int(v) => Ok(*v),
      IntField::Text(raw) => raw.trim().parse().map_err(|_| ValidationError::NotAnInteger {
        field,
        raw: raw.clone(),
      }),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct TimeRequest {
  #[serde(alias = "sensorCronJobTimeHour")]
  pub hour: IntField,
  #[serde(alias = "sensorCronJobTimeMinute")]
  pub minute: IntField,
}

#[derive(Debug, Deserialize)]
pub struct GatewayUrlRequest {
  #[serde(alias = "new_url")]
  pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct GatewayPortRequest {
  pub port: IntField,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
  pub url: String,
  pub port: u16,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
  pub sensor_name: String,
  pub sensor_type: String,
  pub description: String,
  pub queries: Vec<String>,
  pub endpoint: NetworkEndpoint,
  pub gateway: GatewayInfo,
  pub cronjob: Schedule,
}

pub async fn rename(
  State(state): State<SharedState>,
  body: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<()> {
  let Json(req) = body?;
  let name = SensorName::parse(&req.sensor_name)?;

  let mut settings = state.settings.lock().await;
  tracing::info!(from = %settings.name, to = %name, "sensor renamed");
  settings.name = name;
  Ok(())
}

pub async fn set_days(
  State(state): State<SharedState>,
  body: Result<Json<DaysRequest>, JsonRejection>,
) -> ApiResult<()> {
  let Json(req) = body?;
  let days: DayRange = req.days.trim().parse().map_err(ValidationError::from)?;

  // Held across the replace so the stored schedule matches the running job.
  let mut settings = state.settings.lock().await;
  let schedule = settings.schedule.with_days(days);
  state.scheduler.replace(schedule).await?;
  settings.schedule = schedule;
  Ok(())
}

pub async fn set_time(
  State(state): State<SharedState>,
  body: Result<Json<TimeRequest>, JsonRejection>,
) -> ApiResult<()> {
  let Json(req) = body?;
  let hour = TimeField::hour(req.hour.value("hour")?).map_err(ValidationError::from)?;
  let minute = TimeField::minute(req.minute.value("minute")?).map_err(ValidationError::from)?;

  let mut settings = state.settings.lock().await;
  let schedule = settings.schedule.with_time(hour, minute);
  state.scheduler.replace(schedule).await?;
  settings.schedule = schedule;
  Ok(())
}

pub async fn set_gateway_url(
  State(state): State<SharedState>,
  body: Result<Json<GatewayUrlRequest>, JsonRejection>,
) -> ApiResult<()> {
  let Json(req) = body?;
  let url = parse_gateway_url(&req.url)?;

  let mut settings = state.settings.lock().await;
  tracing::info!(url = %url, "gateway url updated");
  settings.gateway.url = url;
  Ok(())
}

pub async fn set_gateway_port(
  State(state): State<SharedState>,
  body: Result<Json<GatewayPortRequest>, JsonRejection>,
) -> ApiResult<()> {
  let Json(req) = body?;
  let port = parse_port(req.port.value("port")?)?;

  let mut settings = state.settings.lock().await;
  tracing::info!(port, "gateway port updated");
  settings.gateway.port = port;
  Ok(())
}

pub async fn health() -> &'static str {
  tracing::debug!("health probe");
  HEALTH_TEXT
}

pub async fn info(State(state): State<SharedState>) -> Json<InfoResponse> {
  let settings = state.settings.lock().await.clone();
  Json(InfoResponse {
    sensor_name: settings.name.to_string(),
    sensor_type: state.identity.kind.to_string(),
    description: state.identity.description.clone(),
    queries: state.identity.queries.clone(),
    endpoint: state.endpoint.clone(),
    gateway: GatewayInfo {
      url: settings.gateway.url,
      port: settings.gateway.port,
    },
    cronjob: settings.schedule,
  })
}

/// Answers first; the agent tears down once the response has been written.
pub async fn shutdown(State(state): State<SharedState>) -> &'static str {
  tracing::info!("shutdown requested through the control surface");
  state.shutdown.cancel();
  SHUTDOWN_TEXT
}
