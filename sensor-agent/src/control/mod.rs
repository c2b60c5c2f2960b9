pub mod error;
pub mod handlers;

use crate::scheduler::Scheduler;
use crate::types::{Identity, NetworkEndpoint, Settings};
use anyhow::Context;
use axum::routing::{delete, get, put};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub struct ControlState {
  pub identity: Identity,
  pub endpoint: NetworkEndpoint,
  pub settings: Arc<Mutex<Settings>>,
  pub scheduler: Arc<Scheduler>,
  /// Cancelled by `DELETE /shutdown`.
  pub shutdown: CancellationToken,
}

pub type SharedState = Arc<ControlState>;

pub fn router(state: SharedState) -> Router {
  Router::new()
    .route("/sensor/update/name", put(handlers::rename))
    .route("/sensor/configuration/cron/days", put(handlers::set_days))
    .route("/sensor/configuration/cron/time", put(handlers::set_time))
    .route("/sensor/configuration/gateway/url", put(handlers::set_gateway_url))
    .route("/sensor/configuration/gateway/port", put(handlers::set_gateway_port))
    .route("/health", get(handlers::health))
    .route("/info", get(handlers::info))
    .route("/shutdown", delete(handlers::shutdown))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Serves until `cancel` fires, then drains in-flight requests.
pub async fn serve(listener: TcpListener, router: Router, cancel: CancellationToken) -> anyhow::Result<()> {
  let addr = listener.local_addr().context("control surface address")?;
  tracing::info!(%addr, "control surface listening");
  axum::serve(listener, router)
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .context("control surface server")?;
  tracing::info!("control surface stopped");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::handlers::{HEALTH_TEXT, SHUTDOWN_TEXT};
  use super::*;
  use crate::schedule::Schedule;
  use crate::scheduler::{Job, SystemClock};
  use crate::types::{GatewayTarget, SensorName};
  use async_trait::async_trait;
  use axum::body::Body;
  use axum::http::{Method, Request, StatusCode};
  use scraper::SensorKind;
  use tower::ServiceExt;

  struct Noop;

  #[async_trait]
  impl Job for Noop {
    async fn fire(&self) {}
  }

  async fn state() -> SharedState {
    let schedule = Schedule::parse("0-6", "*", "*").unwrap();
    let scheduler = Arc::new(Scheduler::new(Arc::new(SystemClock), Arc::new(Noop), true));
    scheduler.replace(schedule).await.unwrap();
    Arc::new(ControlState {
      identity: Identity {
        kind: SensorKind::IdroLevel,
        description: "General Sensor Description".to_string(),
        queries: vec!["soglia1".to_string()],
      },
      endpoint: NetworkEndpoint {
        ip: "127.0.0.1".to_string(),
        port: 12_000,
      },
      settings: Arc::new(Mutex::new(Settings {
        name: SensorName::parse("Castelbolognese").unwrap(),
        gateway: GatewayTarget {
          url: "localhost".to_string(),
          port: 3000,
          scheme: "http".to_string(),
        },
        schedule,
      })),
      scheduler,
      shutdown: CancellationToken::new(),
    })
  }

  fn put_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
      .method(Method::PUT)
      .uri(uri)
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  async fn send(state: &SharedState, req: Request<Body>) -> (StatusCode, String) {
    let res = router(state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
  }

  #[tokio::test]
  async fn blank_rename_is_rejected_without_change() {
    let state = state().await;
    let (status, body) = send(&state, put_json("/sensor/update/name", serde_json::json!({ "sensorName": "   " }))).await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(state.settings.lock().await.name.as_str(), "Castelbolognese");
  }

  #[tokio::test]
  async fn rename_strips_whitespace() {
    let state = state().await;
    let req = put_json("/sensor/update/name", serde_json::json!({ "sensorName": "Ponte Nibbiano" }));
    assert_eq!(send(&state, req).await.0, StatusCode::OK);
    assert_eq!(state.settings.lock().await.name.as_str(), "PonteNibbiano");
  }

  #[tokio::test]
  async fn malformed_body_is_406() {
    let state = state().await;
    let req = put_json("/sensor/update/name", serde_json::json!({ "name": "x" }));
    assert_eq!(send(&state, req).await.0, StatusCode::NOT_ACCEPTABLE);
  }

  #[tokio::test]
  async fn inverted_days_leave_schedule_alone() {
    let state = state().await;
    let before = state.scheduler.active_schedule().await;
    let req = put_json("/sensor/configuration/cron/days", serde_json::json!({ "days": "3-2" }));
    assert_eq!(send(&state, req).await.0, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(state.scheduler.active_schedule().await, before);
    assert_eq!(Some(state.settings.lock().await.schedule), before);
  }

  #[tokio::test]
  async fn days_update_reconfigures_scheduler() {
    let state = state().await;
    let req = put_json(
      "/sensor/configuration/cron/days",
      serde_json::json!({ "sensorCronJobDays": "1-4" }),
    );
    assert_eq!(send(&state, req).await.0, StatusCode::OK);
    let active = state.scheduler.active_schedule().await.unwrap();
    assert_eq!(active.day_of_week.to_string(), "1-4");
    assert_eq!(state.settings.lock().await.schedule, active);
  }

  #[tokio::test]
  async fn time_update_validates_ranges() {
    let state = state().await;
    for body in [
      serde_json::json!({ "hour": 24, "minute": 0 }),
      serde_json::json!({ "hour": 0, "minute": 60 }),
      serde_json::json!({ "hour": -1, "minute": 0 }),
      serde_json::json!({ "hour": "noon", "minute": 0 }),
    ] {
      let req = put_json("/sensor/configuration/cron/time", body);
      assert_eq!(send(&state, req).await.0, StatusCode::NOT_ACCEPTABLE);
    }

    let req = put_json(
      "/sensor/configuration/cron/time",
      serde_json::json!({ "sensorCronJobTimeHour": "7", "sensorCronJobTimeMinute": 30 }),
    );
    assert_eq!(send(&state, req).await.0, StatusCode::OK);
    let active = state.scheduler.active_schedule().await.unwrap();
    assert_eq!(active.cron_expression(), "0 30 7 * * Mon,Tue,Wed,Thu,Fri,Sat,Sun");
  }

  #[tokio::test]
  async fn gateway_updates() {
    let state = state().await;
    let req = put_json("/sensor/configuration/gateway/port", serde_json::json!({ "port": 70_000 }));
    assert_eq!(send(&state, req).await.0, StatusCode::NOT_ACCEPTABLE);
    let req = put_json("/sensor/configuration/gateway/url", serde_json::json!({ "url": "  " }));
    assert_eq!(send(&state, req).await.0, StatusCode::NOT_ACCEPTABLE);

    let req = put_json("/sensor/configuration/gateway/port", serde_json::json!({ "port": 8080 }));
    assert_eq!(send(&state, req).await.0, StatusCode::OK);
    let req = put_json("/sensor/configuration/gateway/url", serde_json::json!({ "url": "gw.example" }));
    assert_eq!(send(&state, req).await.0, StatusCode::OK);

    let gateway = state.settings.lock().await.gateway.clone();
    assert_eq!((gateway.url.as_str(), gateway.port), ("gw.example", 8080));
  }

  #[tokio::test]
  async fn stopped_scheduler_is_503() {
    let state = state().await;
    state.scheduler.shutdown().await;
    let req = put_json("/sensor/configuration/cron/days", serde_json::json!({ "days": "0-1" }));
    assert_eq!(send(&state, req).await.0, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(state.settings.lock().await.schedule.day_of_week.to_string(), "0-6");
  }

  #[tokio::test]
  async fn health_and_info() {
    let state = state().await;
    let req = Request::get("/health").body(Body::empty()).unwrap();
    assert_eq!(send(&state, req).await, (StatusCode::OK, HEALTH_TEXT.to_string()));

    let req = Request::get("/info").body(Body::empty()).unwrap();
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::OK);
    let info: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(info["sensorName"], "Castelbolognese");
    assert_eq!(info["sensorType"], "idro_level");
    assert_eq!(info["gateway"]["port"], 3000);
    assert_eq!(info["endpoint"]["port"], 12_000);
    assert_eq!(info["cronjob"]["dayOfWeek"], "0-6");
  }

  #[tokio::test]
  async fn shutdown_answers_then_signals() {
    let state = state().await;
    let req = Request::delete("/shutdown").body(Body::empty()).unwrap();
    assert_eq!(send(&state, req).await, (StatusCode::OK, SHUTDOWN_TEXT.to_string()));
    assert!(state.shutdown.is_cancelled());
  }
}
