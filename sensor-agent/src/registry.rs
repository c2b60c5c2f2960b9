use crate::types::{Identity, NetworkEndpoint, SensorName};
use anyhow::Context;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: 10,
      delay: Duration::from_secs(5),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
  #[error("registry did not accept the sensor after {attempts} attempts")]
  Exhausted { attempts: u32 },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration<'a> {
  sensor_ip: &'a str,
  sensor_name: &'a str,
  sensor_port: u16,
  sensor_type: &'a str,
  sensor_queries: &'a [String],
}

pub struct RegistryClient {
  client: reqwest::Client,
  register_url: String,
  shutdown_url: String,
  api_key: String,
  policy: RetryPolicy,
}

impl RegistryClient {
  pub fn new(
    url: &str,
    register_path: &str,
    shutdown_path: &str,
    api_key: impl Into<String>,
    policy: RetryPolicy,
    timeout: Duration,
  ) -> anyhow::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .context("build registry HTTP client")?;
    Ok(Self {
      client,
      register_url: format!("{url}{register_path}"),
      shutdown_url: format!("{url}{shutdown_path}"),
      api_key: api_key.into(),
      policy,
    })
  }

  /// Announces the sensor until the registry answers `201 Created`.
  ///
  /// Connection failures and non-201 answers are retried after a fixed
  /// delay. Running out of attempts is fatal for the agent.
  pub async fn register(
    &self,
    endpoint: &NetworkEndpoint,
    name: &SensorName,
    identity: &Identity,
  ) -> Result<(), RegistrationError> {
    let body = Registration {
      sensor_ip: &endpoint.ip,
      sensor_name: name.as_str(),
      sensor_port: endpoint.port,
      sensor_type: identity.kind.as_str(),
      sensor_queries: &identity.queries,
    };

    tracing::info!(url = %self.register_url, "registering the sensor");
    for attempt in 1..=self.policy.attempts {
      match self.try_register(&body).await {
        Ok(status) if status == StatusCode::CREATED => {
          tracing::info!(attempt, "sensor registered");
          return Ok(());
        }
        Ok(status) => {
          tracing::warn!(attempt, status = status.as_u16(), "registry did not create the sensor");
        }
        Err(e) => {
          tracing::warn!(attempt, error = %format!("{e:#}"), "registration attempt failed");
        }
      }

      if attempt < self.policy.attempts {
        tokio::time::sleep(self.policy.delay).await;
      }
    }

    tracing::error!(attempts = self.policy.attempts, "failed to register the sensor");
    Err(RegistrationError::Exhausted {
      attempts: self.policy.attempts,
    })
  }

  async fn try_register(&self, body: &Registration<'_>) -> anyhow::Result<StatusCode> {
    let response = self
      .client
      .post(&self.register_url)
      .header(API_KEY_HEADER, &self.api_key)
      .json(body)
      .send()
      .await
      .with_context(|| format!("POST {}", self.register_url))?;
    let response = response
      .error_for_status()
      .context("registry returned an error status")?;
    Ok(response.status())
  }

  /// Single best-effort de-registration; failures are logged, never retried.
  pub async fn deregister(&self, endpoint: &NetworkEndpoint) {
    let port = endpoint.port.to_string();
    let result = self
      .client
      .delete(&self.shutdown_url)
      .header(API_KEY_HEADER, &self.api_key)
      .query(&[("sensorIp", endpoint.ip.as_str()), ("sensorPort", port.as_str())])
      .send()
      .await;

    match result {
      Ok(response) if response.status().is_success() => {
        tracing::info!("sensor de-registered");
      }
      Ok(response) => {
        tracing::warn!(status = response.status().as_u16(), "registry refused de-registration");
      }
      Err(e) => {
        tracing::warn!(error = %e, "de-registration request failed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use scraper::SensorKind;
  use wiremock::matchers::{body_partial_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client(server: &MockServer, attempts: u32) -> RegistryClient {
    RegistryClient::new(
      &server.uri(),
      "/register",
      "/shutdown",
      "secretKey",
      RetryPolicy {
        attempts,
        delay: Duration::ZERO,
      },
      Duration::from_secs(5),
    )
    .unwrap()
  }

  fn endpoint() -> NetworkEndpoint {
    NetworkEndpoint {
      ip: "0.0.0.0".to_string(),
      port: 12_001,
    }
  }

  fn identity() -> Identity {
    Identity {
      kind: SensorKind::IdroLevel,
      description: "General Sensor Description".to_string(),
      queries: vec!["soglia1".to_string(), "soglia2".to_string(), "soglia3".to_string()],
    }
  }

  #[tokio::test]
  async fn succeeds_on_the_last_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/register"))
      .respond_with(ResponseTemplate::new(503))
      .up_to_n_times(9)
      .expect(9)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/register"))
      .and(header(API_KEY_HEADER, "secretKey"))
      .and(body_partial_json(serde_json::json!({
        "sensorIp": "0.0.0.0",
        "sensorName": "Castelbolognese",
        "sensorPort": 12001,
        "sensorType": "idro_level",
        "sensorQueries": ["soglia1", "soglia2", "soglia3"]
      })))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let name = SensorName::parse("Castelbolognese").unwrap();
    client(&server, 10)
      .register(&endpoint(), &name, &identity())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn gives_up_after_all_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(500))
      .expect(10)
      .mount(&server)
      .await;

    let name = SensorName::parse("Castelbolognese").unwrap();
    let err = client(&server, 10)
      .register(&endpoint(), &name, &identity())
      .await
      .unwrap_err();
    assert!(matches!(err, RegistrationError::Exhausted { attempts: 10 }));
  }

  #[tokio::test]
  async fn ok_without_created_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .expect(3)
      .mount(&server)
      .await;

    let name = SensorName::parse("Castelbolognese").unwrap();
    let res = client(&server, 3).register(&endpoint(), &name, &identity()).await;
    assert!(res.is_err());
  }

  #[tokio::test]
  async fn unreachable_registry_is_exhausted() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let registry = RegistryClient::new(
      &uri,
      "/register",
      "/shutdown",
      "secretKey",
      RetryPolicy {
        attempts: 2,
        delay: Duration::ZERO,
      },
      Duration::from_secs(1),
    )
    .unwrap();
    let name = SensorName::parse("Sestola").unwrap();
    let err = registry.register(&endpoint(), &name, &identity()).await.unwrap_err();
    assert!(matches!(err, RegistrationError::Exhausted { attempts: 2 }));
  }

  #[tokio::test]
  async fn deregister_sends_endpoint_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/shutdown"))
      .and(header(API_KEY_HEADER, "secretKey"))
      .and(query_param("sensorIp", "0.0.0.0"))
      .and(query_param("sensorPort", "12001"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;

    client(&server, 1).deregister(&endpoint()).await;
  }
}
