use crate::detection::{AlertPayload, DetectionRecord};
use crate::types::GatewayTarget;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait Gateway: Send + Sync {
  async fn send_alert(&self, target: &GatewayTarget, alert: &AlertPayload) -> anyhow::Result<()>;

  async fn send_detection(
    &self,
    target: &GatewayTarget,
    record: &DetectionRecord,
  ) -> anyhow::Result<()>;
}

pub struct HttpGateway {
  client: reqwest::Client,
}

impl HttpGateway {
  pub fn new(timeout: Duration) -> anyhow::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .context("build gateway HTTP client")?;
    Ok(Self { client })
  }

  async fn post<T: Serialize + ?Sized>(&self, url: Url, body: &T) -> anyhow::Result<()> {
    let response = self
      .client
      .post(url.clone())
      .json(body)
      .send()
      .await
      .with_context(|| format!("POST {url}"))?;

    let status = response.status();
    if !status.is_success() {
      anyhow::bail!("gateway answered {} for POST {url}", status.as_u16());
    }
    Ok(())
  }
}

pub fn alerts_url(target: &GatewayTarget) -> anyhow::Result<Url> {
  endpoint(target, &["alerts"])
}

/// The sensor name is pushed as one percent-encoded segment.
pub fn detections_url(target: &GatewayTarget, record: &DetectionRecord) -> anyhow::Result<Url> {
  endpoint(
    target,
    &[record.kind.as_str(), record.sensor_name.as_str(), "detections"],
  )
}

fn endpoint(target: &GatewayTarget, segments: &[&str]) -> anyhow::Result<Url> {
  let base = target.detection_base();
  let mut url = Url::parse(&base).with_context(|| format!("invalid gateway url `{base}`"))?;
  url
    .path_segments_mut()
    .map_err(|_| anyhow::anyhow!("gateway url `{base}` cannot take a path"))?
    .pop_if_empty()
    .extend(segments);
  Ok(url)
}

#[async_trait]
impl Gateway for HttpGateway {
  async fn send_alert(&self, target: &GatewayTarget, alert: &AlertPayload) -> anyhow::Result<()> {
    self.post(alerts_url(target)?, alert).await?;
    tracing::info!(
      sensor = %alert.sensor_name,
      threshold = %alert.threshold_name,
      "alert sent to the gateway"
    );
    Ok(())
  }

  async fn send_detection(
    &self,
    target: &GatewayTarget,
    record: &DetectionRecord,
  ) -> anyhow::Result<()> {
    self.post(detections_url(target, record)?, record).await?;
    tracing::info!(sensor = %record.sensor_name, "detection sent to the gateway");
    Ok(())
  }
}
