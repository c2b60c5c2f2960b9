use crate::detection::Detection;
use crate::gateway::Gateway;
use crate::scheduler::Job;
use crate::source::SourceAdapter;
use crate::types::{Identity, Settings};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
  NoReading,
  Sent { alerted: bool },
}

/// One sense-evaluate-send pass, run on every scheduler firing.
pub struct DispatchCycle {
  identity: Identity,
  settings: Arc<Mutex<Settings>>,
  source: Arc<dyn SourceAdapter>,
  gateway: Arc<dyn Gateway>,
}

impl DispatchCycle {
  pub fn new(
    identity: Identity,
    settings: Arc<Mutex<Settings>>,
    source: Arc<dyn SourceAdapter>,
    gateway: Arc<dyn Gateway>,
  ) -> Self {
    Self {
      identity,
      settings,
      source,
      gateway,
    }
  }

  pub async fn run_once(&self) -> anyhow::Result<CycleOutcome> {
    // Renames and gateway changes land on the next cycle, never mid-flight.
    let settings = self.settings.lock().await.clone();

    let Some(reading) = self.source.fetch(settings.name.as_str()).await? else {
      tracing::info!(sensor = %settings.name, "no reading for this sensor in the current feed");
      return Ok(CycleOutcome::NoReading);
    };

    let detection = Detection::new(settings.name, self.identity.kind, &self.identity.queries, reading);

    let mut alerted = false;
    if let Some(alert) = detection.alert() {
      tracing::info!(
        threshold = %alert.threshold_name,
        value = alert.value,
        "threshold exceeded"
      );
      match self.gateway.send_alert(&settings.gateway, &alert).await {
        Ok(()) => alerted = true,
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "failed to send alert"),
      }
    }

    self
      .gateway
      .send_detection(&settings.gateway, &detection.record())
      .await?;
    Ok(CycleOutcome::Sent { alerted })
  }
}

#[async_trait]
impl Job for DispatchCycle {
  async fn fire(&self) {
    let span = tracing::info_span!("dispatch", cycle_id = %uuid::Uuid::new_v4());
    async {
      match self.run_once().await {
        Ok(outcome) => tracing::debug!(?outcome, "dispatch cycle finished"),
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "dispatch cycle abandoned"),
      }
    }
    .instrument(span)
    .await;
  }
}
