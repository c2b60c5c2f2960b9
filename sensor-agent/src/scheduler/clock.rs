use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;

  /// Resolves once `now() >= deadline`.
  async fn sleep_until(&self, deadline: DateTime<Utc>);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  async fn sleep_until(&self, deadline: DateTime<Utc>) {
    let wait = (deadline - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
  }
}

/// Clock that only moves when a test tells it to.
#[cfg(test)]
pub(crate) struct ManualClock {
  now: tokio::sync::watch::Sender<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
  pub(crate) fn new(start: DateTime<Utc>) -> Self {
    let (now, _) = tokio::sync::watch::channel(start);
    Self { now }
  }

  pub(crate) fn advance_to(&self, at: DateTime<Utc>) {
    self.now.send_replace(at);
  }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.borrow()
  }

  async fn sleep_until(&self, deadline: DateTime<Utc>) {
    let mut rx = self.now.subscribe();
    loop {
      let reached = *rx.borrow_and_update() >= deadline;
      if reached || rx.changed().await.is_err() {
        return;
      }
    }
  }
}
