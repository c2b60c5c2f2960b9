use async_trait::async_trait;
use scraper::{Reading, Scraper};

/// Supplies the current reading for a named sensor.
///
/// `Ok(None)` means the upstream feed has no station with that name right
/// now; errors are transport or payload failures.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
  async fn fetch(&self, sensor_name: &str) -> anyhow::Result<Option<Reading>>;
}

#[async_trait]
impl SourceAdapter for Scraper {
  async fn fetch(&self, sensor_name: &str) -> anyhow::Result<Option<Reading>> {
    Ok(self.reading_for(sensor_name).await?)
  }
}
