use crate::config::Config;
use crate::control::{self, ControlState};
use crate::dispatch::DispatchCycle;
use crate::gateway::{Gateway, HttpGateway};
use crate::registry::RegistryClient;
use crate::scheduler::{Clock, Scheduler, SystemClock};
use crate::source::SourceAdapter;
use crate::types::{Identity, NetworkEndpoint, Settings};
use anyhow::Context;
use scraper::Scraper;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Agent {
  identity: Identity,
  endpoint: NetworkEndpoint,
  settings: Settings,
  registry: RegistryClient,
  skip_overlapping: bool,
  source: Arc<dyn SourceAdapter>,
  gateway: Arc<dyn Gateway>,
  clock: Arc<dyn Clock>,
}

impl Agent {
  pub fn new(cfg: &Config) -> anyhow::Result<Self> {
    let kind = cfg.sensor_kind()?;
    let source = Scraper::new(
      kind,
      cfg.scraper.url.clone(),
      Duration::from_secs(cfg.scraper.timeout_seconds),
    )
    .context("build source adapter")?;
    let gateway = HttpGateway::new(Duration::from_secs(cfg.dispatch.timeout_seconds))?;
    Self::with_collaborators(cfg, Arc::new(source), Arc::new(gateway), Arc::new(SystemClock))
  }

  pub fn with_collaborators(
    cfg: &Config,
    source: Arc<dyn SourceAdapter>,
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
  ) -> anyhow::Result<Self> {
    let registry = RegistryClient::new(
      &cfg.registry.url,
      &cfg.registry.register_path,
      &cfg.registry.shutdown_path,
      cfg.registry.key.clone(),
      cfg.retry_policy(),
      Duration::from_secs(cfg.registration.timeout_seconds),
    )?;
    Ok(Self {
      identity: cfg.identity()?,
      endpoint: cfg.endpoint()?,
      settings: cfg.settings()?,
      registry,
      skip_overlapping: cfg.dispatch.skip_overlapping,
      source,
      gateway,
      clock,
    })
  }

  pub async fn run(self, stop: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("{}:{}", self.endpoint.ip, self.endpoint.port);
    let listener = TcpListener::bind(&addr)
      .await
      .with_context(|| format!("bind control surface on {addr}"))?;
    self.run_on(listener, stop).await
  }

  /// Runs until `stop` fires or `DELETE /shutdown` is called.
  pub async fn run_on(self, listener: TcpListener, stop: CancellationToken) -> anyhow::Result<()> {
    tracing::info!(
      sensor = %self.settings.name,
      kind = %self.identity.kind,
      schedule = %self.settings.schedule,
      "starting sensor agent"
    );

    let initial = self.settings.schedule;
    let settings = Arc::new(Mutex::new(self.settings));
    let job = DispatchCycle::new(
      self.identity.clone(),
      settings.clone(),
      self.source,
      self.gateway,
    );
    let scheduler = Arc::new(Scheduler::new(self.clock, Arc::new(job), self.skip_overlapping));
    scheduler
      .replace(initial)
      .await
      .context("configure recurring job")?;

    let shutdown = CancellationToken::new();
    let server_cancel = CancellationToken::new();
    let state = Arc::new(ControlState {
      identity: self.identity.clone(),
      endpoint: self.endpoint.clone(),
      settings: settings.clone(),
      scheduler: scheduler.clone(),
      shutdown: shutdown.clone(),
    });
    let server = tokio::spawn(control::serve(
      listener,
      control::router(state),
      server_cancel.clone(),
    ));

    let name = settings.lock().await.name.clone();
    let outcome = tokio::select! {
      r = self.registry.register(&self.endpoint, &name, &self.identity) => Some(r),
      _ = stop.cancelled() => None,
      _ = shutdown.cancelled() => None,
    };
    match outcome {
      Some(Ok(())) => {
        tokio::select! {
          _ = stop.cancelled() => tracing::info!("stop requested"),
          _ = shutdown.cancelled() => tracing::info!("shutdown requested by the control surface"),
        }
        self.registry.deregister(&self.endpoint).await;
      }
      Some(Err(e)) => {
        scheduler.shutdown().await;
        server_cancel.cancel();
        join_server(server).await;
        return Err(e).context("sensor registration");
      }
      // Nothing was registered, so there is nothing to remove.
      None => tracing::info!("stopped before registration completed"),
    }

    scheduler.shutdown().await;
    server_cancel.cancel();
    join_server(server).await;
    tracing::info!("sensor agent stopped");
    Ok(())
  }
}

async fn join_server(server: JoinHandle<anyhow::Result<()>>) {
  match server.await {
    Ok(Ok(())) => {}
    Ok(Err(e)) => tracing::error!(error = %format!("{e:#}"), "control surface failed"),
    Err(e) => tracing::error!(error = %e, "control surface task panicked"),
  }
}
