//! Owns at most one recurring job; callers only ever swap it.

pub mod clock;

pub use clock::{Clock, SystemClock};

use crate::schedule::{Schedule, ScheduleError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Work executed on every firing.
#[async_trait]
pub trait Job: Send + Sync + 'static {
  async fn fire(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
  #[error("scheduler has been stopped")]
  Stopped,
  #[error(transparent)]
  Schedule(#[from] ScheduleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  Idle,
  Scheduled,
  Stopped,
}

struct ActiveJob {
  schedule: Schedule,
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

impl ActiveJob {
  async fn stop(self) {
    self.cancel.cancel();
    if let Err(e) = self.handle.await {
      tracing::error!(error = %e, "scheduler job loop ended abnormally");
    }
  }
}

#[derive(Default)]
struct Inner {
  active: Option<ActiveJob>,
  stopped: bool,
}

pub struct Scheduler {
  clock: Arc<dyn Clock>,
  job: Arc<dyn Job>,
  skip_overlapping: bool,
  in_flight: Arc<AtomicBool>,
  inner: Mutex<Inner>,
}

impl Scheduler {
  pub fn new(clock: Arc<dyn Clock>, job: Arc<dyn Job>, skip_overlapping: bool) -> Self {
    Self {
      clock,
      job,
      skip_overlapping,
      in_flight: Arc::new(AtomicBool::new(false)),
      inner: Mutex::new(Inner::default()),
    }
  }

  /// Atomically swaps the active job for one firing on `schedule`.
  ///
  /// When this returns, the previous job loop has exited and can no longer
  /// fire; cycles it already started keep running to completion.
  pub async fn replace(&self, schedule: Schedule) -> Result<(), SchedulerError> {
    // Reject before the old job is touched.
    schedule.to_cron()?;

    let mut inner = self.inner.lock().await;
    if inner.stopped {
      return Err(SchedulerError::Stopped);
    }
    if let Some(old) = inner.active.take() {
      tracing::debug!(schedule = %old.schedule, "stopping previous recurring job");
      old.stop().await;
    }

    let cancel = CancellationToken::new();
    let first = schedule.next_after(self.clock.now());
    let handle = tokio::spawn(job_loop(JobLoop {
      clock: self.clock.clone(),
      job: self.job.clone(),
      schedule,
      first,
      cancel: cancel.clone(),
      in_flight: self.in_flight.clone(),
      skip_overlapping: self.skip_overlapping,
    }));

    inner.active = Some(ActiveJob {
      schedule,
      cancel,
      handle,
    });
    tracing::info!(
      schedule = %schedule,
      next_firing = ?first,
      "recurring job configured"
    );
    Ok(())
  }

  /// Terminal: stops the active job and refuses further replacements.
  pub async fn shutdown(&self) {
    let mut inner = self.inner.lock().await;
    inner.stopped = true;
    if let Some(old) = inner.active.take() {
      old.stop().await;
    }
    tracing::info!("scheduler stopped");
  }

  pub async fn state(&self) -> SchedulerState {
    let inner = self.inner.lock().await;
    match (&inner.active, inner.stopped) {
      (_, true) => SchedulerState::Stopped,
      (Some(_), false) => SchedulerState::Scheduled,
      (None, false) => SchedulerState::Idle,
    }
  }

  pub async fn active_schedule(&self) -> Option<Schedule> {
    self.inner.lock().await.active.as_ref().map(|a| a.schedule)
  }
}

struct JobLoop {
  clock: Arc<dyn Clock>,
  job: Arc<dyn Job>,
  schedule: Schedule,
  first: Option<DateTime<Utc>>,
  cancel: CancellationToken,
  in_flight: Arc<AtomicBool>,
  skip_overlapping: bool,
}

async fn job_loop(ctx: JobLoop) {
  let mut next = ctx.first;
  while let Some(deadline) = next {
    tokio::select! {
      biased;
      _ = ctx.cancel.cancelled() => return,
      _ = ctx.clock.sleep_until(deadline) => {}
    }

    fire(&ctx);

    let from = ctx.clock.now().max(deadline);
    next = ctx.schedule.next_after(from);
  }
  tracing::warn!("schedule has no further firing times; recurring job idle");
}

fn fire(ctx: &JobLoop) {
  let guard = if ctx.skip_overlapping {
    if ctx.in_flight.swap(true, Ordering::AcqRel) {
      tracing::warn!("previous dispatch cycle still running; skipping this firing");
      return;
    }
    Some(InFlight(ctx.in_flight.clone()))
  } else {
    None
  };

  let job = ctx.job.clone();
  tokio::spawn(async move {
    let _guard = guard;
    job.fire().await;
  });
}

struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}
