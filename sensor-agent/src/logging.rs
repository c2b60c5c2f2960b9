use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE: &str = "sensor-agent.log";

/// Daily rolling file under `log_dir` plus stderr, used by `run`.
pub fn init_file_and_stderr(
  log_dir: &Path,
  level: &str,
  retention_days: u64,
) -> anyhow::Result<()> {
  fs::create_dir_all(log_dir)?;
  cleanup_old_logs(log_dir, retention_days)?;

  let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let _ = FILE_GUARD.set(guard);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(file_writer)
    .with_target(true);

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(true);

  tracing_subscriber::registry()
    .with(filter(level))
    .with(file_layer)
    .with(stderr_layer)
    .try_init()?;

  Ok(())
}

/// Stderr only; for one-shot console commands that should not touch disk.
pub fn init_stderr_only(level: &str) -> anyhow::Result<()> {
  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(false);

  tracing_subscriber::registry()
    .with(filter(level))
    .with(stderr_layer)
    .try_init()?;
  Ok(())
}

fn filter(level: &str) -> tracing_subscriber::EnvFilter {
  tracing_subscriber::EnvFilter::try_new(level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> anyhow::Result<()> {
  if retention_days == 0 {
    return Ok(());
  }

  let cutoff = SystemTime::now()
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let entries = match fs::read_dir(log_dir) {
    Ok(e) => e,
    Err(_) => return Ok(()),
  };

  for entry in entries.flatten() {
    let path: PathBuf = entry.path();
    if !is_agent_log_file(&path) {
      continue;
    }

    let md = match entry.metadata() {
      Ok(m) => m,
      Err(_) => continue,
    };

    let modified = match md.modified() {
      Ok(t) => t,
      Err(_) => continue,
    };

    if modified < cutoff {
      let _ = fs::remove_file(&path);
    }
  }

  Ok(())
}

fn is_agent_log_file(path: &Path) -> bool {
  let name = match path.file_name().and_then(|n| n.to_str()) {
    Some(n) => n,
    None => return false,
  };

  name == LOG_FILE || name.strip_prefix(LOG_FILE).is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizes_rolled_files_only() {
    assert!(is_agent_log_file(Path::new("logs/sensor-agent.log")));
    assert!(is_agent_log_file(Path::new("logs/sensor-agent.log.2024-03-05")));
    assert!(!is_agent_log_file(Path::new("logs/sensor-agent.logx")));
    assert!(!is_agent_log_file(Path::new("logs/config.toml")));
  }

  #[test]
  fn cleanup_keeps_fresh_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let fresh = dir.path().join("sensor-agent.log.2099-01-01");
    let foreign = dir.path().join("notes.txt");
    fs::write(&fresh, "x").unwrap();
    fs::write(&foreign, "x").unwrap();

    cleanup_old_logs(dir.path(), 14).unwrap();
    assert!(fresh.exists());
    assert!(foreign.exists());
  }
}

