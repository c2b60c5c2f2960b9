use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "SENSOR_AGENT_HOME";

/// `$SENSOR_AGENT_HOME`, or the working directory when unset.
pub fn base_dir() -> anyhow::Result<PathBuf> {
  match std::env::var_os(HOME_ENV) {
    Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
    _ => Ok(std::env::current_dir()?),
  }
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}
