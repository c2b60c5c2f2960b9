pub mod agent;
pub mod config;
pub mod console;
pub mod control;
pub mod detection;
pub mod dispatch;
pub mod fleet;
pub mod gateway;
pub mod logging;
pub mod paths;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod source;
pub mod types;

use anyhow::Context;
use console::Command;
use tokio_util::sync::CancellationToken;

pub fn run_console(args: &[String]) -> anyhow::Result<()> {
  let command = console::parse_args(args.get(1..).unwrap_or_default())?;

  let config = match command {
    Command::Help => {
      console::print_help();
      return Ok(());
    }
    Command::Version => {
      println!("{}", env!("CARGO_PKG_VERSION"));
      return Ok(());
    }
    Command::CheckConfig { config } => {
      let path = console::resolve_config_path(config.as_deref())?;
      return console::run_check_config(&path);
    }
    Command::Fleet(opts) => {
      logging::init_stderr_only("info")?;
      return console::run_fleet(&opts);
    }
    Command::Run { config } => config,
  };

  let config_path = console::resolve_config_path(config.as_deref())?;
  let cfg = config::load(&config_path)?;

  let log_dir = match &cfg.logging.dir {
    Some(dir) => dir.clone(),
    None => paths::logs_dir(&paths::base_dir()?),
  };
  logging::init_file_and_stderr(&log_dir, &cfg.logging.level, cfg.logging.retention_days)?;
  tracing::info!(config = %config_path.display(), "starting sensor agent (console mode)");

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("build tokio runtime")?;

  let stop = CancellationToken::new();
  let ctrlc_stop = stop.clone();
  ctrlc::set_handler(move || {
    ctrlc_stop.cancel();
  })?;

  runtime.block_on(async move {
    let agent = agent::Agent::new(&cfg)?;
    agent.run(stop).await
  })?;
  tracing::info!("sensor agent exited");
  Ok(())
}
