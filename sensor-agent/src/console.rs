use crate::config::{self, Config};
use crate::fleet::{self, FleetOptions, FleetOutcome};
use crate::paths;
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
  Run { config: Option<PathBuf> },
  CheckConfig { config: Option<PathBuf> },
  Fleet(FleetOptions),
  Help,
  Version,
}

/// Parses everything after the program name. No arguments means `run`.
pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
  if args.iter().any(|a| a == "--help" || a == "-h") {
    return Ok(Command::Help);
  }
  if args.iter().any(|a| a == "--version") {
    return Ok(Command::Version);
  }

  let (sub, tail) = match args.split_first() {
    Some((first, tail)) if !first.starts_with("--") => (first.as_str(), tail),
    _ => ("run", args),
  };

  match sub {
    "run" => Ok(Command::Run {
      config: config_flag(tail)?,
    }),
    "check-config" => Ok(Command::CheckConfig {
      config: config_flag(tail)?,
    }),
    "fleet" => Ok(Command::Fleet(FleetOptions::from_args(tail)?)),
    other => anyhow::bail!("unknown command `{other}` (try --help)"),
  }
}

fn config_flag(tail: &[String]) -> anyhow::Result<Option<PathBuf>> {
  match tail {
    [] => Ok(None),
    [flag, path] if flag == "--config" => Ok(Some(PathBuf::from(path))),
    [flag] if flag == "--config" => anyhow::bail!("--config needs a path"),
    [other, ..] => anyhow::bail!("unexpected argument `{other}`"),
  }
}

pub fn resolve_config_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
  match explicit {
    Some(p) => Ok(p.to_path_buf()),
    None => Ok(paths::config_path(&paths::base_dir()?)),
  }
}

pub fn run_check_config(path: &Path) -> anyhow::Result<()> {
  let cfg = config::load(path)?;
  print_summary(path, &cfg)?;
  Ok(())
}

pub fn run_fleet(opts: &FleetOptions) -> anyhow::Result<()> {
  match fleet::generate(opts)? {
    FleetOutcome::AlreadyPopulated => {
      println!(
        "{} already contains files; nothing generated.",
        opts.dir.display()
      );
    }
    FleetOutcome::Written(files) => {
      println!("Wrote {} sensor configs to {}", files.len(), opts.dir.display());
      for f in files {
        println!("  {}", f.display());
      }
    }
  }
  Ok(())
}

fn print_summary(path: &Path, cfg: &Config) -> anyhow::Result<()> {
  let settings = cfg.settings()?;
  let endpoint = cfg.endpoint()?;
  println!("Config OK: {}", path.display());
  println!("Sensor: {} ({})", settings.name, cfg.sensor_kind()?);
  println!("Queries: {}", cfg.sensor.queries.join(", "));
  println!("Listen: {}:{}", endpoint.ip, endpoint.port);
  println!(
    "Registry: {}{} (attempts {}, delay {}s)",
    cfg.registry.url,
    cfg.registry.register_path,
    cfg.registration.attempts,
    cfg.registration.delay_seconds
  );
  println!("Gateway: {}", settings.gateway.detection_base());
  println!("Schedule: {} (cron `{}`)", settings.schedule, settings.schedule.cron_expression());
  Ok(())
}

pub fn print_help() {
  println!("sensor-agent v{}", env!("CARGO_PKG_VERSION"));
  println!("Commands:");
  println!("  run [--config PATH]            (default)");
  println!("  check-config [--config PATH]");
  println!("  fleet <dir> [--base-port N] [--registry URL] [--gateway HOST:PORT]");
  println!("  --version");
  println!("  --help");
  println!("Without --config the agent reads config.toml from ${} or the working directory.", paths::HOME_ENV);
}
