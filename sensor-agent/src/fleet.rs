use crate::config::{
  self, Config, CronjobConfig, DispatchConfig, EthernetConfig, GatewayConfig, LoggingConfig, RegistrationConfig,
  RegistryConfig, ScraperConfig, SensorConfig,
};
use crate::types::{SensorName, MAX_PORT};
use anyhow::Context;
use scraper::SensorKind;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_PORT: i64 = 12_000;
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:3000/v0/api/sensor";
pub const DEFAULT_GATEWAY_HOST: &str = "localhost";
pub const DEFAULT_GATEWAY_PORT: i64 = 3000;

const THRESHOLD_QUERIES: [&str; 3] = ["soglia1", "soglia2", "soglia3"];

pub const CATALOGUE: &[(SensorKind, &[&str])] = &[
  (
    SensorKind::IdroLevel,
    &[
      "Diga di Ridracoli",
      "Castelbolognese",
      "Ponte degli Alpini",
      "S. Carlo",
      "Ponte Nibbiano Tidoncello",
    ],
  ),
  (
    SensorKind::Temp,
    &[
      "Sestola",
      "Cesenatico porto",
      "Piacenza urbana",
      "Cesena urbana",
      "S. Marino",
      "Bologna San Luca",
      "Lavezzola",
    ],
  ),
  (
    SensorKind::Humidity,
    &[
      "Carpineta",
      "Cesena urbana",
      "Reggio nell'Emilia urbana",
      "Novafeltria",
      "Mirabello",
      "Rimini urbana",
      "Piacenza urbana",
    ],
  ),
  (
    SensorKind::Wind,
    &[
      "Bologna urbana",
      "Reggio nell'Emilia urbana",
      "GIRALDA",
      "S. Pietro Capofiume",
      "Martorano",
      "Madonna dei Fornelli",
      "Modena urbana",
      "Bologna Torre Asinelli",
    ],
  ),
  (
    SensorKind::Rain,
    &[
      "S. Felice sul Panaro",
      "Madonna dei Fornelli",
      "Bologna San Luca",
      "Paderno",
      "Secondo Salto",
      "Castel San Pietro Arpa",
      "S. Cassiano sul Lamone",
      "Premilcuore",
      "Castrocaro",
      "S. Maria Nova",
    ],
  ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetOptions {
  pub dir: PathBuf,
  pub base_port: i64,
  pub registry_url: String,
  pub gateway_host: String,
  pub gateway_port: i64,
}

impl FleetOptions {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self {
      dir: dir.into(),
      base_port: DEFAULT_BASE_PORT,
      registry_url: DEFAULT_REGISTRY_URL.to_string(),
      gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
      gateway_port: DEFAULT_GATEWAY_PORT,
    }
  }

  /// `fleet <dir> [--base-port N] [--registry URL] [--gateway HOST:PORT]`
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    let mut dir = None;
    let mut opts = FleetOptions::new(PathBuf::new());
    let mut it = args.iter();
    while let Some(arg) = it.next() {
      match arg.as_str() {
        "--base-port" => {
          let raw = it.next().context("--base-port needs a value")?;
          opts.base_port = raw
            .parse()
            .with_context(|| format!("--base-port `{raw}` is not an integer"))?;
        }
        "--registry" => {
          opts.registry_url = it.next().context("--registry needs a value")?.clone();
        }
        "--gateway" => {
          let raw = it.next().context("--gateway needs HOST:PORT")?;
          let (host, port) = raw
            .rsplit_once(':')
            .with_context(|| format!("--gateway `{raw}` must be HOST:PORT"))?;
          opts.gateway_host = host.to_string();
          opts.gateway_port = port
            .parse()
            .with_context(|| format!("--gateway port `{port}` is not an integer"))?;
        }
        flag if flag.starts_with("--") => anyhow::bail!("unknown fleet option `{flag}`"),
        path if dir.is_none() => dir = Some(PathBuf::from(path)),
        extra => anyhow::bail!("unexpected argument `{extra}`"),
      }
    }
    opts.dir = dir.context("fleet needs an output directory")?;
    Ok(opts)
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FleetOutcome {
  AlreadyPopulated,
  Written(Vec<PathBuf>),
}

pub fn sensor_config(name: &SensorName, kind: SensorKind, port: i64, opts: &FleetOptions) -> Config {
  let queries = match kind {
    SensorKind::Rain => Vec::new(),
    _ => THRESHOLD_QUERIES.iter().map(|q| q.to_string()).collect(),
  };
  Config {
    sensor: SensorConfig {
      name: name.to_string(),
      kind: kind.as_str().to_string(),
      description: "General Sensor Description".to_string(),
      queries,
    },
    ethernet: EthernetConfig {
      ip: "0.0.0.0".to_string(),
      port,
    },
    registry: RegistryConfig {
      url: opts.registry_url.clone(),
      register_path: "/register".to_string(),
      shutdown_path: "/shutdown".to_string(),
      key: "secretKey".to_string(),
    },
    gateway: GatewayConfig {
      url: opts.gateway_host.clone(),
      port: opts.gateway_port,
      scheme: "http".to_string(),
    },
    cronjob: CronjobConfig {
      day_of_week: "0-6".to_string(),
      hour: "*".to_string(),
      minute: "*".to_string(),
    },
    scraper: ScraperConfig::default(),
    registration: RegistrationConfig::default(),
    dispatch: DispatchConfig::default(),
    logging: LoggingConfig::default(),
  }
}

pub fn render_config(cfg: &Config) -> anyhow::Result<String> {
  toml::to_string_pretty(cfg).context("render agent config")
}

pub fn file_name(kind: SensorKind, name: &SensorName) -> String {
  format!("sensor_{}_{}.toml", kind.as_str(), name)
}

/// Writes the whole catalogue into `opts.dir`; a directory that already has
/// files is left untouched.
pub fn generate(opts: &FleetOptions) -> anyhow::Result<FleetOutcome> {
  if is_populated(&opts.dir)? {
    tracing::info!(dir = %opts.dir.display(), "fleet directory already populated; nothing to do");
    return Ok(FleetOutcome::AlreadyPopulated);
  }
  fs::create_dir_all(&opts.dir).with_context(|| format!("create {}", opts.dir.display()))?;

  let mut written = Vec::new();
  let mut port = opts.base_port;
  for (kind, stations) in CATALOGUE {
    for station in stations.iter() {
      if !(0..=MAX_PORT).contains(&port) {
        anyhow::bail!("port {port} for `{station}` is outside [0, {MAX_PORT}]");
      }
      let name = SensorName::parse(station)?;
      let cfg = sensor_config(&name, *kind, port, opts);
      cfg
        .validate()
        .with_context(|| format!("generated config for `{station}`"))?;

      let path = opts.dir.join(file_name(*kind, &name));
      config::write_atomic(&path, &render_config(&cfg)?)?;
      tracing::info!(sensor = %name, kind = %kind, port, path = %path.display(), "sensor config written");
      written.push(path);
      port += 1;
    }
  }
  Ok(FleetOutcome::Written(written))
}

fn is_populated(dir: &Path) -> anyhow::Result<bool> {
  if !dir.exists() {
    return Ok(false);
  }
  let mut entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
  Ok(entries.next().is_some())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn station_count() -> usize {
    CATALOGUE.iter().map(|(_, s)| s.len()).sum()
  }

  #[test]
  fn writes_one_loadable_config_per_station() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = FleetOptions::new(tmp.path().join("sensors_config"));
    let FleetOutcome::Written(paths) = generate(&opts).unwrap() else {
      panic!("expected configs to be written");
    };
    assert_eq!(paths.len(), station_count());

    let sample = opts.dir.join("sensor_idro_level_S.Carlo.toml");
    let cfg = config::load(&sample).unwrap();
    assert_eq!(cfg.sensor.name, "S.Carlo");
    assert_eq!(cfg.sensor.queries, vec!["soglia1", "soglia2", "soglia3"]);
    assert_eq!(cfg.ethernet.port, 12_003);
    assert_eq!(cfg.schedule().unwrap().cron_expression(), "0 * * * * Mon,Tue,Wed,Thu,Fri,Sat,Sun");

    let rain = config::load(&opts.dir.join("sensor_rain_Premilcuore.toml")).unwrap();
    assert!(rain.sensor.queries.is_empty());
  }

  #[test]
  fn ports_are_unique_and_sequential() {
    let tmp = tempfile::tempdir().unwrap();
    let mut opts = FleetOptions::new(tmp.path());
    opts.base_port = 15_000;
    let FleetOutcome::Written(paths) = generate(&opts).unwrap() else {
      panic!("expected configs to be written");
    };
    let mut ports: Vec<i64> = paths
      .iter()
      .map(|p| config::load(p).unwrap().ethernet.port)
      .collect();
    ports.sort_unstable();
    let expected: Vec<i64> = (15_000..15_000 + station_count() as i64).collect();
    assert_eq!(ports, expected);
  }

  #[test]
  fn populated_directory_is_left_alone() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("keep.toml"), "x").unwrap();
    assert_eq!(generate(&FleetOptions::new(tmp.path())).unwrap(), FleetOutcome::AlreadyPopulated);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
  }

  #[test]
  fn port_overflow_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut opts = FleetOptions::new(tmp.path().join("out"));
    opts.base_port = 65_530;
    assert!(generate(&opts).is_err());
  }

  #[test]
  fn parses_options() {
    let args: Vec<String> = ["out", "--base-port", "13000", "--gateway", "gw.local:8080"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    let opts = FleetOptions::from_args(&args).unwrap();
    assert_eq!(opts.dir, PathBuf::from("out"));
    assert_eq!(opts.base_port, 13_000);
    assert_eq!((opts.gateway_host.as_str(), opts.gateway_port), ("gw.local", 8080));
    assert_eq!(opts.registry_url, DEFAULT_REGISTRY_URL);

    assert!(FleetOptions::from_args(&[]).is_err());
    assert!(FleetOptions::from_args(&["out".into(), "--gateway".into(), "nohost".into()]).is_err());
  }
}
