pub mod archive;
mod feed;
pub mod timestamp;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const SENSOR_DATA_URL: &str =
  "https://allertameteo.regione.emilia-romagna.it/o/api/allerta/get-sensor-values-no-time";

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
  #[error("unrecognized sensor type `{0}`")]
  UnknownKind(String),
  #[error("request to sensor feed failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("sensor feed answered with HTTP status {0}")]
  Status(u16),
  #[error("malformed sensor feed payload: {0}")]
  Malformed(String),
}

/// Physical quantity an agent observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
  Rain,
  IdroLevel,
  Temp,
  Wind,
  Humidity,
}

impl SensorKind {
  pub const ALL: [SensorKind; 5] = [
    SensorKind::Rain,
    SensorKind::IdroLevel,
    SensorKind::Temp,
    SensorKind::Wind,
    SensorKind::Humidity,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      SensorKind::Rain => "rain",
      SensorKind::IdroLevel => "idro_level",
      SensorKind::Temp => "temp",
      SensorKind::Wind => "wind",
      SensorKind::Humidity => "humidity",
    }
  }

  /// Variable identifier understood by the upstream feed.
  pub fn variable_id(self) -> &'static str {
    match self {
      SensorKind::Rain => "1,0,3600/1,-,-,-/B13011",
      SensorKind::IdroLevel => "254,0,0/1,-,-,-/B13215",
      SensorKind::Temp => "254,0,0/103,2000,-,-/B12101",
      SensorKind::Wind => "254,0,0/103,10000,-,-/B11002",
      SensorKind::Humidity => "254,0,0/103,2000,-,-/B13003",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      SensorKind::Rain => "rain_sensor",
      SensorKind::IdroLevel => "idro_level_sensor",
      SensorKind::Temp => "temp_sensor",
      SensorKind::Wind => "wind_sensor",
      SensorKind::Humidity => "humidity_sensor",
    }
  }

  pub fn unit(self) -> &'static str {
    match self {
      SensorKind::Rain => "mm",
      SensorKind::IdroLevel => "m",
      SensorKind::Temp => "K",
      SensorKind::Wind => "m/s",
      SensorKind::Humidity => "%",
    }
  }
}

impl fmt::Display for SensorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SensorKind {
  type Err = ScrapeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase();
    SensorKind::ALL
      .into_iter()
      .find(|k| k.as_str() == wanted)
      .ok_or_else(|| ScrapeError::UnknownKind(s.to_string()))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
  pub name: String,
  pub limit: f64,
}

/// One station's value at the snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
  pub station: String,
  pub timestamp: i64,
  pub unit: String,
  pub longitude: Option<f64>,
  pub latitude: Option<f64>,
  pub value: Option<f64>,
  pub thresholds: Vec<Threshold>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
  pub kind: SensorKind,
  pub timestamp: i64,
  pub unit: String,
  pub readings: Vec<Reading>,
}

impl Snapshot {
  pub fn find(&self, station: &str) -> Option<&Reading> {
    let wanted = station_key(station);
    self.readings.iter().find(|r| station_key(&r.station) == wanted)
  }

  pub fn take(mut self, station: &str) -> Option<Reading> {
    let wanted = station_key(station);
    let idx = self
      .readings
      .iter()
      .position(|r| station_key(&r.station) == wanted)?;
    Some(self.readings.swap_remove(idx))
  }
}

/// Agent names drop their spaces, station names keep them; compare on a
/// whitespace-free, lowercase key.
pub fn station_key(name: &str) -> String {
  name
    .chars()
    .filter(|c| !c.is_whitespace())
    .flat_map(char::to_lowercase)
    .collect()
}

pub struct Scraper {
  client: reqwest::Client,
  url: String,
  kind: SensorKind,
}

impl Scraper {
  pub fn new(kind: SensorKind, url: impl Into<String>, timeout: Duration) -> Result<Self, ScrapeError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(format!("sensor-scraper/{}", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      client,
      url: url.into(),
      kind,
    })
  }

  pub fn kind(&self) -> SensorKind {
    self.kind
  }

  pub async fn scrape(&self) -> Result<Snapshot, ScrapeError> {
    self.scrape_at(timestamp::compliant_now()).await
  }

  /// Snapshot for an hour-aligned instant in milliseconds.
  pub async fn scrape_at(&self, at: i64) -> Result<Snapshot, ScrapeError> {
    let response = self
      .client
      .get(&self.url)
      .query(&[
        ("variabile", self.kind.variable_id().to_string()),
        ("time", at.to_string()),
      ])
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(ScrapeError::Status(status.as_u16()));
    }

    let body: serde_json::Value = response
      .json()
      .await
      .map_err(|e| ScrapeError::Malformed(e.to_string()))?;

    let snapshot = feed::parse_snapshot(self.kind, &body)?;
    tracing::info!(
      sensor = self.kind.label(),
      requested_at = at,
      stations = snapshot.readings.len(),
      "retrieved sensor feed snapshot"
    );
    Ok(snapshot)
  }

  pub async fn reading_for(&self, station: &str) -> Result<Option<Reading>, ScrapeError> {
    Ok(self.scrape().await?.take(station))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeMode {
  /// Print the current snapshot, or one station of it, to stdout.
  Print { kind: SensorKind, station: Option<String> },
  /// Write the current snapshot into a directory.
  Dump { kind: SensorKind, dir: PathBuf },
  /// Write the last seven days of every quantity into a directory.
  Week { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
  pub mode: ScrapeMode,
  pub url: String,
}

impl ScrapeRequest {
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    let url = flag_value(args, "--url")?.unwrap_or(SENSOR_DATA_URL).to_string();
    if let Some(dir) = flag_value(args, "--week")? {
      return Ok(Self {
        mode: ScrapeMode::Week { dir: PathBuf::from(dir) },
        url,
      });
    }

    let kind = flag_value(args, "--kind")?
      .ok_or_else(|| anyhow::anyhow!("expected `--kind <rain|idro_level|temp|wind|humidity>` or `--week <dir>`"))?
      .parse::<SensorKind>()?;
    let mode = match flag_value(args, "--dump")? {
      Some(dir) => ScrapeMode::Dump {
        kind,
        dir: PathBuf::from(dir),
      },
      None => ScrapeMode::Print {
        kind,
        station: flag_value(args, "--station")?.map(str::to_string),
      },
    };
    Ok(Self { mode, url })
  }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> anyhow::Result<Option<&'a str>> {
  let Some(i) = args.iter().position(|a| a == flag) else {
    return Ok(None);
  };
  match args.get(i + 1) {
    Some(value) if !value.starts_with("--") => Ok(Some(value.as_str())),
    _ => anyhow::bail!("{flag} needs a value"),
  }
}

pub fn run(request: ScrapeRequest) -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_ansi(false)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()?;

  runtime.block_on(async {
    let timeout = Duration::from_secs(10);
    match request.mode {
      ScrapeMode::Print { kind, station } => {
        let snapshot = Scraper::new(kind, request.url, timeout)?.scrape().await?;
        let out = match station.as_deref() {
          Some(station) => match snapshot.find(station) {
            Some(reading) => serde_json::to_string_pretty(reading)?,
            None => anyhow::bail!("no station named `{station}` in the {kind} feed"),
          },
          None => serde_json::to_string_pretty(&snapshot)?,
        };
        println!("{out}");
      }
      ScrapeMode::Dump { kind, dir } => {
        let snapshot = Scraper::new(kind, request.url, timeout)?.scrape().await?;
        let path = archive::write_snapshot(&dir, &snapshot)?;
        println!("{}", path.display());
      }
      ScrapeMode::Week { dir } => {
        let stamps = timestamp::week_timestamps(chrono::Utc::now());
        let week = archive::scrape_week(&request.url, timeout, &stamps).await?;
        for path in archive::write_week(&dir, &week)? {
          println!("{}", path.display());
        }
      }
    }
    Ok::<(), anyhow::Error>(())
  })
}
