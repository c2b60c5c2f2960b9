use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();
  sensor_agent::run_console(&args).context("sensor agent")
}
