//! Database health check
//!
//! Loads the configuration from the environment, applies `--key=value`
//! overrides and runs `SELECT 1`. Exits 0 when the database answers, 1
//! otherwise.
//!
//! ```text
//! db-healthcheck --url=postgresql://u:p@localhost/app --pool_timeout=5
//! ```

use anyhow::{bail, Context, Result};
use dbmanager::{Config, Database};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn parse_overrides(args: impl IntoIterator<Item = String>) -> Result<Vec<(String, String)>> {
    args.into_iter()
        .map(|arg| {
            let Some(pair) = arg.strip_prefix("--") else {
                bail!("unexpected argument `{arg}`, expected --key=value");
            };
            let Some((key, value)) = pair.split_once('=') else {
                bail!("missing value in `{arg}`, expected --key=value");
            };
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let overrides = parse_overrides(env::args().skip(1))?;
    let config = Config::from_env()?
        .apply_overrides(overrides)
        .context("invalid configuration override")?;
    config.validate()?;

    let dsn = config.resolve_dsn()?;
    println!("Checking {dsn}");

    let db = Database::from_config(config).context("failed to initialize database")?;
    let healthy = db.check_connection().await;
    db.close().await;

    if healthy {
        info!("database is reachable");
        println!("OK");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("database is unreachable");
        println!("FAILED");
        Ok(ExitCode::FAILURE)
    }
}
