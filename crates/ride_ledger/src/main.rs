use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ride_ledger::input::load_payloads;
use ride_ledger::{MemoryStore, Pipeline, PipelineConfig, WorkoutStore, sync_new_workouts};
use ride_ledger_client::config::Config as ProviderConfig;
use ride_ledger_client::http_client::ReqwestWorkoutProvider;

#[derive(Parser, Debug)]
#[command(name = "ride-ledger")]
#[command(about = "Build monthly and yearly ride reports from workout payloads")]
struct Args {
    /// List month and year tables newest period first
    #[arg(long)]
    latest_first: bool,

    /// Skip fetching new workouts from the provider
    #[arg(long)]
    no_sync: bool,

    /// JSON file with workout payloads (array, `{"data": [...]}` or one object)
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configure logging from env var `RIDE_LEDGER_LOG_LEVEL` (or fallback to `RUST_LOG`, default `info`).
    let log_env = std::env::var("RIDE_LEDGER_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    // reqwest/hyper are noisy at debug
    let combined_filter = format!("{log_env},hyper=warn,reqwest=warn");
    let env_filter = tracing_subscriber::EnvFilter::try_new(combined_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::info!("ride-ledger: log filter: {}", log_env);

    let config = PipelineConfig::from_env()?;
    tracing::info!(timezone = %config.timezone, "ride-ledger: bucketing in local timezone");
    let pipeline = Pipeline::new(&config).with_ascending(!args.latest_first);

    let store = MemoryStore::new();
    if let Some(path) = &args.input {
        let raws = load_payloads(path)
            .with_context(|| format!("reading payloads from {}", path.display()))?;
        let outcome = pipeline.validator().validate_batch(&raws);
        let added = store.append(outcome.accepted).await?;
        tracing::info!(
            added,
            rejected = outcome.rejected.len(),
            "ride-ledger: loaded local workouts"
        );
    }

    if !args.no_sync {
        match ProviderConfig::from_env() {
            Ok(provider_config) => {
                let provider = ReqwestWorkoutProvider::from_config(&provider_config)?;
                let report = sync_new_workouts(&provider, &store, pipeline.validator())
                    .await
                    .context("syncing workouts from provider")?;
                tracing::info!(
                    inserted = report.inserted,
                    rejected = report.rejected.len(),
                    "ride-ledger: sync complete"
                );
            }
            Err(e) => tracing::info!("ride-ledger: provider not configured, skipping sync: {e}"),
        }
    }

    let workouts = store.all().await?;
    let reports = pipeline.build(&workouts)?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_to_oldest_first_with_sync() {
        let args = Args::try_parse_from(["ride-ledger"]).unwrap();
        assert!(!args.latest_first);
        assert!(!args.no_sync);
        assert!(args.input.is_none());
    }

    #[test]
    fn parses_flags_and_input() {
        let args =
            Args::try_parse_from(["ride-ledger", "--latest-first", "--no-sync", "rides.json"])
                .unwrap();
        assert!(args.latest_first);
        assert!(args.no_sync);
        assert_eq!(args.input, Some(PathBuf::from("rides.json")));
        assert!(Args::try_parse_from(["ride-ledger", "--ascending"]).is_err());
    }
}
