use clap::Parser;
use elemem_config::{load_bipolar_pairs, load_montage, ExperimentConfig};
use elemem_daemon::Handler;
use elemem_types::BipolarPair;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "elemem_daemon", about = "Closed-loop brain-stimulation controller")]
struct Cli {
    /// Path to the experiment config JSON (spec §6).
    #[arg(long)]
    config: String,

    /// Path to the event-log output file.
    #[arg(long, default_value = "events.jsonl")]
    event_log: String,

    #[arg(long, default_value_t = 1000)]
    sampling_rate: u32,

    #[arg(long, default_value_t = 8)]
    channel_count: usize,

    #[arg(long, default_value_t = 10_000)]
    window_capacity: usize,

    /// Overrides the `tracing` filter directive (e.g. `elemem_daemon=debug`).
    #[arg(long)]
    log_filter: Option<String>,
}

const EXIT_SUCCESS: i32 = 0;
const EXIT_FATAL: i32 = -1;
const EXIT_RECOVERABLE: i32 = -2;
const EXIT_UNHANDLED: i32 = -3;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = cli
        .log_filter
        .clone()
        .map(tracing_subscriber::EnvFilter::new)
        .unwrap_or_else(|| {
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "elemem_daemon=info".into())
        });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("unhandled panic: {info}");
        std::process::exit(EXIT_UNHANDLED);
    }));

    match run(cli).await {
        Ok(()) => code(EXIT_SUCCESS),
        Err(e) if e.is_fatal() => {
            tracing::error!("fatal error: {e}");
            code(EXIT_FATAL)
        }
        Err(e) => {
            tracing::error!("recoverable error: {e}");
            code(EXIT_RECOVERABLE)
        }
    }
}

fn code(n: i32) -> std::process::ExitCode {
    std::process::ExitCode::from(n.rem_euclid(256) as u8)
}

async fn run(cli: Cli) -> Result<(), elemem_types::ElememError> {
    tracing::info!("loading experiment config from {}", cli.config);
    let config = ExperimentConfig::load(&cli.config)?;

    let montage = load_montage(&config.electrode_config_file)?;
    tracing::info!("loaded {} montage entries", montage.len());

    let bipolar_pairs: Vec<BipolarPair> = match &config.bipolar_electrode_config_file {
        Some(path) => load_bipolar_pairs(path)?.into_iter().map(|(_, pair)| pair).collect(),
        None => Vec::new(),
    };

    let handler = Handler::from_experiment_config(
        &config,
        &montage,
        bipolar_pairs,
        cli.sampling_rate,
        cli.channel_count,
        cli.window_capacity,
        &cli.event_log,
    )
    .await?;

    handler.start().await?;
    tracing::info!("session running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| elemem_types::ElememError::fatal(format!("failed to listen for ctrl-c: {e}")))?;

    tracing::info!("shutdown signal received, stopping session");
    handler.stop().await?;
    Ok(())
}
