use std::sync::Arc;

use clap::Parser;
use tokio::io::{self, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::config::{FloodgateConfig, LogFormat, LoggingConfig};
use floodgate::console;
use floodgate::floodcontrol::{FloodControl, ShardedLimiter, SlidingWindowLimiter};

/// Answer, for each user id read from stdin, whether the request is admitted.
///
/// WINDOW_SECS and MAX_REQUESTS are required unless --config is given, in
/// which case they override the file's values.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Args {
    /// Length of the sliding window in seconds
    #[arg(
        value_parser = clap::value_parser!(u64).range(1..),
        required_unless_present = "config"
    )]
    window_secs: Option<u64>,

    /// Maximum requests per user within the window
    #[arg(
        value_parser = clap::value_parser!(u32).range(1..),
        required_unless_present = "config"
    )]
    max_requests: Option<u32>,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Use per-key locking instead of a single lock
    #[arg(long)]
    sharded: bool,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

impl Args {
    /// Layer command-line values over the loaded configuration.
    fn resolve(&self) -> anyhow::Result<FloodgateConfig> {
        let mut config = FloodgateConfig::load(self.config.as_deref())?;
        if let Some(window_secs) = self.window_secs {
            config.limiter.window_secs = window_secs;
        }
        if let Some(max_requests) = self.max_requests {
            config.limiter.max_requests = max_requests;
        }
        if self.sharded {
            config.limiter.sharded = true;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let config = Args::parse().resolve()?;
    init_tracing(&config.logging);

    info!("Starting floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(serve(&config));

    // Tokio reads stdin on a blocking thread that cannot be cancelled. Waiting
    // for it here would keep the process alive until the next input line.
    runtime.shutdown_background();

    info!("floodgate stopped");
    result
}

async fn serve(config: &FloodgateConfig) -> anyhow::Result<()> {
    let limiter: Arc<dyn FloodControl> = if config.limiter.sharded {
        Arc::new(ShardedLimiter::new(
            config.limiter.window(),
            config.limiter.max_requests,
        )?)
    } else {
        Arc::new(SlidingWindowLimiter::new(
            config.limiter.window(),
            config.limiter.max_requests,
        )?)
    };
    info!(
        window_secs = config.limiter.window_secs,
        max_requests = config.limiter.max_requests,
        sharded = config.limiter.sharded,
        "Flood control initialized"
    );

    let shutdown = async {
        let received = shutdown_signal().await;
        info!(signal = received, "Shutting down before end of input");
    };

    let stats = console::run_until(
        &*limiter,
        BufReader::new(io::stdin()),
        io::stdout(),
        shutdown,
    )
    .await?;

    info!(
        admitted = stats.admitted,
        rejected = stats.rejected,
        invalid = stats.invalid,
        "Console session finished"
    );
    Ok(())
}

/// Install the global subscriber. Logs go to stderr; stdout carries answers.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolve with the name of the first termination signal received.
///
/// A signal whose handler cannot be installed is never reported, so the
/// session then runs until end of input.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
