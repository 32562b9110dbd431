use anyhow::Result;
use clap::Parser;
use livelabel::{EventFilter, LiveLabelConfig, PipelineEvent, PipelineOrchestrator};
use tracing::{error, info};

/// Log target for published labels, shown unless running quiet
const RESULTS_TARGET: &str = "livelabel::results";

#[derive(Parser, Debug)]
#[command(name = "livelabel")]
#[command(about = "Live camera classification pipeline")]
#[command(version)]
#[command(long_about = "Captures live camera frames and classifies them in real time, \
publishing the best label and its confidence. Runs on a simulated camera and a \
colour-centroid model asset.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "livelabel.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the pipeline")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Set up camera and model but don't start capture
    #[arg(long, help = "Perform dry run - set up camera and classifier but don't start capture")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Enable keyboard commands
    #[arg(short, long, help = "Read keys from the terminal: 's' switches camera, 'q' quits")]
    keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting livelabel v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match LiveLabelConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut orchestrator = PipelineOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create pipeline: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(args.keyboard);

    if args.dry_run {
        let status = orchestrator.prepare().await;
        info!("Dry run mode - pipeline prepared but capture not started");
        println!("✓ Dry run completed with status {:?}", status);
        orchestrator.shutdown().await?;
        return Ok(());
    }

    spawn_result_logger(&orchestrator);

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Pipeline error during execution: {}", e);
        e
    })?;

    info!("livelabel exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

/// Print every published classification
fn spawn_result_logger(orchestrator: &PipelineOrchestrator) {
    let mut results = orchestrator.event_bus().subscribe_filtered(
        EventFilter::EventTypes(vec!["classification_published", "active_camera_changed"]),
        "result-logger",
    );

    tokio::spawn(async move {
        loop {
            match results.recv().await {
                Ok(PipelineEvent::ClassificationPublished {
                    label, confidence, ..
                }) => {
                    info!(target: RESULTS_TARGET, "{} ({:.0}%)", label, confidence * 100.0);
                }
                Ok(PipelineEvent::ActiveCameraChanged { position, .. }) => {
                    info!(target: RESULTS_TARGET, "Active camera: {}", position.as_str());
                }
                Ok(_) => {}
                Err(livelabel::error::EventBusError::Lagged { .. }) => continue,
                Err(_) => break,
            }
        }
    });
}

/// Filter directives used when RUST_LOG is not set
fn default_filter(args: &Args) -> String {
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    if args.quiet || args.debug {
        format!("livelabel={}", log_level)
    } else {
        format!("livelabel={},{}=info", log_level, RESULTS_TARGET)
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(args)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# livelabel configuration file");
    println!("# Every key can be overridden with LIVELABEL_<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", LiveLabelConfig::default().to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_shows_results() {
        let args = Args::parse_from(["livelabel"]);
        assert_eq!(default_filter(&args), "livelabel=warn,livelabel::results=info");

        let args = Args::parse_from(["livelabel", "--quiet"]);
        assert_eq!(default_filter(&args), "livelabel=error");

        let args = Args::parse_from(["livelabel", "--debug"]);
        assert_eq!(default_filter(&args), "livelabel=debug");
    }

    #[test]
    fn test_default_filter_parses() {
        let args = Args::parse_from(["livelabel", "--verbose"]);
        assert!(tracing_subscriber::EnvFilter::try_new(default_filter(&args)).is_ok());
    }
}
