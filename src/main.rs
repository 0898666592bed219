use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use parkwatch::{ParkwatchConfig, ParkwatchError, ParkwatchOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "parkwatch")]
#[command(about = "Parking-lot occupancy estimation with annotated MJPEG streaming")]
#[command(version)]
#[command(long_about = "Samples CCTV footage of a parking lot with a slot detection model, \
publishes occupancy and revenue figures over HTTP and WebSocket, and serves each camera \
feed as an annotated MJPEG stream.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parkwatch.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - load the model and build components but don't start them
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting parkwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ParkwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    // A model that cannot be loaded is fatal
    let mut orchestrator = match ParkwatchOrchestrator::new(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e @ ParkwatchError::Detector(_)) => {
            error!("Failed to load detection model: {}", e);
            eprintln!("✗ Failed to load detection model: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to create orchestrator: {}", e);
            return Err(e.into());
        }
    };

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize parkwatch: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - model loaded and components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start parkwatch: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Parkwatch error during execution: {}", e);
        e
    })?;

    info!("Parkwatch exited with code: {}", exit_code);

    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parkwatch={}", log_level)));

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
            .with_file(false)
            .with_line_number(false)
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
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
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
    println!("# Parkwatch Configuration File");
    println!("# Every option with its default value. Environment variables prefixed");
    println!("# PARKWATCH_ (e.g. PARKWATCH_SERVER__PORT) and MODEL_PATH, VIDEO_PATH_1,");
    println!("# VIDEO_PATH_2, PORT, FRONTEND_URL override these.");
    println!();
    println!("{}", ParkwatchConfig::default().to_toml()?);
    Ok(())
}
