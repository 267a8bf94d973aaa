//! Screenwatch: periodic screen capture with remote vision analysis

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use screenwatch::analysis::OpenRouterAnalyzer;
use screenwatch::capture;
use screenwatch::display::{ConsoleSink, DashboardChannel, Subscription};
use screenwatch::pipeline::Collaborators;
use screenwatch::storage::PngStore;
use screenwatch::{Config, Pipeline};

#[derive(Debug, Parser)]
#[command(name = "screenwatch", version, about = "Live screen analysis feed")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SCREENWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to run, 0 runs until Ctrl-C
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// Override the capture cadence
    #[arg(long)]
    cadence_ms: Option<u64>,

    /// Replay a still image instead of grabbing the screen
    #[arg(long)]
    image: Option<PathBuf>,

    /// Print dashboard JSON messages instead of the console feed
    #[arg(long)]
    dashboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("screenwatch=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(cadence_ms) = args.cadence_ms {
        config.capture.cadence_ms = cadence_ms;
    }
    if let Some(image) = args.image {
        config.capture.image_path = Some(image);
    }
    config.validate()?;

    info!("Screenwatch launching...");

    let collaborators = Collaborators {
        source: capture::source_for(&config.capture)?,
        analyzer: Arc::new(OpenRouterAnalyzer::new(config.analysis.clone())?),
        store: Arc::new(PngStore::new()),
    };
    let cadence = config.capture.cadence();
    let mut pipeline = Pipeline::new(config, collaborators);

    let printer = if args.dashboard {
        let channel = DashboardChannel::new(256, pipeline.stats_reader());
        let subscription = channel.subscribe();
        pipeline.attach_sink(channel);
        Some(tokio::spawn(print_dashboard(subscription)))
    } else {
        pipeline.attach_sink(ConsoleSink::stdout());
        None
    };

    println!("LIVE SCREEN ANALYSIS FEED");
    println!("{}", "=".repeat(60));
    if args.duration > 0 {
        println!(
            "Running for {} seconds with {:.1}-second intervals...",
            args.duration,
            cadence.as_secs_f64()
        );
    } else {
        println!("Running until Ctrl-C with {:.1}-second intervals...", cadence.as_secs_f64());
    }
    println!("{}", "=".repeat(60));

    pipeline.start()?;

    let interrupted = if args.duration > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.duration)) => false,
            res = tokio::signal::ctrl_c() => { res?; true }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        true
    };
    if interrupted {
        println!("\nStopping live feed...");
    }

    let report = pipeline.stop().await?;
    if !report.is_clean() {
        warn!("Force-terminated workers: {:?}", report.forced);
    }

    // Releasing the sink closes the channel and ends the printer
    let stats = pipeline.stats();
    pipeline.detach_sink();
    drop(pipeline);
    if let Some(printer) = printer {
        printer.await?;
    }

    println!("\nLive feed completed in {:.1}s", stats.runtime.as_secs_f64());
    println!("{stats}");

    info!("Screenwatch shutting down");
    Ok(())
}

async fn print_dashboard(subscription: Subscription) {
    let Subscription {
        greeting,
        mut receiver,
    } = subscription;

    for message in greeting {
        print_json(&message);
    }

    loop {
        match receiver.recv().await {
            Ok(message) => print_json(&message),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Dashboard printer lagged, {} messages dropped", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_json(message: &screenwatch::display::DashboardMessage) {
    match message.to_json() {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Failed to serialize {} message: {}", message.name(), e),
    }
}
