//! Compare vision models on one captured frame

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use screenwatch::analysis::{Analyzer, OpenRouterAnalyzer};
use screenwatch::capture::FrameSource;
use screenwatch::storage::{FrameStore, PngStore};
use screenwatch::{benchmark, capture, imaging, Config};

#[derive(Debug, Parser)]
#[command(name = "benchmark", version, about = "Rank vision models on the same screenshot")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SCREENWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Analyze a still image instead of grabbing the screen
    #[arg(long)]
    image: Option<PathBuf>,

    /// Model ids to compare, replaces the configured list
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,

    /// Where to write the markdown results
    #[arg(short, long)]
    output: Option<PathBuf>,
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
    if let Some(image) = args.image {
        config.capture.image_path = Some(image);
    }
    if !args.models.is_empty() {
        config.benchmark.models = args.models;
    }
    config.analysis.api_key()?;

    println!("Vision Model Benchmarking");
    println!("{}", "=".repeat(50));

    let source = capture::source_for(&config.capture)?;
    let raw = source.capture().await?;
    println!("Original frame size: {}x{}", raw.width(), raw.height());

    let (max_w, max_h) = (config.capture.target_width, config.capture.target_height);
    let frame = tokio::task::spawn_blocking(move || imaging::fit_within(&raw, max_w, max_h)).await?;
    println!("Resized to {}x{}", frame.width(), frame.height());

    let ts = Local::now().timestamp();
    let saved = config
        .storage
        .output_dir
        .join(format!("benchmark_test_{ts}.png"));
    let size = PngStore::new().persist(&frame, &saved).await?;
    println!(
        "Test frame saved: {} ({:.1}KB)",
        saved.display(),
        size as f64 / 1024.0
    );

    let analyzers = config
        .benchmark
        .models
        .iter()
        .map(|model| {
            let mut analysis = config.analysis.clone();
            analysis.model = model.clone();
            OpenRouterAnalyzer::new(analysis).map(|a| Arc::new(a) as Arc<dyn Analyzer>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Comparing {} models", analyzers.len());
    let report = benchmark::run(
        &frame,
        &analyzers,
        config.analysis.timeout(),
        config.benchmark.pause(),
    )
    .await;

    let markdown = report.to_markdown();
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("benchmark_results_{ts}.md")));
    std::fs::write(&output, &markdown)?;

    println!("\n\nResults saved to: {}", output.display());
    println!("\n{markdown}");
    Ok(())
}
