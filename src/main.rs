use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sandwatch::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "sandwatch")]
#[command(about = "Map exposed sand and water change between two Sentinel-2 periods")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "./data/config/sand_exposure.json")]
    config: String,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration {}", args.config))?;
    info!(
        "Comparing {} to {} against {} to {}",
        config.before().start,
        config.before().end,
        config.after().start,
        config.after().end
    );

    let analysis = Pipeline::new(config).run()?;

    println!("Exported: {}", analysis.export);
    for area in &analysis.areas {
        println!("{}", area);
    }
    println!("Change raster statistics:\n{}", analysis.summary);
    for preview in &analysis.previews {
        println!("Preview: {}", preview.display());
    }

    Ok(())
}
