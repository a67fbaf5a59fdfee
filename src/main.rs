use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livetext::{Analyzer, DetectorKind, LivetextConfig, Origin, ViewSize};

#[derive(Parser)]
#[command(name = "livetext")]
#[command(about = "Find text and barcodes in an image and extract links, phone numbers, dates and more")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Run the text detector
    #[arg(long)]
    text: bool,

    /// Run the barcode detector
    #[arg(long)]
    barcode: bool,

    /// Run every detector
    #[arg(long, conflicts_with_all = ["text", "barcode"])]
    all: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the OCR models
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Region used to interpret dates, phone numbers and currencies
    #[arg(long, value_name = "CODE")]
    region: Option<String>,
}

impl Cli {
    /// Detectors named on the command line, if any
    fn detectors(&self) -> Option<DetectorKind> {
        if self.all {
            return Some(DetectorKind::ALL);
        }
        let mut kinds = DetectorKind::NONE;
        if self.text {
            kinds |= DetectorKind::TEXT;
        }
        if self.barcode {
            kinds |= DetectorKind::BARCODE;
        }
        (!kinds.is_empty()).then_some(kinds)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    dotenvy::dotenv().ok();

    let default_filter = if args.verbose { "livetext=debug" } else { "livetext=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = LivetextConfig::from_env();
    if let Some(kinds) = args.detectors() {
        config.detectors = kinds;
    }
    if let Some(model_dir) = &args.model_dir {
        config.ocr.model_dir = model_dir.clone();
    }
    if let Some(region) = &args.region {
        config.extractor.region = region.clone();
    }

    let bytes = std::fs::read(&args.image_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.image_path.display(), e))?;
    let dimensions = image::ImageReader::new(std::io::Cursor::new(&bytes))
        .with_guessed_format()?
        .into_dimensions()
        .ok();

    let analyzer = Analyzer::from_config(&config);
    let snapshot = analyzer.analyze(bytes).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.results)?);
        return Ok(());
    }

    println!("=== Analysis Results ({}) ===", snapshot.detectors);
    println!("Total regions: {}", snapshot.results.len());

    for (i, result) in snapshot.results.iter().enumerate() {
        println!("\n[{}] {:?}", i + 1, result.text);
        match dimensions {
            Some(size) => {
                let corners = result.quad.to_pixels(ViewSize::from_dimensions(size), Origin::UpperLeft);
                let corners: Vec<String> = corners.iter().map(|p| format!("({:.0}, {:.0})", p.x, p.y)).collect();
                println!("    at {}", corners.join(" "));
            }
            None => {
                let bounds = result.quad.bounds();
                println!(
                    "    at ({:.3}, {:.3})-({:.3}, {:.3})",
                    bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
                );
            }
        }
        for entity in &result.entities {
            println!("    - {}", serde_json::to_string(entity)?);
        }
    }

    Ok(())
}
