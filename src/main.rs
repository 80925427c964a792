use anyhow::Context;
use clap::{Parser, Subcommand};
use palette_vision::config::PipelineConfig;
use palette_vision::parallel_pipeline::ParallelPipeline;
use palette_vision::pipeline::{ClassificationReport, Direction, FrameSetReport, PalettePipeline};
use std::path::PathBuf;
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(name = "palette_vision")]
#[command(version, about = "Per-second frame palettes, light maps and light-direction buckets", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Number of parallel workers
    #[arg(short = 'j', long, value_name = "N", global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write dominant, average, palette and light map artifacts for one frame set
    Summarize {
        /// Directory holding the frames of one set
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Route existing palettes into light-direction buckets
    Classify {
        /// Directory whose subdirectories are frame sets
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Bucket directory (defaults to <ROOT>/<buckets_dir>)
        #[arg(short, long, value_name = "DIR")]
        buckets: Option<PathBuf>,
    },

    /// Summarize and classify every frame set under a root directory
    Batch {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn print_set(report: &FrameSetReport) {
    let crop = report
        .crop
        .map(|crop| crop.to_string())
        .unwrap_or_else(|| "per-frame".to_string());
    println!(
        "{}: {} summarized, {} already present, {} failed (crop {})",
        report.set_id,
        report.summarized.len(),
        report.skipped_existing.len(),
        report.failed.len(),
        crop
    );
}

fn print_classification(report: &ClassificationReport) {
    let counts: Vec<String> = Direction::ALL
        .iter()
        .map(|direction| format!("{}={}", direction, report.count(*direction)))
        .collect();
    println!(
        "{}: {} (failed {})",
        report.set_id,
        counts.join(" "),
        report.failed.len()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.threads.is_some() {
        config.workers = cli.threads;
        config.validate()?;
    }
    let parallel = ParallelPipeline::new(PalettePipeline::new(config));

    match cli.command {
        Commands::Summarize { dir } => {
            let report = parallel
                .process_frame_set(&dir)
                .await
                .with_context(|| format!("summarizing {}", dir.display()))?;
            print_set(&report);
        }
        Commands::Classify { root, buckets } => {
            let buckets = buckets.unwrap_or_else(|| parallel.pipeline().buckets_root(&root));
            info!(root = %root.display(), buckets = %buckets.display(), "classifying");
            let reports = parallel
                .classify_root(&root, &buckets)
                .await
                .with_context(|| format!("classifying {}", root.display()))?;
            for report in &reports {
                print_classification(report);
            }
        }
        Commands::Batch { root } => {
            let batch = parallel
                .process_batch(&root)
                .await
                .with_context(|| format!("processing batch {}", root.display()))?;
            for report in &batch.sets {
                print_set(report);
            }
            for (set_id, reason) in &batch.failed_sets {
                warn!(set = %set_id, %reason, "set abandoned");
            }
            for report in &batch.classification {
                print_classification(report);
            }
        }
    }

    Ok(())
}
