//! flowsense operator CLI
//!
//! ```bash
//! flowsense collect --data-dir data/ --out metadata.fsm
//! flowsense train --data-dir data/ --metadata metadata.fsm --out model.fsb
//! flowsense train --data-dir new-days/ --metadata metadata.fsm --out model-2.fsb --resume model.fsb
//! flowsense predict --bundle model.fsb --input unlabeled.csv --output predicted.csv
//! flowsense status --bundle model.fsb
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use flowsense_cli::AppConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "flowsense")]
#[command(version)]
#[command(about = "Streaming network-flow classification pipeline", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit scaling statistics, vocabularies and labels over a shard directory
    Collect(CollectArgs),
    /// Train a model bundle, or continue training one
    Train(TrainArgs),
    /// Predict labels for an unlabeled CSV
    Predict(PredictArgs),
    /// Describe a saved bundle
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct CollectArgs {
    /// Directory of CSV shards
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,

    /// Output metadata file
    #[arg(long, value_name = "PATH", default_value = "metadata.fsm")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Directory of CSV shards
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,

    /// Metadata produced by `collect`
    #[arg(long, value_name = "PATH")]
    metadata: PathBuf,

    /// Output bundle file
    #[arg(long, value_name = "PATH", default_value = "model.fsb")]
    out: PathBuf,

    /// Continue training from this bundle
    #[arg(long, value_name = "PATH")]
    resume: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Bundle to predict with
    #[arg(long, value_name = "PATH")]
    bundle: PathBuf,

    /// Unlabeled CSV input
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// CSV output with a Predicted_Label column
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Bundle to describe
    #[arg(long, value_name = "PATH")]
    bundle: PathBuf,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Collect(args) => {
            let summary = flowsense_cli::collect(&config, &args.data_dir, &args.out)?;
            info!(
                shards = summary.shards_read,
                failed = summary.shards_failed,
                rows = summary.rows_accumulated,
                "Wrote {}",
                args.out.display()
            );
        }
        Commands::Train(args) => {
            let stats = flowsense_cli::train(
                &config,
                &args.data_dir,
                &args.metadata,
                &args.out,
                args.resume.as_deref(),
            )?;
            info!(
                rows = stats.rows_trained,
                chunks = stats.chunks_trained,
                secs = stats.training_time_secs,
                "Wrote {}",
                args.out.display()
            );
        }
        Commands::Predict(args) => {
            let summary = flowsense_cli::predict(&config, &args.bundle, &args.input, &args.output)?;
            info!(
                rows = summary.rows,
                failed = summary.failed,
                "Wrote {}",
                args.output.display()
            );
        }
        Commands::Status(args) => {
            let status = flowsense_cli::status(&args.bundle)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{status}");
            }
        }
    }

    Ok(())
}
