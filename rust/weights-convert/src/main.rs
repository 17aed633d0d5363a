//! GPT-2 Weight Converter
//!
//! Converts a GPT-2 checkpoint into a directory of `.bin` weight files.
//!
//! # Usage
//!
//! ```bash
//! # Convert a checkpoint
//! weights-convert convert model.safetensors ./gpt2_weights
//!
//! # Convert with a configuration file, tolerating name collisions
//! weights-convert convert model.safetensors ./gpt2_weights --config convert.toml --on-collision warn
//!
//! # Check an output directory
//! weights-convert verify ./gpt2_weights
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weights_core::{CollisionPolicy, Converter, ConverterConfig, TensorStore};

/// GPT-2 checkpoint to binary weight converter
#[derive(Parser, Debug)]
#[command(name = "weights-convert")]
#[command(about = "Convert GPT-2 checkpoints into flat binary weight files")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a safetensors checkpoint into .bin files
    Convert {
        /// Source checkpoint
        checkpoint: PathBuf,

        /// Output directory (created if missing)
        output_dir: PathBuf,

        /// What to do when two tensors resolve to the same name (error, warn)
        #[arg(long)]
        on_collision: Option<CollisionPolicy>,

        /// Read the checkpoint into memory instead of memory-mapping it
        #[arg(long)]
        no_mmap: bool,

        /// Skip the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Check that every .bin file's header matches its length
    Verify {
        /// Directory of .bin files
        output_dir: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ConverterConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Convert {
            checkpoint,
            output_dir,
            on_collision,
            no_mmap,
            quiet,
        } => {
            let mut config = config;
            config.output.dir = output_dir;
            if let Some(policy) = on_collision {
                config.output.on_collision = policy;
            }
            if no_mmap {
                config.storage.use_mmap = false;
            }

            let converter = Converter::from_config(config)?;
            let store = converter.open_store(&checkpoint)?;

            let progress = if quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new(store.len() as u64)
            };
            progress.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tensors",
                )?
                .progress_chars("#>-"),
            );

            let result = converter.convert_with_progress(&store, |position, _| {
                progress.set_position(position as u64)
            });
            progress.finish_and_clear();
            let report = result?;

            println!(
                "Converted {} tensors ({} dropped) into {} files, {} bytes in {}",
                report.tensors_read,
                report.tensors_dropped,
                report.files_written,
                report.bytes_written,
                converter.config().output.dir.display()
            );
            if report.overwritten > 0 {
                println!("Replaced {} existing files", report.overwritten);
            }
        }

        Command::Verify { output_dir } => {
            let mut config = config;
            config.output.dir = output_dir;

            let converter = Converter::from_config(config)?;
            let report = converter.verify()?;

            println!(
                "{} files OK ({} payload bytes)",
                report.files.len(),
                report.payload_bytes
            );
        }
    }

    Ok(())
}
