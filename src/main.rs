// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "edgeview")]
#[command(about = "Real-time camera preview with GPU edge detection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against an offscreen render target
    Run {
        /// Start in processed (edge detection) mode
        #[arg(short, long)]
        processed: bool,

        /// Use the synthetic test pattern instead of a camera
        #[arg(short, long)]
        test_pattern: bool,

        /// Capture width (overrides config)
        #[arg(long)]
        width: Option<u32>,

        /// Capture height (overrides config)
        #[arg(long)]
        height: Option<u32>,

        /// Stop after this many rendered frames (default: run until Ctrl-C)
        #[arg(short, long)]
        frames: Option<u64>,
    },

    /// List available capture devices
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=edgeview=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            processed,
            test_pattern,
            width,
            height,
            frames,
        }) => cli::run_pipeline(cli::RunOptions {
            processed,
            test_pattern,
            width,
            height,
            frames,
        }),
        Some(Commands::List) => cli::list_devices(),
        None => cli::run_pipeline(cli::RunOptions {
            processed: false,
            test_pattern: false,
            width: None,
            height: None,
            frames: None,
        }),
    }
}
