//! viobench - VIO benchmarking harness

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "viobench")]
#[command(about = "Accuracy and latency benchmarks for visual-inertial odometry on EuRoC")]
#[command(version)]
struct Cli {
    /// Show debug logs
    #[arg(short, long)]
    verbose: bool,

    /// Command and arguments passed to viobench-cli
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(level)
        .init();

    let cli_args: Vec<&str> = cli.args.iter().map(|s| s.as_str()).collect();
    run_cli(&cli_args)
}

fn run_cli(args: &[&str]) -> anyhow::Result<()> {
    let mut full_args = vec!["viobench-cli"];
    full_args.extend(args);

    match viobench_cli::run_cli_main(&full_args) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("viobench error: {:#}", e);
            std::process::exit(1);
        }
    }
}
