use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wpdetect::{
    config::Config,
    output::{format_result_to_string, print_result, OutputFormat},
    DetectOptions, Detector, ScanResult,
};

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const VERSION_MISMATCH: u8 = 2;
    pub const CANCELLED: u8 = 130;
}

#[derive(Parser)]
#[command(name = "wpdetect")]
#[command(
    author,
    version,
    about = "Detect installed WordPress plugins and their versions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a plugins directory (e.g. wp-content/plugins)
    Scan {
        /// Directory holding the installed plugins
        root: PathBuf,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of files read concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Report only the first plugin found for each slug
        #[arg(long)]
        first_per_slug: bool,

        /// Exit with an error code if any header and code versions disagree
        #[arg(long)]
        fail_on_mismatch: bool,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

struct ScanArgs {
    root: PathBuf,
    format: String,
    output: Option<PathBuf>,
    options: DetectOptions,
    first_per_slug: bool,
    fail_on_mismatch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring config file");
        Config::default()
    });

    match cli.command {
        Commands::Scan {
            root,
            format,
            output,
            workers,
            first_per_slug,
            fail_on_mismatch,
        } => {
            let mut options = DetectOptions::from(&config);
            if let Some(workers) = workers {
                options.workers = workers;
            }

            let args = ScanArgs {
                root,
                format: format.unwrap_or(config.default_format.clone()),
                output,
                options,
                first_per_slug,
                fail_on_mismatch: fail_on_mismatch || config.fail_on_mismatch,
            };
            run_scan(args, &config).await
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(args: ScanArgs, config: &Config) -> Result<u8> {
    let format = OutputFormat::from_str(&args.format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && args.output.is_none();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Scanning {}...", args.root.display()));
        Some(pb)
    } else {
        None
    };

    let mut result = Detector::new(args.options)
        .detect_with_cancel(&args.root, cancel)
        .await
        .with_context(|| format!("Failed to scan {}", args.root.display()))?;

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Found {} plugins", result.records.len()));
    }

    apply_reductions(&mut result, args.first_per_slug, config);

    if let Some(path) = &args.output {
        let text = format_result_to_string(&result, format)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        println!("Results written to: {}", path.display());
    } else {
        print_result(&result, format)?;
    }

    Ok(determine_exit_code(&result, args.fail_on_mismatch))
}

/// Consumer-side filtering of the engine's full result.
fn apply_reductions(result: &mut ScanResult, first_per_slug: bool, config: &Config) {
    if first_per_slug {
        result.records = result.first_per_slug();
    }
    let records = std::mem::take(&mut result.records);
    result.records = config.ignore.filter(records);
}

fn determine_exit_code(result: &ScanResult, fail_on_mismatch: bool) -> u8 {
    if result.cancelled {
        exit_codes::CANCELLED
    } else if fail_on_mismatch && result.has_mismatch() {
        exit_codes::VERSION_MISMATCH
    } else {
        exit_codes::SUCCESS
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let path = Config::config_path();

    match (show_path, init, path.exists()) {
        (true, _, _) => println!("{}", path.display()),
        (false, true, true) => {
            println!("{} already exists, leaving it untouched", path.display());
        }
        (false, true, false) => {
            Config::default()
                .save()
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote defaults to {}:\n", path.display());
            println!("{}", Config::generate_default_config());
        }
        (false, false, true) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            println!("# {}\n\n{}", path.display(), content);
        }
        (false, false, false) => {
            println!("Using built-in defaults; {} does not exist.", path.display());
            println!("Create it with 'wpdetect config --init'.");
        }
    }

    Ok(())
}
