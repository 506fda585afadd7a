use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imagemeta::{
    config::Config,
    image::{ImageSource, OciImage},
    model::Provenance,
    output::{print_report, OutputFormat, ScanReport},
    Labeler,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const DIVERGED: u8 = 2;
}

#[derive(Parser)]
#[command(name = "imagemeta")]
#[command(
    author,
    version,
    about = "Inspect a container image and reconcile its embedded metadata label"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an OCI image layout and print its reconciled metadata
    Scan {
        /// Path to an OCI image-layout directory
        image: PathBuf,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Path prefix inside the image to skip during extraction (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Image config label holding the previously embedded record
        #[arg(long)]
        label_key: Option<String>,

        /// Command used to query RPM databases
        #[arg(long)]
        rpm_command: Option<String>,

        /// JSON file with build provenance to record as a dependency
        #[arg(long)]
        build_provenance: Option<PathBuf>,

        /// Exit with a distinct code when the embedded label disagrees with the scan
        #[arg(long)]
        fail_on_diff: bool,
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

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imagemeta=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn run() -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            image,
            format,
            exclude,
            label_key,
            rpm_command,
            build_provenance,
            fail_on_diff,
        } => {
            let mut config = Config::load().context("failed to load configuration")?;
            if let Some(key) = label_key {
                config.label_key = key;
            }
            if let Some(command) = rpm_command {
                config.rpm_command = command;
            }
            config.exclude_paths.extend(exclude);

            let format_str = format.unwrap_or_else(|| config.default_format.clone());
            let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;

            run_scan(config, image, format, build_provenance, fail_on_diff)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn run_scan(
    config: Config,
    image_dir: PathBuf,
    format: OutputFormat,
    build_provenance: Option<PathBuf>,
    fail_on_diff: bool,
) -> Result<u8> {
    let is_interactive = format == OutputFormat::Table;

    let build_provenance = match build_provenance {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read build provenance {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("invalid build provenance JSON in {}", path.display()))?;
            Some(value)
        }
        None => None,
    };

    let image = OciImage::open(&image_dir)?;
    let tool = Provenance::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), config.tool_url.clone());
    let labeler = Labeler::new(config, tool);

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Inspecting {}...", image.reference()));
        Some(pb)
    } else {
        None
    };

    let outcome = labeler.label(&image, build_provenance);

    if let Some(pb) = progress {
        match &outcome {
            Ok(outcome) => pb.finish_with_message(format!(
                "Found {} dependencies",
                outcome.metadata.dependencies.len()
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }
    let outcome = outcome.with_context(|| format!("failed to label image {}", image.reference()))?;

    let diverged = !outcome.warnings.is_empty();
    let report = ScanReport::new(image.reference(), outcome.metadata, outcome.warnings);
    print_report(&report, format)?;

    if fail_on_diff && diverged {
        Ok(exit_codes::DIVERGED)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'imagemeta config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
