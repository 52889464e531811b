mod acquisition;
mod alarm;
mod audio;
mod config;
mod detection;
mod display;
mod monitor;
mod render;
mod shutdown;
mod waveform;

use crate::config::{Settings, SourceConfig, SourceKind};
use crate::detection::ThresholdPolicy;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "vitalmon")]
#[command(about = "Bedside vital-signs monitor for Linux framebuffers")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (default: ~/.config/vitalmon/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor on the display until interrupted
    Run(RunArgs),

    /// List display outputs and their modes
    Modes {
        /// DRM card device
        #[arg(long)]
        card: Option<PathBuf>,
    },

    /// List available audio output devices
    Devices,

    /// Print the effective configuration
    Config {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

/// Overrides applied on top of the config file
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// DRM card device
    #[arg(long)]
    card: Option<PathBuf>,

    /// Font file for the overlay
    #[arg(long)]
    font: Option<PathBuf>,

    /// Sample source
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Heart rate of the synthetic source
    #[arg(long)]
    bpm: Option<f32>,

    /// Detection threshold on the energy signal
    #[arg(long)]
    threshold: Option<f32>,

    /// Peak floor policy
    #[arg(long, value_enum)]
    policy: Option<ThresholdPolicy>,
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(card) = &self.card {
            settings.display.card = card.clone();
        }
        if let Some(font) = &self.font {
            settings.display.font = Some(font.clone());
        }
        if let Some(kind) = self.source
            && settings.source.kind() != kind
        {
            settings.source = SourceConfig::for_kind(kind);
        }
        if let Some(value) = self.bpm {
            match &mut settings.source {
                SourceConfig::Synthetic { bpm, .. } => *bpm = value,
                _ => log::warn!("--bpm only applies to the synthetic source, ignoring"),
            }
        }
        if let Some(threshold) = self.threshold {
            settings.detector.threshold = threshold;
        }
        if let Some(policy) = self.policy {
            settings.detector.policy = policy;
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Ok(Settings::load_from(path)?),
        None => Ok(Settings::load()),
    }
}

fn list_modes(card: &Path) -> Result<()> {
    let outputs = display::probe_outputs(card)?;

    println!("Display outputs on {}:", card.display());
    println!("{:<20} {:<10} Modes", "Output", "Connected");
    println!("{}", "-".repeat(60));

    for output in outputs {
        let connected = if output.connected { "YES" } else { "NO" };
        println!("{:<20} {:<10} {}", output.name, connected, output.modes.len());

        let selected = display::select_mode(&output.modes);
        for (i, mode) in output.modes.iter().enumerate() {
            let mut notes = Vec::new();
            if mode.preferred {
                notes.push("preferred");
            }
            if output.connected && selected == Some(i) {
                notes.push("selected");
            }
            println!(
                "{:<31} {}x{}@{} {}",
                "",
                mode.width,
                mode.height,
                mode.refresh,
                notes.join(", ")
            );
        }
    }
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = audio::list_output_devices()?;

    println!("Available Audio Output Devices:");
    println!("{:<30} {:<10} {:<20} Formats", "Name", "Default", "Sample Rates");
    println!("{}", "-".repeat(80));

    for device in devices {
        let default_str = if device.is_default { "YES" } else { "NO" };
        let sample_rates = device
            .supported_sample_rates
            .iter()
            .take(3)
            .map(|sr| sr.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let formats = device
            .supported_formats
            .iter()
            .take(2)
            .map(|f| format!("{:?}", f))
            .collect::<Vec<_>>()
            .join(", ");

        let name: String = device.name.chars().take(30).collect();
        println!("{:<30} {:<10} {:<20} {}", name, default_str, sample_rates, formats);
    }
    Ok(())
}

fn execute(cli: Cli) -> Result<()> {
    let mut settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut settings);
            monitor::run(&settings)
        }
        Commands::Modes { card } => list_modes(card.as_deref().unwrap_or(settings.display.card.as_path())),
        Commands::Devices => list_devices(),
        Commands::Config { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print!("{}", settings.to_toml()?);
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = execute(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
