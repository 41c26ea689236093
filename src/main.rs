//! Handover Awareness CLI
//!
//! Splits simulator rides into handover windows, annotates them with gaze
//! and grades them.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use handover_awareness::{
    audit::RunLog,
    config::Config,
    core::read_grading_json,
    pipeline,
    report::GazeReport,
    telemetry::RecordingId,
    DATA_LAYOUT, VERSION,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handover-analysis")]
#[command(version = VERSION)]
#[command(about = "Driver attention around automated-driving handovers", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that override the configuration file.
#[derive(Args)]
struct Overrides {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the simulator data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Root for analysis output
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Scenario to process (repeatable)
    #[arg(long = "scenario", global = true)]
    scenarios: Vec<u32>,

    /// File listing the user ids to process
    #[arg(long, global = true)]
    users: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resample telemetry and cut it into event windows
    Split {
        /// Video frame rate the telemetry is resampled to
        #[arg(long)]
        fps: Option<f64>,

        /// Frames kept after each active run
        #[arg(long)]
        lookahead: Option<usize>,
    },

    /// Annotate event windows with the objects the driver looked at
    Annotate,

    /// Grade annotated windows
    Grade,

    /// Show the gaze report of one ride
    Report {
        /// User id (as in user_<id>_s<scenario>)
        #[arg(long)]
        user: String,

        /// Scenario of the ride
        #[arg(long = "ride-scenario", default_value = "1")]
        scenario: u32,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.overrides)?;

    match cli.command {
        Commands::Split { fps, lookahead } => {
            if let Some(fps) = fps {
                config.telemetry.target_fps = fps;
            }
            if let Some(lookahead) = lookahead {
                config.events.lookahead_frames = lookahead;
            }
            config.validate()?;
            cmd_split(&config)
        }
        Commands::Annotate => cmd_annotate(&config),
        Commands::Grade => cmd_grade(&config),
        Commands::Report { user, scenario } => cmd_report(&config, &user, scenario),
        Commands::Config { save } => cmd_config(&config, cli.overrides.config, save),
    }
}

fn load_config(overrides: &Overrides) -> anyhow::Result<Config> {
    let mut config = match &overrides.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("could not load config from {}", path.display()))?,
        None => Config::load().context("could not load config")?,
    };

    if let Some(dir) = &overrides.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &overrides.output_dir {
        config.output_dir = dir.clone();
    }
    if !overrides.scenarios.is_empty() {
        config.scenarios = overrides.scenarios.clone();
    }
    if let Some(users) = &overrides.users {
        config.user_ids_file = Some(users.clone());
    }

    Ok(config)
}

/// Open a persisted run log for `stage` and list the recordings it covers.
fn start_run(config: &Config, stage: &str) -> anyhow::Result<(RunLog, Vec<RecordingId>)> {
    config.ensure_directories()?;
    let recordings =
        pipeline::discover_recordings(config).context("could not list recordings")?;

    println!("Handover Analysis v{VERSION}: {stage}");
    println!("  Data: {}", config.data_dir.display());
    println!("  Output: {}", config.output_dir.display());
    println!("  Recordings: {}", recordings.len());
    println!();

    let log = RunLog::with_persistence(stage, config.run_log_path());
    Ok((log, recordings))
}

fn finish_run(mut log: RunLog) {
    log.close();
    println!();
    println!("{}", log.summary());
}

fn cmd_split(config: &Config) -> anyhow::Result<()> {
    let (mut log, recordings) = start_run(config, "split")?;
    println!(
        "Resampling to {} fps, lookahead {} frames",
        config.telemetry.target_fps, config.events.lookahead_frames
    );
    pipeline::split_all(config, &recordings, &mut log);
    finish_run(log);
    Ok(())
}

fn cmd_annotate(config: &Config) -> anyhow::Result<()> {
    let (mut log, recordings) = start_run(config, "annotate")?;
    pipeline::annotate_all(config, &recordings, &mut log);
    finish_run(log);
    Ok(())
}

fn cmd_grade(config: &Config) -> anyhow::Result<()> {
    let (mut log, recordings) = start_run(config, "grade")?;
    let result = pipeline::grade_all(config, &recordings, &mut log);
    finish_run(log);

    let rides = result?;
    println!();
    println!(
        "Graded {} ride(s) into {}",
        rides.len(),
        config.grading_dir().display()
    );
    Ok(())
}

fn cmd_report(config: &Config, user: &str, scenario: u32) -> anyhow::Result<()> {
    let path = config.grading_dir().join("grading_data.json");
    let rides = read_grading_json(&path).context("run 'handover-analysis grade' first")?;

    let Some(report) = GazeReport::from_rides(&rides, user, scenario) else {
        bail!("no graded ride for user {user} in scenario {scenario}");
    };
    println!("{report}");
    Ok(())
}

fn cmd_config(config: &Config, path: Option<PathBuf>, save: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(Config::config_path);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", path.display());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    println!("{DATA_LAYOUT}");

    if save {
        config.save_to(&path)?;
        println!("Saved configuration to {}", path.display());
    }
    Ok(())
}
