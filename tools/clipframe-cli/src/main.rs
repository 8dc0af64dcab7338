//! Clipframe CLI: command-line interface for clip inspection and frame export.
//!
//! Usage:
//!   clipframe check                                   Check external tools
//!   clipframe profiles                                List output profiles
//!   clipframe probe <CLIP>                            Show clip properties and matching profile
//!   clipframe frame <CLIP> <FOLDER> <N>               Export one frame as PNG
//!   clipframe range <CLIP> <FOLDER> <PREFIX> <IN> <OUT>
//!                                                     Export a frame range as a PNG sequence
//!   clipframe script <IN> <OUT> <PREFIX> <SCRIPT>     Run a G'MIC script over a frame folder

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipframe_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipframe",
    about = "Clip preview, frame export and scripted frame rendering",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that ffmpeg, ffprobe and gmic are usable
    Check,

    /// List the output profile catalog
    Profiles {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a clip's properties and the closest profile
    Probe {
        /// Clip to inspect
        clip: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a single frame to <FOLDER>/frame<N>.png
    Frame {
        /// Source clip
        clip: PathBuf,

        /// Output folder
        folder: PathBuf,

        /// Frame index
        frame: i64,

        /// Profile name (defaults to the closest match)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Export frames IN..=OUT to <FOLDER>/<PREFIX>_%04d.png
    Range {
        /// Source clip
        clip: PathBuf,

        /// Output folder
        folder: PathBuf,

        /// Output file name prefix
        prefix: String,

        /// First frame (inclusive)
        mark_in: i64,

        /// Last frame (inclusive)
        mark_out: i64,

        /// Profile name (defaults to the closest match)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Run a G'MIC script over every numbered frame in a folder
    Script {
        /// Folder of input frames
        input: PathBuf,

        /// Output folder
        output: PathBuf,

        /// Output file name prefix
        prefix: String,

        /// G'MIC commands, e.g. "-blur 3 -sharpen 100"
        script: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    clipframe_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Check => commands::check::run(&config),
        Commands::Profiles { json } => commands::profiles::run(&config, json),
        Commands::Probe { clip, json } => commands::probe::run(&config, clip, json),
        Commands::Frame {
            clip,
            folder,
            frame,
            profile,
        } => commands::frame::run(&config, clip, folder, frame, profile),
        Commands::Range {
            clip,
            folder,
            prefix,
            mark_in,
            mark_out,
            profile,
        } => commands::range::run(config, clip, folder, prefix, mark_in, mark_out, profile).await,
        Commands::Script {
            input,
            output,
            prefix,
            script,
        } => commands::script::run(config, input, output, prefix, script).await,
    }
}
