use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "whisperx-flow",
    about = "Supervise a WhisperX runner worker and transcribe audio through it",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the worker, load a model, transcribe one file, print the
    /// result, and shut the worker down.
    Run(RunArgs),
    /// List the models the worker can load.
    Models,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Audio file to transcribe.
    pub audio: PathBuf,

    /// Model to load before transcribing.
    #[arg(long, default_value = "tiny.en")]
    pub model: String,

    /// Path to whisperx_runner.py; probed in conventional locations
    /// when omitted.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Python interpreter used to run the worker.
    #[arg(long, default_value = "python3")]
    pub python: PathBuf,

    /// Give up if the whole run takes longer than this many seconds
    /// (first-time model downloads can be slow).
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,

    /// Print the raw transcription JSON instead of the plain transcript.
    #[arg(long)]
    pub json: bool,
}
