//! Arguments

// Imports
use std::path::PathBuf;

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
pub struct Args {
	/// Log file
	///
	/// Specifies a file to perform verbose logging to.
	/// You can use `RUST_LOG_FILE` to set filtering options
	#[clap(long = "log-file")]
	pub log_file: Option<PathBuf>,

	/// Whether to append to the log file
	#[clap(long = "log-file-append")]
	pub log_file_append: bool,

	/// Sub-command
	#[command(subcommand)]
	pub sub_cmd: SubCmd,
}

/// Sub-command
#[derive(Debug, clap::Subcommand)]
pub enum SubCmd {
	#[clap(name = "run")]
	Run(Run),

	#[clap(name = "compare")]
	Compare(Compare),
}

/// Runs a set of experiments and writes their results
#[derive(Debug, clap::Args)]
pub struct Run {
	/// Experiments file.
	///
	/// A JSON array of `{ "name": ..., "config": ... }` objects.
	/// If not passed, runs the baseline experiments.
	#[clap(long = "experiments")]
	pub experiments_file: Option<PathBuf>,

	/// Output directory
	#[clap(short = 'o', long = "output-dir", default_value = "data")]
	pub output_dir: PathBuf,

	/// Seed for experiments that don't specify one
	#[clap(long = "seed")]
	pub seed: Option<u64>,
}

/// Compares a candidate configuration against a baseline
#[derive(Debug, clap::Args)]
pub struct Compare {
	/// Baseline, either a preset name or a JSON config
	pub baseline: String,

	/// Candidate, either a preset name or a JSON config
	pub candidate: String,

	/// Seed for configurations that don't specify one
	#[clap(long = "seed")]
	pub seed: Option<u64>,
}
