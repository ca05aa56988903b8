//! Arguments

// Imports
use std::{net::SocketAddr, path::PathBuf};

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

	/// Config file
	///
	/// If not passed, the defaults are used.
	#[clap(long = "config")]
	pub config_file: Option<PathBuf>,

	/// Address to listen on.
	///
	/// Overrides the config file.
	#[clap(long = "bind")]
	pub bind: Option<SocketAddr>,
}
