//! Logger

// Imports
use {
	std::{fs, io, path::Path, sync::Mutex},
	tracing::metadata::LevelFilter,
	tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer},
};

/// Initializes the global logger.
///
/// Always logs to stderr, filtered by `RUST_LOG` (`info` by default).
/// If `log_file` is set, additionally logs to it, filtered by `RUST_LOG_FILE`
/// (`debug` by default).
///
/// Any messages registered with [`pre_init`] are emitted right after.
pub fn init(log_file: Option<&Path>, log_file_append: bool) {
	let term_layer = fmt::layer()
		.with_writer(io::stderr)
		.with_filter(self::env_filter("RUST_LOG", LevelFilter::INFO));

	let file_layer = log_file.and_then(|path| {
		let file = fs::OpenOptions::new()
			.create(true)
			.write(true)
			.append(log_file_append)
			.truncate(!log_file_append)
			.open(path);

		match file {
			Ok(file) => Some(
				fmt::layer()
					.with_ansi(false)
					.with_writer(Mutex::new(file))
					.with_filter(self::env_filter("RUST_LOG_FILE", LevelFilter::DEBUG)),
			),
			Err(err) => {
				pre_init::warn(format!("Unable to open log file {path:?}: {err}"));
				None
			},
		}
	});

	if let Err(err) = tracing_subscriber::registry()
		.with(term_layer)
		.with(file_layer)
		.try_init()
	{
		eprintln!("Unable to initialize logger: {err}");
	}

	pre_init::flush();
}

/// Builds an env filter from `var`, falling back to `default`
fn env_filter(var: &str, default: LevelFilter) -> EnvFilter {
	EnvFilter::builder()
		.with_default_directive(default.into())
		.with_env_var(var)
		.from_env_lossy()
}

/// Logging before the logger is initialized.
///
/// Messages are buffered and emitted once [`init`](super::init) runs.
pub mod pre_init {
	// Imports
	use {
		std::{mem, sync::Mutex},
		tracing::Level,
	};

	/// Buffered messages
	static MESSAGES: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

	/// Buffers a debug message
	pub fn debug(msg: impl Into<String>) {
		self::push(Level::DEBUG, msg.into());
	}

	/// Buffers a warning message
	pub fn warn(msg: impl Into<String>) {
		self::push(Level::WARN, msg.into());
	}

	fn push(level: Level, msg: String) {
		self::lock().push((level, msg));
	}

	/// Emits all buffered messages
	pub(super) fn flush() {
		let messages = mem::take(&mut *self::lock());
		for (level, msg) in messages {
			if level == Level::WARN {
				tracing::warn!(target: "numasim::pre_init", "{msg}");
			} else {
				tracing::debug!(target: "numasim::pre_init", "{msg}");
			}
		}
	}

	fn lock() -> std::sync::MutexGuard<'static, Vec<(Level, String)>> {
		// Note: A panic while holding the lock can't leave the buffer in an invalid state
		MESSAGES.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}
}
