//! Logger

// Imports
use {
	std::{fs, io, path::Path, sync::Mutex},
	tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter},
};

/// Initializes the logger.
///
/// Logs to stderr, filtered by `RUST_LOG` (`info` by default).
/// If `log_file` is set, additionally logs to it, filtered by `RUST_LOG_FILE`
/// (`debug` by default).
///
/// Any messages sent through [`pre_init`] are emitted once initialized.
pub fn init(log_file: Option<&Path>, log_file_append: bool) {
	// Note: Stdout is reserved for the benchmark output, so we log to stderr.
	let stderr_layer = tracing_subscriber::fmt::layer()
		.with_writer(io::stderr)
		.with_filter(self::env_filter("RUST_LOG", LevelFilter::INFO));

	let file_layer = log_file.and_then(|path| {
		let mut options = fs::OpenOptions::new();
		match log_file_append {
			true => options.create(true).append(true),
			false => options.create(true).write(true).truncate(true),
		};

		match options.open(path) {
			Ok(file) => Some(
				tracing_subscriber::fmt::layer()
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
		.with(stderr_layer)
		.with(file_layer)
		.try_init()
	{
		eprintln!("Unable to initialize logger: {err}");
	}

	pre_init::flush();
}

/// Creates an env filter from `var`, falling back to `default`
fn env_filter(var: &str, default: LevelFilter) -> EnvFilter {
	EnvFilter::builder()
		.with_default_directive(default.into())
		.with_env_var(var)
		.from_env_lossy()
}

/// Logging before the logger is initialized.
///
/// Messages are buffered and emitted by [`init`].
pub mod pre_init {
	// Imports
	use std::{
		mem,
		sync::{Mutex, PoisonError},
	};

	/// Buffered messages
	static MESSAGES: Mutex<Vec<(Level, String)>> = Mutex::new(vec![]);

	/// Level of a buffered message
	#[derive(Clone, Copy, Debug)]
	enum Level {
		Debug,
		Warn,
	}

	/// Buffers a debug message
	pub fn debug(msg: impl Into<String>) {
		self::push(Level::Debug, msg.into());
	}

	/// Buffers a warning
	pub fn warn(msg: impl Into<String>) {
		self::push(Level::Warn, msg.into());
	}

	fn push(level: Level, msg: String) {
		MESSAGES
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push((level, msg));
	}

	/// Emits all buffered messages
	pub(super) fn flush() {
		let messages = mem::take(&mut *MESSAGES.lock().unwrap_or_else(PoisonError::into_inner));
		for (level, msg) in messages {
			match level {
				Level::Debug => tracing::debug!("{msg}"),
				Level::Warn => tracing::warn!("{msg}"),
			}
		}
	}
}
