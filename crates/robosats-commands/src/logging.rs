//! Log subscriber installation

use robosats_conf::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count, falling back to the configured level
pub fn level_for(settings: &LoggingSettings, verbosity: u8) -> String {
	match verbosity {
		0 => settings.level.clone(),
		1 => "debug".to_string(),
		_ => "trace".to_string(),
	}
}

/// Install the global subscriber; `RUST_LOG` wins over the configured level
///
/// Installing twice is a no-op.
pub fn init(settings: &LoggingSettings, verbosity: u8) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(level_for(settings, verbosity)));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr);

	let _ = match settings.format {
		LogFormat::Pretty => builder.pretty().try_init(),
		LogFormat::Compact => builder.compact().try_init(),
		LogFormat::Json => builder.json().try_init(),
	};
}
