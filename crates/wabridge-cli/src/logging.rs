//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wabridge_core::config::{LogFormat, LogLevel, LoggingConfig};
use wabridge_core::env;

/// Filter used when neither `WABRIDGE_LOG` nor `RUST_LOG` is set.
pub fn default_directive(level: LogLevel, verbose: u8) -> String {
    let level = match verbose {
        0 => level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    format!("wabridge={},tower_http={}", level, level)
}

fn filter(config: &LoggingConfig, verbose: u8) -> EnvFilter {
    env::get_var(env::vars::WABRIDGE_LOG)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(config.level, verbose)))
}

/// Install the global subscriber. Logs go to stderr; command output owns stdout.
pub fn init(config: &LoggingConfig, verbose: u8) {
    let registry = tracing_subscriber::registry().with(filter(config, verbose));

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
