//! Log output setup for the `harc` binary.
//!
//! Logs go to stderr so `list` and `export` can pipe JSON on stdout.
//! `RUST_LOG` overrides the default filter.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "harc=info,headline_archiver=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// JSON when stderr is not a terminal, human-readable otherwise.
    #[default]
    Auto,
    Pretty,
    Json,
}

impl LogFormat {
    fn use_json(self) -> bool {
        match self {
            LogFormat::Auto => !atty::is(atty::Stream::Stderr),
            LogFormat::Pretty => false,
            LogFormat::Json => true,
        }
    }
}

pub fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Already initialized is fine.
    if format.use_json() {
        let _ = builder.json().with_current_span(false).try_init();
    } else {
        let _ = builder.compact().try_init();
    }
}
