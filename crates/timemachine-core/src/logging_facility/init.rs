//! Subscriber installation for binaries
//!
//! Library code only emits events; the `tm` binary decides where they go.
//! Both profiles write to stderr so stdout stays reserved for command
//! output (including `--json` results).

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives, e.g. `timemachine_store=trace`
pub const LOG_FILTER_ENV: &str = "TM_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable lines, debug level for the time machine crates
    Development,
    /// One JSON object per event, info level
    Production,
}

impl Profile {
    /// Parse a profile name as given on the command line
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "dev" | "development" => Some(Profile::Development),
            "prod" | "production" | "json" => Some(Profile::Production),
            _ => None,
        }
    }

    fn default_directives(&self) -> &'static str {
        match self {
            Profile::Development => "timemachine=debug,tm=debug",
            Profile::Production => "timemachine=info,tm=info",
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new(self.default_directives()))
    }
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber for `profile`. Only the first call counts;
/// a subscriber installed by someone else is left in place.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(profile.filter());
        let _ = match profile {
            Profile::Development => builder.with_target(false).try_init(),
            Profile::Production => builder.json().try_init(),
        };
    });
}
