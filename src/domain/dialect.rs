use crate::domain::{LineEvent, ReflectorDialect, RelayDialect};
use std::path::Path;

/// Substring of the configured log file name that selects the reflector dialect.
pub const REFLECTOR_LOG_MARKER: &str = "reflector";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DialectKind {
    /// A standalone SvxLink node writing `svxlink.log`.
    Relay,
    /// A federated SvxReflector writing `svxreflector.log`.
    Reflector,
}

impl DialectKind {
    pub fn from_log_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.contains(REFLECTOR_LOG_MARKER) {
            Self::Reflector
        } else {
            Self::Relay
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Relay => "svxlink",
            Self::Reflector => "svxreflector",
        }
    }

    pub fn into_dialect(self) -> Box<dyn LogDialect> {
        match self {
            Self::Relay => Box::new(RelayDialect),
            Self::Reflector => Box::new(ReflectorDialect),
        }
    }
}

/// How the bootstrap scanner rebuilds the table once the session start is known.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplayStrategy {
    /// Seed from the first "connected nodes" summary after the banner, then stop.
    FirstSummary,
    /// Apply every recognized node event up to the end of the log.
    EveryEvent,
}

/// A log format the monitor understands. Chosen once at startup.
pub trait LogDialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// The startup banner that opens a session.
    fn is_session_start(&self, line: &str) -> bool;

    /// A later connection marker, only reported for diagnostics during bootstrap.
    fn is_secondary_marker(&self, line: &str) -> bool;

    /// Maps one line to at most one event. Unrecognized lines yield `None`.
    fn parse_line(&self, line: &str) -> Option<LineEvent>;

    fn replay_strategy(&self) -> ReplayStrategy;

    /// Whether a log without any session banner is unusable.
    fn requires_session_start(&self) -> bool;
}
