use crate::domain::{AliasLookup, LineEvent, LogDialect, NodeTable, ReplayStrategy};
use crate::infra::LogLines;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug)]
pub struct BootstrapOutcome {
    pub table: NodeTable,
    /// First line the incremental updater still has to read.
    pub cursor: usize,
    /// Line after the last session banner, if one was found.
    pub session_start: Option<usize>,
    /// Line after the earliest connection marker following the banner. Diagnostics only.
    pub secondary_marker: Option<usize>,
    pub applied: usize,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no {dialect} session banner found in log")]
    NoSessionBanner { dialect: &'static str },
}

/// Walks backward to the last banner. Returns `(session_start, secondary_marker)`, both as
/// "index + 1" cursors.
pub fn find_session_start(
    dialect: &dyn LogDialect,
    lines: &[String],
) -> (Option<usize>, Option<usize>) {
    let mut secondary = None;
    for (index, line) in lines.iter().enumerate().rev() {
        if dialect.is_session_start(line) {
            return (Some(index + 1), secondary);
        }
        if dialect.is_secondary_marker(line) {
            secondary = Some(index + 1);
        }
    }
    (None, secondary)
}

/// Rebuilds the node table from the latest session in the log. Only newline-terminated
/// lines are considered.
pub fn bootstrap(
    dialect: &dyn LogDialect,
    log: &LogLines,
    aliases: Arc<dyn AliasLookup>,
) -> Result<BootstrapOutcome, BootstrapError> {
    let lines = log.complete_lines();
    let mut table = NodeTable::new(aliases);
    let (session_start, secondary_marker) = find_session_start(dialect, lines);

    let Some(start) = session_start else {
        if dialect.requires_session_start() {
            return Err(BootstrapError::NoSessionBanner {
                dialect: dialect.kind().label(),
            });
        }
        tracing::warn!(
            event = "bootstrap.no_banner",
            dialect = dialect.kind().label(),
            lines = lines.len(),
            "no session banner, starting from an empty table"
        );
        return Ok(BootstrapOutcome {
            table,
            cursor: 0,
            session_start: None,
            secondary_marker: None,
            applied: 0,
        });
    };

    tracing::info!(
        event = "bootstrap.banner",
        dialect = dialect.kind().label(),
        line = start,
        secondary = ?secondary_marker,
        "session banner found"
    );

    let mut cursor = start;
    let mut applied = 0;
    match dialect.replay_strategy() {
        ReplayStrategy::FirstSummary => {
            for (offset, line) in lines[start..].iter().enumerate() {
                if let Some(LineEvent::ConnectedNodes(nodes)) = dialect.parse_line(line) {
                    for update in &nodes {
                        table.apply(update);
                    }
                    applied = nodes.len();
                    cursor = start + offset + 1;
                    break;
                }
            }
        }
        ReplayStrategy::EveryEvent => {
            for line in &lines[start..] {
                if let Some(LineEvent::Node(update)) = dialect.parse_line(line) {
                    table.apply(&update);
                    applied += 1;
                }
            }
            cursor = lines.len();
        }
    }

    tracing::info!(
        event = "bootstrap.done",
        nodes = table.len(),
        applied,
        cursor,
        "node table rebuilt"
    );
    Ok(BootstrapOutcome {
        table,
        cursor,
        session_start,
        secondary_marker,
        applied,
    })
}
