use crate::app::{BootstrapOutcome, Dispatcher};
use crate::domain::{LineEvent, LogDialect, NodeRecord, NodeTable};
use crate::infra::{LineSource, LogSourceError, LogWatcher, WatchSignal};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;

#[derive(Debug, PartialEq)]
pub enum TickOutcome {
    /// Nothing new to read; no broadcast is owed.
    Unchanged,
    Updated {
        applied: usize,
        snapshot: Vec<NodeRecord>,
    },
}

/// Owns the live table between ticks and advances it over newly appended lines.
pub struct Updater<S: LineSource> {
    source: S,
    dialect: Box<dyn LogDialect>,
    table: NodeTable,
    cursor: usize,
}

impl<S: LineSource> Updater<S> {
    pub fn new(source: S, dialect: Box<dyn LogDialect>, bootstrap: BootstrapOutcome) -> Self {
        Self {
            source,
            dialect,
            table: bootstrap.table,
            cursor: bootstrap.cursor,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    pub fn tick(&mut self) -> Result<TickOutcome, LogSourceError> {
        if !self.source.has_grown()? {
            return Ok(TickOutcome::Unchanged);
        }

        let log = self.source.current_lines()?;
        self.source.mark_consumed();
        let end = log.complete;
        if end < self.cursor {
            tracing::warn!(
                event = "tick.shrunk",
                cursor = self.cursor,
                lines = end,
                "log shrank below the cursor, re-anchoring at its end"
            );
            self.cursor = end;
            return Ok(TickOutcome::Unchanged);
        }
        if end == self.cursor {
            return Ok(TickOutcome::Unchanged);
        }

        let mut applied = 0;
        for line in &log.lines[self.cursor..end] {
            match self.dialect.parse_line(line) {
                Some(LineEvent::Node(update)) => {
                    self.table.apply(&update);
                    applied += 1;
                }
                Some(LineEvent::SessionStart) => {
                    tracing::info!(
                        event = "tick.session_start",
                        dialect = self.dialect.kind().label(),
                        "log producer restarted"
                    );
                }
                Some(LineEvent::SessionMarker | LineEvent::ConnectedNodes(_)) | None => {}
            }
        }

        tracing::debug!(
            event = "tick.applied",
            from = self.cursor,
            to = end,
            applied,
            "log advanced"
        );
        self.cursor = end;
        Ok(TickOutcome::Updated {
            applied,
            snapshot: self.table.snapshot(),
        })
    }
}

/// Polls every `period` (and on watcher wake-ups) forever, publishing each change.
pub async fn run_updater<S: LineSource>(
    mut updater: Updater<S>,
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    mut watcher: Option<LogWatcher>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            signal = next_change(&mut watcher) => match signal {
                Some(WatchSignal::Changed) => {}
                Some(WatchSignal::Error(message)) => {
                    tracing::warn!(event = "watch.error", error = %message, "log watcher error");
                    continue;
                }
                None => {
                    tracing::warn!(event = "watch.closed", "log watcher stopped, polling only");
                    watcher = None;
                    continue;
                }
            },
        }

        match updater.tick() {
            Ok(TickOutcome::Unchanged) => {}
            Ok(TickOutcome::Updated { snapshot, .. }) => {
                dispatcher.publish(snapshot, OffsetDateTime::now_utc()).await;
            }
            Err(error) => {
                tracing::warn!(event = "tick.read_failed", error = %error, "skipping tick");
            }
        }
    }
}

async fn next_change(watcher: &mut Option<LogWatcher>) -> Option<WatchSignal> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bootstrap;
    use crate::domain::{
        AccessPolicy, Admission, AliasLookup, NoAliases, NoSessions, OnlineState, PacketState,
        ReflectorDialect, RelayDialect,
    };
    use crate::infra::{LogFile, LogLines, split_lines};
    use std::cell::Cell;
    use std::fs;
    use std::io::{self, Write};
    use std::path::PathBuf;
    use std::time::SystemTime;
    use tempfile::tempdir;

    /// In-memory log whose growth is driven by the test.
    struct ScriptedLog {
        text: String,
        grown: bool,
        failing_reads: Cell<usize>,
    }

    impl ScriptedLog {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                grown: true,
                failing_reads: Cell::new(0),
            }
        }

        fn append(&mut self, text: &str) {
            self.text.push_str(text);
            self.grown = true;
        }
    }

    impl LineSource for ScriptedLog {
        fn has_grown(&mut self) -> Result<bool, LogSourceError> {
            Ok(self.grown)
        }

        fn current_lines(&self) -> Result<LogLines, LogSourceError> {
            let failing = self.failing_reads.get();
            if failing > 0 {
                self.failing_reads.set(failing - 1);
                return Err(LogSourceError::Read {
                    path: PathBuf::from("svxreflector.log"),
                    source: io::Error::other("too many open files"),
                });
            }
            Ok(split_lines(self.text.as_bytes()))
        }

        fn mark_consumed(&mut self) {
            self.grown = false;
        }
    }

    fn aliases() -> Arc<dyn AliasLookup> {
        Arc::new(NoAliases)
    }

    fn updater_for(
        dialect: Box<dyn LogDialect>,
        text: &str,
    ) -> Updater<ScriptedLog> {
        let source = ScriptedLog::new(text);
        let log = source.current_lines().expect("lines");
        let outcome = bootstrap(dialect.as_ref(), &log, aliases()).expect("bootstrap");
        Updater::new(source, dialect, outcome)
    }

    const BANNER: &str = "03.11.2023 15:00:00: SvxReflector v1.2.0\n";

    #[test]
    fn login_talk_and_stop_scenario() {
        let mut updater = updater_for(Box::new(ReflectorDialect), BANNER);
        assert_eq!(updater.tick().expect("tick"), TickOutcome::Unchanged);

        updater.source.append(
            "03.11.2023 15:37:18: F1ABC-R: Login OK from 1.2.3.4:5 with protocol version 2.0\n\
             03.11.2023 15:38:00: F1ABC-R: Talker start on TG #33\n\
             03.11.2023 15:38:07: F1ABC-R: Talker stop on TG #33\n",
        );
        let TickOutcome::Updated { applied, snapshot } = updater.tick().expect("tick") else {
            panic!("expected update");
        };
        assert_eq!(applied, 3);
        assert_eq!(snapshot.len(), 1);
        let record = &snapshot[0];
        assert_eq!(record.callsign, "F1ABC-R");
        assert_eq!(record.online_state, OnlineState::Online);
        assert_eq!(record.talkgroup_id, "33");
        assert_eq!(record.packet_state, PacketState::End);
        assert!(record.delay_seconds > 0.0);
        assert_eq!(updater.cursor(), 4);
    }

    #[test]
    fn no_growth_means_no_mutation() {
        let mut updater = updater_for(
            Box::new(ReflectorDialect),
            "03.11.2023 15:00:00: SvxReflector v1.2.0\n03.11.2023 15:37:19: F1ABC-R: Select TG #33\n",
        );
        updater.tick().expect("first");
        let before = updater.table().snapshot();
        assert_eq!(updater.tick().expect("second"), TickOutcome::Unchanged);
        assert_eq!(updater.tick().expect("third"), TickOutcome::Unchanged);
        assert_eq!(updater.table().snapshot(), before);
    }

    #[test]
    fn partial_line_is_applied_once_complete() {
        let mut updater = updater_for(Box::new(ReflectorDialect), BANNER);
        updater.tick().expect("first");

        updater.source.append("03.11.2023 15:38:00: F1ABC-R: Talker st");
        assert_eq!(updater.tick().expect("partial"), TickOutcome::Unchanged);
        assert_eq!(updater.cursor(), 1);

        updater.source.append("art on TG #33\n");
        let TickOutcome::Updated { applied, snapshot } = updater.tick().expect("complete") else {
            panic!("expected update");
        };
        assert_eq!(applied, 1);
        assert_eq!(snapshot[0].talkgroup_id, "33");
        assert!(snapshot[0].is_transmitting());
    }

    #[test]
    fn failed_read_is_retried_on_next_tick() {
        let mut updater = updater_for(Box::new(ReflectorDialect), BANNER);
        updater.tick().expect("first");

        updater
            .source
            .append("03.11.2023 15:38:00: F1ABC-R: Talker start on TG #33\n");
        updater.source.failing_reads.set(1);
        assert!(matches!(updater.tick(), Err(LogSourceError::Read { .. })));
        assert_eq!(updater.cursor(), 1);

        let TickOutcome::Updated { applied, snapshot } = updater.tick().expect("retry") else {
            panic!("expected update");
        };
        assert_eq!(applied, 1);
        assert_eq!(snapshot[0].talkgroup_id, "33");
        assert_eq!(updater.cursor(), 2);
        assert_eq!(updater.tick().expect("settled"), TickOutcome::Unchanged);
    }

    #[test]
    fn shrinking_log_reanchors_cursor() {
        let mut updater = updater_for(
            Box::new(ReflectorDialect),
            "03.11.2023 15:00:00: SvxReflector v1.2.0\n03.11.2023 15:37:19: F1ABC-R: Select TG #33\n",
        );
        updater.tick().expect("first");
        assert_eq!(updater.cursor(), 2);

        updater.source.text = BANNER.to_string();
        updater.source.grown = true;
        assert_eq!(updater.tick().expect("shrunk"), TickOutcome::Unchanged);
        assert_eq!(updater.cursor(), 1);
    }

    #[test]
    fn relay_ignores_new_connection_summaries() {
        let mut updater = updater_for(
            Box::new(RelayDialect),
            "Fri Nov  3 15:00:00 2023: SvxLink v1.7.0\n\
             Fri Nov  3 15:00:03 2023: ReflectorLogic: Connected nodes: (EU)F1ABC\n",
        );
        updater.tick().expect("first");

        updater.source.append(
            "Fri Nov  3 15:05:00 2023: ReflectorLogic: Connected nodes: (EU)F9NEW\n\
             Fri Nov  3 15:05:01 2023: ReflectorLogic: Talker start on TG #208: F1ABC\n",
        );
        let TickOutcome::Updated { applied, snapshot } = updater.tick().expect("tick") else {
            panic!("expected update");
        };
        assert_eq!(applied, 1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].talkgroup_id, "208");
    }

    #[tokio::test]
    async fn run_updater_publishes_file_growth() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("svxreflector.log");
        fs::write(&path, BANNER).expect("write");

        let mut source = LogFile::open(&path).expect("open");
        let log = source.current_lines().expect("lines");
        let outcome = bootstrap(&ReflectorDialect, &log, aliases()).expect("bootstrap");
        source.has_grown().expect("prime");
        source.mark_consumed();
        let updater = Updater::new(source, Box::new(ReflectorDialect), outcome);

        let dispatcher = Arc::new(Dispatcher::new(
            AccessPolicy::default(),
            Arc::new(NoSessions),
            Vec::new(),
        ));
        let mut handle = dispatcher
            .register("127.0.0.1".parse().expect("ip"), "generic", Admission::Page)
            .await;
        assert!(handle.greeting.is_some());

        let mut file = fs::OpenOptions::new().append(true).open(&path).expect("append");
        file.write_all(b"03.11.2023 15:38:00: F1ABC-R: Talker start on TG #33\n")
            .expect("write");
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .expect("set mtime");
        drop(file);

        let updater_loop = run_updater(updater, dispatcher.clone(), Duration::from_millis(20), None);
        tokio::pin!(updater_loop);
        tokio::select! {
            _ = &mut updater_loop => panic!("updater loop ended"),
            received = tokio::time::timeout(Duration::from_secs(5), handle.updates.changed()) => {
                received.expect("published in time").expect("open");
            }
        }
        let text = handle.updates.borrow_and_update().clone();
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["TRAFFIC"][0]["CALLSIGN"], "F1ABC-R");
        assert_eq!(value["BIGEARS"], "1");
    }
}
