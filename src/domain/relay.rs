use crate::domain::{
    DialectKind, LineEvent, LogDialect, NodePatch, NodeUpdate, OnlineState, PacketState,
    ReplayStrategy, Timing, parse_line_timestamp,
};

const SESSION_START: &str = "SvxLink v";
const CONNECTION_ESTABLISHED: &str = "ReflectorLogic: Connection established to";
const CONNECTED_NODES: &str = "Connected nodes:";
const TALKER_START: &str = "Talker start";
const TALKER_STOP: &str = "Talker stop";
const TALKGROUP_PREFIX: &str = " on TG #";

/// Standalone SvxLink node log.
///
/// Only the connected-nodes summary can introduce nodes; it is read once at bootstrap.
/// Afterwards only talker start/stop lines move the table.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelayDialect;

impl LogDialect for RelayDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Relay
    }

    fn is_session_start(&self, line: &str) -> bool {
        line.contains(SESSION_START)
    }

    fn is_secondary_marker(&self, line: &str) -> bool {
        line.contains(CONNECTION_ESTABLISHED)
    }

    fn parse_line(&self, line: &str) -> Option<LineEvent> {
        if line.is_empty() {
            return None;
        }
        if self.is_session_start(line) {
            return Some(LineEvent::SessionStart);
        }
        if let Some(index) = line.find(CONNECTED_NODES) {
            let listed = &line[index + CONNECTED_NODES.len()..];
            return Some(LineEvent::ConnectedNodes(parse_connected_nodes(line, listed)));
        }
        if let Some((talkgroup, callsign)) = parse_talker(line, TALKER_START) {
            let patch = NodePatch {
                talkgroup_id: talkgroup,
                timing: parse_line_timestamp(line).map(Timing::Start),
                packet_state: Some(PacketState::Start),
                online_state: Some(OnlineState::Online),
                ..NodePatch::default()
            };
            return Some(LineEvent::Node(NodeUpdate { callsign, patch }));
        }
        if let Some((_, callsign)) = parse_talker(line, TALKER_STOP) {
            let patch = NodePatch {
                timing: parse_line_timestamp(line).map(Timing::Stop),
                packet_state: Some(PacketState::End),
                online_state: Some(OnlineState::Online),
                ..NodePatch::default()
            };
            return Some(LineEvent::Node(NodeUpdate { callsign, patch }));
        }
        None
    }

    fn replay_strategy(&self) -> ReplayStrategy {
        ReplayStrategy::FirstSummary
    }

    fn requires_session_start(&self) -> bool {
        true
    }
}

/// `(EU)F1ABC, (EU)F5XYZ-L, F4DEF` into one seeding update per entry.
fn parse_connected_nodes(line: &str, listed: &str) -> Vec<NodeUpdate> {
    let stamp = parse_line_timestamp(line);
    listed
        .split(',')
        .filter_map(|entry| {
            let (region, callsign) = split_region(entry);
            if callsign.is_empty() {
                return None;
            }
            let patch = NodePatch {
                region: Some(region.to_string()),
                talkgroup_id: Some(String::new()),
                monitoring: Some(String::new()),
                timing: stamp.clone().map(Timing::Start),
                packet_state: Some(PacketState::End),
                online_state: Some(OnlineState::Online),
                ..NodePatch::default()
            };
            Some(NodeUpdate {
                callsign: callsign.to_string(),
                patch,
            })
        })
        .collect()
}

fn split_region(entry: &str) -> (&str, &str) {
    let entry = entry.trim();
    let Some(close) = entry.find(')') else {
        return ("", entry);
    };
    let region = entry
        .find('(')
        .filter(|open| *open < close)
        .map(|open| &entry[open + 1..close])
        .unwrap_or("");
    (region, entry[close + 1..].trim())
}

/// Accepts `Talker start: CALL` and `Talker start on TG #33: CALL`.
fn parse_talker(line: &str, marker: &str) -> Option<(Option<String>, String)> {
    let index = line.find(marker)?;
    let rest = &line[index + marker.len()..];

    let (talkgroup, callsign) = if let Some(callsign) = rest.strip_prefix(':') {
        (None, callsign)
    } else if let Some(rest) = rest.strip_prefix(TALKGROUP_PREFIX) {
        let (talkgroup, callsign) = rest.split_once(':')?;
        (Some(talkgroup.trim().to_string()), callsign)
    } else {
        return None;
    };

    let callsign = callsign.trim();
    if callsign.is_empty() {
        return None;
    }
    Some((talkgroup, callsign.to_string()))
}
