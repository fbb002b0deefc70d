use crate::domain::{
    DialectKind, LineEvent, LogDialect, NodePatch, NodeUpdate, OnlineState, PacketState,
    ReplayStrategy, Timing, parse_line_timestamp,
};

/// Column where the acting node's callsign starts: `DD.MM.YYYY HH:MM:SS: ` is 21 bytes.
const CALLSIGN_OFFSET: usize = 21;
/// `": "` between the callsign and the marker.
const CALLSIGN_SEPARATOR_LEN: usize = 2;

const SESSION_START: &str = "SvxReflector v1";
const CLIENT_PREFIX: &str = "Client ";
const CLIENT_CONNECTED: &str = " connected";
const LOGIN_OK_FROM: &str = "Login OK from";
const MONITOR_TG: &str = "Monitor TG#:";
const SELECT_TG: &str = "Select TG #";
const TALKER_START: &str = "Talker start on TG #";
const TALKER_STOP: &str = "Talker stop on TG #";
const TALKER_TIMEOUT: &str = "Talker audio timeout on TG #";
const PEER_DISCONNECT: &str = "disconnected: Connection closed by remote peer";
const LOCAL_DISCONNECT: &str = "disconnected: Locally ordered disconnect";

/// Position of the protocol version among the whitespace tokens after `Login OK from`:
/// `127.0.0.1:51560 with protocol version 2.0`.
const PROTOCOL_TOKEN: usize = 4;

/// Federated SvxReflector log. Every connection event is replayed, in file order.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReflectorDialect;

impl LogDialect for ReflectorDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Reflector
    }

    fn is_session_start(&self, line: &str) -> bool {
        line.contains(SESSION_START)
    }

    fn is_secondary_marker(&self, line: &str) -> bool {
        line.contains(CLIENT_PREFIX) && line.contains(CLIENT_CONNECTED)
    }

    fn parse_line(&self, line: &str) -> Option<LineEvent> {
        if line.is_empty() {
            return None;
        }
        if self.is_session_start(line) {
            return Some(LineEvent::SessionStart);
        }
        // The matching "Login OK" line carries the node; counting this one too would
        // register the same connection twice.
        if self.is_secondary_marker(line) {
            return Some(LineEvent::SessionMarker);
        }

        if let Some(index) = line.find(LOGIN_OK_FROM) {
            let callsign = callsign_before(line, index)?;
            let rest = &line[index + LOGIN_OK_FROM.len()..];
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let (ip, port) = match tokens.first() {
                Some(endpoint) => match endpoint.rsplit_once(':') {
                    Some((ip, port)) => (ip.to_string(), port.to_string()),
                    None => (endpoint.to_string(), String::new()),
                },
                None => (String::new(), String::new()),
            };
            let patch = NodePatch {
                ip: Some(ip),
                port: Some(port),
                protocol_version: Some(
                    tokens
                        .get(PROTOCOL_TOKEN)
                        .map(|token| token.to_string())
                        .unwrap_or_default(),
                ),
                timing: parse_line_timestamp(line).map(Timing::Start),
                packet_state: Some(PacketState::End),
                online_state: Some(OnlineState::Online),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        if let Some(index) = line.find(MONITOR_TG) {
            let callsign = callsign_before(line, index)?;
            let patch = NodePatch {
                monitoring: Some(after(line, index, MONITOR_TG)),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        if let Some(index) = line.find(SELECT_TG) {
            let callsign = callsign_before(line, index)?;
            let patch = NodePatch {
                talkgroup_id: Some(after(line, index, SELECT_TG)),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        if let Some(index) = line.find(TALKER_START) {
            let callsign = callsign_before(line, index)?;
            let patch = NodePatch {
                talkgroup_id: Some(after(line, index, TALKER_START)),
                timing: parse_line_timestamp(line).map(Timing::Start),
                packet_state: Some(PacketState::Start),
                online_state: Some(OnlineState::Online),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        if let Some(index) = line.find(TALKER_STOP) {
            let callsign = callsign_before(line, index)?;
            let patch = NodePatch {
                timing: parse_line_timestamp(line).map(Timing::Stop),
                packet_state: Some(PacketState::End),
                online_state: Some(OnlineState::Online),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        if let Some(index) = line.find(TALKER_TIMEOUT) {
            let callsign = callsign_before(line, index)?;
            let patch = NodePatch {
                online_state: Some(OnlineState::Timeout),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        // "Client 1.2.3.4:5 disconnected: ..." has no callsign yet.
        if line.contains(CLIENT_PREFIX) {
            return None;
        }
        if let Some(index) = line
            .find(PEER_DISCONNECT)
            .or_else(|| line.find(LOCAL_DISCONNECT))
        {
            let callsign = callsign_before(line, index)?;
            let patch = NodePatch {
                timing: parse_line_timestamp(line).map(Timing::Stop),
                packet_state: Some(PacketState::End),
                online_state: Some(OnlineState::Offline),
                ..NodePatch::default()
            };
            return node_event(callsign, patch);
        }

        None
    }

    fn replay_strategy(&self) -> ReplayStrategy {
        ReplayStrategy::EveryEvent
    }

    fn requires_session_start(&self) -> bool {
        false
    }
}

fn node_event(callsign: &str, patch: NodePatch) -> Option<LineEvent> {
    Some(LineEvent::Node(NodeUpdate {
        callsign: callsign.to_string(),
        patch,
    }))
}

fn callsign_before(line: &str, marker_index: usize) -> Option<&str> {
    let end = marker_index.checked_sub(CALLSIGN_SEPARATOR_LEN)?;
    let callsign = line.get(CALLSIGN_OFFSET..end)?.trim();
    if callsign.is_empty() {
        return None;
    }
    Some(callsign)
}

fn after(line: &str, index: usize, marker: &str) -> String {
    line[index + marker.len()..].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(line: &str) -> NodeUpdate {
        match ReflectorDialect.parse_line(line) {
            Some(LineEvent::Node(update)) => update,
            other => panic!("expected node event for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn login_carries_endpoint_and_protocol() {
        let update = node(
            "03.11.2023 15:37:18: F5XXX-R: Login OK from 127.0.0.1:51560 with protocol version 2.0",
        );
        assert_eq!(update.callsign, "F5XXX-R");
        assert_eq!(update.patch.ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(update.patch.port.as_deref(), Some("51560"));
        assert_eq!(update.patch.protocol_version.as_deref(), Some("2.0"));
        assert_eq!(update.patch.online_state, Some(OnlineState::Online));
        assert!(matches!(update.patch.timing, Some(Timing::Start(_))));
    }

    #[test]
    fn monitor_and_select_update_talkgroups() {
        let monitor = node("03.11.2023 15:37:18: F5XXX-R: Monitor TG#: [ 33 208 ]");
        assert_eq!(monitor.patch.monitoring.as_deref(), Some("[ 33 208 ]"));
        assert_eq!(monitor.patch.timing, None);

        let select = node("03.11.2023 15:37:19: F5ZXD-R: Select TG #33");
        assert_eq!(select.callsign, "F5ZXD-R");
        assert_eq!(select.patch.talkgroup_id.as_deref(), Some("33"));
    }

    #[test]
    fn talker_lines_move_packet_state() {
        let start = node("03.11.2023 14:15:06: F5ZXD-R: Talker start on TG #33");
        assert_eq!(start.patch.talkgroup_id.as_deref(), Some("33"));
        assert_eq!(start.patch.packet_state, Some(PacketState::Start));

        let stop = node("03.11.2023 14:15:08: F5ZXD-R: Talker stop on TG #33");
        assert_eq!(stop.patch.packet_state, Some(PacketState::End));
        assert!(matches!(stop.patch.timing, Some(Timing::Stop(_))));

        let timeout = node("17.09.2023 01:01:18: F5XXX-R: Talker audio timeout on TG #33");
        assert_eq!(timeout.patch.online_state, Some(OnlineState::Timeout));
    }

    #[test]
    fn both_disconnect_flavours_go_offline() {
        let peer = node("03.11.2023 14:15:56: F5XXX-R: disconnected: Connection closed by remote peer");
        assert_eq!(peer.callsign, "F5XXX-R");
        assert_eq!(peer.patch.online_state, Some(OnlineState::Offline));

        let local = node("03.11.2023 14:15:57: F1ABC-R: disconnected: Locally ordered disconnect");
        assert_eq!(local.patch.online_state, Some(OnlineState::Offline));
    }

    #[test]
    fn client_lines_are_markers_or_ignored() {
        assert_eq!(
            ReflectorDialect.parse_line("03.11.2023 15:37:18: Client 127.0.0.1:51560 connected"),
            Some(LineEvent::SessionMarker)
        );
        assert_eq!(
            ReflectorDialect.parse_line(
                "03.11.2023 15:37:18: Client 127.0.0.1:51560 disconnected: Connection closed by remote peer"
            ),
            None
        );
    }

    #[test]
    fn banner_wins_and_short_lines_never_panic() {
        assert_eq!(
            ReflectorDialect.parse_line("03.11.2023 15:00:00: SvxReflector v1.2.0 Copyright"),
            Some(LineEvent::SessionStart)
        );
        assert_eq!(ReflectorDialect.parse_line("Select TG #33"), None);
        assert_eq!(ReflectorDialect.parse_line("03.11.2023 15:37"), None);
        assert_eq!(ReflectorDialect.parse_line("03.11.2023 15:37:18: : Select TG #4"), None);
    }

    #[test]
    fn malformed_timestamp_still_applies_state() {
        let update = node("xx.11.2023 14:15:06: F5ZXD-R: Talker start on TG #33");
        assert_eq!(update.patch.timing, None);
        assert_eq!(update.patch.talkgroup_id.as_deref(), Some("33"));
        assert_eq!(update.patch.packet_state, Some(PacketState::Start));
    }
}
