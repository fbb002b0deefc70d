use crate::domain::{NodePatch, NodeRecord, NodeUpdate, Timing, UNRESOLVED_RADIO_IDENTITY};
use std::fmt;
use std::sync::Arc;

/// Resolves a talker prefix to a serialized subscriber entry.
pub trait AliasLookup: Send + Sync {
    fn lookup(&self, talker: &str) -> Option<String>;
}

/// Directory used when no subscriber dump is loaded.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAliases;

impl AliasLookup for NoAliases {
    fn lookup(&self, _talker: &str) -> Option<String> {
        None
    }
}

/// Callsigns with a digit in position 2 or 3 (`F1ABC-R`, `DL1XYZ`) belong to an operator
/// who may carry a radio ID. Their talker is the leading word (`F1ABC`).
pub fn derive_talker(callsign: &str) -> Option<&str> {
    let has_digit = callsign.chars().skip(1).take(2).any(|c| c.is_ascii_digit());
    if !has_digit {
        return None;
    }
    let end = callsign
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(index, _)| index)
        .unwrap_or(callsign.len());
    if end == 0 {
        return None;
    }
    Some(&callsign[..end])
}

/// Live table of every node seen since bootstrap, in first-seen order.
///
/// Records are never removed: a node that leaves stays visible as `OFFLINE`.
#[derive(Clone)]
pub struct NodeTable {
    records: Vec<NodeRecord>,
    aliases: Arc<dyn AliasLookup>,
}

impl fmt::Debug for NodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTable")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new(Arc::new(NoAliases))
    }
}

impl NodeTable {
    pub fn new(aliases: Arc<dyn AliasLookup>) -> Self {
        Self {
            records: Vec::new(),
            aliases,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeRecord> {
        self.records.get(index)
    }

    pub fn find(&self, callsign: &str) -> Option<usize> {
        self.records.iter().position(|record| record.callsign == callsign)
    }

    /// Lookup-or-create. The same callsign always resolves to the same index.
    pub fn upsert(&mut self, callsign: &str) -> usize {
        if let Some(index) = self.find(callsign) {
            return index;
        }
        let mut record = NodeRecord::new(callsign);
        if let Some(talker) = derive_talker(callsign) {
            record.talker = talker.to_string();
            record.radio_identity = self
                .aliases
                .lookup(talker)
                .unwrap_or_else(|| UNRESOLVED_RADIO_IDENTITY.to_string());
        }
        self.records.push(record);
        self.records.len() - 1
    }

    /// Out-of-range indexes are ignored.
    pub fn apply_patch(&mut self, index: usize, patch: &NodePatch) {
        let Some(record) = self.records.get_mut(index) else {
            return;
        };

        if let Some(region) = &patch.region {
            record.region = region.clone();
        }
        if let Some(talkgroup) = &patch.talkgroup_id {
            record.talkgroup_id = talkgroup.clone();
        }
        if let Some(monitoring) = &patch.monitoring {
            record.monitoring = monitoring.clone();
        }
        if let Some(ip) = &patch.ip {
            record.ip = ip.clone();
        }
        if let Some(port) = &patch.port {
            record.port = port.clone();
        }
        if let Some(protocol) = &patch.protocol_version {
            record.protocol_version = protocol.clone();
        }
        match &patch.timing {
            Some(Timing::Start(at)) => {
                record.date = at.date.clone();
                record.time = at.time.clone();
                record.start_xmit_epoch_ms = at.epoch_ms;
                record.delay_seconds = 0.0;
            }
            Some(Timing::Stop(at)) => {
                record.date = at.date.clone();
                record.time = at.time.clone();
                if record.start_xmit_epoch_ms > 0 && at.epoch_ms >= record.start_xmit_epoch_ms {
                    record.delay_seconds =
                        (at.epoch_ms - record.start_xmit_epoch_ms) as f64 / 1000.0;
                }
            }
            None => {}
        }
        if let Some(packet) = patch.packet_state {
            record.packet_state = packet;
        }
        if let Some(online) = patch.online_state {
            record.online_state = online;
        }
    }

    pub fn apply(&mut self, update: &NodeUpdate) -> usize {
        let index = self.upsert(&update.callsign);
        self.apply_patch(index, &update.patch);
        index
    }

    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventTime, OnlineState, PacketState};
    use std::collections::HashMap;

    struct FixedAliases(HashMap<String, String>);

    impl AliasLookup for FixedAliases {
        fn lookup(&self, talker: &str) -> Option<String> {
            self.0.get(talker).cloned()
        }
    }

    fn at(epoch_ms: i64) -> EventTime {
        EventTime {
            epoch_ms,
            date: "03-11-2023".to_string(),
            time: "14:15:06".to_string(),
        }
    }

    #[test]
    fn upsert_is_idempotent_and_keeps_order() {
        let mut table = NodeTable::default();
        let a = table.upsert("F1ABC-R");
        let b = table.upsert("F5XYZ-L");
        assert_eq!(table.upsert("F1ABC-R"), a);
        assert_eq!(table.upsert("F5XYZ-L"), b);
        assert_eq!(table.len(), 2);

        let calls: Vec<String> = table.snapshot().into_iter().map(|r| r.callsign).collect();
        assert_eq!(calls, vec!["F1ABC-R", "F5XYZ-L"]);
    }

    #[test]
    fn delay_is_stop_minus_start_in_seconds() {
        let mut table = NodeTable::default();
        let index = table.upsert("F1ABC-R");
        table.apply_patch(
            index,
            &NodePatch {
                timing: Some(Timing::Start(at(1_000_000))),
                packet_state: Some(PacketState::Start),
                ..NodePatch::default()
            },
        );
        assert!(table.get(index).is_some_and(NodeRecord::is_transmitting));

        table.apply_patch(
            index,
            &NodePatch {
                timing: Some(Timing::Stop(at(1_002_500))),
                packet_state: Some(PacketState::End),
                ..NodePatch::default()
            },
        );
        let record = table.get(index).expect("record");
        assert_eq!(record.delay_seconds, 2.5);
        assert_eq!(record.start_xmit_epoch_ms, 1_000_000);
        assert_eq!(record.packet_state, PacketState::End);
    }

    #[test]
    fn stop_without_start_keeps_zero_delay() {
        let mut table = NodeTable::default();
        let index = table.upsert("F1ABC-R");
        table.apply_patch(
            index,
            &NodePatch {
                timing: Some(Timing::Stop(at(5_000))),
                ..NodePatch::default()
            },
        );
        assert_eq!(table.get(index).expect("record").delay_seconds, 0.0);
    }

    #[test]
    fn later_events_overwrite_online_state() {
        let mut table = NodeTable::default();
        for state in [OnlineState::Online, OnlineState::Timeout, OnlineState::Offline] {
            table.apply(&NodeUpdate {
                callsign: "F1ABC-R".to_string(),
                patch: NodePatch {
                    online_state: Some(state),
                    ..NodePatch::default()
                },
            });
        }
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(0).map(|r| r.online_state),
            Some(OnlineState::Offline)
        );
    }

    #[test]
    fn talker_prefix_resolves_alias() {
        let aliases = FixedAliases(HashMap::from([(
            "F1ABC".to_string(),
            r#"{"callsign":"F1ABC","radio_id":2080001}"#.to_string(),
        )]));
        let mut table = NodeTable::new(Arc::new(aliases));

        let known = table.upsert("F1ABC-R");
        let unknown = table.upsert("F4ZZZ-L");
        let reflector = table.upsert("XLX208");

        let known = table.get(known).expect("known");
        assert_eq!(known.talker, "F1ABC");
        assert!(known.radio_identity.contains("2080001"));

        let unknown = table.get(unknown).expect("unknown");
        assert_eq!(unknown.talker, "F4ZZZ");
        assert_eq!(unknown.radio_identity, UNRESOLVED_RADIO_IDENTITY);

        let reflector = table.get(reflector).expect("reflector");
        assert_eq!(reflector.talker, "XLX208");
        assert_eq!(reflector.radio_identity, UNRESOLVED_RADIO_IDENTITY);
    }

    #[test]
    fn derive_talker_needs_an_early_digit() {
        assert_eq!(derive_talker("F1ABC-R"), Some("F1ABC"));
        assert_eq!(derive_talker("DL1XYZ"), Some("DL1XYZ"));
        assert_eq!(derive_talker("ON4ABC/P"), Some("ON4ABC"));
        assert_eq!(derive_talker("XLX208"), None);
        assert_eq!(derive_talker("A"), None);
        assert_eq!(derive_talker(""), None);
    }
}
