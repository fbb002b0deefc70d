use crate::domain::EventTime;
use serde::{Serialize, Serializer};

/// Whether a node is currently keyed up.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketState {
    Start,
    #[default]
    End,
}

/// Connection state as asserted by the log. Serialized as the numeric code the dashboard
/// expects (`0..=3`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OnlineState {
    Offline,
    Online,
    Timeout,
    #[default]
    Unknown,
}

impl OnlineState {
    pub fn code(self) -> u8 {
        match self {
            Self::Offline => 0,
            Self::Online => 1,
            Self::Timeout => 2,
            Self::Unknown => 3,
        }
    }
}

impl Serialize for OnlineState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

pub const UNRESOLVED_RADIO_IDENTITY: &str = "{}";

/// One row of the dashboard. Field names on the wire match the dashboard page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeRecord {
    #[serde(rename = "CALLSIGN")]
    pub callsign: String,
    #[serde(rename = "TALKER")]
    pub talker: String,
    #[serde(rename = "TGID")]
    pub talkgroup_id: String,
    #[serde(rename = "MONITORING")]
    pub monitoring: String,
    #[serde(rename = "REGION")]
    pub region: String,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "PORT")]
    pub port: String,
    #[serde(rename = "PROTOCOL")]
    pub protocol_version: String,
    #[serde(rename = "DATE")]
    pub date: String,
    #[serde(rename = "TIME")]
    pub time: String,
    #[serde(rename = "STARTXMIT")]
    pub start_xmit_epoch_ms: i64,
    #[serde(rename = "DELAY")]
    pub delay_seconds: f64,
    #[serde(rename = "PACKET")]
    pub packet_state: PacketState,
    #[serde(rename = "ONLINE")]
    pub online_state: OnlineState,
    #[serde(rename = "RADIOID")]
    pub radio_identity: String,
}

impl NodeRecord {
    pub fn new(callsign: &str) -> Self {
        Self {
            callsign: callsign.to_string(),
            talker: callsign.to_string(),
            talkgroup_id: String::new(),
            monitoring: String::new(),
            region: String::new(),
            ip: String::new(),
            port: String::new(),
            protocol_version: String::new(),
            date: String::new(),
            time: String::new(),
            start_xmit_epoch_ms: 0,
            delay_seconds: 0.0,
            packet_state: PacketState::End,
            online_state: OnlineState::Unknown,
            radio_identity: UNRESOLVED_RADIO_IDENTITY.to_string(),
        }
    }

    pub fn is_transmitting(&self) -> bool {
        self.packet_state == PacketState::Start
    }
}

/// How an event moves a record's timing fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Timing {
    /// A transmission or connection began: stamp it and reset the delay.
    Start(EventTime),
    /// A transmission or connection ended: stamp it and compute the delay since start.
    Stop(EventTime),
}

/// Partial record update produced by a dialect parser. `None` leaves the field alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePatch {
    pub region: Option<String>,
    pub talkgroup_id: Option<String>,
    pub monitoring: Option<String>,
    pub ip: Option<String>,
    pub port: Option<String>,
    pub protocol_version: Option<String>,
    pub timing: Option<Timing>,
    pub packet_state: Option<PacketState>,
    pub online_state: Option<OnlineState>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeUpdate {
    pub callsign: String,
    pub patch: NodePatch,
}

/// What a single log line means to the monitor.
#[derive(Clone, Debug, PartialEq)]
pub enum LineEvent {
    /// The log producer (re)started: a new session begins after this line.
    SessionStart,
    /// A connection-level marker that only advances the replay cursor.
    SessionMarker,
    Node(NodeUpdate),
    /// Summary of every connected node, only used to seed the table at bootstrap.
    ConnectedNodes(Vec<NodeUpdate>),
}
