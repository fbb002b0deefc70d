use crate::domain::NodeRecord;
use serde::Serialize;

#[derive(Serialize)]
struct TrafficMessage<'a> {
    #[serde(rename = "TRAFFIC")]
    traffic: &'a [NodeRecord],
    #[serde(rename = "BIGEARS", skip_serializing_if = "Option::is_none")]
    big_ears: Option<String>,
}

#[derive(Serialize)]
struct ConfigMessage<'a> {
    #[serde(rename = "CONFIG")]
    config: ConfigPackets<'a>,
}

#[derive(Serialize)]
struct ConfigPackets<'a> {
    #[serde(rename = "PACKETS")]
    packets: ConfigTraffic<'a>,
}

#[derive(Serialize)]
struct ConfigTraffic<'a> {
    #[serde(rename = "TRAFFIC")]
    traffic: &'a [NodeRecord],
}

/// Routine tick message. `observers` is only reported to dashboard pages.
pub fn encode_traffic(
    nodes: &[NodeRecord],
    observers: Option<usize>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&TrafficMessage {
        traffic: nodes,
        big_ears: observers.map(|count| count.to_string()),
    })
}

/// Greeting sent once when an observer is admitted.
pub fn encode_config(nodes: &[NodeRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ConfigMessage {
        config: ConfigPackets {
            packets: ConfigTraffic { traffic: nodes },
        },
    })
}
