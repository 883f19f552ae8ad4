//! Payload catalog of the flydrop node: queries, commands, and the events it emits.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::api::{Command, Query};

/// Stable peer identifier (hex-encoded certificate fingerprint on the native side).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    #[default]
    Unknown,
}

/// What a peer advertises about itself during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub id: PeerId,
    pub typ: DeviceType,
    pub name: String,
    pub addr: SocketAddr,
}

/// Persisted node settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub id: PeerId,
    #[serde(default)]
    pub known_peers: Vec<PeerMetadata>,
    #[serde(default)]
    pub auto_accept: bool,
}

/// Contents of a pairing QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub secret: String,
    pub peer: PeerMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRequest {
    GetConf,
    GetDiscoveredPeers,
    /// `Some(secret)` is the second stage of pairing two devices.
    GetSharableQrCode(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResponse {
    Conf(NodeConfig),
    DiscoveredPeers(Vec<PeerMetadata>),
    SharableQrCode(Vec<u8>),
}

impl Query for QueryRequest {
    type Response = QueryResponse;
}

/// Request carried to a peer inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRequest {
    LaunchUri(String),
}

/// Host answer to a peer's session request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerAck {
    Success,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandRequest {
    StartDiscovery,
    StopDiscovery,
    SendPeer(PeerId, PeerRequest),
    SetConfig(NodeConfig),
    /// Raw QR payload scanned from the other device.
    Pair(Vec<u8>),
    /// Answer session `u64` opened by the peer.
    Ack(PeerId, u64, PeerAck),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResponse {
    Ok,
}

impl Command for CommandRequest {
    type Response = CommandResponse;
}

/// Asynchronous notifications from the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreEvent {
    Discovered(PeerMetadata),
    /// Peer wants to open a URI; needs a [`CommandRequest::Ack`].
    AskLaunchUri(PeerId, u64, String),
    /// Peer opened a URI (auto-accepted).
    LaunchUri(PeerId, u64, String),
    PeerCtlWaiting(PeerId),
    PeerCtlSuccess(PeerId),
    PeerCtlCancel(PeerId),
    PeerCtlFailed(PeerId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    fn peer() -> PeerMetadata {
        PeerMetadata {
            id: "ab12".into(),
            typ: DeviceType::Desktop,
            name: "desk".into(),
            addr: "192.168.1.20:50692".parse().unwrap(),
        }
    }

    #[test]
    fn request_wire_shapes() {
        let codec = Codec::default();
        assert_eq!(codec.encode(&QueryRequest::GetConf).unwrap(), r#""get_conf""#);
        assert_eq!(
            codec
                .encode(&QueryRequest::GetSharableQrCode(Some("s".into())))
                .unwrap(),
            r#"{"get_sharable_qr_code":"s"}"#
        );
        assert_eq!(
            codec
                .encode(&CommandRequest::Ack("p".into(), 3, PeerAck::Success))
                .unwrap(),
            r#"{"ack":["p",3,"success"]}"#
        );
    }

    #[test]
    fn event_from_native_payload() {
        let codec = Codec::default();
        let ev: CoreEvent = codec
            .decode(r#"{"discovered": {"id": "ab12", "typ": "desktop", "name": "desk", "addr": "192.168.1.20:50692"}}"#)
            .unwrap();
        assert_eq!(ev, CoreEvent::Discovered(peer()));

        let ev: CoreEvent = codec
            .decode(r#"{"ask_launch_uri": ["ab12", 9, "https://example.com"]}"#)
            .unwrap();
        assert!(matches!(ev, CoreEvent::AskLaunchUri(_, 9, _)));
    }

    #[test]
    fn config_round_trips_through_codec() {
        let codec = Codec::default();
        let conf = NodeConfig {
            name: "laptop".into(),
            id: "ff00".into(),
            known_peers: vec![peer()],
            auto_accept: true,
        };
        let response = QueryResponse::Conf(conf);
        let back: QueryResponse = codec.decode(&codec.encode(&response).unwrap()).unwrap();
        assert_eq!(back, response);
    }
}
