//! In-memory flydrop node served through the loopback core.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use fly_bridge::loopback::{Emitter, LoopbackCore, Reply};
use fly_bridge::messages::{
    CommandRequest, CommandResponse, CoreEvent, DeviceType, NodeConfig, PeerMetadata, QrPayload,
    QueryRequest, QueryResponse,
};
use fly_bridge::{ApiError, ApiResponse, Codec, EntryPoint, NamingPolicy};
use serde::Serialize;

#[derive(Debug)]
struct NodeState {
    conf: NodeConfig,
    discovering: bool,
    discovered: Vec<PeerMetadata>,
}

/// A node that answers the full message catalog from memory. Starting discovery "finds" one
/// simulated peer.
pub fn loopback_node(name: &str, naming: NamingPolicy) -> LoopbackCore {
    let state = Arc::new(Mutex::new(NodeState {
        conf: NodeConfig {
            name: name.to_owned(),
            id: format!("loopback-{name}").as_str().into(),
            ..NodeConfig::default()
        },
        discovering: false,
        discovered: Vec::new(),
    }));
    let codec = Codec::new(naming);
    LoopbackCore::builder()
        .respond(move |entry, raw, emitter| {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let payload = match entry {
                EntryPoint::Query => match codec.decode::<QueryRequest>(raw) {
                    Ok(q) => encode(codec, &answer_query(&state, q)),
                    Err(e) => encode(codec, &bad_request::<QueryResponse>(e)),
                },
                _ => match codec.decode::<CommandRequest>(raw) {
                    Ok(c) => encode(codec, &run_command(&mut state, c, codec, emitter)),
                    Err(e) => encode(codec, &bad_request::<CommandResponse>(e)),
                },
            };
            match payload {
                Some(p) => Reply::Respond(p),
                None => Reply::Drop,
            }
        })
        .build()
}

fn encode<T: Serialize>(codec: Codec, value: &T) -> Option<String> {
    match codec.encode(value) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(error = %e, "loopback node failed to encode its reply");
            None
        }
    }
}

fn bad_request<T>(e: serde_json::Error) -> ApiResponse<T> {
    ApiResponse::Err(ApiError {
        message: e.to_string(),
        kind: Some("bad_request".into()),
    })
}

fn simulated_peer() -> PeerMetadata {
    PeerMetadata {
        id: "simulated-phone".into(),
        typ: DeviceType::Mobile,
        name: "Simulated phone".into(),
        addr: SocketAddr::from(([127, 0, 0, 1], 50693)),
    }
}

fn self_metadata(conf: &NodeConfig) -> PeerMetadata {
    PeerMetadata {
        id: conf.id.clone(),
        typ: DeviceType::Desktop,
        name: conf.name.clone(),
        addr: SocketAddr::from(([127, 0, 0, 1], 50692)),
    }
}

fn answer_query(state: &NodeState, q: QueryRequest) -> ApiResponse<QueryResponse> {
    match q {
        QueryRequest::GetConf => ApiResponse::Ok(QueryResponse::Conf(state.conf.clone())),
        QueryRequest::GetDiscoveredPeers => {
            ApiResponse::Ok(QueryResponse::DiscoveredPeers(state.discovered.clone()))
        }
        QueryRequest::GetSharableQrCode(secret) => {
            let qr = QrPayload {
                secret: secret.unwrap_or_else(|| format!("{}-pairing", state.conf.id)),
                peer: self_metadata(&state.conf),
            };
            match serde_json::to_vec(&qr) {
                Ok(bytes) => ApiResponse::Ok(QueryResponse::SharableQrCode(bytes)),
                Err(e) => ApiResponse::Err(ApiError {
                    message: e.to_string(),
                    kind: Some("internal".into()),
                }),
            }
        }
    }
}

fn run_command(
    state: &mut NodeState,
    c: CommandRequest,
    codec: Codec,
    emitter: &Emitter,
) -> ApiResponse<CommandResponse> {
    let emit = |event: CoreEvent| {
        if let Some(raw) = encode(codec, &event) {
            emitter.emit(raw);
        }
    };
    match c {
        CommandRequest::StartDiscovery => {
            if !state.discovering {
                state.discovering = true;
                let peer = simulated_peer();
                if !state.discovered.contains(&peer) {
                    state.discovered.push(peer.clone());
                }
                emit(CoreEvent::Discovered(peer));
            }
        }
        CommandRequest::StopDiscovery => state.discovering = false,
        CommandRequest::SetConfig(conf) => state.conf = conf,
        CommandRequest::Pair(bytes) => {
            let qr: QrPayload = match serde_json::from_slice(&bytes) {
                Ok(qr) => qr,
                Err(e) => return bad_request(e),
            };
            let id = qr.peer.id.clone();
            if !state.conf.known_peers.iter().any(|p| p.id == id) {
                state.conf.known_peers.push(qr.peer);
            }
            emit(CoreEvent::PeerCtlSuccess(id));
        }
        CommandRequest::SendPeer(id, _request) => {
            let known = state.conf.known_peers.iter().any(|p| p.id == id)
                || state.discovered.iter().any(|p| p.id == id);
            if !known {
                return ApiResponse::Err(ApiError {
                    message: format!("unknown peer {id}"),
                    kind: Some("peer".into()),
                });
            }
            emit(CoreEvent::PeerCtlWaiting(id.clone()));
            emit(CoreEvent::PeerCtlSuccess(id));
        }
        CommandRequest::Ack(id, session, ack) => {
            tracing::debug!(%id, session, ?ack, "loopback node acknowledged session");
        }
    }
    ApiResponse::Ok(CommandResponse::Ok)
}
