use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use relay_frame::Frame;

use crate::channel::ChannelSettings;
use crate::error::RendezvousError;
use crate::peer::PeerKey;
use crate::registry::Registry;

const PEER_TOKEN_HEADER: &str = "x-peer-token";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub heartbeat_interval: Duration,
    pub started_at: Instant,
    pub software: &'static str,
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PEER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    channel: Option<String>,
    port: i64,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InfoBody {
    software: &'static str,
    uptime_secs: u64,
    channels: usize,
}

pub async fn create_or_join(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<Json<ChannelSettings>, RendezvousError> {
    let token = header_token(&headers).or(body.token);
    let peer = PeerKey::resolve(token.as_deref(), addr);

    match body.channel {
        Some(channel_id) => {
            let channel = state.registry.join(&channel_id, peer)?;
            log::info!("channel {channel_id} joined by entrance");
            Ok(Json(channel.settings.clone()))
        }
        None => {
            if body.port < 0 {
                return Err(RendezvousError::Malformed("port must be >= 0".into()));
            }
            let channel = state.registry.create(body.port, peer)?;
            log::info!("channel {} created by exposer (port {})", channel.settings.channel, body.port);
            Ok(Json(channel.settings.clone()))
        }
    }
}

pub async fn receive(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RendezvousError> {
    let token = header_token(&headers);
    let peer = PeerKey::resolve(token.as_deref(), addr);
    let channel = state.registry.get(&channel_id)?;
    let role = channel.role_of(&peer).ok_or(RendezvousError::RoleConflict)?;
    let heartbeat_interval = state.heartbeat_interval;

    let body_stream = stream! {
        loop {
            match channel.recv(role, heartbeat_interval).await {
                Ok(Some(frame)) => {
                    let line = match frame.encode_line() {
                        Ok(line) => line,
                        Err(e) => {
                            log::warn!("receive: dropping frame that failed to encode: {e}");
                            continue;
                        }
                    };
                    yield Ok::<_, std::io::Error>(format!("{line}\n").into_bytes());
                }
                Ok(None) => yield Ok::<_, std::io::Error>(b"\n".to_vec()),
                Err(()) => break,
            }
        }
    };

    Ok((
        [("content-type", "application/x-ndjson")],
        Body::from_stream(body_stream),
    )
        .into_response())
}

pub async fn forward(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, RendezvousError> {
    let token = header_token(&headers);
    let peer = PeerKey::resolve(token.as_deref(), addr);
    let channel = state.registry.get(&channel_id)?;
    let role = channel.role_of(&peer).ok_or(RendezvousError::RoleConflict)?;

    for line in body.lines() {
        match Frame::decode_line(line) {
            Ok(Some(frame)) => channel.enqueue(role, frame).await,
            Ok(None) => {}
            Err(e) => {
                log::warn!("forward: rejecting malformed frame on channel {channel_id}: {e}");
                return Err(RendezvousError::Malformed(e.to_string()));
            }
        }
    }

    Ok(StatusCode::OK)
}

pub async fn delete(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> StatusCode {
    if state.registry.remove(&channel_id) {
        log::info!("channel {channel_id} deleted");
    }
    StatusCode::OK
}

pub async fn info(State(state): State<AppState>) -> Json<InfoBody> {
    Json(InfoBody {
        software: state.software,
        uptime_secs: state.started_at.elapsed().as_secs(),
        channels: state.registry.len(),
    })
}
