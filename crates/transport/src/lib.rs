//! Endpoint-side HTTP transport against the rendezvous server.
//!
//! A [`Transport`] is single-owner: one instance drives exactly one
//! channel, with one logical receive loop ([`Transport::receive`]) and one
//! forward serialiser ([`Transport::forward`]) per instance, matching the
//! "single outbound request at a time" requirement so PUTs never
//! interleave.

mod backoff;

use std::io;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::io::StreamReader;

use relay_frame::Frame;

use backoff::Backoff;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);
const FORWARD_RETRIES: u32 = 3;
const PEER_TOKEN_HEADER: &str = "x-peer-token";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("frame codec error: {0}")]
    Frame(#[from] relay_frame::FrameError),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response from rendezvous server: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("channel not found")]
    ChannelNotFound,
    #[error("caller is not a recognized peer of this channel")]
    RoleConflict,
    #[error("channel id already in use")]
    DuplicateChannel,
    #[error("transient rendezvous failure: {0}")]
    Transient(String),
}

impl TransportError {
    /// Whether an engine should treat this as fatal to the whole endpoint
    /// (persistent loss of R) rather than just the affected stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ChannelNotFound | TransportError::RoleConflict
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel: String,
    pub port: u16,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    port: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

enum Classification {
    Ok,
    NotFound,
    Forbidden,
    Conflict,
    Transient,
}

fn classify(status: StatusCode) -> Classification {
    match status {
        s if s.is_success() => Classification::Ok,
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Classification::NotFound,
        StatusCode::FORBIDDEN => Classification::Forbidden,
        StatusCode::CONFLICT => Classification::Conflict,
        _ => Classification::Transient,
    }
}

/// HTTP client abstraction hiding reconnection and framing from the
/// exposer/entrance engines.
pub struct Transport {
    client: Client,
    base_url: Url,
    channel_id: String,
    token: Option<String>,
    forward_lock: AsyncMutex<()>,
}

impl Transport {
    /// POST / with no `channel`, registering the caller as the exposer of
    /// a freshly minted channel.
    pub async fn create(
        base_url: Url,
        port: u16,
        token: Option<String>,
    ) -> Result<(Self, ChannelInfo), TransportError> {
        let client = Client::new();
        let info = Self::post_settings(&client, &base_url, None, port, token.as_deref()).await?;
        let transport = Self {
            client,
            base_url,
            channel_id: info.channel.clone(),
            token,
            forward_lock: AsyncMutex::new(()),
        };
        Ok((transport, info))
    }

    /// POST / with an existing `channel`, registering the caller as the
    /// client (entrance) of that channel.
    pub async fn join(
        base_url: Url,
        channel_id: String,
        token: Option<String>,
    ) -> Result<(Self, ChannelInfo), TransportError> {
        let client = Client::new();
        let info =
            Self::post_settings(&client, &base_url, Some(&channel_id), 0, token.as_deref()).await?;
        let transport = Self {
            client,
            base_url,
            channel_id: info.channel.clone(),
            token,
            forward_lock: AsyncMutex::new(()),
        };
        Ok((transport, info))
    }

    async fn post_settings(
        client: &Client,
        base_url: &Url,
        channel: Option<&str>,
        port: u16,
        token: Option<&str>,
    ) -> Result<ChannelInfo, TransportError> {
        let mut request = client.post(base_url.clone()).json(&CreateRequest {
            channel,
            port: port as i64,
            token,
        });
        if let Some(token) = token {
            request = request.header(PEER_TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        match classify(response.status()) {
            Classification::Ok => Ok(response.json::<ChannelInfo>().await?),
            Classification::NotFound => Err(TransportError::ChannelNotFound),
            Classification::Forbidden => Err(TransportError::RoleConflict),
            Classification::Conflict => Err(TransportError::DuplicateChannel),
            Classification::Transient => Err(TransportError::Transient(format!(
                "status {}",
                response.status()
            ))),
        }
    }

    fn channel_url(&self) -> Url {
        self.base_url
            .join(&self.channel_id)
            .expect("channel id is url-path-safe")
    }

    /// Long-poll R for frames addressed to this peer. The returned stream
    /// transparently reconnects on EOF or a transient network error with
    /// exponential backoff (1s initial, 30s cap), skipping heartbeats. The
    /// stream ends only when R reports the channel is gone or the caller
    /// is no longer a recognized peer of it — the engine should treat
    /// stream end as fatal and shut the endpoint down.
    pub fn receive(&self) -> impl Stream<Item = Frame> + '_ {
        stream! {
            let mut backoff = Backoff::default();

            'reconnect: loop {
                let mut request = self.client.get(self.channel_url());
                if let Some(token) = &self.token {
                    request = request.header(PEER_TOKEN_HEADER, token);
                }

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(e) => {
                        log::warn!("receive: connecting to rendezvous server failed: {e}");
                        backoff.sleep().await;
                        continue 'reconnect;
                    }
                };

                match classify(response.status()) {
                    Classification::Ok => {}
                    Classification::NotFound | Classification::Forbidden => {
                        log::error!(
                            "receive: channel {} is no longer reachable (status {})",
                            self.channel_id,
                            response.status(),
                        );
                        return;
                    }
                    Classification::Conflict | Classification::Transient => {
                        log::warn!("receive: transient status {} from rendezvous server", response.status());
                        backoff.sleep().await;
                        continue 'reconnect;
                    }
                }

                backoff.reset();

                let byte_stream = response
                    .bytes_stream()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
                let mut lines = tokio::io::BufReader::new(StreamReader::new(byte_stream)).lines();

                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match Frame::decode_line(&line) {
                            Ok(Some(frame)) => yield frame,
                            Ok(None) => continue,
                            Err(e) => {
                                log::warn!("receive: dropping malformed frame: {e}");
                            }
                        },
                        Ok(None) => {
                            log::debug!("receive: stream ended, reconnecting");
                            backoff.sleep().await;
                            continue 'reconnect;
                        }
                        Err(e) => {
                            log::warn!("receive: read error, reconnecting: {e}");
                            backoff.sleep().await;
                            continue 'reconnect;
                        }
                    }
                }
            }
        }
    }

    /// PUT /{channel} with one frame. Retries idempotently up to 3 times
    /// on transient failures; PUTs are serialised so only one outbound
    /// request is in flight per transport instance at a time.
    pub async fn forward(&self, frame: Frame) -> Result<(), TransportError> {
        let line = frame.encode_line()?;
        let _guard = self.forward_lock.lock().await;

        let mut last_error = TransportError::Transient("no attempt made".into());
        for attempt in 1..=FORWARD_RETRIES {
            let mut request = self
                .client
                .put(self.channel_url())
                .timeout(FORWARD_TIMEOUT)
                .body(line.clone());
            if let Some(token) = &self.token {
                request = request.header(PEER_TOKEN_HEADER, token);
            }

            match request.send().await {
                Ok(response) => match classify(response.status()) {
                    Classification::Ok => return Ok(()),
                    Classification::NotFound => return Err(TransportError::ChannelNotFound),
                    Classification::Forbidden => return Err(TransportError::RoleConflict),
                    Classification::Conflict | Classification::Transient => {
                        last_error =
                            TransportError::Transient(format!("status {}", response.status()));
                    }
                },
                Err(e) => last_error = TransportError::Transient(e.to_string()),
            }

            if attempt < FORWARD_RETRIES {
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
            }
        }

        Err(last_error)
    }

    /// DELETE /{channel}, then release HTTP resources. Idempotent: R
    /// returns 200 whether or not the channel still existed.
    pub async fn close(&self) -> Result<(), TransportError> {
        let mut request = self.client.delete(self.channel_url());
        if let Some(token) = &self.token {
            request = request.header(PEER_TOKEN_HEADER, token);
        }
        request.send().await?;
        Ok(())
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}
