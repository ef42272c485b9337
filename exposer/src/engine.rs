use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;

use relay_frame::{Frame, MAX_PAYLOAD};
use relay_transport::Transport;

use crate::config::Target;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("rendezvous transport was lost")]
    TransportLost,
}

/// A stream's write half plus a handle to abort its paired reader pump.
/// Removing a `StreamHandle` from `Engine::streams` and aborting its pump
/// together drop both socket halves, actually closing the fd instead of
/// leaking a blocked reader.
struct StreamHandle {
    write_half: OwnedWriteHalf,
    pump: AbortHandle,
}

/// Owns the `stream_id -> outbound socket` map and the single transport
/// instance. One frame-dispatch task (driven by `run`) consumes
/// `transport.receive()`; each open stream additionally owns a reader
/// pump task feeding `transport.forward()`.
pub struct Engine {
    transport: Transport,
    target: Target,
    streams: Mutex<HashMap<String, StreamHandle>>,
    shutdown: Notify,
}

impl Engine {
    pub fn new(transport: Transport, target: Target) -> Arc<Self> {
        Arc::new(Self {
            transport,
            target,
            streams: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        })
    }

    pub async fn run(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut frames = Box::pin(self.transport.receive());
        loop {
            tokio::select! {
                frame = frames.next() => {
                    match frame {
                        Some(frame) => self.handle_frame(frame).await,
                        None => {
                            log::error!("exposer: rendezvous receive loop ended, shutting down");
                            return Err(EngineError::TransportLost);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    log::error!("exposer: transport reported a fatal error, shutting down");
                    return Err(EngineError::TransportLost);
                }
            }
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: Frame) {
        let exists = self.streams.lock().await.contains_key(&frame.id);
        match (frame.is_control(), exists) {
            (true, false) => self.open_stream(frame.id).await,
            (true, true) => self.close_stream(&frame.id).await,
            (false, true) => self.write_data(&frame.id, frame.data.unwrap()).await,
            (false, false) => log::debug!("exposer: discarding DATA for unknown stream {}", frame.id),
        }
    }

    async fn open_stream(self: &Arc<Self>, id: String) {
        let addr = format!("{}:{}", self.target.host, self.target.port);
        log::debug!("stream {id}: dialing {addr}");
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                log::info!("stream {id}: dialed {addr}");
                let (read_half, write_half) = stream.into_split();
                let join = tokio::spawn(self.clone().pump(id.clone(), read_half));
                let pump = join.abort_handle();
                self.streams
                    .lock()
                    .await
                    .insert(id, StreamHandle { write_half, pump });
            }
            Err(e) => {
                log::warn!("stream {id}: dial {addr} failed: {e}");
                self.emit_close(id).await;
            }
        }
    }

    async fn close_stream(&self, id: &str) {
        if let Some(handle) = self.streams.lock().await.remove(id) {
            handle.pump.abort();
            log::info!("stream {id}: closed by peer");
        }
    }

    async fn write_data(&self, id: &str, data: Bytes) {
        let mut streams = self.streams.lock().await;
        let Some(handle) = streams.get_mut(id) else {
            return;
        };
        if let Err(e) = handle.write_half.write_all(&data).await {
            log::warn!("stream {id}: write error: {e}");
            if let Some(handle) = streams.remove(id) {
                handle.pump.abort();
            }
            drop(streams);
            self.emit_close(id.to_string()).await;
        }
    }

    async fn pump(self: Arc<Self>, id: String, mut read_half: OwnedReadHalf) {
        let mut buf = vec![0u8; MAX_PAYLOAD];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    log::debug!("stream {id}: target EOF");
                    break;
                }
                Ok(n) => {
                    let payload = Bytes::copy_from_slice(&buf[..n]);
                    if let Err(e) = self.transport.forward(Frame::data(id.clone(), payload)).await {
                        log::warn!("stream {id}: forward failed: {e}");
                        if e.is_fatal() {
                            self.shutdown.notify_one();
                        }
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("stream {id}: read error: {e}");
                    break;
                }
            }
        }
        let removed = self.streams.lock().await.remove(&id).is_some();
        if removed {
            self.emit_close(id).await;
        }
    }

    async fn emit_close(&self, id: String) {
        if let Err(e) = self.transport.forward(Frame::control(id.clone())).await {
            log::warn!("stream {id}: failed to emit CLOSE: {e}");
            if e.is_fatal() {
                self.shutdown.notify_one();
            }
        }
    }
}
