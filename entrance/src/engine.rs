use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;
use uuid::Uuid;

use relay_frame::{Frame, MAX_PAYLOAD};
use relay_transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("rendezvous transport was lost")]
    TransportLost,
    #[error("failed to bind local listener: {0}")]
    Bind(#[source] std::io::Error),
}

/// A stream's write half plus a handle to abort its paired reader pump.
/// Removing a `StreamHandle` from `Engine::streams` and aborting its pump
/// together drop both socket halves, actually closing the fd instead of
/// leaking a blocked reader.
struct StreamHandle {
    write_half: OwnedWriteHalf,
    pump: AbortHandle,
}

/// Owns the local TCP listener and the `stream_id -> local socket` map.
/// Only the Entrance originates streams: the Exposer never initiates an
/// OPEN, so inbound control frames for an unknown id are always discarded.
pub struct Engine {
    transport: Transport,
    listener: TcpListener,
    streams: Mutex<HashMap<String, StreamHandle>>,
    shutdown: Notify,
}

impl Engine {
    pub async fn bind(transport: Transport, port: u16) -> Result<Arc<Self>, EngineError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(EngineError::Bind)?;
        Ok(Arc::new(Self {
            transport,
            listener,
            streams: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        }))
    }

    pub async fn run(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut frames = Box::pin(self.transport.receive());
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            log::info!("local accept from {peer}");
                            self.clone().spawn_stream(socket);
                        }
                        Err(e) => log::warn!("local accept failed: {e}"),
                    }
                }
                frame = frames.next() => {
                    match frame {
                        Some(frame) => self.handle_frame(frame).await,
                        None => {
                            log::error!("entrance: rendezvous receive loop ended, shutting down");
                            return Err(EngineError::TransportLost);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    log::error!("entrance: transport reported a fatal error, shutting down");
                    return Err(EngineError::TransportLost);
                }
            }
        }
    }

    fn spawn_stream(self: Arc<Self>, socket: tokio::net::TcpStream) {
        tokio::spawn(async move {
            let id = Uuid::new_v4().to_string();
            let (read_half, write_half) = socket.into_split();
            let engine = self.clone();
            let id_for_pump = id.clone();
            // The pump only starts reading once OPEN has been sent, so a
            // fast local write can never race DATA ahead of it.
            let (opened_tx, opened_rx) = tokio::sync::oneshot::channel::<()>();
            let join = tokio::spawn(async move {
                let _ = opened_rx.await;
                engine.pump(id_for_pump, read_half).await;
            });
            let pump = join.abort_handle();
            self.streams
                .lock()
                .await
                .insert(id.clone(), StreamHandle { write_half, pump });
            log::debug!("stream {id}: opened locally");
            self.emit_open(id).await;
            let _ = opened_tx.send(());
        });
    }

    async fn handle_frame(&self, frame: Frame) {
        let exists = self.streams.lock().await.contains_key(&frame.id);
        match (frame.is_control(), exists) {
            (false, true) => self.write_data(&frame.id, frame.data.unwrap()).await,
            (false, false) => log::debug!("entrance: discarding DATA for unknown stream {}", frame.id),
            (true, true) => self.close_stream(&frame.id).await,
            (true, false) => log::debug!("entrance: discarding peer-initiated OPEN/CLOSE for {}", frame.id),
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

    async fn pump(&self, id: String, mut read_half: OwnedReadHalf) {
        let mut buf = vec![0u8; MAX_PAYLOAD];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    log::debug!("stream {id}: local EOF");
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

    async fn emit_open(&self, id: String) {
        if let Err(e) = self.transport.forward(Frame::control(id.clone())).await {
            log::warn!("stream {id}: failed to emit OPEN: {e}");
            if e.is_fatal() {
                self.shutdown.notify_one();
            }
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
