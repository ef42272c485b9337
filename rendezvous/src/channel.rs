use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use relay_frame::Frame;

use crate::peer::PeerKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSettings {
    pub channel: String,
    pub port: i64,
}

/// Which peer of a channel a request came from, as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Exposer,
    Entrance,
}

/// A channel's state: its two peer identities and the bounded FIFO pair
/// carrying frames between them. The mpsc sender half provides the
/// mandated blocking-backpressure policy for free — `send` awaits when
/// the queue is full instead of dropping.
pub struct Channel {
    pub settings: ChannelSettings,
    pub exposer_addr: PeerKey,
    client_addr: Mutex<Option<PeerKey>>,
    to_entrance_tx: mpsc::Sender<Frame>,
    to_entrance_rx: AsyncMutex<mpsc::Receiver<Frame>>,
    to_exposer_tx: mpsc::Sender<Frame>,
    to_exposer_rx: AsyncMutex<mpsc::Receiver<Frame>>,
    last_activity: Mutex<Instant>,
}

impl Channel {
    pub fn new(settings: ChannelSettings, exposer_addr: PeerKey, queue_capacity: usize) -> Self {
        let (to_entrance_tx, to_entrance_rx) = mpsc::channel(queue_capacity);
        let (to_exposer_tx, to_exposer_rx) = mpsc::channel(queue_capacity);
        Self {
            settings,
            exposer_addr,
            client_addr: Mutex::new(None),
            to_entrance_tx,
            to_entrance_rx: AsyncMutex::new(to_entrance_rx),
            to_exposer_tx,
            to_exposer_rx: AsyncMutex::new(to_exposer_rx),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn bind_entrance(&self, peer: PeerKey) {
        *self.client_addr.lock() = Some(peer);
    }

    pub fn client_addr(&self) -> Option<PeerKey> {
        self.client_addr.lock().clone()
    }

    /// Resolve which role, if any, `peer` plays in this channel. A peer
    /// that matches neither identity is a role conflict, not a 404 — the
    /// channel exists, the caller just isn't a party to it.
    pub fn role_of(&self, peer: &PeerKey) -> Option<Role> {
        if &self.exposer_addr == peer {
            return Some(Role::Exposer);
        }
        if self.client_addr.lock().as_ref() == Some(peer) {
            return Some(Role::Entrance);
        }
        None
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Route a frame from its sender's role onto the opposite queue.
    /// Blocks (the channel's natural backpressure) when that queue is
    /// full; never drops.
    pub async fn enqueue(&self, from: Role, frame: Frame) {
        self.touch();
        let result = match from {
            Role::Exposer => self.to_entrance_tx.send(frame).await,
            Role::Entrance => self.to_exposer_tx.send(frame).await,
        };
        if result.is_err() {
            log::debug!("enqueue: receiver for channel {} dropped", self.settings.channel);
        }
    }

    /// Wait up to `timeout` for the next frame addressed to `role`.
    /// `Ok(None)` means the wait elapsed (caller should emit a
    /// heartbeat); `Err(())` means the queue's sender was dropped, which
    /// only happens if the channel itself is being torn down.
    pub async fn recv(&self, role: Role, timeout: Duration) -> Result<Option<Frame>, ()> {
        let mut guard = match role {
            Role::Exposer => self.to_exposer_rx.lock().await,
            Role::Entrance => self.to_entrance_rx.lock().await,
        };
        match tokio::time::timeout(timeout, guard.recv()).await {
            Ok(Some(frame)) => {
                self.touch();
                Ok(Some(frame))
            }
            Ok(None) => Err(()),
            Err(_elapsed) => Ok(None),
        }
    }
}
