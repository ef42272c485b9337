use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::channel::{Channel, ChannelSettings};
use crate::error::RendezvousError;
use crate::peer::PeerKey;

/// In-memory `channel_id -> Channel` map. Coarse-grained read-write lock
/// over the map is sufficient: creation/join/delete are rare relative to
/// the per-channel queue traffic they guard access to.
pub struct Registry {
    channels: RwLock<AHashMap<String, Arc<Channel>>>,
    queue_capacity: usize,
}

impl Registry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            channels: RwLock::new(AHashMap::new()),
            queue_capacity,
        }
    }

    pub fn create(&self, port: i64, exposer_addr: PeerKey) -> Result<Arc<Channel>, RendezvousError> {
        let id = Uuid::new_v4().to_string();
        let settings = ChannelSettings {
            channel: id.clone(),
            port,
        };
        let channel = Arc::new(Channel::new(settings, exposer_addr, self.queue_capacity));

        let mut channels = self.channels.write();
        if channels.contains_key(&id) {
            return Err(RendezvousError::DuplicateChannel);
        }
        channels.insert(id, channel.clone());
        Ok(channel)
    }

    pub fn join(&self, channel_id: &str, entrance_addr: PeerKey) -> Result<Arc<Channel>, RendezvousError> {
        let channel = self.get(channel_id)?;
        if channel.exposer_addr == entrance_addr {
            return Err(RendezvousError::RoleConflict);
        }
        match channel.client_addr() {
            Some(existing) if existing != entrance_addr => return Err(RendezvousError::RoleConflict),
            _ => channel.bind_entrance(entrance_addr),
        }
        Ok(channel)
    }

    pub fn get(&self, channel_id: &str) -> Result<Arc<Channel>, RendezvousError> {
        self.channels
            .read()
            .get(channel_id)
            .cloned()
            .ok_or(RendezvousError::ChannelNotFound)
    }

    /// Idempotent: returns true if a channel existed and was removed.
    pub fn remove(&self, channel_id: &str) -> bool {
        self.channels.write().remove(channel_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Remove every channel idle longer than `idle_timeout`. Run
    /// periodically from a background task.
    pub fn reap_idle(&self, idle_timeout: Duration) {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|id, channel| {
            let keep = channel.idle_for() < idle_timeout;
            if !keep {
                log::info!("reaping idle channel {id}");
            }
            keep
        });
        let reaped = before - channels.len();
        if reaped > 0 {
            log::info!("idle-reap sweep removed {reaped} channel(s)");
        }
    }
}
