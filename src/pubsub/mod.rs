//! Channel-based publish/subscribe used for geofence notifications.
//!
//! The engine never talks to sockets; it publishes through this trait
//! and the host decides how messages reach clients. `MemoryBus` is the
//! in-process implementation used by the embedded keyspace and the test
//! suite. Delivery is best-effort: a slow subscriber's queue drops its
//! oldest messages, writers are never blocked.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

pub trait PubSub: Send + Sync {
    fn subscribe(&self, client: u64, channel: &str);
    fn unsubscribe(&self, client: u64, channel: &str);
    /// Deliver to every subscriber of the channel; returns how many
    /// received it.
    fn publish(&self, channel: &str, message: &[u8]) -> usize;
}

/// Per-subscriber queue cap before old messages are dropped.
const DEFAULT_QUEUE_LIMIT: usize = 1024;

pub struct MemoryBus {
    channels: RwLock<HashMap<String, Vec<u64>>>,
    queues: RwLock<HashMap<u64, VecDeque<(String, Vec<u8>)>>>,
    queue_limit: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_queue_limit(DEFAULT_QUEUE_LIMIT)
    }

    pub fn with_queue_limit(queue_limit: usize) -> Self {
        MemoryBus {
            channels: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            queue_limit,
        }
    }

    /// Take every message queued for a client, in arrival order.
    pub fn drain(&self, client: u64) -> Vec<(String, Vec<u8>)> {
        let mut queues = self.queues.write();
        match queues.get_mut(&client) {
            Some(q) => q.drain(..).collect(),
            None => Vec::new(),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub for MemoryBus {
    fn subscribe(&self, client: u64, channel: &str) {
        let mut channels = self.channels.write();
        let subs = channels.entry(channel.to_string()).or_default();
        if !subs.contains(&client) {
            subs.push(client);
        }
        self.queues.write().entry(client).or_default();
    }

    fn unsubscribe(&self, client: u64, channel: &str) {
        let mut channels = self.channels.write();
        if let Some(subs) = channels.get_mut(channel) {
            subs.retain(|c| *c != client);
            if subs.is_empty() {
                channels.remove(channel);
            }
        }
    }

    fn publish(&self, channel: &str, message: &[u8]) -> usize {
        let channels = self.channels.read();
        let Some(subs) = channels.get(channel) else {
            return 0;
        };
        let mut queues = self.queues.write();
        let mut delivered = 0;
        for client in subs {
            let q = queues.entry(*client).or_default();
            while q.len() >= self.queue_limit {
                q.pop_front();
            }
            q.push_back((channel.to_string(), message.to_vec()));
            delivered += 1;
        }
        delivered
    }
}
