//! Key → spatial value map with per-value exclusive access.
//!
//! The engine's execution model serialises every command touching a
//! value: on this threaded runtime that contract is met by taking the
//! value's mutex for the duration of each command. Values are created on
//! first write and removed once a delete empties them. The keyspace also
//! owns the fence bookkeeping per subscriber: one active fence per
//! client, released when the client goes away.

use crate::geo::geom::Geom;
use crate::pubsub::{MemoryBus, PubSub};
use crate::store::fence::{self, Fence, SearchPredicate};
use crate::store::value::SpatialValue;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct ClientFence {
    channel: String,
    key: String,
}

pub struct Keyspace {
    values: DashMap<String, Arc<Mutex<SpatialValue>>>,
    bus: Arc<dyn PubSub>,
    client_fences: Mutex<HashMap<u64, ClientFence>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::with_bus(Arc::new(MemoryBus::new()))
    }

    pub fn with_bus(bus: Arc<dyn PubSub>) -> Self {
        Keyspace {
            values: DashMap::new(),
            bus,
            client_fences: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<dyn PubSub> {
        &self.bus
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn key_count(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.iter().map(|e| e.key().clone()).collect()
    }

    fn value_arc(&self, key: &str) -> Option<Arc<Mutex<SpatialValue>>> {
        self.values.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Run `f` against an existing value; `None` when the key is absent.
    pub fn read<R>(&self, key: &str, f: impl FnOnce(&SpatialValue) -> R) -> Option<R> {
        let arc = self.value_arc(key)?;
        let guard = arc.lock();
        Some(f(&guard))
    }

    /// Mutate an existing value; `None` when the key is absent.
    pub fn write<R>(&self, key: &str, f: impl FnOnce(&mut SpatialValue) -> R) -> Option<R> {
        let arc = self.value_arc(key)?;
        let mut guard = arc.lock();
        Some(f(&mut guard))
    }

    /// Mutate the value, creating it first when the key is new.
    pub fn write_or_create<R>(&self, key: &str, f: impl FnOnce(&mut SpatialValue) -> R) -> R {
        let arc = {
            let entry = self
                .values
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SpatialValue::new())));
            Arc::clone(entry.value())
        };
        let mut guard = arc.lock();
        f(&mut guard)
    }

    /// Deleting the last field deletes the value itself.
    pub fn remove_if_empty(&self, key: &str) -> bool {
        let removed = self
            .values
            .remove_if(key, |_, v| v.lock().is_empty())
            .is_some();
        if removed {
            tracing::debug!(key, "removed empty spatial value");
        }
        removed
    }

    /// Used during snapshot load.
    pub(crate) fn insert_value(&self, key: String, value: SpatialValue) {
        self.values.insert(key, Arc::new(Mutex::new(value)));
    }

    pub fn for_each_value(&self, mut f: impl FnMut(&str, &SpatialValue)) {
        for entry in self.values.iter() {
            let guard = entry.value().lock();
            f(entry.key(), &guard);
        }
    }

    /// Clone of the geometry stored under another key/field, for MEMBER
    /// search targets.
    pub fn member_geometry(&self, key: &str, field: &str) -> Option<Geom> {
        self.read(key, |v| v.get(field).cloned()).flatten()
    }

    /// Register a fence for `client` on `key`, creating the value when
    /// needed. A client holds at most one fence; any previous one is
    /// released first. Returns the fence channel the client is now
    /// subscribed to.
    pub fn register_fence(
        &self,
        client: u64,
        key: &str,
        pattern: Option<String>,
        predicate: SearchPredicate,
    ) -> String {
        self.release_fences(client);
        let channel = fence::fence_channel(key);
        let record = Fence {
            channel: channel.clone(),
            pattern,
            predicate,
        };
        self.write_or_create(key, |v| v.add_fence(record));
        self.bus.subscribe(client, &channel);
        self.client_fences.lock().insert(
            client,
            ClientFence {
                channel: channel.clone(),
                key: key.to_string(),
            },
        );
        channel
    }

    /// Tear down the client's fence subscription, if any: the record is
    /// removed from its spatial value and the channel unsubscribed.
    pub fn release_fences(&self, client: u64) {
        let Some(cf) = self.client_fences.lock().remove(&client) else {
            return;
        };
        self.write(&cf.key, |v| v.remove_fence(&cf.channel));
        self.bus.unsubscribe(client, &cf.channel);
        tracing::debug!(client, channel = %cf.channel, "released fence");
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::wkt::DecodeOpts;
    use crate::store::fence::SearchMode;

    fn geom(s: &str) -> Geom {
        Geom::decode_wkt(s, DecodeOpts::default()).unwrap()
    }

    fn predicate() -> SearchPredicate {
        SearchPredicate {
            mode: SearchMode::Intersects,
            radius: None,
            geom: Geom::rect_polygon(crate::geo::types::Rect::new(0.0, 0.0, 1.0, 1.0)),
        }
    }

    #[test]
    fn test_create_on_write_remove_when_empty() {
        let ks = Keyspace::new();
        assert!(!ks.contains_key("k"));
        ks.write_or_create("k", |v| {
            v.set("f", geom("POINT(1 1)"), None);
        });
        assert!(ks.contains_key("k"));
        assert!(!ks.remove_if_empty("k"));
        ks.write("k", |v| {
            v.delete("f", None);
        });
        assert!(ks.remove_if_empty("k"));
        assert!(!ks.contains_key("k"));
    }

    #[test]
    fn test_member_geometry() {
        let ks = Keyspace::new();
        ks.write_or_create("k", |v| {
            v.set("f", geom("POINT(3 4)"), None);
        });
        let g = ks.member_geometry("k", "f").unwrap();
        assert_eq!(g.center().x, 3.0);
        assert!(ks.member_geometry("k", "missing").is_none());
        assert!(ks.member_geometry("missing", "f").is_none());
    }

    #[test]
    fn test_one_fence_per_client() {
        let ks = Keyspace::new();
        let ch1 = ks.register_fence(9, "a", None, predicate());
        let ch2 = ks.register_fence(9, "b", None, predicate());
        assert_ne!(ch1, ch2);
        assert_eq!(ks.read("a", |v| v.fence_count()), Some(0));
        assert_eq!(ks.read("b", |v| v.fence_count()), Some(1));
        ks.release_fences(9);
        assert_eq!(ks.read("b", |v| v.fence_count()), Some(0));
    }
}
