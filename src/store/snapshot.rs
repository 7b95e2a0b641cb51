//! Snapshot encode/load for spatial values.
//!
//! Only the field → geometry hash is serialised; the R-tree and the
//! handle bijection are derived state, rebuilt deterministically by
//! replaying `set` for every field (without fence notifications). A blob
//! that fails validation on load is skipped and logged, never fatal, and
//! the counts are reported so operators can see it happened.

use crate::error::{GeoError, Result};
use crate::geo::geom::Geom;
use crate::pubsub::PubSub;
use crate::store::keyspace::Keyspace;
use crate::store::value::SpatialValue;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::warn;

#[derive(Serialize, Deserialize)]
struct ValueSnapshot {
    fields: Vec<(String, Vec<u8>)>,
}

#[derive(Serialize, Deserialize)]
struct KeyspaceSnapshot {
    values: Vec<(String, ValueSnapshot)>,
}

/// Outcome counters of a snapshot load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub skipped: usize,
}

impl AddAssign for LoadStats {
    fn add_assign(&mut self, other: LoadStats) {
        self.loaded += other.loaded;
        self.skipped += other.skipped;
    }
}

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

pub fn encode_value(value: &SpatialValue) -> Result<Vec<u8>> {
    let snap = ValueSnapshot {
        fields: value
            .entries()
            .map(|(f, g)| (f.clone(), g.as_bytes().to_vec()))
            .collect(),
    };
    bincode::serde::encode_to_vec(&snap, config()).map_err(|e| GeoError::Snapshot(e.to_string()))
}

/// Rebuild a spatial value from raw hash entries, skipping blobs that no
/// longer validate.
pub fn rebuild_value(entries: impl IntoIterator<Item = (String, Vec<u8>)>) -> (SpatialValue, LoadStats) {
    let mut value = SpatialValue::new();
    let mut stats = LoadStats::default();
    for (field, bytes) in entries {
        match Geom::from_encoded(bytes) {
            Ok(g) => {
                value.set(&field, g, None);
                stats.loaded += 1;
            }
            Err(err) => {
                warn!(field = %field, error = %err, "skipping invalid geometry blob in snapshot");
                stats.skipped += 1;
            }
        }
    }
    (value, stats)
}

pub fn decode_value(bytes: &[u8]) -> Result<(SpatialValue, LoadStats)> {
    let (snap, _): (ValueSnapshot, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| GeoError::Snapshot(e.to_string()))?;
    Ok(rebuild_value(snap.fields))
}

pub fn encode_keyspace(ks: &Keyspace) -> Result<Vec<u8>> {
    let mut values = Vec::new();
    ks.for_each_value(|key, value| {
        values.push((
            key.to_string(),
            ValueSnapshot {
                fields: value
                    .entries()
                    .map(|(f, g)| (f.clone(), g.as_bytes().to_vec()))
                    .collect(),
            },
        ));
    });
    bincode::serde::encode_to_vec(&KeyspaceSnapshot { values }, config())
        .map_err(|e| GeoError::Snapshot(e.to_string()))
}

pub fn load_keyspace(bytes: &[u8], bus: Arc<dyn PubSub>) -> Result<(Keyspace, LoadStats)> {
    let (snap, _): (KeyspaceSnapshot, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| GeoError::Snapshot(e.to_string()))?;
    let ks = Keyspace::with_bus(bus);
    let mut stats = LoadStats::default();
    for (key, vsnap) in snap.values {
        let (value, vstats) = rebuild_value(vsnap.fields);
        stats += vstats;
        if !value.is_empty() {
            ks.insert_value(key, value);
        }
    }
    Ok((ks, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::wkt::DecodeOpts;
    use crate::pubsub::MemoryBus;

    fn geom(s: &str) -> Geom {
        Geom::decode_wkt(s, DecodeOpts::default()).unwrap()
    }

    #[test]
    fn test_value_round_trip() {
        let mut v = SpatialValue::new();
        v.set("a", geom("POINT(1 2)"), None);
        v.set("b", geom("POLYGON((0 0,1 0,1 1,0 0))"), None);
        let bytes = encode_value(&v).unwrap();
        let (loaded, stats) = decode_value(&bytes).unwrap();
        assert_eq!(stats, LoadStats { loaded: 2, skipped: 0 });
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.index_len(), 2);
        assert_eq!(loaded.get("a"), v.get("a"));
        assert_eq!(loaded.get("b"), v.get("b"));
    }

    #[test]
    fn test_rebuild_skips_invalid_blobs() {
        let entries = vec![
            ("good".to_string(), geom("POINT(1 1)").into_bytes()),
            ("bad".to_string(), vec![1, 2, 3]),
            ("also_good".to_string(), geom("POINT(2 2)").into_bytes()),
        ];
        let (value, stats) = rebuild_value(entries);
        assert_eq!(stats, LoadStats { loaded: 2, skipped: 1 });
        assert_eq!(value.len(), 2);
        assert!(!value.exists("bad"));
    }

    #[test]
    fn test_reload_searches_identically() {
        let mut v = SpatialValue::new();
        for i in 0..40 {
            let s = format!("POINT({} {})", i % 10, i / 10);
            v.set(&format!("f{i}"), geom(&s), None);
        }
        let (reloaded, _) = decode_value(&encode_value(&v).unwrap()).unwrap();
        let window = crate::geo::types::Rect::new(2.0, 0.0, 5.0, 2.0);
        let collect = |value: &SpatialValue| {
            let mut fields = Vec::new();
            value.search_overlapping(&window, &mut |f, _| {
                fields.push(f.to_string());
                true
            });
            fields.sort();
            fields
        };
        assert_eq!(collect(&v), collect(&reloaded));
    }

    #[test]
    fn test_keyspace_round_trip() {
        let ks = Keyspace::new();
        ks.write_or_create("k1", |v| {
            v.set("f", geom("POINT(1 1)"), None);
        });
        ks.write_or_create("k2", |v| {
            v.set("g", geom("POINT(2 2)"), None);
        });
        let bytes = encode_keyspace(&ks).unwrap();
        let (loaded, stats) = load_keyspace(&bytes, Arc::new(MemoryBus::new())).unwrap();
        assert_eq!(stats.loaded, 2);
        assert_eq!(loaded.key_count(), 2);
        assert_eq!(loaded.read("k2", |v| v.len()), Some(1));
    }
}
