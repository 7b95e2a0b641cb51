//! Geofence records and the notification pass run on every mutation.
//!
//! A fence is a persistent search: the target geometry, mode and field
//! pattern captured from a `FENCE` search, plus the private pub/sub
//! channel the subscriber listens on. Each write to the spatial value
//! re-evaluates every fence against the changed geometry and publishes
//! `inside:<field>` or `outside:<field>`; deletes always publish
//! `outside:<field>`. No historical state is kept.

use crate::geo::geodesy;
use crate::geo::geom::{Geom, GeomRef};
use crate::geo::polymap::PolyMap;
use crate::geo::types::Coord;
use crate::glob::glob_match;
use crate::pubsub::PubSub;
use rand::RngCore;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Within,
    Intersects,
}

/// The exact filter applied to candidates after R-tree pruning, shared
/// by one-shot searches and registered fences.
pub struct SearchPredicate {
    pub mode: SearchMode,
    /// Set for radius targets; `geom` then holds the circle polygon.
    pub radius: Option<(Coord, f64)>,
    pub geom: Geom,
}

impl SearchPredicate {
    /// Evaluate against a prebuilt polygon map of the target geometry.
    pub fn matches_with_map(&self, candidate: GeomRef<'_>, target_map: &PolyMap<'_>) -> bool {
        if let Some((center, meters)) = self.radius {
            if candidate.is_simple_point() {
                return geodesy::coord_within_radius(candidate.center(), center, meters);
            }
        }
        let m = PolyMap::new(candidate);
        match self.mode {
            SearchMode::Within => m.within(target_map),
            SearchMode::Intersects => m.intersects(target_map),
        }
    }

    pub fn matches(&self, candidate: GeomRef<'_>) -> bool {
        let map = PolyMap::new(self.geom.as_ref());
        self.matches_with_map(candidate, &map)
    }
}

pub struct Fence {
    pub channel: String,
    /// `None` matches every field.
    pub pattern: Option<String>,
    pub predicate: SearchPredicate,
}

impl Fence {
    fn matches_field(&self, field: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(p) => glob_match(p, field),
        }
    }
}

/// Fresh private channel name: `fence$<18-hex-nonce>$<key>`.
pub fn fence_channel(key: &str) -> String {
    let mut nonce = [0u8; 9];
    rand::rng().fill_bytes(&mut nonce);
    let mut hex = String::with_capacity(18);
    for b in nonce {
        let _ = write!(hex, "{b:02x}");
    }
    format!("fence${hex}${key}")
}

/// The key a fence channel was registered against.
pub fn key_of_channel(channel: &str) -> Option<&str> {
    let rest = channel.strip_prefix("fence$")?;
    let idx = rest.find('$')?;
    Some(&rest[idx + 1..])
}

pub(crate) fn notify_set(fences: &[Fence], field: &str, geom: GeomRef<'_>, bus: &dyn PubSub) {
    for f in fences {
        if !f.matches_field(field) {
            continue;
        }
        let prefix = if f.predicate.matches(geom) {
            "inside:"
        } else {
            "outside:"
        };
        bus.publish(&f.channel, format!("{prefix}{field}").as_bytes());
    }
}

pub(crate) fn notify_delete(fences: &[Fence], field: &str, bus: &dyn PubSub) {
    for f in fences {
        if !f.matches_field(field) {
            continue;
        }
        bus.publish(&f.channel, format!("outside:{field}").as_bytes());
    }
}
