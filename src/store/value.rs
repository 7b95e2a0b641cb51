//! The spatial value: an ordered field → geometry hash paired with an
//! R-tree over the geometries' bounding rectangles.
//!
//! The hash is the durable state; the tree and the handle bijection are
//! derived and rebuilt from it on load. The tree stores opaque handles
//! drawn from a per-value monotonic counter so that nothing pins the
//! hash's internal storage: `handle_to_field` / `field_to_handle` carry
//! the translation both ways. Mutations keep all four structures in step
//! with a remove-old then insert-new ordering.

use crate::geo::geom::Geom;
use crate::geo::types::Rect;
use crate::glob::glob_match;
use crate::index::rtree::RTree;
use crate::pubsub::PubSub;
use crate::store::fence::{self, Fence};
use std::collections::{BTreeMap, HashMap};

pub struct SpatialValue {
    geom_hash: BTreeMap<String, Geom>,
    tree: RTree,
    next_handle: u64,
    handle_to_field: BTreeMap<u64, String>,
    field_to_handle: HashMap<String, u64>,
    fences: Vec<Fence>,
}

impl SpatialValue {
    pub fn new() -> Self {
        SpatialValue {
            geom_hash: BTreeMap::new(),
            tree: RTree::new(),
            next_handle: 0,
            handle_to_field: BTreeMap::new(),
            field_to_handle: HashMap::new(),
            fences: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.geom_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geom_hash.is_empty()
    }

    pub fn exists(&self, field: &str) -> bool {
        self.geom_hash.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Geom> {
        self.geom_hash.get(field)
    }

    /// Encoded byte length of the stored blob; 0 when the field is
    /// absent.
    pub fn value_len(&self, field: &str) -> usize {
        self.geom_hash.get(field).map_or(0, |g| g.size())
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.geom_hash.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Geom)> {
        self.geom_hash.iter()
    }

    /// Store a geometry under `field`, replacing any previous entry, and
    /// run the fence pass when a bus is supplied. Returns true when the
    /// field already existed.
    pub fn set(&mut self, field: &str, geom: Geom, bus: Option<&dyn PubSub>) -> bool {
        let bounds = geom.bounds();
        let updated = self.remove_entry(field);
        self.next_handle += 1;
        let handle = self.next_handle;
        self.handle_to_field.insert(handle, field.to_string());
        self.field_to_handle.insert(field.to_string(), handle);
        self.tree.insert(bounds, handle);
        self.geom_hash.insert(field.to_string(), geom);
        if let Some(bus) = bus {
            if let Some(g) = self.geom_hash.get(field) {
                fence::notify_set(&self.fences, field, g.as_ref(), bus);
            }
        }
        updated
    }

    /// Drop a field, publishing the synthetic `outside:` notification
    /// when a bus is supplied. Returns true when the field existed.
    pub fn delete(&mut self, field: &str, bus: Option<&dyn PubSub>) -> bool {
        let removed = self.remove_entry(field);
        if removed {
            if let Some(bus) = bus {
                fence::notify_delete(&self.fences, field, bus);
            }
        }
        removed
    }

    fn remove_entry(&mut self, field: &str) -> bool {
        let Some(handle) = self.field_to_handle.get(field).copied() else {
            return false;
        };
        let bounds = self
            .geom_hash
            .get(field)
            .map(|g| g.bounds())
            .unwrap_or_default();
        self.tree.remove(&bounds, handle);
        self.field_to_handle.remove(field);
        self.handle_to_field.remove(&handle);
        self.geom_hash.remove(field);
        true
    }

    /// Candidate walk for the search engine: every stored geometry whose
    /// MBR overlaps `rect`, resolved back to its field. The visitor
    /// returns false to stop.
    pub fn search_overlapping(&self, rect: &Rect, f: &mut impl FnMut(&str, &Geom) -> bool) {
        self.tree.search(rect, &mut |_, handle| {
            if let Some(field) = self.handle_to_field.get(&handle) {
                if let Some(g) = self.geom_hash.get(field) {
                    return f(field, g);
                }
            }
            true
        });
    }

    /// Leaf count of the spatial index (always equals `len`).
    pub fn index_len(&self) -> usize {
        self.tree.count()
    }

    /// Every (field, MBR) pair currently indexed.
    pub fn index_rects(&self) -> Vec<(String, Rect)> {
        let everything = Rect::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::INFINITY);
        let mut out = Vec::with_capacity(self.len());
        self.tree.search(&everything, &mut |rect, handle| {
            if let Some(field) = self.handle_to_field.get(&handle) {
                out.push((field.clone(), *rect));
            }
            true
        });
        out
    }

    /// Cursor walk over the ordered fields. The cursor is an offset into
    /// the field order; `count` bounds how many entries are examined per
    /// call and the pattern filters what is returned. A zero cursor in
    /// the reply means the walk is complete.
    pub fn scan(
        &self,
        cursor: u64,
        pattern: Option<&str>,
        count: usize,
    ) -> (u64, Vec<(&String, &Geom)>) {
        let count = count.max(1);
        let mut out = Vec::new();
        let mut examined = 0usize;
        for (field, geom) in self.geom_hash.iter().skip(cursor as usize) {
            if examined == count {
                return (cursor + examined as u64, out);
            }
            examined += 1;
            let keep = match pattern {
                None => true,
                Some(p) => glob_match(p, field),
            };
            if keep {
                out.push((field, geom));
            }
        }
        (0, out)
    }

    pub fn add_fence(&mut self, fence: Fence) {
        self.fences.push(fence);
    }

    /// Remove the fence bound to `channel`; true when one was present.
    pub fn remove_fence(&mut self, channel: &str) -> bool {
        let before = self.fences.len();
        self.fences.retain(|f| f.channel != channel);
        self.fences.len() != before
    }

    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }
}

impl Default for SpatialValue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::wkt::DecodeOpts;

    fn geom(s: &str) -> Geom {
        Geom::decode_wkt(s, DecodeOpts::default()).unwrap()
    }

    #[test]
    fn test_set_get_delete() {
        let mut v = SpatialValue::new();
        assert!(!v.set("a", geom("POINT(1 2)"), None));
        assert!(v.set("a", geom("POINT(3 4)"), None));
        assert_eq!(v.len(), 1);
        assert_eq!(v.get("a").map(|g| g.center().x), Some(3.0));
        assert!(v.delete("a", None));
        assert!(!v.delete("a", None));
        assert!(v.is_empty());
    }

    #[test]
    fn test_tree_tracks_hash() {
        let mut v = SpatialValue::new();
        for i in 0..50 {
            let s = format!("POINT({} {})", i, i);
            v.set(&format!("f{i}"), geom(&s), None);
        }
        assert_eq!(v.index_len(), v.len());
        for i in (0..50).step_by(2) {
            v.delete(&format!("f{i}"), None);
        }
        assert_eq!(v.len(), 25);
        assert_eq!(v.index_len(), 25);
        // every indexed MBR matches the stored geometry's bounds
        for (field, rect) in v.index_rects() {
            let g = v.get(&field).expect("indexed field missing from hash");
            assert_eq!(g.bounds(), rect);
        }
    }

    #[test]
    fn test_overwrite_reindexes() {
        let mut v = SpatialValue::new();
        v.set("a", geom("POINT(0 0)"), None);
        v.set("a", geom("POINT(50 50)"), None);
        let mut hits = Vec::new();
        v.search_overlapping(&Rect::new(-1.0, -1.0, 1.0, 1.0), &mut |f, _| {
            hits.push(f.to_string());
            true
        });
        assert!(hits.is_empty());
        v.search_overlapping(&Rect::new(49.0, 49.0, 51.0, 51.0), &mut |f, _| {
            hits.push(f.to_string());
            true
        });
        assert_eq!(hits, vec!["a".to_string()]);
    }

    #[test]
    fn test_scan_full_traversal() {
        let mut v = SpatialValue::new();
        for i in 0..23 {
            v.set(&format!("f{i:02}"), geom("POINT(0 0)"), None);
        }
        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, batch) = v.scan(cursor, None, 5);
            seen.extend(batch.into_iter().map(|(f, _)| f.clone()));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 23);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn test_scan_match_filter() {
        let mut v = SpatialValue::new();
        v.set("truck1", geom("POINT(0 0)"), None);
        v.set("truck2", geom("POINT(0 0)"), None);
        v.set("car1", geom("POINT(0 0)"), None);
        let (next, batch) = v.scan(0, Some("truck*"), 100);
        assert_eq!(next, 0);
        assert_eq!(batch.len(), 2);
    }
}
