//! Flattened polygon view of any geometry, plus the exact Euclidean
//! intersects/within predicates that run after R-tree pruning.
//!
//! The map is a directory only: every ring is a `CoordSeq` pointing into
//! the geometry blob, so building a map never copies coordinates and the
//! map must not outlive its geometry.

use crate::geo::geom::{CoordSeq, GeomRef, Shape};
use crate::geo::types::Rect;

/// Where a point sits relative to a ring (or a region).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointPos {
    Outside,
    Boundary,
    Inside,
}

pub struct PolyMap<'a> {
    bounds: Rect,
    /// Outer rings. Points and lines contribute a single degenerate ring.
    polygons: Vec<CoordSeq<'a>>,
    /// Hole rings of `polygons[i]`.
    holes: Vec<Vec<CoordSeq<'a>>>,
}

impl<'a> PolyMap<'a> {
    pub fn new(g: GeomRef<'a>) -> PolyMap<'a> {
        let mut m = PolyMap {
            bounds: g.bounds(),
            polygons: Vec::new(),
            holes: Vec::new(),
        };
        m.push_geom(g);
        m
    }

    fn push_geom(&mut self, g: GeomRef<'a>) {
        match g.shape() {
            Shape::Point(seq) | Shape::LineString(seq) | Shape::MultiPoint(seq) => {
                self.polygons.push(seq);
                self.holes.push(Vec::new());
            }
            Shape::Polygon(rings) => {
                let mut it = rings.iter();
                match it.next() {
                    Some(outer) => {
                        self.polygons.push(outer);
                        self.holes.push(it.collect());
                    }
                    None => {
                        self.polygons.push(CoordSeq::empty());
                        self.holes.push(Vec::new());
                    }
                }
            }
            Shape::MultiLineString(rings) => {
                for line in rings.iter() {
                    self.polygons.push(line);
                    self.holes.push(Vec::new());
                }
            }
            Shape::MultiPolygon(polys) => {
                for rings in polys.iter() {
                    let mut it = rings.iter();
                    match it.next() {
                        Some(outer) => {
                            self.polygons.push(outer);
                            self.holes.push(it.collect());
                        }
                        None => {
                            self.polygons.push(CoordSeq::empty());
                            self.holes.push(Vec::new());
                        }
                    }
                }
            }
            Shape::GeometryCollection(_) => {
                for child in g.collection_iter(true) {
                    self.push_geom(child);
                }
            }
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    fn rings(&self) -> impl Iterator<Item = &CoordSeq<'a>> {
        self.polygons
            .iter()
            .chain(self.holes.iter().flatten())
            .filter(|r| !r.is_empty())
    }

    /// Region containment for one polygon entry: inside the outer ring
    /// and not strictly inside any of its holes.
    fn entry_point_pos(outer: &CoordSeq<'a>, holes: &[CoordSeq<'a>], p: (f64, f64)) -> PointPos {
        match ring_point_pos(outer, p) {
            PointPos::Outside => PointPos::Outside,
            PointPos::Boundary => PointPos::Boundary,
            PointPos::Inside => {
                for hole in holes {
                    match ring_point_pos(hole, p) {
                        PointPos::Inside => return PointPos::Outside,
                        PointPos::Boundary => return PointPos::Boundary,
                        PointPos::Outside => {}
                    }
                }
                PointPos::Inside
            }
        }
    }

    /// Point-in-region test over the whole map (closure: boundary counts).
    fn contains_point(&self, p: (f64, f64)) -> bool {
        self.polygons
            .iter()
            .zip(self.holes.iter())
            .any(|(outer, holes)| Self::entry_point_pos(outer, holes, p) != PointPos::Outside)
    }

    /// True when the two mapped regions cross, touch, or contain one
    /// another. Rings with holes are evaluated as outer-minus-holes.
    pub fn intersects(&self, target: &PolyMap<'_>) -> bool {
        if !self.bounds.intersects(&target.bounds) {
            return false;
        }
        for ra in self.rings() {
            for rb in target.rings() {
                if rings_touch(ra, rb) {
                    return true;
                }
            }
        }
        for (outer, _) in self.polygons.iter().zip(self.holes.iter()) {
            for i in 0..outer.len() {
                if target.contains_point(outer.point(i)) {
                    return true;
                }
            }
        }
        for (outer, _) in target.polygons.iter().zip(target.holes.iter()) {
            for i in 0..outer.len() {
                if self.contains_point(outer.point(i)) {
                    return true;
                }
            }
        }
        false
    }

    /// True when this map lies entirely inside the target: every vertex
    /// of every ring sits in some target region, and no ring of this map
    /// properly crosses a target ring.
    pub fn within(&self, target: &PolyMap<'_>) -> bool {
        let mut seen_vertex = false;
        for ring in self.polygons.iter().chain(self.holes.iter().flatten()) {
            for i in 0..ring.len() {
                seen_vertex = true;
                if !target.contains_point(ring.point(i)) {
                    return false;
                }
            }
        }
        if !seen_vertex {
            return false;
        }
        for ra in self.rings() {
            for rb in target.rings() {
                if rings_properly_cross(ra, rb) {
                    return false;
                }
            }
        }
        true
    }
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// `p` assumed collinear with a-b: is it between them?
fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

/// Segment intersection including endpoint and collinear contact.
/// Degenerate (zero-length) segments behave as points.
fn segments_touch(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), p4: (f64, f64)) -> bool {
    let d1 = cross(p3, p4, p1);
    let d2 = cross(p3, p4, p2);
    let d3 = cross(p1, p2, p3);
    let d4 = cross(p1, p2, p4);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

/// Strictly transversal crossing; shared endpoints and collinear overlap
/// do not count.
fn segments_properly_cross(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), p4: (f64, f64)) -> bool {
    let d1 = cross(p3, p4, p1);
    let d2 = cross(p3, p4, p2);
    let d3 = cross(p1, p2, p3);
    let d4 = cross(p1, p2, p4);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

fn ring_edge(ring: &CoordSeq<'_>, i: usize) -> ((f64, f64), (f64, f64)) {
    let a = ring.point(i);
    let b = ring.point((i + 1) % ring.len());
    (a, b)
}

/// Ray-cast position of a point relative to a ring. The ring is treated
/// as implicitly closed; rings with fewer than three vertices enclose
/// nothing and can only report Boundary or Outside.
fn ring_point_pos(ring: &CoordSeq<'_>, p: (f64, f64)) -> PointPos {
    let n = ring.len();
    if n == 0 {
        return PointPos::Outside;
    }
    for i in 0..n {
        let (a, b) = ring_edge(ring, i);
        if cross(a, b, p) == 0.0 && on_segment(a, b, p) {
            return PointPos::Boundary;
        }
    }
    let mut inside = false;
    for i in 0..n {
        let (a, b) = ring_edge(ring, i);
        if (a.1 > p.1) != (b.1 > p.1) {
            let t = (b.0 - a.0) * (p.1 - a.1) / (b.1 - a.1) + a.0;
            if p.0 < t {
                inside = !inside;
            }
        }
    }
    if inside {
        PointPos::Inside
    } else {
        PointPos::Outside
    }
}

/// Any pair of edges touching or crossing.
fn rings_touch(a: &CoordSeq<'_>, b: &CoordSeq<'_>) -> bool {
    for i in 0..a.len() {
        let (a1, a2) = ring_edge(a, i);
        for j in 0..b.len() {
            let (b1, b2) = ring_edge(b, j);
            if segments_touch(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

fn rings_properly_cross(a: &CoordSeq<'_>, b: &CoordSeq<'_>) -> bool {
    for i in 0..a.len() {
        let (a1, a2) = ring_edge(a, i);
        for j in 0..b.len() {
            let (b1, b2) = ring_edge(b, j);
            if segments_properly_cross(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}
