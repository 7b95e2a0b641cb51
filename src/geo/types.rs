//! Coordinate and rectangle primitives shared by the codec, the polygon
//! map and the R-tree.

use serde::{Deserialize, Serialize};

/// A coordinate with up to four axes. The Z and M axes are only meaningful
/// when the owning geometry declares them; undeclared axes read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub m: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0, m: 0.0 }
    }

    pub fn with_zm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Self { x, y, z, m }
    }
}

/// Axis-aligned rectangle, `min <= max` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub min: Coord,
    pub max: Coord,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: Coord::new(min_x, min_y),
            max: Coord::new(max_x, max_y),
        }
    }

    /// Rectangle covering a single coordinate.
    pub fn point(c: Coord) -> Self {
        Self { min: c, max: c }
    }

    pub fn center(&self) -> Coord {
        Coord::with_zm(
            (self.max.x - self.min.x) / 2.0 + self.min.x,
            (self.max.y - self.min.y) / 2.0 + self.min.y,
            (self.max.z - self.min.z) / 2.0 + self.min.z,
            (self.max.m - self.min.m) / 2.0 + self.min.m,
        )
    }

    /// Grow the rectangle to include `c` on every axis.
    pub fn expand(&mut self, c: Coord) {
        if c.x < self.min.x {
            self.min.x = c.x;
        }
        if c.y < self.min.y {
            self.min.y = c.y;
        }
        if c.z < self.min.z {
            self.min.z = c.z;
        }
        if c.m < self.min.m {
            self.min.m = c.m;
        }
        if c.x > self.max.x {
            self.max.x = c.x;
        }
        if c.y > self.max.y {
            self.max.y = c.y;
        }
        if c.z > self.max.z {
            self.max.z = c.z;
        }
        if c.m > self.max.m {
            self.max.m = c.m;
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let mut r = *self;
        r.expand(other.min);
        r.expand(other.max);
        r
    }

    /// 2D overlap test on the x/y axes.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// 2D containment test for a coordinate.
    pub fn contains_coord(&self, c: &Coord) -> bool {
        c.x >= self.min.x && c.x <= self.max.x && c.y >= self.min.y && c.y <= self.max.y
    }

    pub fn area(&self) -> f64 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }
}
