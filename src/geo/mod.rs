// Geometry core: the binary codec, WKT interchange, geodesy helpers,
// the polygon map driving the exact predicates, and map-cell helpers.

pub mod cell;
pub mod geodesy;
pub mod geom;
pub mod polymap;
pub mod types;
pub mod wkt;

pub use geom::{Geom, GeomRef, GeomType};
pub use polymap::PolyMap;
pub use types::{Coord, Rect};
pub use wkt::{DecodeOpts, EncodeOpts};
