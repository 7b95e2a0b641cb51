//! Encoded geometry blobs.
//!
//! The in-memory and on-wire form of every geometry is a single contiguous
//! buffer: one endianness byte (0 = big, 1 = little; always the host's),
//! a u32 type code offset by 0/1000/2000/3000 to flag base/Z/M/ZM axis
//! widths, then the kind-specific payload. Series counts are u32 and
//! coordinates are packed f64s, so a coordinate occupies 16, 24 or 32
//! bytes depending on the declared axes. All higher layers (bounds,
//! polygon maps, search) read this layout directly without decoding into
//! an object tree.

use crate::error::{GeoError, Result};
use crate::geo::types::{Coord, Rect};
use crate::geo::{geodesy, wkt};
use serde_json::{json, Value};

/// Endianness marker for blobs produced on this host.
pub(crate) const ENDIAN_BYTE: u8 = if cfg!(target_endian = "little") { 1 } else { 0 };

/// Endian byte plus type code.
pub(crate) const HEADER_LEN: usize = 5;

/// The seven geometry kinds, tagged by the base type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeomType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

impl GeomType {
    pub fn base_code(self) -> u32 {
        self as u32
    }

    fn from_base(code: u32) -> Option<Self> {
        match code {
            1 => Some(GeomType::Point),
            2 => Some(GeomType::LineString),
            3 => Some(GeomType::Polygon),
            4 => Some(GeomType::MultiPoint),
            5 => Some(GeomType::MultiLineString),
            6 => Some(GeomType::MultiPolygon),
            7 => Some(GeomType::GeometryCollection),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GeomType::Point => "POINT",
            GeomType::LineString => "LINESTRING",
            GeomType::Polygon => "POLYGON",
            GeomType::MultiPoint => "MULTIPOINT",
            GeomType::MultiLineString => "MULTILINESTRING",
            GeomType::MultiPolygon => "MULTIPOLYGON",
            GeomType::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }
}

/// Decoded type code: kind plus the Z/M axis flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub kind: GeomType,
    pub z: bool,
    pub m: bool,
}

impl Header {
    pub fn decode(code: u32) -> Result<Self> {
        let (base, z, m) = if (3000..=3999).contains(&code) {
            (code - 3000, true, true)
        } else if (2000..=2999).contains(&code) {
            (code - 2000, false, true)
        } else if (1000..=1999).contains(&code) {
            (code - 1000, true, false)
        } else if code <= 999 {
            (code, false, false)
        } else {
            return Err(GeoError::Input);
        };
        let kind = GeomType::from_base(base).ok_or(GeoError::Input)?;
        Ok(Header { kind, z, m })
    }

    pub fn code(self) -> u32 {
        let offset = match (self.z, self.m) {
            (true, true) => 3000,
            (false, true) => 2000,
            (true, false) => 1000,
            (false, false) => 0,
        };
        self.kind.base_code() + offset
    }

    pub fn dims(self) -> usize {
        2 + self.z as usize + self.m as usize
    }

    pub fn coord_size(self) -> usize {
        self.dims() * 8
    }
}

#[inline]
pub(crate) fn ne_u32(buf: &[u8], pos: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[pos..pos + 4]);
    u32::from_ne_bytes(b)
}

#[inline]
pub(crate) fn ne_f64(buf: &[u8], pos: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[pos..pos + 8]);
    f64::from_ne_bytes(b)
}

#[inline]
pub(crate) fn put_u32(buf: &mut Vec<u8>, n: u32) {
    buf.extend_from_slice(&n.to_ne_bytes());
}

#[inline]
pub(crate) fn put_f64(buf: &mut Vec<u8>, n: f64) {
    buf.extend_from_slice(&n.to_ne_bytes());
}

/// Bounds-checked count read used while validating foreign buffers.
fn read_count(buf: &[u8], pos: &mut usize) -> Result<usize> {
    if *pos + 4 > buf.len() {
        return Err(GeoError::Input);
    }
    let n = ne_u32(buf, *pos) as usize;
    *pos += 4;
    Ok(n)
}

fn advance(buf: &[u8], pos: usize, by: usize) -> Result<usize> {
    let end = pos.checked_add(by).ok_or(GeoError::Memory)?;
    if end > buf.len() {
        return Err(GeoError::Input);
    }
    Ok(end)
}

/// Validate one fully encoded geometry starting at `pos` and return the
/// offset one past its end. Every declared count is range-checked before
/// anything behind it is trusted.
pub(crate) fn validate_at(buf: &[u8], pos: usize) -> Result<usize> {
    if pos + HEADER_LEN > buf.len() {
        return Err(GeoError::Input);
    }
    if buf[pos] != ENDIAN_BYTE {
        return Err(GeoError::Input);
    }
    let h = Header::decode(ne_u32(buf, pos + 1))?;
    let csz = h.coord_size();
    let mut p = pos + HEADER_LEN;
    match h.kind {
        GeomType::Point => {
            p = advance(buf, p, csz)?;
        }
        GeomType::LineString | GeomType::MultiPoint => {
            let n = read_count(buf, &mut p)?;
            p = advance(buf, p, n.checked_mul(csz).ok_or(GeoError::Memory)?)?;
        }
        GeomType::Polygon | GeomType::MultiLineString => {
            let rings = read_count(buf, &mut p)?;
            for _ in 0..rings {
                let n = read_count(buf, &mut p)?;
                p = advance(buf, p, n.checked_mul(csz).ok_or(GeoError::Memory)?)?;
            }
        }
        GeomType::MultiPolygon => {
            let polys = read_count(buf, &mut p)?;
            for _ in 0..polys {
                let rings = read_count(buf, &mut p)?;
                for _ in 0..rings {
                    let n = read_count(buf, &mut p)?;
                    p = advance(buf, p, n.checked_mul(csz).ok_or(GeoError::Memory)?)?;
                }
            }
        }
        GeomType::GeometryCollection => {
            let n = read_count(buf, &mut p)?;
            for _ in 0..n {
                p = validate_at(buf, p)?;
            }
        }
    }
    Ok(p)
}

/// Size of one encoded geometry at `pos` in an already validated buffer.
fn measure_at(buf: &[u8], pos: usize) -> usize {
    let h = match Header::decode(ne_u32(buf, pos + 1)) {
        Ok(h) => h,
        Err(_) => return buf.len() - pos,
    };
    let csz = h.coord_size();
    let mut p = pos + HEADER_LEN;
    match h.kind {
        GeomType::Point => p += csz,
        GeomType::LineString | GeomType::MultiPoint => {
            let n = ne_u32(buf, p) as usize;
            p += 4 + n * csz;
        }
        GeomType::Polygon | GeomType::MultiLineString => {
            let rings = ne_u32(buf, p) as usize;
            p += 4;
            for _ in 0..rings {
                let n = ne_u32(buf, p) as usize;
                p += 4 + n * csz;
            }
        }
        GeomType::MultiPolygon => {
            let polys = ne_u32(buf, p) as usize;
            p += 4;
            for _ in 0..polys {
                let rings = ne_u32(buf, p) as usize;
                p += 4;
                for _ in 0..rings {
                    let n = ne_u32(buf, p) as usize;
                    p += 4 + n * csz;
                }
            }
        }
        GeomType::GeometryCollection => {
            let n = ne_u32(buf, p) as usize;
            p += 4;
            for _ in 0..n {
                p += measure_at(buf, p);
            }
        }
    }
    p - pos
}

/// A packed run of coordinates sharing one axis layout. Also serves as
/// the ring type of the polygon map; the data slice points into the
/// owning geometry blob.
#[derive(Debug, Clone, Copy)]
pub struct CoordSeq<'a> {
    z: bool,
    m: bool,
    len: usize,
    data: &'a [u8],
}

impl<'a> CoordSeq<'a> {
    pub(crate) fn new(z: bool, m: bool, len: usize, data: &'a [u8]) -> Self {
        Self { z, m, len, data }
    }

    pub(crate) fn empty() -> Self {
        Self {
            z: false,
            m: false,
            len: 0,
            data: &[],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dims(&self) -> usize {
        2 + self.z as usize + self.m as usize
    }

    fn byte_len(&self) -> usize {
        self.len * self.dims() * 8
    }

    pub fn coord(&self, i: usize) -> Coord {
        let base = i * self.dims() * 8;
        let x = ne_f64(self.data, base);
        let y = ne_f64(self.data, base + 8);
        let mut z = 0.0;
        let mut m = 0.0;
        let mut at = base + 16;
        if self.z {
            z = ne_f64(self.data, at);
            at += 8;
        }
        if self.m {
            m = ne_f64(self.data, at);
        }
        Coord::with_zm(x, y, z, m)
    }

    /// The (x, y) pair of vertex `i`, ignoring any extra axes.
    pub fn point(&self, i: usize) -> (f64, f64) {
        let base = i * self.dims() * 8;
        (ne_f64(self.data, base), ne_f64(self.data, base + 8))
    }

    pub fn iter(&self) -> impl Iterator<Item = Coord> + 'a {
        let seq = *self;
        (0..seq.len).map(move |i| seq.coord(i))
    }
}

/// Sequence of rings: `u32 n` then `n` coordinates, repeated.
#[derive(Debug, Clone, Copy)]
pub struct RingSeq<'a> {
    z: bool,
    m: bool,
    count: usize,
    data: &'a [u8],
}

impl<'a> RingSeq<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> RingIter<'a> {
        RingIter {
            z: self.z,
            m: self.m,
            remaining: self.count,
            data: self.data,
            pos: 0,
        }
    }
}

pub struct RingIter<'a> {
    z: bool,
    m: bool,
    remaining: usize,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for RingIter<'a> {
    type Item = CoordSeq<'a>;

    fn next(&mut self) -> Option<CoordSeq<'a>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let n = ne_u32(self.data, self.pos) as usize;
        self.pos += 4;
        let csz = (2 + self.z as usize + self.m as usize) * 8;
        let seq = CoordSeq::new(self.z, self.m, n, &self.data[self.pos..self.pos + n * csz]);
        self.pos += seq.byte_len();
        Some(seq)
    }
}

/// Sequence of polygons, each a ring sequence.
#[derive(Debug, Clone, Copy)]
pub struct PolySeq<'a> {
    z: bool,
    m: bool,
    count: usize,
    data: &'a [u8],
}

impl<'a> PolySeq<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> PolyIter<'a> {
        PolyIter {
            z: self.z,
            m: self.m,
            remaining: self.count,
            data: self.data,
            pos: 0,
        }
    }
}

pub struct PolyIter<'a> {
    z: bool,
    m: bool,
    remaining: usize,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for PolyIter<'a> {
    type Item = RingSeq<'a>;

    fn next(&mut self) -> Option<RingSeq<'a>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let rings = ne_u32(self.data, self.pos) as usize;
        self.pos += 4;
        let csz = (2 + self.z as usize + self.m as usize) * 8;
        let start = self.pos;
        for _ in 0..rings {
            let n = ne_u32(self.data, self.pos) as usize;
            self.pos += 4 + n * csz;
        }
        Some(RingSeq {
            z: self.z,
            m: self.m,
            count: rings,
            data: &self.data[start..self.pos],
        })
    }
}

/// Sequence of fully encoded child geometries.
#[derive(Debug, Clone, Copy)]
pub struct GeomSeq<'a> {
    count: usize,
    data: &'a [u8],
}

impl<'a> GeomSeq<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> GeomSeqIter<'a> {
        GeomSeqIter {
            remaining: self.count,
            data: self.data,
            pos: 0,
        }
    }
}

pub struct GeomSeqIter<'a> {
    remaining: usize,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for GeomSeqIter<'a> {
    type Item = GeomRef<'a>;

    fn next(&mut self) -> Option<GeomRef<'a>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let sz = measure_at(self.data, self.pos);
        let g = GeomRef {
            buf: &self.data[self.pos..self.pos + sz],
        };
        self.pos += sz;
        Some(g)
    }
}

/// Structured zero-copy view of a geometry payload.
pub enum Shape<'a> {
    Point(CoordSeq<'a>),
    LineString(CoordSeq<'a>),
    MultiPoint(CoordSeq<'a>),
    Polygon(RingSeq<'a>),
    MultiLineString(RingSeq<'a>),
    MultiPolygon(PolySeq<'a>),
    GeometryCollection(GeomSeq<'a>),
}

/// Borrowed view of an encoded geometry. Only ever constructed over
/// validated bytes, so the accessors read without re-checking lengths.
#[derive(Debug, Clone, Copy)]
pub struct GeomRef<'a> {
    buf: &'a [u8],
}

impl<'a> GeomRef<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    pub(crate) fn header(&self) -> Header {
        match Header::decode(ne_u32(self.buf, 1)) {
            Ok(h) => h,
            // unreachable on validated bytes; fall back to a point header
            Err(_) => Header {
                kind: GeomType::Point,
                z: false,
                m: false,
            },
        }
    }

    pub fn geom_type(&self) -> GeomType {
        self.header().kind
    }

    pub fn has_z(&self) -> bool {
        self.header().z
    }

    pub fn has_m(&self) -> bool {
        self.header().m
    }

    pub fn is_simple_point(&self) -> bool {
        self.geom_type() == GeomType::Point
    }

    pub fn shape(&self) -> Shape<'a> {
        let h = self.header();
        let payload = &self.buf[HEADER_LEN..];
        match h.kind {
            GeomType::Point => Shape::Point(CoordSeq::new(h.z, h.m, 1, payload)),
            GeomType::LineString | GeomType::MultiPoint => {
                let n = ne_u32(payload, 0) as usize;
                let seq = CoordSeq::new(h.z, h.m, n, &payload[4..4 + n * h.coord_size()]);
                if h.kind == GeomType::LineString {
                    Shape::LineString(seq)
                } else {
                    Shape::MultiPoint(seq)
                }
            }
            GeomType::Polygon | GeomType::MultiLineString => {
                let count = ne_u32(payload, 0) as usize;
                let seq = RingSeq {
                    z: h.z,
                    m: h.m,
                    count,
                    data: &payload[4..],
                };
                if h.kind == GeomType::Polygon {
                    Shape::Polygon(seq)
                } else {
                    Shape::MultiLineString(seq)
                }
            }
            GeomType::MultiPolygon => {
                let count = ne_u32(payload, 0) as usize;
                Shape::MultiPolygon(PolySeq {
                    z: h.z,
                    m: h.m,
                    count,
                    data: &payload[4..],
                })
            }
            GeomType::GeometryCollection => {
                let count = ne_u32(payload, 0) as usize;
                Shape::GeometryCollection(GeomSeq {
                    count,
                    data: &payload[4..],
                })
            }
        }
    }

    pub fn for_each_coord(&self, f: &mut impl FnMut(Coord)) {
        match self.shape() {
            Shape::Point(seq) | Shape::LineString(seq) | Shape::MultiPoint(seq) => {
                for c in seq.iter() {
                    f(c);
                }
            }
            Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
                for ring in rings.iter() {
                    for c in ring.iter() {
                        f(c);
                    }
                }
            }
            Shape::MultiPolygon(polys) => {
                for rings in polys.iter() {
                    for ring in rings.iter() {
                        for c in ring.iter() {
                            f(c);
                        }
                    }
                }
            }
            Shape::GeometryCollection(geoms) => {
                for g in geoms.iter() {
                    g.for_each_coord(f);
                }
            }
        }
    }

    /// Minimum bounding rectangle over every vertex. An empty geometry
    /// reports the zero rectangle.
    pub fn bounds(&self) -> Rect {
        let mut rect: Option<Rect> = None;
        self.for_each_coord(&mut |c| match &mut rect {
            None => rect = Some(Rect::point(c)),
            Some(r) => r.expand(c),
        });
        rect.unwrap_or_default()
    }

    /// A point the geometry stands for: the coordinate itself for a
    /// Point, the midpoint of the bounds for everything else.
    pub fn center(&self) -> Coord {
        if let Shape::Point(seq) = self.shape() {
            return seq.coord(0);
        }
        self.bounds().center()
    }

    /// Iterate a collection's children. `flatten` descends into nested
    /// collections and yields only non-collection leaves, in document
    /// order. Non-collection geometries have no children.
    pub fn collection_iter(&self, flatten: bool) -> CollectionIter<'a> {
        let mut stack = Vec::new();
        if let Shape::GeometryCollection(seq) = self.shape() {
            stack.push(seq.iter());
        }
        CollectionIter { stack, flatten }
    }

    pub fn encode_wkt(&self, opts: wkt::EncodeOpts) -> String {
        wkt::encode(*self, opts)
    }

    pub fn to_geojson(&self) -> Value {
        let z = self.has_z();
        match self.shape() {
            Shape::Point(seq) => json!({"type": "Point", "coordinates": coord_json(seq.coord(0), z)}),
            Shape::LineString(seq) => json!({"type": "LineString", "coordinates": seq_json(seq, z)}),
            Shape::MultiPoint(seq) => json!({"type": "MultiPoint", "coordinates": seq_json(seq, z)}),
            Shape::Polygon(rings) => json!({"type": "Polygon", "coordinates": rings_json(rings, z)}),
            Shape::MultiLineString(rings) => {
                json!({"type": "MultiLineString", "coordinates": rings_json(rings, z)})
            }
            Shape::MultiPolygon(polys) => {
                let coords: Vec<Value> = polys.iter().map(|r| rings_json(r, z)).collect();
                json!({"type": "MultiPolygon", "coordinates": coords})
            }
            Shape::GeometryCollection(geoms) => {
                let children: Vec<Value> = geoms.iter().map(|g| g.to_geojson()).collect();
                json!({"type": "GeometryCollection", "geometries": children})
            }
        }
    }
}

fn coord_json(c: Coord, with_z: bool) -> Value {
    if with_z {
        json!([c.x, c.y, c.z])
    } else {
        json!([c.x, c.y])
    }
}

fn seq_json(seq: CoordSeq<'_>, with_z: bool) -> Value {
    Value::Array(seq.iter().map(|c| coord_json(c, with_z)).collect())
}

fn rings_json(rings: RingSeq<'_>, with_z: bool) -> Value {
    Value::Array(rings.iter().map(|r| seq_json(r, with_z)).collect())
}

pub struct CollectionIter<'a> {
    stack: Vec<GeomSeqIter<'a>>,
    flatten: bool,
}

impl<'a> Iterator for CollectionIter<'a> {
    type Item = GeomRef<'a>;

    fn next(&mut self) -> Option<GeomRef<'a>> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(g) => {
                    if self.flatten {
                        if let Shape::GeometryCollection(seq) = g.shape() {
                            self.stack.push(seq.iter());
                            continue;
                        }
                    }
                    return Some(g);
                }
            }
        }
    }
}

/// An owned, validated geometry blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Geom {
    buf: Vec<u8>,
}

impl Geom {
    /// Wrap already encoded bytes, validating the full layout first.
    pub fn from_encoded(buf: Vec<u8>) -> Result<Geom> {
        let end = validate_at(&buf, 0)?;
        if end != buf.len() {
            return Err(GeoError::Input);
        }
        Ok(Geom { buf })
    }

    /// Decode any accepted wire form, keyed on the first non-whitespace
    /// byte: 0x00/0x01 is WKB, `{` is GeoJSON (reserved, unsupported),
    /// anything else is WKT.
    pub fn decode(input: &[u8], opts: wkt::DecodeOpts) -> Result<Geom> {
        let mut i = 0;
        while i < input.len() {
            match input[i] {
                b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | b' ' => i += 1,
                0 | 1 => return Geom::decode_wkb(&input[i..]),
                b'{' => return Err(GeoError::Unsupported),
                _ => return Geom::decode_wkt_bytes(input, opts),
            }
        }
        Err(GeoError::Input)
    }

    pub fn decode_wkt(input: &str, opts: wkt::DecodeOpts) -> Result<Geom> {
        Geom::decode_wkt_bytes(input.as_bytes(), opts)
    }

    fn decode_wkt_bytes(input: &[u8], opts: wkt::DecodeOpts) -> Result<Geom> {
        let buf = wkt::decode(input, opts)?;
        Ok(Geom { buf })
    }

    /// Ingest a WKB-layout buffer. The leading byte must match the host
    /// byte order and the payload must account for every declared count;
    /// anything short, long or misdeclared is an input error.
    pub fn decode_wkb(input: &[u8]) -> Result<Geom> {
        if input.is_empty() {
            return Err(GeoError::Input);
        }
        if input[0] != ENDIAN_BYTE {
            return Err(GeoError::Input);
        }
        let end = validate_at(input, 0)?;
        if end != input.len() {
            return Err(GeoError::Input);
        }
        Ok(Geom {
            buf: input.to_vec(),
        })
    }

    /// Polygon approximating a circle of `meters` around the center,
    /// with `steps` segments.
    pub fn circle(center: Coord, meters: f64, steps: usize) -> Geom {
        let steps = steps.max(3);
        let mut buf = Vec::with_capacity(HEADER_LEN + 8 + (steps + 1) * 16);
        buf.push(ENDIAN_BYTE);
        put_u32(&mut buf, GeomType::Polygon.base_code());
        put_u32(&mut buf, 1);
        put_u32(&mut buf, (steps + 1) as u32);
        let (first_lat, first_lon) = geodesy::destination(center.y, center.x, meters, 0.0);
        for i in 0..steps {
            let bearing = i as f64 * 360.0 / steps as f64;
            let (lat, lon) = geodesy::destination(center.y, center.x, meters, bearing);
            put_f64(&mut buf, lon);
            put_f64(&mut buf, lat);
        }
        put_f64(&mut buf, first_lon);
        put_f64(&mut buf, first_lat);
        Geom { buf }
    }

    /// Polygon for an axis-aligned rectangle.
    pub fn rect_polygon(r: Rect) -> Geom {
        let mut buf = Vec::with_capacity(HEADER_LEN + 8 + 5 * 16);
        buf.push(ENDIAN_BYTE);
        put_u32(&mut buf, GeomType::Polygon.base_code());
        put_u32(&mut buf, 1);
        put_u32(&mut buf, 5);
        for (x, y) in [
            (r.min.x, r.min.y),
            (r.max.x, r.min.y),
            (r.max.x, r.max.y),
            (r.min.x, r.max.y),
            (r.min.x, r.min.y),
        ] {
            put_f64(&mut buf, x);
            put_f64(&mut buf, y);
        }
        Geom { buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn as_ref(&self) -> GeomRef<'_> {
        GeomRef { buf: &self.buf }
    }

    pub fn geom_type(&self) -> GeomType {
        self.as_ref().geom_type()
    }

    pub fn bounds(&self) -> Rect {
        self.as_ref().bounds()
    }

    pub fn center(&self) -> Coord {
        self.as_ref().center()
    }

    pub fn is_simple_point(&self) -> bool {
        self.as_ref().is_simple_point()
    }

    pub fn collection_iter(&self, flatten: bool) -> CollectionIter<'_> {
        self.as_ref().collection_iter(flatten)
    }

    pub fn encode_wkt(&self, opts: wkt::EncodeOpts) -> String {
        self.as_ref().encode_wkt(opts)
    }

    pub fn to_geojson(&self) -> Value {
        self.as_ref().to_geojson()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::wkt::{DecodeOpts, EncodeOpts};

    fn decode(s: &str) -> Geom {
        Geom::decode_wkt(s, DecodeOpts::default()).unwrap()
    }

    #[test]
    fn test_point_layout() {
        let g = decode("POINT(-122.4 37.8)");
        let b = g.as_bytes();
        assert_eq!(b.len(), 1 + 4 + 16);
        assert_eq!(b[0], ENDIAN_BYTE);
        assert_eq!(ne_u32(b, 1), 1);
        assert_eq!(ne_f64(b, 5), -122.4);
        assert_eq!(ne_f64(b, 13), 37.8);
    }

    #[test]
    fn test_pointzm_size() {
        let g = decode("POINTZM(1 2 3 4)");
        assert_eq!(g.size(), 5 + 4 * 8);
        assert!(g.as_ref().has_z());
        assert!(g.as_ref().has_m());
    }

    #[test]
    fn test_empty_series_layout() {
        let g = decode("LINESTRING()");
        assert_eq!(g.size(), 1 + 4 + 4);
        let b = g.bounds();
        assert_eq!(b.min, b.max);
        assert_eq!(g.center(), b.min);
    }

    #[test]
    fn test_bounds_of_polygon() {
        let g = decode("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let b = g.bounds();
        assert_eq!(b, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(g.center(), Coord::new(5.0, 5.0));
    }

    #[test]
    fn test_center_of_point_is_point() {
        let g = decode("POINT(3 4)");
        assert_eq!(g.center(), Coord::new(3.0, 4.0));
        assert!(g.is_simple_point());
    }

    #[test]
    fn test_wkb_round_trip() {
        let g = decode("MULTIPOLYGON(((0 0,4 0,4 4,0 4,0 0),(1 1,2 1,2 2,1 2,1 1)))");
        let again = Geom::decode_wkb(g.as_bytes()).unwrap();
        assert_eq!(g, again);
    }

    #[test]
    fn test_wkb_rejects_truncation() {
        let g = decode("LINESTRING(0 0,1 1,2 2)");
        let b = g.as_bytes();
        for cut in [1, 5, 9, b.len() - 1] {
            assert_eq!(Geom::decode_wkb(&b[..cut]), Err(GeoError::Input), "cut at {cut}");
        }
    }

    #[test]
    fn test_wkb_rejects_overdeclared_count() {
        let g = decode("LINESTRING(0 0,1 1)");
        let mut b = g.as_bytes().to_vec();
        // claim three coordinates while only two are present
        b[5..9].copy_from_slice(&3u32.to_ne_bytes());
        assert_eq!(Geom::decode_wkb(&b), Err(GeoError::Input));
    }

    #[test]
    fn test_wkb_rejects_trailing_bytes() {
        let g = decode("POINT(1 2)");
        let mut b = g.as_bytes().to_vec();
        b.push(0);
        assert_eq!(Geom::decode_wkb(&b), Err(GeoError::Input));
    }

    #[test]
    fn test_wkb_rejects_foreign_endianness() {
        let g = decode("POINT(1 2)");
        let mut b = g.as_bytes().to_vec();
        b[0] = 1 - b[0];
        assert_eq!(Geom::decode_wkb(&b), Err(GeoError::Input));
    }

    #[test]
    fn test_decode_auto_detect() {
        let wkb = decode("POINT(1 2)").into_bytes();
        assert!(Geom::decode(&wkb, DecodeOpts::default()).is_ok());
        assert!(Geom::decode(b"  POINT(1 2)", DecodeOpts::default()).is_ok());
        assert_eq!(
            Geom::decode(b"{\"type\":\"Point\"}", DecodeOpts::default()),
            Err(GeoError::Unsupported)
        );
        assert_eq!(Geom::decode(b"", DecodeOpts::default()), Err(GeoError::Input));
        assert_eq!(Geom::decode(b"   ", DecodeOpts::default()), Err(GeoError::Input));
    }

    #[test]
    fn test_collection_iter_flat() {
        let g = decode(
            "GEOMETRYCOLLECTION(POINT(1 1),GEOMETRYCOLLECTION(POINT(2 2),LINESTRING(0 0,1 1)),POINT(3 3))",
        );
        let kinds: Vec<GeomType> = g.collection_iter(true).map(|c| c.geom_type()).collect();
        assert_eq!(
            kinds,
            vec![
                GeomType::Point,
                GeomType::Point,
                GeomType::LineString,
                GeomType::Point
            ]
        );
        let centers: Vec<f64> = g.collection_iter(true).map(|c| c.center().x).collect();
        assert_eq!(centers, vec![1.0, 2.0, 0.5, 3.0]);
    }

    #[test]
    fn test_collection_iter_shallow() {
        let g = decode("GEOMETRYCOLLECTION(POINT(1 1),GEOMETRYCOLLECTION(POINT(2 2)))");
        let kinds: Vec<GeomType> = g.collection_iter(false).map(|c| c.geom_type()).collect();
        assert_eq!(kinds, vec![GeomType::Point, GeomType::GeometryCollection]);
    }

    #[test]
    fn test_collection_iter_restartable() {
        let g = decode("GEOMETRYCOLLECTION(POINT(1 1),POINT(2 2))");
        assert_eq!(g.collection_iter(true).count(), 2);
        assert_eq!(g.collection_iter(true).count(), 2);
    }

    #[test]
    fn test_circle_polygon() {
        let g = Geom::circle(Coord::new(-122.0, 37.0), 1000.0, 12);
        assert_eq!(g.geom_type(), GeomType::Polygon);
        let b = g.bounds();
        assert!(b.contains_coord(&Coord::new(-122.0, 37.0)));
        // every vertex is ~1000m from the center
        g.as_ref().for_each_coord(&mut |c| {
            let d = geodesy::distance(37.0, -122.0, c.y, c.x);
            assert!((d - 1000.0).abs() < 1.0, "vertex at {d}m");
        });
    }

    #[test]
    fn test_rect_polygon() {
        let g = Geom::rect_polygon(Rect::new(0.0, 1.0, 2.0, 3.0));
        assert_eq!(g.bounds(), Rect::new(0.0, 1.0, 2.0, 3.0));
    }

    #[test]
    fn test_geojson_point() {
        let g = decode("POINT(1 2)");
        assert_eq!(
            g.to_geojson(),
            serde_json::json!({"type": "Point", "coordinates": [1.0, 2.0]})
        );
    }

    #[test]
    fn test_geojson_collection() {
        let g = decode("GEOMETRYCOLLECTION(POINT(1 2),LINESTRING(0 0,1 1))");
        let v = g.to_geojson();
        assert_eq!(v["type"], "GeometryCollection");
        assert_eq!(v["geometries"][1]["type"], "LineString");
    }
}
