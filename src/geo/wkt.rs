//! WKT decoding and encoding for the binary geometry layout.
//!
//! The decoder is a single pass over the text that writes the encoded
//! buffer directly: series counts are backpatched, and the first
//! coordinate of a geometry fixes the axis width for the whole stream.
//! A third or fourth numeric seen before an explicit `Z`/`M` modifier
//! promotes the geometry; later coordinates must then match the promoted
//! width.

use crate::error::{GeoError, Result};
use crate::geo::geom::{ne_u32, put_f64, put_u32, GeomRef, GeomType, Header, Shape, ENDIAN_BYTE};
use crate::geo::types::Coord;
use std::fmt::Write;

/// Options accepted by the WKT decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOpts {
    /// Reject extra axes unless the literal carries an explicit `Z`/`M`
    /// modifier.
    pub require_zm: bool,
}

/// Options accepted by the WKT encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOpts {
    /// Emit the `Z`/`M`/`ZM` modifier even when it could be inferred.
    pub show_zm: bool,
    /// Emit `EMPTY` instead of `()` for empty series.
    pub show_empty: bool,
}

#[inline]
fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | b' ')
}

const KEYWORDS: [(&str, GeomType); 7] = [
    ("GEOMETRYCOLLECTION", GeomType::GeometryCollection),
    ("MULTILINESTRING", GeomType::MultiLineString),
    ("MULTIPOLYGON", GeomType::MultiPolygon),
    ("MULTIPOINT", GeomType::MultiPoint),
    ("LINESTRING", GeomType::LineString),
    ("POLYGON", GeomType::Polygon),
    ("POINT", GeomType::Point),
];

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    opts: DecodeOpts,
    out: Vec<u8>,

    // modifiers of the geometry currently being decoded
    has_z: bool,
    has_m: bool,
    is_empty: bool,

    // scratch for the coordinate last read
    x: f64,
    y: f64,
    z: f64,
    m: f64,
    found_z: bool,
    found_m: bool,

    // width promotion state, fixed by the first written coordinate
    wrote_coord: bool,
    must_z: bool,
    must_m: bool,
}

impl<'a> Parser<'a> {
    fn new(src: &'a [u8], opts: DecodeOpts) -> Self {
        Parser {
            src,
            pos: 0,
            opts,
            out: vec![ENDIAN_BYTE],
            has_z: false,
            has_m: false,
            is_empty: false,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            m: 0.0,
            found_z: false,
            found_m: false,
            wrote_coord: false,
            must_z: false,
            must_m: false,
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if is_ws(b)) {
            self.pos += 1;
        }
    }

    /// Consume `kw` if the input continues with it, ignoring case.
    fn try_keyword(&mut self, kw: &str) -> bool {
        let end = self.pos + kw.len();
        if end > self.src.len() {
            return false;
        }
        if self.src[self.pos..end].eq_ignore_ascii_case(kw.as_bytes()) {
            self.pos = end;
            return true;
        }
        false
    }

    fn parse_number(&mut self) -> Result<f64> {
        let start = self.pos;
        let mut end = self.pos;
        while end < self.src.len()
            && matches!(self.src[end], b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')
        {
            end += 1;
        }
        // longest prefix that parses, like strtod
        let mut stop = end;
        while stop > start {
            let s = std::str::from_utf8(&self.src[start..stop]).map_err(|_| GeoError::Input)?;
            if let Ok(v) = s.parse::<f64>() {
                self.pos = stop;
                return Ok(v);
            }
            stop -= 1;
        }
        Err(GeoError::Input)
    }

    /// Read the optional `Z`/`M`/`ZM` and `EMPTY` tokens that may follow
    /// a geometry keyword. Leaves the cursor at the opening parenthesis
    /// for non-empty geometries.
    fn decode_head(&mut self) -> Result<()> {
        self.has_z = false;
        self.has_m = false;
        self.is_empty = false;
        let mut reads = 0;
        loop {
            if matches!(self.peek(), Some(b) if is_ws(b) || matches!(b, b'z' | b'Z' | b'm' | b'M'))
            {
                self.skip_ws();
                if self.try_keyword("EMPTY") {
                    if self.is_empty {
                        return Err(GeoError::Input);
                    }
                    self.is_empty = true;
                } else if matches!(self.peek(), Some(b'z' | b'Z')) {
                    if self.has_z || self.has_m || self.is_empty {
                        return Err(GeoError::Input);
                    }
                    self.pos += 1;
                    self.has_z = true;
                    if matches!(self.peek(), Some(b'm' | b'M')) {
                        self.pos += 1;
                        self.has_m = true;
                    }
                } else if matches!(self.peek(), Some(b'm' | b'M')) {
                    if self.has_z || self.has_m || self.is_empty {
                        return Err(GeoError::Input);
                    }
                    self.pos += 1;
                    self.has_m = true;
                }
            }
            reads += 1;
            if (self.has_z || self.has_m) && !self.is_empty && reads <= 2 {
                continue;
            }
            break;
        }
        self.skip_ws();
        if !self.is_empty && self.peek() != Some(b'(') {
            return Err(GeoError::Input);
        }
        Ok(())
    }

    fn append_type(&mut self, kind: GeomType) {
        let h = Header {
            kind,
            z: self.has_z,
            m: self.has_m,
        };
        put_u32(&mut self.out, h.code());
    }

    /// Read one coordinate: x and y, then the extra axes the modifiers
    /// declare, then any undeclared extras (which promote the geometry
    /// unless `require_zm` forbids them).
    fn decode_numbers(&mut self) -> Result<()> {
        self.found_z = false;
        self.found_m = false;
        self.z = 0.0;
        self.m = 0.0;
        self.x = self.parse_number()?;
        self.skip_ws();
        self.y = self.parse_number()?;
        if self.has_z {
            self.skip_ws();
            self.z = self.parse_number()?;
            self.found_z = true;
        } else if !self.has_m {
            self.skip_ws();
            if matches!(self.peek(), Some(b')' | b',')) {
                return Ok(());
            }
            if self.opts.require_zm {
                return Err(GeoError::Input);
            }
            self.z = self.parse_number()?;
            self.found_z = true;
        }
        if self.has_m {
            self.skip_ws();
            self.m = self.parse_number()?;
            self.found_m = true;
        } else if !self.has_z {
            self.skip_ws();
            if matches!(self.peek(), Some(b')' | b',')) {
                return Ok(());
            }
            if self.opts.require_zm {
                return Err(GeoError::Input);
            }
            self.m = self.parse_number()?;
            self.found_m = true;
        }
        Ok(())
    }

    fn append_coord(&mut self) -> Result<()> {
        if !self.wrote_coord {
            self.must_z = self.has_z || self.found_z;
            self.must_m = self.has_m || self.found_m;
            // the first coordinate fixes the width; rewrite the type code
            let mut h = Header::decode(ne_u32(&self.out, 1))?;
            h.z = self.must_z;
            h.m = self.must_m;
            self.out[1..5].copy_from_slice(&h.code().to_ne_bytes());
        } else if self.found_z != self.must_z || self.found_m != self.must_m {
            return Err(GeoError::Input);
        }
        put_f64(&mut self.out, self.x);
        put_f64(&mut self.out, self.y);
        if self.must_z {
            put_f64(&mut self.out, self.z);
        }
        if self.must_m {
            put_f64(&mut self.out, self.m);
        }
        self.wrote_coord = true;
        Ok(())
    }

    fn decode_point(&mut self) -> Result<()> {
        self.decode_head()?;
        self.append_type(GeomType::Point);
        if self.is_empty {
            self.x = 0.0;
            self.y = 0.0;
            self.z = 0.0;
            self.m = 0.0;
            self.found_z = false;
            self.found_m = false;
        } else {
            // decode_head left the cursor at '('
            self.pos += 1;
            self.skip_ws();
            self.decode_numbers()?;
            self.skip_ws();
            if self.peek() != Some(b')') {
                return Err(GeoError::Input);
            }
            self.pos += 1;
        }
        self.append_coord()
    }

    /// Decode one parenthesised series. `level` counts the remaining
    /// nesting: 0 reads coordinates, positive levels recurse, and -1
    /// reads full child geometries (geometry collections).
    fn decode_series_segment(&mut self, level: i32) -> Result<()> {
        let szpos = self.out.len();
        put_u32(&mut self.out, 0);
        if self.is_empty {
            return Ok(());
        }
        if self.peek() != Some(b'(') {
            return Err(GeoError::Input);
        }
        self.pos += 1;
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(());
        }
        let mut n: u32 = 0;
        loop {
            self.skip_ws();
            if level < 0 {
                let (child, read) = decode_inner(&self.src[self.pos..], self.opts, true)?;
                self.pos += read;
                self.out.extend_from_slice(&child);
            } else if level == 0 {
                self.decode_numbers()?;
                self.append_coord()?;
            } else {
                self.decode_series_segment(level - 1)?;
            }
            self.skip_ws();
            n += 1;
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(GeoError::Input),
            }
        }
        self.out[szpos..szpos + 4].copy_from_slice(&n.to_ne_bytes());
        Ok(())
    }

    fn decode_series(&mut self, kind: GeomType) -> Result<()> {
        self.decode_head()?;
        self.append_type(kind);
        let level = match kind {
            GeomType::LineString | GeomType::MultiPoint => 0,
            GeomType::Polygon | GeomType::MultiLineString => 1,
            GeomType::MultiPolygon => 2,
            GeomType::GeometryCollection => -1,
            GeomType::Point => return Err(GeoError::Input),
        };
        self.decode_series_segment(level)
    }

    fn decode_geometry(&mut self) -> Result<()> {
        self.skip_ws();
        for (kw, kind) in KEYWORDS {
            if self.try_keyword(kw) {
                return match kind {
                    GeomType::Point => self.decode_point(),
                    other => self.decode_series(other),
                };
            }
        }
        Err(GeoError::Input)
    }
}

fn decode_inner(input: &[u8], opts: DecodeOpts, leave_open: bool) -> Result<(Vec<u8>, usize)> {
    if input.is_empty() {
        return Err(GeoError::Input);
    }
    let mut p = Parser::new(input, opts);
    p.decode_geometry()?;
    if !leave_open {
        p.skip_ws();
        if p.pos < input.len() {
            return Err(GeoError::Input);
        }
    }
    Ok((p.out, p.pos))
}

/// Decode a complete WKT literal into the encoded layout.
pub(crate) fn decode(input: &[u8], opts: DecodeOpts) -> Result<Vec<u8>> {
    decode_inner(input, opts, false).map(|(buf, _)| buf)
}

fn fmt_f64(out: &mut String, v: f64) {
    let _ = write!(out, "{}", v);
}

fn fmt_coord(out: &mut String, c: Coord, z: bool, m: bool) {
    fmt_f64(out, c.x);
    out.push(' ');
    fmt_f64(out, c.y);
    if z {
        out.push(' ');
        fmt_f64(out, c.z);
    }
    if m {
        out.push(' ');
        fmt_f64(out, c.m);
    }
}

fn empty_series(out: &mut String, opts: EncodeOpts, top: bool) {
    if opts.show_empty {
        if top {
            out.push(' ');
        }
        out.push_str("EMPTY");
    } else {
        out.push_str("()");
    }
}

fn encode_into(g: GeomRef<'_>, opts: EncodeOpts, out: &mut String) {
    let h = g.header();
    // an M-only geometry must always carry its modifier, otherwise the
    // third numeric would re-decode as Z
    let show_zm = (h.m && !h.z) || opts.show_zm;
    out.push_str(h.kind.name());
    if show_zm {
        if h.z && h.m {
            out.push_str(" ZM");
        } else if h.z {
            out.push_str(" Z");
        } else if h.m {
            out.push_str(" M");
        }
    }
    let coords = |out: &mut String, seq: crate::geo::geom::CoordSeq<'_>| {
        out.push('(');
        for (i, c) in seq.iter().enumerate() {
            if i != 0 {
                out.push(',');
            }
            fmt_coord(out, c, h.z, h.m);
        }
        out.push(')');
    };
    match g.shape() {
        Shape::Point(seq) => coords(out, seq),
        Shape::LineString(seq) | Shape::MultiPoint(seq) => {
            if seq.is_empty() {
                empty_series(out, opts, true);
            } else {
                coords(out, seq);
            }
        }
        Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
            if rings.is_empty() {
                empty_series(out, opts, true);
            } else {
                out.push('(');
                for (i, ring) in rings.iter().enumerate() {
                    if i != 0 {
                        out.push(',');
                    }
                    if ring.is_empty() {
                        empty_series(out, opts, false);
                    } else {
                        coords(out, ring);
                    }
                }
                out.push(')');
            }
        }
        Shape::MultiPolygon(polys) => {
            if polys.len() == 0 {
                empty_series(out, opts, true);
            } else {
                out.push('(');
                for (i, rings) in polys.iter().enumerate() {
                    if i != 0 {
                        out.push(',');
                    }
                    if rings.is_empty() {
                        empty_series(out, opts, false);
                    } else {
                        out.push('(');
                        for (j, ring) in rings.iter().enumerate() {
                            if j != 0 {
                                out.push(',');
                            }
                            if ring.is_empty() {
                                empty_series(out, opts, false);
                            } else {
                                coords(out, ring);
                            }
                        }
                        out.push(')');
                    }
                }
                out.push(')');
            }
        }
        Shape::GeometryCollection(geoms) => {
            if geoms.len() == 0 {
                empty_series(out, opts, true);
            } else {
                out.push('(');
                for (i, child) in geoms.iter().enumerate() {
                    if i != 0 {
                        out.push(',');
                    }
                    encode_into(child, opts, out);
                }
                out.push(')');
            }
        }
    }
}

/// Render a geometry as WKT with shortest round-trip decimals.
pub(crate) fn encode(g: GeomRef<'_>, opts: EncodeOpts) -> String {
    let mut out = String::new();
    encode_into(g, opts, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::geom::Geom;

    fn dec(s: &str) -> Geom {
        Geom::decode_wkt(s, DecodeOpts::default()).unwrap()
    }

    fn wkt(s: &str) -> String {
        dec(s).encode_wkt(EncodeOpts::default())
    }

    #[test]
    fn test_round_trip_normalises() {
        assert_eq!(wkt("point ( 1 2 )"), "POINT(1 2)");
        assert_eq!(wkt("LINESTRING(0 0, 1 1,2 0)"), "LINESTRING(0 0,1 1,2 0)");
        assert_eq!(
            wkt("POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,3 2,3 3,2 3,2 2))"),
            "POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,3 2,3 3,2 3,2 2))"
        );
        assert_eq!(
            wkt("MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))"),
            "MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))"
        );
        assert_eq!(
            wkt("GEOMETRYCOLLECTION(POINT(1 1),LINESTRING(0 0,1 1))"),
            "GEOMETRYCOLLECTION(POINT(1 1),LINESTRING(0 0,1 1))"
        );
    }

    #[test]
    fn test_decode_encode_decode_is_stable() {
        for s in [
            "POINT(-122.4 37.8)",
            "MULTIPOINT(1 1,2 2)",
            "POINT Z(1 2 3)",
            "POINT M(1 2 3)",
            "POINTZM(1 2 3 4)",
            "MULTILINESTRING((0 0,1 1),(2 2,3 3))",
            "GEOMETRYCOLLECTION(POINT(1 1),GEOMETRYCOLLECTION(POINT(2 2)))",
            "LINESTRING()",
        ] {
            let g1 = dec(s);
            let g2 = dec(&g1.encode_wkt(EncodeOpts::default()));
            assert_eq!(g1.as_bytes(), g2.as_bytes(), "unstable for {s}");
        }
    }

    #[test]
    fn test_promotion_from_extra_axes() {
        let g = dec("POINT(1 2 3)");
        assert!(g.as_ref().has_z());
        assert!(!g.as_ref().has_m());
        assert_eq!(g.size(), 5 + 24);

        let g = dec("LINESTRING(1 2 3 4,5 6 7 8)");
        assert!(g.as_ref().has_z());
        assert!(g.as_ref().has_m());
        assert_eq!(g.size(), 5 + 4 + 2 * 32);
    }

    #[test]
    fn test_promotion_width_mismatch_is_error() {
        assert_eq!(
            Geom::decode_wkt("LINESTRING(0 0,1 1 5)", DecodeOpts::default()),
            Err(GeoError::Input)
        );
        assert_eq!(
            Geom::decode_wkt("LINESTRING(0 0 1,1 1)", DecodeOpts::default()),
            Err(GeoError::Input)
        );
    }

    #[test]
    fn test_require_zm() {
        let opts = DecodeOpts { require_zm: true };
        assert_eq!(Geom::decode_wkt("POINT(1 2 3)", opts), Err(GeoError::Input));
        assert!(Geom::decode_wkt("POINT Z(1 2 3)", opts).is_ok());
    }

    #[test]
    fn test_declared_axes_are_mandatory() {
        assert_eq!(
            Geom::decode_wkt("POINT Z(1 2)", DecodeOpts::default()),
            Err(GeoError::Input)
        );
        assert_eq!(
            Geom::decode_wkt("POINT ZM(1 2 3)", DecodeOpts::default()),
            Err(GeoError::Input)
        );
    }

    #[test]
    fn test_m_only_always_shows_modifier() {
        assert_eq!(wkt("POINT M(1 2 3)"), "POINT M(1 2 3)");
    }

    #[test]
    fn test_z_modifier_elided_by_default() {
        assert_eq!(wkt("POINT Z(1 2 3)"), "POINT(1 2 3)");
        let shown = dec("POINT Z(1 2 3)").encode_wkt(EncodeOpts {
            show_zm: true,
            ..Default::default()
        });
        assert_eq!(shown, "POINT Z(1 2 3)");
    }

    #[test]
    fn test_empty_forms() {
        assert_eq!(wkt("POINT EMPTY"), "POINT(0 0)");
        assert_eq!(wkt("LINESTRING EMPTY"), "LINESTRING()");
        assert_eq!(wkt("POLYGON EMPTY"), "POLYGON()");
        let shown = dec("LINESTRING EMPTY").encode_wkt(EncodeOpts {
            show_empty: true,
            ..Default::default()
        });
        assert_eq!(shown, "LINESTRING EMPTY");
    }

    #[test]
    fn test_keyword_case_and_whitespace() {
        assert_eq!(wkt("\t multipoint \n ( 1 1 , 2 2 ) \r"), "MULTIPOINT(1 1,2 2)");
        assert_eq!(wkt("PoLyGoN((0 0,1 0,1 1,0 0))"), "POLYGON((0 0,1 0,1 1,0 0))");
    }

    #[test]
    fn test_rejects_malformed_input() {
        for s in [
            "",
            "CIRCLE(1 2)",
            "POINT",
            "POINT(1)",
            "POINT(1 2",
            "POINT(1 2) extra",
            "LINESTRING(0 0,)",
            "POLYGON(0 0,1 1)",
            "POINT(a b)",
            "POINT ZZ(1 2 3)",
        ] {
            assert!(
                Geom::decode_wkt(s, DecodeOpts::default()).is_err(),
                "accepted {s:?}"
            );
        }
    }

    #[test]
    fn test_scientific_notation() {
        let g = dec("POINT(1e2 -2.5E-1)");
        let c = g.center();
        assert_eq!(c.x, 100.0);
        assert_eq!(c.y, -0.25);
    }

    #[test]
    fn test_nested_collection_round_trip() {
        let s = "GEOMETRYCOLLECTION(GEOMETRYCOLLECTION(POINT(1 2),MULTIPOINT(3 4,5 6)),POLYGON((0 0,1 0,1 1,0 0)))";
        assert_eq!(wkt(s), s);
    }
}
