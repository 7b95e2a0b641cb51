//! GSEARCH: argument parsing, candidate pruning, exact filtering and
//! output formatting, plus FENCE registration.
//!
//! Grammar (clauses are order-free, each may appear once):
//!
//! ```text
//! GSEARCH key
//!   [WITHIN|INTERSECTS]
//!   [CURSOR cursor]
//!   [MATCH pattern]
//!   [FENCE]
//!   [OUTPUT COUNT|FIELD|WKT|WKB|JSON|POINT|BOUNDS|(HASH precision)|(QUAD level)|(TILE z)]
//!   (RADIUS lon lat meters)|(GEOMETRY wkt|wkb)|
//!     (BOUNDS minlon minlat maxlon maxlat)|
//!     (TILE x y z)|(QUAD key)|(HASH geohash)|(MEMBER key field)
//! ```

use crate::command::{arg_str, wkt_bulk, Reply};
use crate::geo::cell;
use crate::geo::geodesy;
use crate::geo::geom::Geom;
use crate::geo::polymap::PolyMap;
use crate::geo::types::{Coord, Rect};
use crate::geo::wkt::DecodeOpts;
use crate::glob::glob_match;
use crate::store::fence::{SearchMode, SearchPredicate};
use crate::store::keyspace::Keyspace;
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Count,
    Field,
    Wkt,
    Wkb,
    Json,
    Point,
    Bounds,
    Hash(i64),
    Quad(i64),
    Tile(i64),
}

struct TargetSpec {
    bounds: Rect,
    radius: Option<(Coord, f64)>,
    geom: Geom,
}

fn invalid_args() -> Reply {
    Reply::error("invalid arguments for 'gsearch' command")
}

fn num_f64(args: &[Bytes], i: usize, msg: &str) -> Result<f64, Reply> {
    arg_str(args, i)
        .trim()
        .parse::<f64>()
        .map_err(|_| Reply::error(msg))
}

fn num_i64(args: &[Bytes], i: usize, msg: &str) -> Result<i64, Reply> {
    arg_str(args, i)
        .trim()
        .parse::<i64>()
        .map_err(|_| Reply::error(msg))
}

fn valid_lon_lat(lon: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

pub(crate) fn gsearch(ks: &Keyspace, client: u64, args: &[Bytes]) -> Reply {
    if args.len() < 2 {
        return Reply::error("wrong number of arguments for 'gsearch' command");
    }
    let key = arg_str(args, 1);

    let mut mode = SearchMode::Intersects;
    let mut pattern: Option<String> = None;
    let mut output = Output::Wkt;
    let mut fence = false;
    let mut target: Option<TargetSpec> = None;

    let mut mode_on = false;
    let mut cursor_on = false;
    let mut match_on = false;
    let mut output_on = false;
    let mut fence_on = false;
    let mut target_on = false;

    macro_rules! once {
        ($flag:ident) => {
            if $flag {
                return invalid_args();
            }
            $flag = true;
        };
    }

    let mut i = 2;
    while i < args.len() {
        let tok = arg_str(args, i).to_ascii_lowercase();
        match tok.as_str() {
            "within" => {
                once!(mode_on);
                mode = SearchMode::Within;
                i += 1;
            }
            "intersects" => {
                once!(mode_on);
                mode = SearchMode::Intersects;
                i += 1;
            }
            "match" => {
                once!(match_on);
                if i + 1 >= args.len() {
                    return Reply::error("need match pattern");
                }
                let p = arg_str(args, i + 1);
                if p != "*" {
                    pattern = Some(p);
                }
                i += 2;
            }
            "fence" => {
                once!(fence_on);
                fence = true;
                i += 1;
            }
            "cursor" => {
                once!(cursor_on);
                if i + 1 >= args.len() {
                    return Reply::error("need cursor");
                }
                let cursor = match num_i64(args, i + 1, "need numeric cursor") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                if cursor != 0 {
                    return Reply::error("invalid cursor");
                }
                i += 2;
            }
            "output" => {
                once!(output_on);
                if i + 1 >= args.len() {
                    return Reply::error(
                        "need output type (count,field,wkt,wkb,json,point,bounds,hash)",
                    );
                }
                let kind = arg_str(args, i + 1).to_ascii_lowercase();
                let mut used = 2;
                output = match kind.as_str() {
                    "count" => Output::Count,
                    "field" => Output::Field,
                    "wkt" => Output::Wkt,
                    "wkb" => Output::Wkb,
                    "json" => Output::Json,
                    "point" => Output::Point,
                    "bounds" => Output::Bounds,
                    "hash" => {
                        if i + 2 >= args.len() {
                            return Reply::error("need hash precision");
                        }
                        let p = match num_i64(args, i + 2, "need numeric precision") {
                            Ok(n) => n,
                            Err(e) => return e,
                        };
                        used = 3;
                        Output::Hash(p.clamp(1, 22))
                    }
                    "quad" => {
                        if i + 2 >= args.len() {
                            return Reply::error("need quad level");
                        }
                        let p = match num_i64(args, i + 2, "need numeric level") {
                            Ok(n) => n,
                            Err(e) => return e,
                        };
                        used = 3;
                        Output::Quad(p.clamp(1, 22))
                    }
                    "tile" => {
                        if i + 2 >= args.len() {
                            return Reply::error("need tile z");
                        }
                        let p = match num_i64(args, i + 2, "need numeric z") {
                            Ok(n) => n,
                            Err(e) => return e,
                        };
                        used = 3;
                        Output::Tile(p.clamp(1, 22))
                    }
                    _ => return invalid_args(),
                };
                i += used;
            }
            "radius" => {
                once!(target_on);
                if i + 3 >= args.len() {
                    return Reply::error("need longitude, latitude, meters");
                }
                let lon = match num_f64(args, i + 1, "need numeric longitude") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let lat = match num_f64(args, i + 2, "need numeric latitude") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let meters = match num_f64(args, i + 3, "need numeric meters") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                if !valid_lon_lat(lon, lat) {
                    return Reply::error("invalid longitude/latitude pair");
                }
                let center = Coord::new(lon, lat);
                target = Some(TargetSpec {
                    bounds: geodesy::bounds_from(lat, lon, meters),
                    radius: Some((center, meters)),
                    geom: Geom::circle(center, meters, 12),
                });
                i += 4;
            }
            "geom" | "geometry" => {
                once!(target_on);
                if i + 1 >= args.len() {
                    return Reply::error("need geometry");
                }
                let geom = match Geom::decode(&args[i + 1], DecodeOpts::default()) {
                    Ok(g) => g,
                    Err(_) => return Reply::error("invalid geometry"),
                };
                target = Some(TargetSpec {
                    bounds: geom.bounds(),
                    radius: None,
                    geom,
                });
                i += 2;
            }
            "bounds" => {
                once!(target_on);
                if i + 4 >= args.len() {
                    return Reply::error(
                        "need min longitude, min latitude, max longitude, max latitude",
                    );
                }
                let min_lon = match num_f64(args, i + 1, "need numeric min longitude") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let min_lat = match num_f64(args, i + 2, "need numeric min latitude") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let max_lon = match num_f64(args, i + 3, "need numeric max longitude") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let max_lat = match num_f64(args, i + 4, "need numeric max latitude") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                if !valid_lon_lat(min_lon, min_lat)
                    || !valid_lon_lat(max_lon, max_lat)
                    || min_lon > max_lon
                    || min_lat > max_lat
                {
                    return Reply::error("invalid longitude/latitude pairs");
                }
                let rect = Rect::new(min_lon, min_lat, max_lon, max_lat);
                target = Some(TargetSpec {
                    bounds: rect,
                    radius: None,
                    geom: Geom::rect_polygon(rect),
                });
                i += 5;
            }
            "tile" => {
                once!(target_on);
                if i + 3 >= args.len() {
                    return Reply::error("need x,y,z");
                }
                let x = match num_f64(args, i + 1, "need numeric x") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let y = match num_f64(args, i + 2, "need numeric y") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let z = match num_f64(args, i + 3, "need numeric z") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let rect = cell::tile_bounds(x, y, z);
                target = Some(TargetSpec {
                    bounds: rect,
                    radius: None,
                    geom: Geom::rect_polygon(rect),
                });
                i += 4;
            }
            "quad" => {
                once!(target_on);
                if i + 1 >= args.len() {
                    return Reply::error("need key");
                }
                let rect = match cell::quadkey_bounds(&arg_str(args, i + 1)) {
                    Ok(r) => r,
                    Err(_) => return Reply::error("invalid quad key"),
                };
                target = Some(TargetSpec {
                    bounds: rect,
                    radius: None,
                    geom: Geom::rect_polygon(rect),
                });
                i += 2;
            }
            "hash" => {
                once!(target_on);
                if i + 1 >= args.len() {
                    return Reply::error("need hash");
                }
                let rect = match cell::geohash_bounds(&arg_str(args, i + 1)) {
                    Ok(r) => r,
                    Err(_) => return Reply::error("invalid hash"),
                };
                target = Some(TargetSpec {
                    bounds: rect,
                    radius: None,
                    geom: Geom::rect_polygon(rect),
                });
                i += 2;
            }
            "member" => {
                once!(target_on);
                if i + 2 >= args.len() {
                    return Reply::error("need member key, field");
                }
                let mkey = arg_str(args, i + 1);
                let mfield = arg_str(args, i + 2);
                let Some(geom) = ks.member_geometry(&mkey, &mfield) else {
                    return Reply::error("member is not available in database");
                };
                target = Some(TargetSpec {
                    bounds: geom.bounds(),
                    radius: None,
                    geom,
                });
                i += 3;
            }
            _ => return invalid_args(),
        }
    }

    let Some(target) = target else {
        return invalid_args();
    };
    let bounds = target.bounds;
    let predicate = SearchPredicate {
        mode,
        radius: target.radius,
        geom: target.geom,
    };

    if fence {
        let channel = ks.register_fence(client, &key, pattern, predicate);
        return Reply::Bulk(Bytes::from(channel));
    }

    let searched = ks.read(&key, |v| {
        let target_map = PolyMap::new(predicate.geom.as_ref());
        let mut count = 0usize;
        let mut flat: Vec<Reply> = Vec::new();
        v.search_overlapping(&bounds, &mut |field, g| {
            if let Some(p) = &pattern {
                if !glob_match(p, field) {
                    return true;
                }
            }
            if !predicate.matches_with_map(g.as_ref(), &target_map) {
                return true;
            }
            count += 1;
            match output {
                Output::Count => {}
                Output::Field => flat.push(Reply::bulk(field)),
                _ => {
                    flat.push(Reply::bulk(field));
                    flat.push(render_value(g, output));
                }
            }
            true
        });
        if output == Output::Count {
            Reply::Integer(count as i64)
        } else {
            Reply::Array(vec![Reply::Integer(0), Reply::Array(flat)])
        }
    });
    searched.unwrap_or(Reply::Array(vec![]))
}

fn render_value(g: &Geom, output: Output) -> Reply {
    match output {
        Output::Wkt => wkt_bulk(g),
        Output::Wkb => Reply::Bulk(Bytes::copy_from_slice(g.as_bytes())),
        Output::Json => Reply::bulk(g.to_geojson().to_string()),
        Output::Point => {
            let c = g.center();
            Reply::Array(vec![Reply::Double(c.x), Reply::Double(c.y)])
        }
        Output::Bounds => {
            let b = g.bounds();
            Reply::Array(vec![
                Reply::Double(b.min.x),
                Reply::Double(b.min.y),
                Reply::Double(b.max.x),
                Reply::Double(b.max.y),
            ])
        }
        Output::Hash(p) => {
            let c = g.center();
            match cell::geohash_at(c.x, c.y, p) {
                Ok(h) => Reply::bulk(h),
                Err(_) => Reply::bulk(""),
            }
        }
        Output::Quad(p) => {
            let c = g.center();
            Reply::bulk(cell::quadkey_at(c.y, c.x, p))
        }
        Output::Tile(z) => {
            let c = g.center();
            let (x, y) = cell::tile_at(c.y, c.x, z);
            Reply::Array(vec![Reply::Integer(x), Reply::Integer(y)])
        }
        Output::Count | Output::Field => Reply::bulk(""),
    }
}
