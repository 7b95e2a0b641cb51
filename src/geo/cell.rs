//! Map-cell helpers: web-mercator tiles, quadkeys and geohashes.
//!
//! Search targets given as a cell are reduced to a plain lat/lon
//! rectangle; output encodings go the other way, from a geometry center
//! to the cell that contains it.

use crate::error::{GeoError, Result};
use crate::geo::types::Rect;
use std::f64::consts::PI;

/// Latitude limit of the square web-mercator projection.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// The geohash alphabet caps useful precision at 12 characters.
const MAX_GEOHASH_LEN: usize = 12;

fn tile_lon(x: f64, n: f64) -> f64 {
    x / n * 360.0 - 180.0
}

fn tile_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Lat/lon rectangle of tile (x, y) at zoom `z`.
pub fn tile_bounds(x: f64, y: f64, z: f64) -> Rect {
    let n = 2f64.powf(z.max(0.0).floor());
    let x = x.floor();
    let y = y.floor();
    Rect::new(
        tile_lon(x, n),
        tile_lat(y + 1.0, n),
        tile_lon(x + 1.0, n),
        tile_lat(y, n),
    )
}

/// Tile containing the coordinate at the given zoom.
pub fn tile_at(lat: f64, lon: f64, zoom: i64) -> (i64, i64) {
    let zoom = zoom.clamp(0, 30);
    let n = (1i64 << zoom) as f64;
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = ((lon + 180.0) / 360.0 * n).floor();
    let lat_rad = lat.to_radians();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
    let max = (n - 1.0) as i64;
    ((x as i64).clamp(0, max), (y as i64).clamp(0, max))
}

/// Lat/lon rectangle addressed by a quadkey.
pub fn quadkey_bounds(key: &str) -> Result<Rect> {
    if key.len() > 30 {
        return Err(GeoError::Argument("invalid quad key".to_string()));
    }
    let mut x: i64 = 0;
    let mut y: i64 = 0;
    for ch in key.chars() {
        x <<= 1;
        y <<= 1;
        match ch {
            '0' => {}
            '1' => x |= 1,
            '2' => y |= 1,
            '3' => {
                x |= 1;
                y |= 1;
            }
            _ => return Err(GeoError::Argument("invalid quad key".to_string())),
        }
    }
    Ok(tile_bounds(x as f64, y as f64, key.len() as f64))
}

/// Quadkey of the cell containing the coordinate.
pub fn quadkey_at(lat: f64, lon: f64, precision: i64) -> String {
    let precision = precision.clamp(1, 30);
    let (x, y) = tile_at(lat, lon, precision);
    let mut key = String::with_capacity(precision as usize);
    for i in (1..=precision).rev() {
        let mask = 1i64 << (i - 1);
        let mut digit = 0u8;
        if x & mask != 0 {
            digit += 1;
        }
        if y & mask != 0 {
            digit += 2;
        }
        key.push((b'0' + digit) as char);
    }
    key
}

/// Lat/lon rectangle of a geohash cell.
pub fn geohash_bounds(hash: &str) -> Result<Rect> {
    let bbox = geohash::decode_bbox(hash)
        .map_err(|_| GeoError::Argument("invalid hash".to_string()))?;
    Ok(Rect::new(
        bbox.min().x,
        bbox.min().y,
        bbox.max().x,
        bbox.max().y,
    ))
}

/// Geohash of the cell containing the coordinate.
pub fn geohash_at(lon: f64, lat: f64, precision: i64) -> Result<String> {
    let len = (precision.clamp(1, MAX_GEOHASH_LEN as i64)) as usize;
    geohash::encode(geohash::Coord { x: lon, y: lat }, len)
        .map_err(|_| GeoError::Argument("invalid hash".to_string()))
}
