// Search and geofence integration tests.

use bytes::Bytes;
use rusty_geostore::geo::geodesy;
use rusty_geostore::{dispatch, Keyspace, MemoryBus, Reply};
use std::sync::Arc;

fn cmd_as(ks: &Keyspace, client: u64, parts: &[&str]) -> Reply {
    let args: Vec<Bytes> = parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect();
    dispatch(ks, client, &args)
}

fn cmd(ks: &Keyspace, parts: &[&str]) -> Reply {
    cmd_as(ks, 1, parts)
}

fn messages(bus: &MemoryBus, client: u64) -> Vec<String> {
    bus.drain(client)
        .into_iter()
        .map(|(_, m)| String::from_utf8_lossy(&m).into_owned())
        .collect()
}

#[test]
fn test_intersects_bounds_returns_polygon() {
    let ks = Keyspace::new();
    cmd(&ks, &["GSET", "pg", "r1", "POLYGON((0 0,10 0,10 10,0 10,0 0))"]);
    assert_eq!(
        cmd(&ks, &["GSEARCH", "pg", "INTERSECTS", "BOUNDS", "5", "5", "6", "6"]),
        Reply::Array(vec![
            Reply::Integer(0),
            Reply::Array(vec![
                Reply::Bulk(Bytes::from("r1")),
                Reply::Bulk(Bytes::from("POLYGON((0 0,10 0,10 10,0 10,0 0))"))
            ])
        ])
    );
}

#[test]
fn test_within_radius_field_output() {
    let ks = Keyspace::new();
    cmd(&ks, &["GSET", "pts", "a", "POINT(0 0)"]);
    cmd(&ks, &["GSET", "pts", "b", "POINT(0 1)"]);
    assert_eq!(
        cmd(
            &ks,
            &["GSEARCH", "pts", "WITHIN", "RADIUS", "0", "0", "120000", "OUTPUT", "FIELD"]
        ),
        Reply::Array(vec![
            Reply::Integer(0),
            Reply::Array(vec![Reply::Bulk(Bytes::from("a")), Reply::Bulk(Bytes::from("b"))])
        ])
    );
}

#[test]
fn test_radius_boundary_accuracy() {
    let ks = Keyspace::new();
    let (lat_in, lon_in) = geodesy::destination(0.0, 0.0, 119_990.0, 90.0);
    let (lat_out, lon_out) = geodesy::destination(0.0, 0.0, 120_010.0, 90.0);
    cmd(&ks, &["GSET", "pts", "in", &format!("POINT({lon_in} {lat_in})")]);
    cmd(&ks, &["GSET", "pts", "out", &format!("POINT({lon_out} {lat_out})")]);
    assert_eq!(
        cmd(
            &ks,
            &["GSEARCH", "pts", "WITHIN", "RADIUS", "0", "0", "120000", "OUTPUT", "FIELD"]
        ),
        Reply::Array(vec![
            Reply::Integer(0),
            Reply::Array(vec![Reply::Bulk(Bytes::from("in"))])
        ])
    );
}

#[test]
fn test_collection_search_count() {
    let ks = Keyspace::new();
    cmd(&ks, &["GSET", "g", "c", "GEOMETRYCOLLECTION(POINT(1 1),POINT(2 2))"]);
    assert_eq!(
        cmd(
            &ks,
            &["GSEARCH", "g", "INTERSECTS", "BOUNDS", "1.5", "1.5", "3", "3", "OUTPUT", "COUNT"]
        ),
        Reply::Integer(1)
    );
}

#[test]
fn test_count_matches_list_length() {
    let ks = Keyspace::new();
    for i in 0..30 {
        cmd(&ks, &["GSET", "k", &format!("f{i}"), &format!("POINT({} 0)", i)]);
    }
    let Reply::Integer(count) = cmd(
        &ks,
        &["GSEARCH", "k", "INTERSECTS", "BOUNDS", "3", "-1", "12", "1", "OUTPUT", "COUNT"],
    ) else {
        panic!("expected count");
    };
    let Reply::Array(parts) = cmd(&ks, &["GSEARCH", "k", "INTERSECTS", "BOUNDS", "3", "-1", "12", "1"])
    else {
        panic!("expected array");
    };
    let Reply::Array(flat) = &parts[1] else {
        panic!("expected body");
    };
    assert_eq!(flat.len() as i64, count * 2);
    assert_eq!(count, 10);
}

#[test]
fn test_fence_inside_outside_delete() {
    let bus = Arc::new(MemoryBus::new());
    let ks = Keyspace::with_bus(bus.clone());
    let subscriber = 7;

    let reply = cmd_as(&ks, subscriber, &["GSEARCH", "f", "INTERSECTS", "BOUNDS", "0", "0", "1", "1", "FENCE"]);
    let Reply::Bulk(channel) = reply else {
        panic!("expected fence channel, got {reply:?}");
    };
    let channel = String::from_utf8_lossy(&channel).into_owned();
    assert!(channel.starts_with("fence$"));
    assert!(channel.ends_with("$f"));

    cmd(&ks, &["GSET", "f", "car", "POINT(0.5 0.5)"]);
    assert_eq!(messages(&bus, subscriber), vec!["inside:car".to_string()]);

    cmd(&ks, &["GSET", "f", "car", "POINT(2 2)"]);
    assert_eq!(messages(&bus, subscriber), vec!["outside:car".to_string()]);

    cmd(&ks, &["GDEL", "f", "car"]);
    assert_eq!(messages(&bus, subscriber), vec!["outside:car".to_string()]);
}

#[test]
fn test_fence_pattern_scopes_notifications() {
    let bus = Arc::new(MemoryBus::new());
    let ks = Keyspace::with_bus(bus.clone());
    let subscriber = 3;
    cmd_as(
        &ks,
        subscriber,
        &["GSEARCH", "f", "MATCH", "truck*", "INTERSECTS", "BOUNDS", "0", "0", "1", "1", "FENCE"],
    );
    cmd(&ks, &["GSET", "f", "car", "POINT(0.5 0.5)"]);
    cmd(&ks, &["GSET", "f", "truck9", "POINT(0.5 0.5)"]);
    assert_eq!(messages(&bus, subscriber), vec!["inside:truck9".to_string()]);
}

#[test]
fn test_fence_teardown_stops_notifications() {
    let bus = Arc::new(MemoryBus::new());
    let ks = Keyspace::with_bus(bus.clone());
    let subscriber = 5;
    cmd_as(&ks, subscriber, &["GSEARCH", "f", "INTERSECTS", "BOUNDS", "0", "0", "1", "1", "FENCE"]);
    cmd(&ks, &["GSET", "f", "car", "POINT(0.5 0.5)"]);
    assert_eq!(messages(&bus, subscriber).len(), 1);

    ks.release_fences(subscriber);
    assert_eq!(ks.read("f", |v| v.fence_count()), Some(0));
    cmd(&ks, &["GSET", "f", "car", "POINT(0.6 0.6)"]);
    assert!(messages(&bus, subscriber).is_empty());
}

#[test]
fn test_new_fence_replaces_previous() {
    let bus = Arc::new(MemoryBus::new());
    let ks = Keyspace::with_bus(bus.clone());
    let subscriber = 9;
    cmd_as(&ks, subscriber, &["GSEARCH", "a", "INTERSECTS", "BOUNDS", "0", "0", "1", "1", "FENCE"]);
    cmd_as(&ks, subscriber, &["GSEARCH", "b", "INTERSECTS", "BOUNDS", "0", "0", "1", "1", "FENCE"]);
    assert_eq!(ks.read("a", |v| v.fence_count()), Some(0));
    assert_eq!(ks.read("b", |v| v.fence_count()), Some(1));

    cmd(&ks, &["GSET", "a", "x", "POINT(0.5 0.5)"]);
    assert!(messages(&bus, subscriber).is_empty());
    cmd(&ks, &["GSET", "b", "y", "POINT(0.5 0.5)"]);
    assert_eq!(messages(&bus, subscriber), vec!["inside:y".to_string()]);
}

#[test]
fn test_within_vs_intersects_modes() {
    let ks = Keyspace::new();
    cmd(&ks, &["GSET", "k", "inside", "POLYGON((1 1,2 1,2 2,1 2,1 1))"]);
    cmd(&ks, &["GSET", "k", "straddling", "POLYGON((9 9,11 9,11 11,9 11,9 9))"]);
    let target = ["BOUNDS", "0", "0", "10", "10"];

    let run = |mode: &str| {
        let mut parts = vec!["GSEARCH", "k", mode];
        parts.extend_from_slice(&target);
        parts.extend_from_slice(&["OUTPUT", "FIELD"]);
        let Reply::Array(reply) = cmd(&ks, &parts) else {
            panic!("bad reply");
        };
        let Reply::Array(names) = &reply[1] else {
            panic!("bad body");
        };
        let mut fields: Vec<String> = names
            .iter()
            .map(|r| match r {
                Reply::Bulk(b) => String::from_utf8_lossy(b).into_owned(),
                _ => panic!("bad field"),
            })
            .collect();
        fields.sort();
        fields
    };

    assert_eq!(run("INTERSECTS"), vec!["inside".to_string(), "straddling".to_string()]);
    assert_eq!(run("WITHIN"), vec!["inside".to_string()]);
}

#[test]
fn test_radius_search_with_polygon_candidate() {
    let ks = Keyspace::new();
    // a small polygon around (0.05, 0.05), roughly 7.8km from the origin
    cmd(&ks, &["GSET", "k", "area", "POLYGON((0.04 0.04,0.06 0.04,0.06 0.06,0.04 0.06,0.04 0.04))"]);
    assert_eq!(
        cmd(&ks, &["GSEARCH", "k", "INTERSECTS", "RADIUS", "0", "0", "10000", "OUTPUT", "COUNT"]),
        Reply::Integer(1)
    );
    assert_eq!(
        cmd(&ks, &["GSEARCH", "k", "INTERSECTS", "RADIUS", "0", "0", "1000", "OUTPUT", "COUNT"]),
        Reply::Integer(0)
    );
}

#[test]
fn test_tile_quad_hash_targets_reduce_to_bounds() {
    let ks = Keyspace::new();
    cmd(&ks, &["GSET", "k", "sf", "POINT(-122.4194 37.7749)"]);
    cmd(&ks, &["GSET", "k", "nyc", "POINT(-74.006 40.7128)"]);

    // tile containing San Francisco at zoom 10
    let (tx, ty) = rusty_geostore::geo::cell::tile_at(37.7749, -122.4194, 10);
    let reply = cmd(
        &ks,
        &["GSEARCH", "k", "TILE", &tx.to_string(), &ty.to_string(), "10", "OUTPUT", "FIELD"],
    );
    assert_eq!(
        reply,
        Reply::Array(vec![
            Reply::Integer(0),
            Reply::Array(vec![Reply::Bulk(Bytes::from("sf"))])
        ])
    );

    let quad = rusty_geostore::geo::cell::quadkey_at(40.7128, -74.006, 12);
    let reply = cmd(&ks, &["GSEARCH", "k", "QUAD", &quad, "OUTPUT", "FIELD"]);
    assert_eq!(
        reply,
        Reply::Array(vec![
            Reply::Integer(0),
            Reply::Array(vec![Reply::Bulk(Bytes::from("nyc"))])
        ])
    );

    let hash = rusty_geostore::geo::cell::geohash_at(-122.4194, 37.7749, 6).unwrap();
    let reply = cmd(&ks, &["GSEARCH", "k", "HASH", &hash, "OUTPUT", "FIELD"]);
    assert_eq!(
        reply,
        Reply::Array(vec![
            Reply::Integer(0),
            Reply::Array(vec![Reply::Bulk(Bytes::from("sf"))])
        ])
    );
}
