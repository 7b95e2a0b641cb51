//! Command surface: case-insensitive verbs over byte arguments, each
//! answered with a typed reply. Geometry values are transcoded to WKT on
//! egress; inputs are auto-detected (WKT, WKB, or the reserved GeoJSON).

pub mod search;

use crate::error::GeoError;
use crate::geo::geom::Geom;
use crate::geo::wkt::{DecodeOpts, EncodeOpts};
use crate::store::keyspace::Keyspace;
use bytes::Bytes;

/// Reply model of the command/reply protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Integer(i64),
    Double(f64),
    Bulk(Bytes),
    Null,
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn error(msg: impl Into<String>) -> Reply {
        Reply::Error(msg.into())
    }

    pub fn bulk(s: impl Into<String>) -> Reply {
        Reply::Bulk(Bytes::from(s.into()))
    }
}

pub(crate) fn arg_str(args: &[Bytes], i: usize) -> String {
    String::from_utf8_lossy(&args[i]).into_owned()
}

fn wrong_args(verb: &str) -> Reply {
    Reply::error(format!("wrong number of arguments for '{verb}' command"))
}

fn decode_geometry(bytes: &[u8]) -> Result<Geom, Reply> {
    Geom::decode(bytes, DecodeOpts::default()).map_err(|e| match e {
        GeoError::Unsupported => Reply::error("unsupported geometry encoding"),
        _ => Reply::error("invalid geometry"),
    })
}

pub(crate) fn wkt_bulk(g: &Geom) -> Reply {
    Reply::bulk(g.encode_wkt(EncodeOpts::default()))
}

/// Execute one command for `client`. The client id scopes fence
/// subscriptions; reads may pass any value.
pub fn dispatch(ks: &Keyspace, client: u64, args: &[Bytes]) -> Reply {
    if args.is_empty() {
        return Reply::error("empty command");
    }
    let verb = String::from_utf8_lossy(&args[0]).to_ascii_lowercase();
    match verb.as_str() {
        "gset" => gset(ks, args),
        "gsetnx" => gsetnx(ks, args),
        "gmset" => gmset(ks, args),
        "gget" => gget(ks, args),
        "gmget" => gmget(ks, args),
        "gdel" => gdel(ks, args),
        "gexists" => gexists(ks, args),
        "glen" => glen(ks, args),
        "gstrlen" => gstrlen(ks, args),
        "gkeys" => ggetall_generic(ks, args, true, false),
        "gvals" => ggetall_generic(ks, args, false, true),
        "ggetall" => ggetall_generic(ks, args, true, true),
        "gscan" => gscan(ks, args),
        "gsearch" => search::gsearch(ks, client, args),
        _ => Reply::error(format!("unknown command '{verb}'")),
    }
}

fn gset(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() != 4 {
        return wrong_args("gset");
    }
    let geom = match decode_geometry(&args[3]) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let field = arg_str(args, 2);
    let updated = ks.write_or_create(&arg_str(args, 1), |v| {
        v.set(&field, geom, Some(ks.bus().as_ref()))
    });
    Reply::Integer(if updated { 0 } else { 1 })
}

fn gsetnx(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() != 4 {
        return wrong_args("gsetnx");
    }
    let key = arg_str(args, 1);
    let field = arg_str(args, 2);
    if ks.read(&key, |v| v.exists(&field)).unwrap_or(false) {
        return Reply::Integer(0);
    }
    let geom = match decode_geometry(&args[3]) {
        Ok(g) => g,
        Err(e) => return e,
    };
    ks.write_or_create(&key, |v| v.set(&field, geom, Some(ks.bus().as_ref())));
    Reply::Integer(1)
}

fn gmset(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() < 4 || (args.len() - 2) % 2 != 0 {
        return wrong_args("gmset");
    }
    // decode everything before touching the store
    let mut pairs = Vec::with_capacity((args.len() - 2) / 2);
    for i in (2..args.len()).step_by(2) {
        let geom = match decode_geometry(&args[i + 1]) {
            Ok(g) => g,
            Err(e) => return e,
        };
        pairs.push((arg_str(args, i), geom));
    }
    ks.write_or_create(&arg_str(args, 1), |v| {
        for (field, geom) in pairs {
            v.set(&field, geom, Some(ks.bus().as_ref()));
        }
    });
    Reply::Ok
}

fn gget(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() != 3 {
        return wrong_args("gget");
    }
    let field = arg_str(args, 2);
    ks.read(&arg_str(args, 1), |v| v.get(&field).map(wkt_bulk))
        .flatten()
        .unwrap_or(Reply::Null)
}

fn gmget(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() < 3 {
        return wrong_args("gmget");
    }
    let key = arg_str(args, 1);
    let replies = args[2..]
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let field = arg_str(args, i + 2);
            ks.read(&key, |v| v.get(&field).map(wkt_bulk))
                .flatten()
                .unwrap_or(Reply::Null)
        })
        .collect();
    Reply::Array(replies)
}

fn gdel(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() < 3 {
        return wrong_args("gdel");
    }
    let key = arg_str(args, 1);
    let mut deleted = 0i64;
    for i in 2..args.len() {
        let field = arg_str(args, i);
        let removed = ks
            .write(&key, |v| v.delete(&field, Some(ks.bus().as_ref())))
            .unwrap_or(false);
        if removed {
            deleted += 1;
            if ks.remove_if_empty(&key) {
                break;
            }
        }
    }
    Reply::Integer(deleted)
}

fn gexists(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() != 3 {
        return wrong_args("gexists");
    }
    let field = arg_str(args, 2);
    let exists = ks
        .read(&arg_str(args, 1), |v| v.exists(&field))
        .unwrap_or(false);
    Reply::Integer(exists as i64)
}

fn glen(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() != 2 {
        return wrong_args("glen");
    }
    Reply::Integer(ks.read(&arg_str(args, 1), |v| v.len()).unwrap_or(0) as i64)
}

fn gstrlen(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() != 3 {
        return wrong_args("gstrlen");
    }
    let field = arg_str(args, 2);
    let len = ks
        .read(&arg_str(args, 1), |v| v.value_len(&field))
        .unwrap_or(0);
    Reply::Integer(len as i64)
}

fn ggetall_generic(ks: &Keyspace, args: &[Bytes], keys: bool, vals: bool) -> Reply {
    if args.len() != 2 {
        return wrong_args(if keys && vals {
            "ggetall"
        } else if keys {
            "gkeys"
        } else {
            "gvals"
        });
    }
    let replies = ks
        .read(&arg_str(args, 1), |v| {
            let mut out = Vec::new();
            for (field, geom) in v.entries() {
                if keys {
                    out.push(Reply::bulk(field.clone()));
                }
                if vals {
                    out.push(wkt_bulk(geom));
                }
            }
            out
        })
        .unwrap_or_default();
    Reply::Array(replies)
}

fn gscan(ks: &Keyspace, args: &[Bytes]) -> Reply {
    if args.len() < 3 {
        return wrong_args("gscan");
    }
    let key = arg_str(args, 1);
    let Ok(cursor) = arg_str(args, 2).trim().parse::<u64>() else {
        return Reply::error("invalid cursor");
    };
    let mut pattern: Option<String> = None;
    let mut count = 10usize;
    let mut i = 3;
    while i < args.len() {
        let opt = arg_str(args, i).to_ascii_lowercase();
        match opt.as_str() {
            "match" if i + 1 < args.len() => {
                let p = arg_str(args, i + 1);
                if p != "*" {
                    pattern = Some(p);
                }
                i += 2;
            }
            "count" if i + 1 < args.len() => {
                match arg_str(args, i + 1).trim().parse::<usize>() {
                    Ok(n) if n >= 1 => count = n,
                    _ => return Reply::error("syntax error"),
                }
                i += 2;
            }
            _ => return Reply::error("syntax error"),
        }
    }
    let scanned = ks.read(&key, |v| {
        let (next, batch) = v.scan(cursor, pattern.as_deref(), count);
        let mut flat = Vec::with_capacity(batch.len() * 2);
        for (field, geom) in batch {
            flat.push(Reply::bulk(field.clone()));
            flat.push(wkt_bulk(geom));
        }
        (next, flat)
    });
    let (next, flat) = scanned.unwrap_or((0, Vec::new()));
    Reply::Array(vec![Reply::Integer(next as i64), Reply::Array(flat)])
}
