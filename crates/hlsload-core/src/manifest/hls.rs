//! Lossy HLS playlist parser
//!
//! Reads a playlist line by line and never fails:
//! - `#EXT-X-STREAM-INF` declares a variant whose URI is the next line
//! - `#EXTINF` declares a fragment whose URI is the next line
//! - every other `#EXT-X-` tag is stored generically under its normalized name
//!
//! Malformed input degrades instead of erroring: a tag without `:` becomes a
//! boolean flag and a payload that fits no type is kept as text.

use super::{Fragment, Manifest, Variant};
use crate::value::{coerce, normalize_key, split, Value, EXTENSION_PREFIX};
use std::collections::BTreeMap;
use tracing::trace;

/// Tag declaring a variant stream in a master manifest
pub const VARIANT_TAG: &str = "#EXT-X-STREAM-INF";

/// Tag declaring a media fragment in a media playlist
pub const FRAGMENT_TAG: &str = "#EXTINF";

const COMMENT_MARKER: char = '#';

/// Parse manifest text.
///
/// `previous_variants` is the variant list already known to the caller. A
/// response without any variant tags is a media playlist, so the result
/// carries `previous_variants` forward instead of reporting no variants.
/// A response that does declare variants always starts a fresh list.
pub fn parse(text: &str, previous_variants: Option<Vec<Variant>>) -> Manifest {
    let lines: Vec<&str> = text.split('\n').map(str::trim_end).collect();

    let mut variants: Option<Vec<Variant>> = None;
    let mut fragments: Option<Vec<Fragment>> = None;
    let mut tags = BTreeMap::new();

    for (idx, line) in lines.iter().enumerate() {
        if !line.starts_with(COMMENT_MARKER) {
            continue;
        }

        let (name, payload) = match line.split_once(':') {
            Some((name, payload)) => (name, Some(payload)),
            None => (*line, None),
        };
        let uri_line = lines
            .get(idx + 1)
            .copied()
            .filter(|next| !next.starts_with(COMMENT_MARKER));

        match name {
            VARIANT_TAG => {
                let list = variants.get_or_insert_with(Vec::new);
                let attributes = coerce(payload.unwrap_or_default());
                match uri_line {
                    Some(uri) => list.push(Variant::new(uri, attributes)),
                    None => trace!(line = idx, "Variant tag without URI line"),
                }
            }
            FRAGMENT_TAG => {
                let list = fragments.get_or_insert_with(Vec::new);
                let payload = payload.unwrap_or_default();
                let duration = fragment_duration(&coerce(payload), payload);
                match uri_line {
                    Some(uri) if list.iter().any(|f| f.uri == uri) => {
                        trace!(uri, "Skipping duplicate fragment");
                    }
                    Some(uri) => list.push(Fragment::new(uri, duration)),
                    None => trace!(line = idx, "Fragment tag without URI line"),
                }
            }
            _ if name.starts_with(EXTENSION_PREFIX) => {
                let value = match payload {
                    Some(payload) => coerce(payload),
                    None => Value::Boolean(true),
                };
                tags.insert(normalize_key(name), value);
            }
            _ => {}
        }
    }

    Manifest {
        variants: variants.or(previous_variants),
        fragments,
        tags,
    }
}

/// Duration is the first positional item of the `#EXTINF` payload. A bare
/// `6.006,` payload coerces to text, so fall back to its first segment.
fn fragment_duration(attributes: &Value, payload: &str) -> f64 {
    attributes
        .first()
        .and_then(Value::as_f64)
        .or_else(|| {
            split(payload, ',')
                .next()
                .and_then(|head| head.trim().parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}
