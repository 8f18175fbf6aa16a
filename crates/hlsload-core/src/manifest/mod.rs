//! Manifest data model and parsing

mod hls;

pub use hls::{parse, FRAGMENT_TAG, VARIANT_TAG};

use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// One variant stream declared by a master manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    /// URI of the media playlist, relative or absolute
    pub uri: String,
    /// Coerced attribute payload; a map for well-formed tags, raw text otherwise
    pub attributes: Value,
}

impl Variant {
    pub fn new(uri: impl Into<String>, attributes: Value) -> Self {
        Self {
            uri: uri.into(),
            attributes,
        }
    }

    /// Look up a normalized attribute name (e.g. `bandwidth`, `codecs`)
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Declared peak bandwidth in bits per second
    pub fn bandwidth(&self) -> Option<u64> {
        self.attribute("bandwidth")
            .and_then(Value::as_i64)
            .and_then(|bw| u64::try_from(bw).ok())
    }

    /// Declared resolution as (width, height)
    pub fn resolution(&self) -> Option<(u32, u32)> {
        let raw = self.attribute("resolution")?.as_str()?;
        let (w, h) = raw.split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// One media segment in a media playlist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    /// URI of the segment, relative or absolute
    pub uri: String,
    /// Duration in seconds
    pub duration: f64,
}

impl Fragment {
    pub fn new(uri: impl Into<String>, duration: f64) -> Self {
        Self {
            uri: uri.into(),
            duration,
        }
    }
}

/// Result of parsing one manifest response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Manifest {
    /// Variant streams; carried over from the previous parse for media playlists
    pub variants: Option<Vec<Variant>>,
    /// Fragment queue, unique by URI
    pub fragments: Option<Vec<Fragment>>,
    /// Every other `#EXT-X-` tag keyed by normalized name
    pub tags: BTreeMap<String, Value>,
}

impl Manifest {
    /// Variants as a slice, empty when none are known
    pub fn variants(&self) -> &[Variant] {
        self.variants.as_deref().unwrap_or_default()
    }

    /// Fragments as a slice, empty when the response declared none
    pub fn fragments(&self) -> &[Fragment] {
        self.fragments.as_deref().unwrap_or_default()
    }

    /// Generic tag lookup by normalized name
    pub fn tag(&self, name: &str) -> Option<&Value> {
        self.tags.get(name)
    }

    /// True when this response declared fragments rather than only variants
    pub fn is_media_playlist(&self) -> bool {
        self.fragments.is_some()
    }

    /// True for a master manifest: variants and no fragment tags. A media
    /// playlist that carried variants forward is not a master.
    pub fn is_master(&self) -> bool {
        !self.variants().is_empty() && !self.is_media_playlist()
    }

    /// `#EXT-X-TARGETDURATION` in seconds
    pub fn target_duration(&self) -> Option<f64> {
        self.tag("targetduration").and_then(Value::as_f64)
    }

    /// `#EXT-X-MEDIA-SEQUENCE`
    pub fn media_sequence(&self) -> Option<i64> {
        self.tag("media_sequence").and_then(Value::as_i64)
    }

    /// `#EXT-X-VERSION`
    pub fn version(&self) -> Option<i64> {
        self.tag("version").and_then(Value::as_i64)
    }

    /// `#EXT-X-PLAYLIST-TYPE`, e.g. `VOD` or `EVENT`
    pub fn playlist_type(&self) -> Option<&str> {
        self.tag("playlist_type").and_then(Value::as_str)
    }

    /// True when `#EXT-X-ENDLIST` was present
    pub fn is_endlist(&self) -> bool {
        self.tags.contains_key("endlist")
    }

    /// Total duration of the declared fragments in seconds
    pub fn total_duration(&self) -> f64 {
        self.fragments().iter().map(|f| f.duration).sum()
    }
}
