//! Manifest parsing example
//!
//! Demonstrates lossy parsing of a master manifest followed by a media
//! playlist that inherits the master's variants.
//!
//! Run with: cargo run -p hlsload-core --example parse_manifest

use hlsload_core::manifest::parse;
use hlsload_core::session::select_variant;
use hlsload_core::value::coerce;

fn main() {
    println!("hlsload Core - Manifest Parsing Example");
    println!("=======================================\n");

    let master = r#"#EXTM3U
#EXT-X-VERSION:4
#EXT-X-INDEPENDENT-SEGMENTS
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS="avc1.4d401e,mp4a.40.2"
360p/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,CODECS="avc1.4d401f,mp4a.40.2"
720p/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080,CODECS="avc1.640028,mp4a.40.2"
1080p/playlist.m3u8
"#;

    let manifest = parse(master, None);
    println!("Master manifest: {} variants", manifest.variants().len());
    for (i, variant) in manifest.variants().iter().enumerate() {
        println!(
            "  {}. {} bandwidth={:?} resolution={:?} codecs={:?}",
            i,
            variant.uri,
            variant.bandwidth(),
            variant.resolution(),
            variant.attribute("codecs").and_then(|v| v.as_str()),
        );
    }
    for (name, value) in &manifest.tags {
        println!("  tag {} = {}", name, value);
    }

    if let Some(variant) = select_variant(manifest.variants(), Some(4)) {
        println!("\nQuality 4 wraps around to {}", variant.uri);
    }

    let media = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:120
#EXTINF:6.006,
segment120.ts
#EXTINF:6.006,
segment121.ts
#EXTINF:5.839,title
segment122.ts
#EXTINF:6.006,
segment121.ts
"#;

    let playlist = parse(media, manifest.variants.clone());
    println!(
        "\nMedia playlist: {} fragments, {:.3}s total (duplicate URI dropped)",
        playlist.fragments().len(),
        playlist.total_duration()
    );
    println!("  target duration: {:?}", playlist.target_duration());
    println!("  media sequence:  {:?}", playlist.media_sequence());
    println!("  live:            {}", !playlist.is_endlist());
    println!("  inherited variants: {}", playlist.variants().len());

    println!("\nAttribute coercion:");
    for raw in ["42", "6.006", "YES", "6.006,title", "A=1,B-C=\"x,y\"", "VOD"] {
        println!("  {:<16} -> {:?}", raw, coerce(raw));
    }
}
