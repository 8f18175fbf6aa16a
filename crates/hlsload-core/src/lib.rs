//! hlsload Core - HLS load generation library
//!
//! This crate simulates viewers of an HTTP Live Streaming origin or CDN:
//! - Lossy, never-failing playlist parsing with typed attribute coercion
//! - Variant selection (fixed index or random)
//! - Fragment download with a simulated playback clock and buffer
//! - Live media playlist refresh
//! - Per-request success/failure reporting
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         hlsload Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐                             │
//! │  │    Value     │─▶│   Manifest   │                             │
//! │  │   Coercion   │  │    Parser    │                             │
//! │  └──────────────┘  └──────┬───────┘                             │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Player    │                              │
//! │                    │   Session   │                              │
//! │                    └──┬───────┬──┘                              │
//! │                       │       │                                 │
//! │              ┌────────┴─┐  ┌──┴───────────┐  ┌──────────────┐   │
//! │              │ Fetcher  │  │  Event Sink  │─▶│   Request    │   │
//! │              │  (HTTP)  │  │              │  │    Stats     │   │
//! │              └──────────┘  └──────────────┘  └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod session;
pub mod types;
pub mod value;

pub use analytics::{EventLog, EventSink, MultiSink, RequestStats, RequestStatsEntry, TracingSink};
pub use error::{Error, FetchError, Result};
pub use fetch::{FetchResponse, Fetcher, HttpFetcher};
pub use manifest::{Fragment, Manifest, Variant};
pub use session::Player;
pub use types::*;
pub use value::{coerce, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "hlsload core initialized");
}
