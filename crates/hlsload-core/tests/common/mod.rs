//! Shared helpers for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use hlsload_core::{FetchError, FetchResponse, Fetcher};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// One scripted reply
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<String, FetchError>,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(body.into()),
        }
    }

    pub fn err(error: FetchError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct Route {
    queued: VecDeque<Reply>,
    default: Option<Reply>,
}

/// In-memory fetcher: queued replies are served first, then the route's
/// default. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
    segment_downloads: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request for `url` with `reply` once queued replies run out
    pub fn route(self, url: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .default = Some(reply);
        self
    }

    /// Serve `body` for `url`
    pub fn serve(self, url: &str, body: impl Into<String>) -> Self {
        self.route(url, Reply::ok(body))
    }

    /// Queue a one-shot reply for `url`
    pub fn then(self, url: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .queued
            .push_back(reply);
        self
    }

    /// Number of requests issued for `url`
    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// URLs requested through the body-discarding segment path
    pub fn segment_downloads(&self) -> Vec<String> {
        self.segment_downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            routes.get_mut(url.as_str()).and_then(|route| {
                route.queued.pop_front().or_else(|| route.default.clone())
            })
        };

        let Some(reply) = reply else {
            return Err(FetchError::Http(404));
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result.map(FetchResponse::ok)
    }

    async fn fetch_segment(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.segment_downloads.lock().unwrap().push(url.to_string());
        self.fetch(url).await
    }
}

pub const MASTER_URL: &str = "http://cdn.test/live/master.m3u8";
pub const LOW_URL: &str = "http://cdn.test/live/low/index.m3u8";
pub const HIGH_URL: &str = "http://cdn.test/live/high/index.m3u8";

/// Two-variant master manifest pointing at `LOW_URL` and `HIGH_URL`
pub fn master_playlist() -> String {
    "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
high/index.m3u8
"
    .to_string()
}

/// Media playlist with one fragment per duration, named `seg{i}.ts`
pub fn media_playlist(durations: &[f64], endlist: bool) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:12\n#EXT-X-MEDIA-SEQUENCE:0\n");
    for (i, duration) in durations.iter().enumerate() {
        text.push_str(&format!("#EXTINF:{:.3},\nseg{}.ts\n", duration, i));
    }
    if endlist {
        text.push_str("#EXT-X-ENDLIST\n");
    }
    text
}

/// Absolute URL of fragment `index` of the low variant
pub fn low_segment(index: usize) -> String {
    format!("http://cdn.test/live/low/seg{}.ts", index)
}

/// Fetcher serving the master, the low variant playlist and its fragments
pub fn low_variant_fetcher(durations: &[f64], endlist: bool) -> ScriptedFetcher {
    let mut fetcher = ScriptedFetcher::new()
        .serve(MASTER_URL, master_playlist())
        .serve(LOW_URL, media_playlist(durations, endlist));
    for i in 0..durations.len() + 4 {
        fetcher = fetcher.serve(&low_segment(i), "\x47 fake transport stream");
    }
    fetcher
}
