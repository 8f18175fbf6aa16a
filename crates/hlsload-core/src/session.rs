//! Playback simulation
//!
//! A [`Player`] drives one session at a time through:
//!
//! ```text
//! FetchingMaster -> FetchingVariant -> Buffering -> Playing -> Finished
//!        |                 |                            |
//!        +---------------- +-------> Failed <-----------+ (underrun)
//! ```
//!
//! Each loop tick fetches at most one fragment, advances the simulated
//! playback clock, refreshes a stale media playlist while playing, and then
//! sleeps for one tick so other sessions get to run.

use crate::{
    analytics::EventSink,
    error::{Error, FetchError},
    fetch::{FetchResponse, Fetcher, HttpFetcher},
    manifest::{self, Fragment, Variant},
    types::*,
    Result,
};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Request name under which every fragment of `playlist_url` is reported
pub fn segment_request_name(playlist_url: &Url) -> String {
    format!("Segment ({})", playlist_url)
}

/// Pick the variant to play: `quality` modulo the variant count, or a
/// uniformly random variant when no quality is given.
pub fn select_variant(variants: &[Variant], quality: Option<usize>) -> Option<&Variant> {
    if variants.is_empty() {
        return None;
    }
    match quality {
        Some(index) => variants.get(index % variants.len()),
        None => variants.choose(&mut rand::thread_rng()),
    }
}

/// What a request downloads; fragment bodies are never parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Manifest,
    Segment,
}

/// Mutable state of one playback run
struct Session {
    id: SessionId,
    state: PlaybackState,
    /// Variant list learned from the master manifest
    variants: Option<Vec<Variant>>,
    queue: Vec<Fragment>,
    queued_uris: HashSet<String>,
    /// Index of the next fragment to fetch
    cursor: usize,
    buffered_seconds: f64,
    play_start: Option<Instant>,
    buffered_at_play_start: Option<f64>,
    last_manifest_fetch: Instant,
    retry_count: u32,
    refreshes: usize,
}

impl Session {
    fn new() -> Self {
        Self {
            id: SessionId::new(),
            state: PlaybackState::FetchingMaster,
            variants: None,
            queue: Vec::new(),
            queued_uris: HashSet::new(),
            cursor: 0,
            buffered_seconds: 0.0,
            play_start: None,
            buffered_at_play_start: None,
            last_manifest_fetch: Instant::now(),
            retry_count: 0,
            refreshes: 0,
        }
    }

    fn transition(&mut self, next: PlaybackState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        info!(session_id = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Append fragments whose URI is not queued yet; the cursor is untouched
    fn enqueue(&mut self, fragments: Vec<Fragment>) -> usize {
        let before = self.queue.len();
        for fragment in fragments {
            if self.queued_uris.insert(fragment.uri.clone()) {
                self.queue.push(fragment);
            }
        }
        self.queue.len() - before
    }

    fn has_pending_fragments(&self) -> bool {
        self.cursor < self.queue.len()
    }

    fn elapsed_play_time(&self, now: Instant) -> f64 {
        self.play_start
            .map(|start| now.duration_since(start).as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&mut self, termination: Termination, variant_url: &Url, now: Instant) -> PlaybackReport {
        self.transition(PlaybackState::Finished);
        let report = PlaybackReport {
            session_id: self.id,
            buffered_seconds: self.buffered_seconds,
            elapsed_play_time: self.elapsed_play_time(now),
            termination,
            variant_url: variant_url.to_string(),
            fragments_fetched: self.cursor,
            manifest_refreshes: self.refreshes,
            buffered_at_play_start: self.buffered_at_play_start,
        };
        info!(
            session_id = %self.id,
            termination = %termination,
            buffered = report.buffered_seconds,
            elapsed = report.elapsed_play_time,
            "Session finished"
        );
        report
    }
}

/// Simulated HLS client
pub struct Player {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn EventSink>,
    config: SimulationConfig,
}

impl Player {
    pub fn new(fetcher: Arc<dyn Fetcher>, sink: Arc<dyn EventSink>, config: SimulationConfig) -> Self {
        Self {
            fetcher,
            sink,
            config,
        }
    }

    /// Create a player that fetches over HTTP
    pub fn http(sink: Arc<dyn EventSink>, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(Arc::new(fetcher), sink, config))
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Fetch `url` and report the attempt under `name`
    async fn request(
        &self,
        url: &Url,
        name: &str,
        resource: Resource,
    ) -> std::result::Result<FetchResponse, FetchError> {
        let start = Instant::now();
        let result = match resource {
            Resource::Manifest => self.fetcher.fetch(url).await,
            Resource::Segment => self.fetcher.fetch_segment(url).await,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                self.sink
                    .report_success(name, elapsed_ms, response.response_bytes())
                    .await;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Fetch failed");
                self.sink.report_failure(name, elapsed_ms, e).await;
            }
        }

        result
    }

    /// Simulate one viewer playing `url`.
    ///
    /// `quality` pins the variant index (modulo the variant count) and
    /// `duration` caps the simulated playback time in seconds.
    ///
    /// Returns a report when the session stops gracefully: completed,
    /// duration reached, stalled on a failing fragment, or out of fragments
    /// before playback started. Startup fetch failures and buffer underruns
    /// are errors.
    ///
    /// The variant URI is joined to the master URL. Fragment URIs are joined
    /// to the media playlist URL they were listed in, not to the master URL,
    /// so `low/index.m3u8` listing `seg0.ts` fetches `low/seg0.ts`.
    #[instrument(skip(self))]
    pub async fn play(
        &self,
        url: &str,
        quality: Option<usize>,
        duration: Option<f64>,
    ) -> Result<PlaybackReport> {
        let base_url = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut session = Session::new();
        info!(session_id = %session.id, url = %base_url, "Starting session");

        // Master manifest
        let response = match self.request(&base_url, base_url.as_str(), Resource::Manifest).await {
            Ok(response) => response,
            Err(source) => {
                session.transition(PlaybackState::Failed);
                return Err(Error::MasterFetch {
                    url: base_url.to_string(),
                    source,
                });
            }
        };
        let master = manifest::parse(&response.body, None);
        session.variants = master.variants.filter(|variants| !variants.is_empty());

        let selected = session
            .variants
            .as_deref()
            .and_then(|variants| select_variant(variants, quality))
            .cloned();
        let Some(variant) = selected else {
            session.transition(PlaybackState::Failed);
            return Err(Error::NoVariants {
                url: base_url.to_string(),
            });
        };
        let playlist_url = base_url.join(&variant.uri).map_err(|e| Error::InvalidUrl {
            url: variant.uri.clone(),
            reason: e.to_string(),
        })?;
        info!(
            session_id = %session.id,
            variant = %playlist_url,
            bandwidth = variant.bandwidth(),
            "Variant selected"
        );

        // Media playlist
        session.transition(PlaybackState::FetchingVariant);
        let response = match self.request(&playlist_url, playlist_url.as_str(), Resource::Manifest).await {
            Ok(response) => response,
            Err(source) => {
                session.transition(PlaybackState::Failed);
                return Err(Error::PlaylistFetch {
                    url: playlist_url.to_string(),
                    source,
                });
            }
        };
        let media = manifest::parse(&response.body, None);
        if let Some(variants) = media.variants {
            session.variants = Some(variants);
        }
        session.enqueue(media.fragments.unwrap_or_default());
        session.last_manifest_fetch = Instant::now();
        session.transition(PlaybackState::Buffering);

        let segment_name = segment_request_name(&playlist_url);

        loop {
            if session.has_pending_fragments() {
                let fragment = &session.queue[session.cursor];
                let fragment_duration = fragment.duration;
                let fragment_url = playlist_url.join(&fragment.uri).map_err(|e| Error::InvalidUrl {
                    url: fragment.uri.clone(),
                    reason: e.to_string(),
                })?;

                match self.request(&fragment_url, &segment_name, Resource::Segment).await {
                    Ok(_) => {
                        session.cursor += 1;
                        session.buffered_seconds += fragment_duration;
                        session.retry_count = 0;
                        debug!(
                            session_id = %session.id,
                            cursor = session.cursor,
                            buffered = session.buffered_seconds,
                            "Fragment buffered"
                        );
                    }
                    Err(e) => {
                        session.retry_count += 1;
                        warn!(
                            session_id = %session.id,
                            fragment = %fragment_url,
                            attempt = session.retry_count,
                            error = %e,
                            "Fragment fetch failed"
                        );
                        if session.retry_count >= self.config.max_retries {
                            return Ok(session.finish(Termination::Stalled, &playlist_url, Instant::now()));
                        }
                    }
                }
            }

            if session.state == PlaybackState::Buffering
                && session.buffered_seconds > self.config.buffer_threshold
            {
                session.transition(PlaybackState::Playing);
                session.play_start = Some(Instant::now());
                session.buffered_at_play_start = Some(session.buffered_seconds);
            }

            if session.state == PlaybackState::Playing {
                if session.last_manifest_fetch.elapsed().as_secs_f64() > self.config.manifest_max_age {
                    self.refresh(&mut session, &playlist_url).await;
                }

                let now = Instant::now();
                let elapsed = session.elapsed_play_time(now);
                if elapsed > session.buffered_seconds {
                    if session.has_pending_fragments() {
                        warn!(
                            session_id = %session.id,
                            buffered = session.buffered_seconds,
                            elapsed,
                            pending = session.queue.len() - session.cursor,
                            "Buffer underrun"
                        );
                        session.transition(PlaybackState::Failed);
                        return Err(Error::Underrun {
                            buffered_seconds: session.buffered_seconds,
                            elapsed_play_time: elapsed,
                        });
                    }
                    return Ok(session.finish(Termination::Completed, &playlist_url, now));
                }
                if let Some(limit) = duration {
                    if elapsed > limit {
                        return Ok(session.finish(Termination::DurationReached, &playlist_url, now));
                    }
                }
            } else if !session.has_pending_fragments() {
                return Ok(session.finish(
                    Termination::ExhaustedBeforePlayback,
                    &playlist_url,
                    Instant::now(),
                ));
            }

            tokio::time::sleep(self.config.tick()).await;
        }
    }

    /// Re-fetch the media playlist and queue any new fragments. A failed
    /// refresh keeps the current queue.
    async fn refresh(&self, session: &mut Session, playlist_url: &Url) {
        let result = self.request(playlist_url, playlist_url.as_str(), Resource::Manifest).await;
        session.last_manifest_fetch = Instant::now();

        match result {
            Ok(response) => {
                let manifest = manifest::parse(&response.body, session.variants.take());
                session.variants = manifest.variants;
                let added = session.enqueue(manifest.fragments.unwrap_or_default());
                session.refreshes += 1;
                debug!(
                    session_id = %session.id,
                    added,
                    queued = session.queue.len(),
                    "Media playlist refreshed"
                );
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Media playlist refresh failed");
            }
        }
    }
}
