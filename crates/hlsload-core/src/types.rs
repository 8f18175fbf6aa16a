//! Core types for hlsload

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Buffered seconds that must be exceeded before playback starts
pub const BUFFER_THRESHOLD: f64 = 10.0;

/// Age in seconds after which a playing session re-fetches its media playlist
pub const MANIFEST_MAX_AGE: f64 = 20.0;

/// Consecutive fragment fetch failures that end a session
pub const MAX_RETRIES: u32 = 2;

/// Unique identifier for a simulated playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simulated player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Fetching the master manifest
    FetchingMaster,
    /// Fetching the selected variant's media playlist
    FetchingVariant,
    /// Downloading fragments until the buffer threshold is crossed
    Buffering,
    /// Playback clock running; the media playlist is refreshed when stale
    Playing,
    /// Session ended with a report
    Finished,
    /// Session ended with a fatal error
    Failed,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            (FetchingMaster, FetchingVariant)
                | (FetchingMaster, Failed)
                | (FetchingVariant, Buffering)
                | (FetchingVariant, Failed)
                | (Buffering, Playing)
                | (Buffering, Finished)
                | (Playing, Finished)
                | (Playing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Finished | PlaybackState::Failed)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::FetchingMaster => write!(f, "fetching_master"),
            PlaybackState::FetchingVariant => write!(f, "fetching_variant"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Finished => write!(f, "finished"),
            PlaybackState::Failed => write!(f, "failed"),
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Buffered seconds to exceed before playback starts
    pub buffer_threshold: f64,
    /// Media playlist age (seconds) that triggers a refresh while playing
    pub manifest_max_age: f64,
    /// Consecutive fragment failures before the session stops
    pub max_retries: u32,
    /// Loop tick in milliseconds
    pub tick_ms: u64,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Redirects followed before a fetch fails
    pub max_redirects: usize,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: BUFFER_THRESHOLD,
            manifest_max_age: MANIFEST_MAX_AGE,
            max_retries: MAX_RETRIES,
            tick_ms: 1000,
            request_timeout_ms: 10000,
            max_redirects: 10,
            user_agent: format!("hlsload/{}", crate::VERSION),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(Error::InvalidConfig("tick_ms must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries must be at least 1".into()));
        }
        let invalid = |secs: f64| secs.is_nan() || secs < 0.0;
        if invalid(self.buffer_threshold) || invalid(self.manifest_max_age) {
            return Err(Error::InvalidConfig(
                "thresholds must be non-negative numbers".into(),
            ));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Why a session stopped without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every fragment was fetched and played
    Completed,
    /// The requested playback duration was reached
    DurationReached,
    /// A fragment kept failing and the session gave up
    Stalled,
    /// Every fragment was fetched before the buffer threshold was crossed
    ExhaustedBeforePlayback,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::DurationReached => write!(f, "duration reached"),
            Termination::Stalled => write!(f, "stalled"),
            Termination::ExhaustedBeforePlayback => write!(f, "exhausted before playback"),
        }
    }
}

/// Outcome of a session that ended without a fatal error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReport {
    pub session_id: SessionId,
    /// Sum of the durations of every fetched fragment
    pub buffered_seconds: f64,
    /// Seconds since playback started, 0 if it never did
    pub elapsed_play_time: f64,
    pub termination: Termination,
    /// Media playlist the session played
    pub variant_url: String,
    pub fragments_fetched: usize,
    pub manifest_refreshes: usize,
    /// Buffer level at the moment playback started
    pub buffered_at_play_start: Option<f64>,
}
