//! Playback session tests
//!
//! Every test runs on a paused tokio clock: loop ticks and scripted network
//! delays advance virtual time, so timings below are exact.

mod common;

use common::*;
use hlsload_core::{
    session::segment_request_name, Error, FetchError, Player, RequestStats, SimulationConfig,
    Termination,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn build_player(fetcher: ScriptedFetcher, config: SimulationConfig) -> (Player, Arc<ScriptedFetcher>, Arc<RequestStats>) {
    let fetcher = Arc::new(fetcher);
    let stats = Arc::new(RequestStats::new());
    let player = Player::new(fetcher.clone(), stats.clone(), config);
    (player, fetcher, stats)
}

fn low_segment_name() -> String {
    segment_request_name(&Url::parse(LOW_URL).unwrap())
}

fn assert_secs(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}s, got {}s",
        expected,
        actual
    );
}

// =============================================================================
// Happy paths
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_short_vod_finishes_before_playback() {
    let (player, fetcher, stats) = build_player(
        low_variant_fetcher(&[2.0, 2.0, 2.0], true),
        SimulationConfig::default(),
    );

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.termination, Termination::ExhaustedBeforePlayback);
    assert_secs(report.buffered_seconds, 6.0);
    assert_secs(report.elapsed_play_time, 0.0);
    assert_eq!(report.buffered_at_play_start, None);
    assert_eq!(report.fragments_fetched, 3);
    assert_eq!(report.variant_url, LOW_URL);

    assert_eq!(fetcher.requests_for(MASTER_URL), 1);
    assert_eq!(fetcher.requests_for(LOW_URL), 1);
    for i in 0..3 {
        assert_eq!(fetcher.requests_for(&low_segment(i)), 1);
    }

    // Only fragments go through the body-discarding download path
    let expected: Vec<String> = (0..3).map(low_segment).collect();
    assert_eq!(fetcher.segment_downloads(), expected);

    let segments = stats.entry(&low_segment_name()).await.unwrap();
    assert_eq!(segments.requests, 3);
    assert_eq!(segments.failures, 0);
    assert_eq!(stats.entry(MASTER_URL).await.unwrap().requests, 1);
    assert_eq!(stats.entry(LOW_URL).await.unwrap().requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_playback_waits_for_buffer_threshold() {
    // Five 2s fragments reach exactly 10s, which is not above the threshold
    let (player, _, _) = build_player(
        low_variant_fetcher(&[2.0; 5], true),
        SimulationConfig::default(),
    );
    let report = player.play(MASTER_URL, Some(0), Some(3.0)).await.unwrap();
    assert_eq!(report.termination, Termination::ExhaustedBeforePlayback);
    assert_eq!(report.buffered_at_play_start, None);
    assert_secs(report.buffered_seconds, 10.0);

    // The sixth fragment crosses it
    let (player, _, _) = build_player(
        low_variant_fetcher(&[2.0; 6], true),
        SimulationConfig::default(),
    );
    let report = player.play(MASTER_URL, Some(0), Some(3.0)).await.unwrap();
    assert_eq!(report.buffered_at_play_start, Some(12.0));
    assert_eq!(report.termination, Termination::DurationReached);
    // Playback starts on tick 5 and the cap is checked once per tick
    assert_secs(report.elapsed_play_time, 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_vod_plays_to_completion() {
    let (player, _, _) = build_player(
        low_variant_fetcher(&[2.0; 6], true),
        SimulationConfig::default(),
    );

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_secs(report.buffered_seconds, 12.0);
    assert_secs(report.elapsed_play_time, 13.0);
    assert_eq!(report.fragments_fetched, 6);
    assert_eq!(report.manifest_refreshes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_quality_index_wraps_around_variants() {
    let fetcher = low_variant_fetcher(&[2.0], true);
    let (player, fetcher, _) = build_player(fetcher, SimulationConfig::default());

    // Index 2 of two variants selects the first one
    let report = player.play(MASTER_URL, Some(2), None).await.unwrap();
    assert_eq!(report.variant_url, LOW_URL);
    assert_eq!(fetcher.requests_for(HIGH_URL), 0);
}

#[tokio::test(start_paused = true)]
async fn test_random_variant_selection() {
    let fetcher = low_variant_fetcher(&[2.0], true)
        .serve(HIGH_URL, media_playlist(&[2.0], true))
        .serve("http://cdn.test/live/high/seg0.ts", "ts");
    let (player, _, _) = build_player(fetcher, SimulationConfig::default());

    for _ in 0..8 {
        let report = player.play(MASTER_URL, None, None).await.unwrap();
        assert!(report.variant_url == LOW_URL || report.variant_url == HIGH_URL);
        assert_eq!(report.fragments_fetched, 1);
    }
}

// =============================================================================
// Fragment failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failing_fragment_stalls_after_one_retry() {
    let fetcher = low_variant_fetcher(&[2.0; 4], true)
        .route(&low_segment(2), Reply::err(FetchError::Http(503)));
    let (player, fetcher, stats) = build_player(fetcher, SimulationConfig::default());

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.termination, Termination::Stalled);
    assert_secs(report.buffered_seconds, 4.0);
    assert_secs(report.elapsed_play_time, 0.0);
    assert_eq!(report.fragments_fetched, 2);
    assert_eq!(fetcher.requests_for(&low_segment(2)), 2);
    assert_eq!(fetcher.requests_for(&low_segment(3)), 0);

    let segments = stats.entry(&low_segment_name()).await.unwrap();
    assert_eq!(segments.requests, 4);
    assert_eq!(segments.failures, 2);
    assert_eq!(segments.errors.get("HTTP"), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn test_stall_reports_elapsed_play_time() {
    // Playback starts after the first 11s fragment; the second never arrives
    let fetcher = low_variant_fetcher(&[11.0, 11.0], true)
        .route(&low_segment(1), Reply::err(FetchError::Timeout));
    let (player, _, _) = build_player(fetcher, SimulationConfig::default());

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.termination, Termination::Stalled);
    assert_eq!(report.buffered_at_play_start, Some(11.0));
    assert_secs(report.buffered_seconds, 11.0);
    // Failures on ticks 1 and 2, playback started on tick 0
    assert_secs(report.elapsed_play_time, 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_successful_retry_resets_counter() {
    let fetcher = low_variant_fetcher(&[2.0; 3], true)
        .then(&low_segment(0), Reply::err(FetchError::Connection("reset".into())))
        .then(&low_segment(2), Reply::err(FetchError::Connection("reset".into())));
    let (player, fetcher, _) = build_player(fetcher, SimulationConfig::default());

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.fragments_fetched, 3);
    assert_secs(report.buffered_seconds, 6.0);
    assert_eq!(fetcher.requests_for(&low_segment(0)), 2);
    assert_eq!(fetcher.requests_for(&low_segment(2)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_fragment_causes_underrun() {
    let fetcher = low_variant_fetcher(&[11.0; 3], true)
        .route(&low_segment(1), Reply::ok("ts").after(Duration::from_secs(30)));
    let (player, _, stats) = build_player(fetcher, SimulationConfig::default());

    let err = player.play(MASTER_URL, Some(0), None).await.unwrap_err();

    match err {
        Error::Underrun {
            buffered_seconds,
            elapsed_play_time,
        } => {
            assert_secs(buffered_seconds, 22.0);
            assert_secs(elapsed_play_time, 31.0);
        }
        other => panic!("expected underrun, got {:?}", other),
    }

    let segments = stats.entry(&low_segment_name()).await.unwrap();
    assert_eq!(segments.max_response_ms, 30_000);
}

// =============================================================================
// Startup failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_master_fetch_failure_is_fatal() {
    let fetcher = ScriptedFetcher::new().route(MASTER_URL, Reply::err(FetchError::TooManyRedirects));
    let (player, fetcher, stats) = build_player(fetcher, SimulationConfig::default());

    let err = player.play(MASTER_URL, None, None).await.unwrap_err();

    assert!(matches!(
        err,
        Error::MasterFetch {
            source: FetchError::TooManyRedirects,
            ..
        }
    ));
    assert!(err.is_startup_failure());
    assert_eq!(fetcher.total_requests(), 1);
    let master = stats.entry(MASTER_URL).await.unwrap();
    assert_eq!(master.failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_master_without_variants_is_fatal() {
    let fetcher = ScriptedFetcher::new().serve(MASTER_URL, media_playlist(&[2.0], true));
    let (player, fetcher, _) = build_player(fetcher, SimulationConfig::default());

    let err = player.play(MASTER_URL, None, None).await.unwrap_err();

    assert!(matches!(err, Error::NoVariants { .. }));
    assert_eq!(fetcher.total_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_media_playlist_failure_is_fatal() {
    let fetcher = ScriptedFetcher::new().serve(MASTER_URL, master_playlist());
    let (player, fetcher, stats) = build_player(fetcher, SimulationConfig::default());

    let err = player.play(MASTER_URL, Some(1), None).await.unwrap_err();

    assert!(matches!(
        err,
        Error::PlaylistFetch {
            source: FetchError::Http(404),
            ..
        }
    ));
    assert_eq!(fetcher.requests_for(HIGH_URL), 1);
    assert_eq!(stats.total().await.requests, 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_base_url() {
    let (player, fetcher, _) = build_player(ScriptedFetcher::new(), SimulationConfig::default());
    let err = player.play("not a url", None, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidUrl { .. }));
    assert_eq!(fetcher.total_requests(), 0);
}

// =============================================================================
// Live refresh
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_live_refresh_appends_new_fragments() {
    let config = SimulationConfig {
        manifest_max_age: 5.0,
        ..Default::default()
    };
    // First fetch sees six fragments, every refresh sees eight
    let fetcher = low_variant_fetcher(&[2.0; 8], false)
        .then(LOW_URL, Reply::ok(media_playlist(&[2.0; 6], false)));
    let (player, fetcher, _) = build_player(fetcher, config);

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.fragments_fetched, 8);
    assert_secs(report.buffered_seconds, 16.0);
    assert!(report.manifest_refreshes >= 2);
    for i in 0..8 {
        assert_eq!(fetcher.requests_for(&low_segment(i)), 1, "fragment {}", i);
    }
    assert_eq!(fetcher.requests_for(LOW_URL), 1 + report.manifest_refreshes);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_keeps_playing() {
    let config = SimulationConfig {
        manifest_max_age: 5.0,
        ..Default::default()
    };
    let fetcher = low_variant_fetcher(&[2.0; 6], false)
        .route(LOW_URL, Reply::err(FetchError::Http(500)))
        .then(LOW_URL, Reply::ok(media_playlist(&[2.0; 6], false)));
    let (player, fetcher, stats) = build_player(fetcher, config);

    let report = player.play(MASTER_URL, Some(0), None).await.unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.manifest_refreshes, 0);
    assert_secs(report.buffered_seconds, 12.0);
    assert!(fetcher.requests_for(LOW_URL) > 1);

    let playlist = stats.entry(LOW_URL).await.unwrap();
    assert_eq!(playlist.failures, playlist.requests - 1);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_share_stats_sink() {
    let fetcher = Arc::new(low_variant_fetcher(&[2.0; 2], true));
    let stats = Arc::new(RequestStats::new());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let player = Player::new(fetcher.clone(), stats.clone(), SimulationConfig::default());
        handles.push(tokio::spawn(async move {
            player.play(MASTER_URL, Some(0), None).await
        }));
    }
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.fragments_fetched, 2);
    }

    assert_eq!(stats.entry(MASTER_URL).await.unwrap().requests, 4);
    assert_eq!(stats.entry(&low_segment_name()).await.unwrap().requests, 8);
    assert_eq!(stats.total().await.requests, 16);
}
