//! CLI command implementations

use crate::output::{self, OutputFormat};
use clap::Args;
use console::style;
use hlsload_core::{
    manifest, EventLog, EventSink, Fetcher, HttpFetcher, MultiSink, PlaybackReport, Player,
    RequestStats, SimulationConfig, Termination, TracingSink,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};
use url::Url;

/// Simulation settings that override the config file
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Seconds that must be buffered before playback starts
    #[arg(long, global = true)]
    pub buffer_threshold: Option<f64>,

    /// Seconds before a live media playlist is re-fetched
    #[arg(long, global = true)]
    pub manifest_max_age: Option<f64>,

    /// Failed attempts at one fragment before the session stalls
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Length of one simulation tick in milliseconds
    #[arg(long, global = true)]
    pub tick_ms: Option<u64>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(buffer_threshold) = self.buffer_threshold {
            config.buffer_threshold = buffer_threshold;
        }
        if let Some(manifest_max_age) = self.manifest_max_age {
            config.manifest_max_age = manifest_max_age;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_ms = tick_ms;
        }
    }
}

/// Load the simulation config (defaults when no file is given) and apply
/// command line overrides on top
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<SimulationConfig> {
    let mut config = match path {
        Some(path) => {
            let config = SimulationConfig::from_file(path)?;
            info!(path = %path.display(), "Loaded simulation config");
            config
        }
        None => SimulationConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Simulate a single viewer
pub async fn play(
    url: &str,
    quality: Option<usize>,
    duration: Option<f64>,
    show_events: bool,
    config: SimulationConfig,
    format: &str,
) -> anyhow::Result<()> {
    let stats = Arc::new(RequestStats::new());
    let log = Arc::new(EventLog::new());
    let sink = MultiSink::new()
        .with(stats.clone())
        .with(log.clone())
        .with(Arc::new(TracingSink));
    let player = Player::http(Arc::new(sink), config)?;

    let result = player.play(url, quality, duration).await;
    let entries = stats.snapshot().await;
    let total = stats.total().await;

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let (report, error) = match &result {
                Ok(report) => (Some(report), None),
                Err(e) => (None, Some(e.to_string())),
            };
            let events = if show_events { Some(log.get_events().await) } else { None };
            let body = serde_json::json!({
                "report": report,
                "error": error,
                "requests": entries,
                "total": total,
                "events": events,
            });
            println!("{}", output::to_json(&body));
        }
        OutputFormat::Text | OutputFormat::Table => {
            match &result {
                Ok(report) => println!("{}", output::report_text(report)),
                Err(e) => println!("{} {}", style("Session failed:").red().bold(), e),
            }
            if show_events {
                println!("\nEvents:");
                for record in log.get_events().await {
                    println!("  {}", serde_json::to_string(&record)?);
                }
            }
            println!("\n{}", output::stats_table(&entries, &total));
        }
    }

    if let Err(e) = result {
        anyhow::bail!("session ended with {}", e.error_code());
    }
    Ok(())
}

/// Options for a load run
pub struct LoadOptions {
    pub users: usize,
    pub spawn_rate: f64,
    pub run_time: Duration,
    pub quality: Option<usize>,
    pub duration: Option<f64>,
    /// Pause between one viewer's sessions; never shorter than one tick
    pub wait: Duration,
}

/// Delay between viewer spawns for `spawn_rate` viewers per second
fn spawn_interval(spawn_rate: f64) -> anyhow::Result<Duration> {
    if spawn_rate.is_nan() || spawn_rate <= 0.0 {
        anyhow::bail!("--spawn-rate must be positive");
    }
    Duration::try_from_secs_f64(1.0 / spawn_rate)
        .map_err(|e| anyhow::anyhow!("--spawn-rate {} is out of range: {}", spawn_rate, e))
}

/// Session outcome counters shared by every simulated viewer
#[derive(Debug, Default)]
struct SessionTally {
    completed: AtomicU64,
    duration_reached: AtomicU64,
    stalled: AtomicU64,
    exhausted: AtomicU64,
    underruns: AtomicU64,
    startup_failures: AtomicU64,
}

#[derive(Debug, Serialize)]
struct TallySnapshot {
    completed: u64,
    duration_reached: u64,
    stalled: u64,
    exhausted_before_playback: u64,
    underruns: u64,
    startup_failures: u64,
}

impl SessionTally {
    fn record(&self, result: &hlsload_core::Result<PlaybackReport>) {
        let counter = match result {
            Ok(report) => match report.termination {
                Termination::Completed => &self.completed,
                Termination::DurationReached => &self.duration_reached,
                Termination::Stalled => &self.stalled,
                Termination::ExhaustedBeforePlayback => &self.exhausted,
            },
            Err(hlsload_core::Error::Underrun { .. }) => &self.underruns,
            Err(_) => &self.startup_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            duration_reached: self.duration_reached.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
            exhausted_before_playback: self.exhausted.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            startup_failures: self.startup_failures.load(Ordering::Relaxed),
        }
    }
}

/// One simulated viewer: plays the stream over and over until aborted,
/// pausing between sessions
async fn run_user(
    id: usize,
    player: Arc<Player>,
    url: Arc<str>,
    quality: Option<usize>,
    duration: Option<f64>,
    wait: Duration,
    tally: Arc<SessionTally>,
) {
    let pause = wait.max(player.config().tick());
    loop {
        let result = player.play(&url, quality, duration).await;
        tally.record(&result);
        if let Err(e) = result {
            warn!(user = id, error = %e, "Session ended with error");
        }
        tokio::time::sleep(pause).await;
    }
}

/// Run many concurrent viewers until the run time elapses or Ctrl-C
pub async fn load(
    url: &str,
    options: LoadOptions,
    config: SimulationConfig,
    format: &str,
) -> anyhow::Result<()> {
    if options.users == 0 {
        anyhow::bail!("--users must be at least 1");
    }
    let spawn_every = spawn_interval(options.spawn_rate)?;
    Url::parse(url)?;

    let stats = Arc::new(RequestStats::new());
    let sink: Arc<dyn EventSink> = Arc::new(MultiSink::new().with(stats.clone()).with(Arc::new(TracingSink)));
    let player = Arc::new(Player::http(sink, config)?);
    let tally = Arc::new(SessionTally::default());
    let url: Arc<str> = Arc::from(url);

    info!(
        url = %url,
        users = options.users,
        spawn_rate = options.spawn_rate,
        run_time_secs = options.run_time.as_secs(),
        "Starting load run"
    );

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")?);
    progress.enable_steady_tick(Duration::from_millis(200));

    let reporter = {
        let stats = stats.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                let total = stats.total().await;
                progress.set_message(format!(
                    "{} requests, {} failures, avg {:.0}ms",
                    total.requests,
                    total.failures,
                    total.avg_response_ms()
                ));
            }
        })
    };

    let mut users = JoinSet::new();
    let spawner = async {
        for id in 0..options.users {
            users.spawn(run_user(
                id,
                player.clone(),
                url.clone(),
                options.quality,
                options.duration,
                options.wait,
                tally.clone(),
            ));
            tokio::time::sleep(spawn_every).await;
        }
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = tokio::time::sleep(options.run_time) => {
            info!("Run time elapsed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
        _ = spawner => {}
    }

    // Sessions own all of their state, so dropping them mid-tick is safe
    users.shutdown().await;
    reporter.abort();
    progress.finish_and_clear();

    let entries = stats.snapshot().await;
    let total = stats.total().await;
    let sessions = tally.snapshot();

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "url": url.as_ref(),
                "started_at": stats.started_at(),
                "sessions": sessions,
                "requests": entries,
                "total": total,
            });
            println!("{}", output::to_json(&body));
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!(
                "Load run against {} (started {})",
                url,
                stats.started_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "Sessions: {} completed, {} capped, {} exhausted, {} stalled, {} underruns, {} failed",
                sessions.completed,
                sessions.duration_reached,
                sessions.exhausted_before_playback,
                sessions.stalled,
                style(sessions.underruns).yellow(),
                style(sessions.startup_failures).red(),
            );
            println!("\n{}", output::stats_table(&entries, &total));
        }
    }

    Ok(())
}

/// Fetch and parse a single manifest
pub async fn inspect(url: &str, config: SimulationConfig, format: &str) -> anyhow::Result<()> {
    let url = Url::parse(url)?;
    let fetcher = HttpFetcher::new(&config)?;
    let response = fetcher.fetch(&url).await?;
    let manifest = manifest::parse(&response.body, None);

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&manifest)),
        OutputFormat::Text | OutputFormat::Table => {
            println!("Manifest: {} ({} bytes)", url, response.body.len());
            print!("{}", output::manifest_text(&manifest));
        }
    }

    Ok(())
}
