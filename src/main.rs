use anyhow::Context;
use clap::Parser;
use log::{debug, error, info, warn};
use seismo::aggregator::{AlertHistory, HistoryChange};
use seismo::config::{Config, MAX_THRESHOLD, MIN_THRESHOLD};
use seismo::error::ConfigError;
use seismo::sensor::{AccelerationSource, ReplaySource, Seismometer, SimulatedSource};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Command-line arguments for the acceleration alert monitor
#[derive(Parser)]
#[command(
    name = "seismo",
    about = "Tri-axial acceleration alert monitor",
    long_about = "Samples a tri-axial accelerometer, groups threshold crossings into per-axis \
                  alert episodes and reports the strongest alerting axis as it changes."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Replay recorded readings instead of the simulated accelerometer
    #[arg(long, value_name = "FILE", help = "JSON-lines recording to replay")]
    replay: Option<PathBuf>,

    /// Override the configured alert threshold
    #[arg(long, value_name = "G", help = "Alert threshold in g (0.1 to 2.0)")]
    threshold: Option<f64>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS", help = "Run time limit in seconds")]
    duration: Option<u64>,
}

impl Cli {
    /// Validate CLI arguments
    fn validate(&self) -> Result<(), String> {
        if let Some(config_path) = &self.config {
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
        }

        if let Some(replay_path) = &self.replay {
            if !replay_path.is_file() {
                return Err(format!(
                    "Replay file does not exist: {}",
                    replay_path.display()
                ));
            }
        }

        if let Some(threshold) = self.threshold {
            if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
                return Err(format!(
                    "Threshold must be between {} and {} g, got {}",
                    MIN_THRESHOLD, MAX_THRESHOLD, threshold
                ));
            }
        }

        if self.duration == Some(0) {
            return Err("Duration must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Wires the alert history, the sampler and the change reporter together
struct Monitor {
    history: AlertHistory,
    seismometer: Seismometer,
    reporter_shutdown: Option<Sender<()>>,
    reporter_handle: Option<JoinHandle<()>>,
}

impl Monitor {
    fn new(config: &Config, source: Box<dyn AccelerationSource>) -> Self {
        info!("Initializing monitor with configuration");

        let history = AlertHistory::new(&config.history);
        let seismometer = Seismometer::new(&config.sampling, source, history.aggregator());

        Self {
            history,
            seismometer,
            reporter_shutdown: None,
            reporter_handle: None,
        }
    }

    /// Load configuration from file or use defaults
    ///
    /// A missing file falls back to defaults; an invalid one is an error.
    fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
        match config_path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Config::from_file(path) {
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file unreadable ({}), using defaults", e);
                        Ok(Config::default())
                    }
                    result => result,
                }
            }
            None => {
                info!("Using default configuration");
                Ok(Config::default())
            }
        }
    }

    fn start(&mut self) -> anyhow::Result<()> {
        info!("Starting monitor components");

        let changes = self.history.subscribe();
        let (shutdown_sender, shutdown_receiver) = mpsc::channel();
        self.reporter_shutdown = Some(shutdown_sender);
        self.reporter_handle = Some(std::thread::spawn(move || {
            Self::reporter_thread(changes, shutdown_receiver)
        }));

        self.seismometer
            .start()
            .context("failed to start the seismometer")?;

        info!("All monitor components started successfully");
        Ok(())
    }

    /// Log every change to the alert history as it happens
    fn reporter_thread(changes: Receiver<HistoryChange>, shutdown: Receiver<()>) {
        info!("Reporter thread started");

        loop {
            if shutdown.try_recv().is_ok() {
                break;
            }

            match changes.recv_timeout(Duration::from_millis(100)) {
                Ok(HistoryChange::ConsolidatedAdded(alert)) => warn!(
                    "Strongest axis {}: {:.2} g (threshold {:.2} g) for {}",
                    alert.strongest_axis,
                    alert.strongest_value,
                    alert.threshold,
                    alert.formatted_duration()
                ),
                Ok(HistoryChange::GroupClosed(group)) => info!(
                    "Axis {} back to normal after {}, peak {:.2} g at {}",
                    group.axis,
                    group.formatted_duration(),
                    group.peak_value,
                    group.peak_time.format("%H:%M:%S%.3f")
                ),
                Ok(HistoryChange::Reset { at }) => info!("Alert history reset at {}", at),
                Ok(change) => debug!("History change: {:?}", change),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Alert history closed");
                    break;
                }
            }
        }

        info!("Reporter thread stopped");
    }

    /// Block until interrupted, the time limit passes or the source runs dry
    fn wait(&self, shutdown: &Receiver<()>, limit: Option<Duration>) {
        let started = Instant::now();

        loop {
            match shutdown.recv_timeout(Duration::from_millis(200)) {
                Ok(()) => {
                    info!("Shutdown signal received");
                    return;
                }
                Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }

            if !self.seismometer.is_running() {
                info!("Sampling finished");
                return;
            }

            if limit.is_some_and(|limit| started.elapsed() >= limit) {
                info!("Run time limit reached");
                return;
            }
        }
    }

    fn stop(&mut self) {
        info!("Stopping monitor components");

        self.seismometer.stop();

        if let Some(sender) = self.reporter_shutdown.take() {
            if let Err(e) = sender.send(()) {
                error!("Failed to send shutdown signal to reporter: {}", e);
            }
        }
        if let Some(handle) = self.reporter_handle.take() {
            if let Err(e) = handle.join() {
                error!("Reporter thread failed to join: {:?}", e);
            }
        }

        self.history.shutdown();
        info!("Monitor stopped successfully");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting acceleration alert monitor");

    cli.validate()
        .map_err(anyhow::Error::msg)
        .context("invalid arguments")?;

    let mut config =
        Monitor::load_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(threshold) = cli.threshold {
        config.sampling.threshold = threshold;
    }

    let source: Box<dyn AccelerationSource> = match &cli.replay {
        Some(path) => {
            info!("Replaying readings from {}", path.display());
            Box::new(ReplaySource::from_file(path).context("failed to load replay file")?)
        }
        None => {
            info!("Using simulated accelerometer");
            Box::new(SimulatedSource::default())
        }
    };

    let mut monitor = Monitor::new(&config, source);
    monitor.start()?;

    // Set up signal handling for graceful shutdown
    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("failed to set interrupt handler")?;

    info!(
        "Monitoring at {:.2} g threshold. Press Ctrl+C to stop.",
        monitor.seismometer.threshold()
    );
    monitor.wait(&shutdown_receiver, cli.duration.map(Duration::from_secs));
    monitor.stop();

    let snapshot = monitor.history.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("failed to serialize summary")?
    );

    info!("Monitor shutdown complete");
    Ok(())
}
