use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use sensflow_runtime::{
    Clock, ConfigRecord, DEFAULT_IDLE, JsonFileStore, LabClock, MemoryStore, Pipeline, QueuedTransport, RecordingTransport,
    Sample, TelemetryTransport,
};
use serde_json::Value;
use web_time::Duration;

use crate::error::{DemoError, Result};
use crate::logging::init_logging;
use crate::settings::Settings;
use crate::topology;

#[derive(Debug, Parser)]
#[command(
    name = "sensflow-demo",
    about = "Simulated bilge and temperature monitor on the sensflow runtime",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand. Each overrides the settings file.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// JSON settings file.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[arg(long, global = true)]
    pub hostname: Option<String>,

    #[arg(long, global = true)]
    pub read_delay_ms: Option<u64>,

    /// Directory for persisted component parameters.
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Settings file (or defaults) with flag overrides applied.
    pub fn resolve(&self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(hostname) = &self.hostname {
            settings.hostname.clone_from(hostname);
        }
        if let Some(ms) = self.read_delay_ms {
            settings.read_delay_ms = ms;
        }
        if let Some(dir) = &self.config_dir {
            settings.config_dir = Some(dir.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the monitor and run it until interrupted.
    Run(RunArgs),

    /// Print schema and current values of every configurable component.
    Describe,

    /// Change parameters of one component and persist them.
    Set(SetArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Stop after this many seconds of pipeline time.
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Run on a simulated clock that jumps straight to each due task.
    #[arg(long, requires = "duration_secs")]
    pub lab: bool,

    /// Validate the topology, read every input once into memory, and exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Make every Nth one-wire transaction fail.
    #[arg(long)]
    pub fault_every: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct SetArgs {
    /// Configuration path, e.g. /bilge/samples.
    pub path: String,

    /// JSON object of parameter values, e.g. '{"sample_size": 20}'.
    pub values: String,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.log_json)?;
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let settings = cli.global.resolve()?;
    match cli.command {
        // The delivery thread writes stdout; never hold its lock here.
        Commands::Run(args) => run_monitor(&settings, &args),
        Commands::Describe => describe(&settings, &mut io::stdout().lock()),
        Commands::Set(args) => set(&settings, &args, &mut io::stdout().lock()),
    }
}

// ─── Assembly ────────────────────────────────────────────────────────────────

/// Pipeline with the configured store, not yet wired.
fn pipeline_for(settings: &Settings, clock: Clock, transport: Option<Rc<dyn TelemetryTransport>>) -> Pipeline {
    let mut builder = Pipeline::builder().hostname(settings.hostname.as_str()).clock(clock);
    if let Some(transport) = transport {
        builder = builder.shared_transport(transport);
    }
    match &settings.config_dir {
        Some(dir) => builder.store(JsonFileStore::new(dir)).build(),
        None => builder.store(MemoryStore::new()).build(),
    }
}

/// Writes samples as JSON lines. Failed writes are counted and logged at
/// powers of two, so a closed pipe is visible without flooding the log.
#[derive(Debug)]
pub struct JsonLines<W> {
    out: W,
    failed: u64,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: 0 }
    }

    /// Samples that could not be written.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn write(&mut self, sample: &Sample) {
        let written = serde_json::to_string(sample)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(self.out, "{line}"));
        if let Err(err) = written {
            self.failed += 1;
            if self.failed.is_power_of_two() {
                tracing::warn!(path = %sample.path, failed = self.failed, %err, "cannot write telemetry sample");
            }
        }
    }
}

#[cfg(unix)]
fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};

    let flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&flag))?;
    }
    Ok(flag)
}

#[cfg(not(unix))]
fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    Ok(Arc::new(AtomicBool::new(false)))
}

/// Start the monitor, fire whatever is due once into memory, print the
/// captured samples, and stop.
fn dry_run(settings: &Settings, clock: Clock) -> Result<()> {
    let recorder = RecordingTransport::new();
    let pipeline = pipeline_for(settings, clock, Some(Rc::new(recorder.clone()) as Rc<dyn TelemetryTransport>));
    let _monitor = topology::build(&pipeline, settings);
    pipeline.start()?;
    let fired = pipeline.run_once();

    let mut out = io::stdout().lock();
    for sample in recorder.samples() {
        writeln!(out, "{}", serde_json::to_string(&sample)?)?;
    }
    tracing::info!(
        nodes = pipeline.node_count(),
        edges = pipeline.edge_count(),
        tasks = fired,
        samples = recorder.len(),
        "dry run: topology is valid"
    );
    Ok(())
}

// ─── Subcommands ─────────────────────────────────────────────────────────────

pub fn run_monitor(settings: &Settings, args: &RunArgs) -> Result<()> {
    let mut settings = settings.clone();
    if let Some(n) = args.fault_every {
        settings.simulation.fault_every = n;
    }

    let lab = args.lab.then(LabClock::new);
    let clock = lab.as_ref().map_or_else(Clock::real, Clock::lab);

    if args.dry_run {
        return dry_run(&settings, clock);
    }

    let mut lines = JsonLines::new(io::stdout());
    let queue = Rc::new(QueuedTransport::start(settings.queue_capacity, move |sample| {
        lines.write(&sample);
    })?);
    let pipeline = pipeline_for(&settings, clock, Some(Rc::clone(&queue) as Rc<dyn TelemetryTransport>));
    let monitor = topology::build(&pipeline, &settings);
    pipeline.start()?;

    let stop = shutdown_flag()?;
    let clock = pipeline.clock().clone();
    let deadline = args.duration_secs.map(|secs| clock.now() + Duration::from_secs(secs));
    pipeline.run_until(DEFAULT_IDLE, || {
        stop.load(Ordering::Relaxed) || deadline.is_some_and(|d| clock.now() >= d)
    });

    queue.shutdown();
    tracing::info!(
        uptime_ms = pipeline.clock().now().as_millis() as u64,
        published = monitor.published(),
        faults = monitor.fault_count(),
        delivered = queue.delivered(),
        dropped = queue.dropped(),
        "monitor stopped"
    );
    Ok(())
}

pub fn describe(settings: &Settings, out: &mut impl Write) -> Result<()> {
    let pipeline = pipeline_for(settings, Clock::real(), None);
    let _monitor = topology::build(&pipeline, settings);

    let mut all = serde_json::Map::new();
    for path in pipeline.config_paths() {
        if let Some(description) = pipeline.describe_config(&path) {
            all.insert(path, description);
        }
    }
    writeln!(out, "{}", serde_json::to_string_pretty(&Value::Object(all))?)?;
    Ok(())
}

/// Apply `args.values` to the component at `args.path`. Fields that fail
/// validation make the command fail after the valid ones are applied.
pub fn set(settings: &Settings, args: &SetArgs, out: &mut impl Write) -> Result<()> {
    let changes: ConfigRecord = serde_json::from_str(&args.values)
        .map_err(|e| DemoError::invalid(format!("values must be a JSON object: {e}")))?;

    let pipeline = pipeline_for(settings, Clock::real(), None);
    let _monitor = topology::build(&pipeline, settings);
    let report = pipeline.update_config(&args.path, &changes)?;
    if settings.config_dir.is_none() {
        tracing::warn!(path = %args.path, "no config directory given; change is not persisted");
    }

    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    if report.is_clean() {
        Ok(())
    } else {
        Err(DemoError::invalid(format!(
            "{} field(s) rejected for {}",
            report.rejected.len(),
            args.path
        )))
    }
}
