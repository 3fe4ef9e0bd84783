mod config;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use framewatch_core::{MonitorRunner, RunOutcome, RunnerSettings};
use framewatch_logging::{init_tracing, LogFormat, Logger};
use framewatch_probe::{
    build_args, FfprobeClient, MonitorConfig, MonitorOptions, ProbeMonitor, StreamInfo,
    StreamProbe, StreamRecord,
};

use crate::config::{MonitorSection, ProjectConfig};

#[derive(Parser, Debug)]
#[command(
    name = "framewatch",
    about = "Live stream health monitor built on ffprobe",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory to look for framewatch.toml in (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Enable debug diagnostics
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Continuously monitor a stream and report encoder and network stats
    Monitor(MonitorArgs),
    /// Describe the streams of an input once
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Stream URL
    url: String,

    #[command(flatten)]
    probe: ProbeFlags,

    /// Seconds between stats samples
    #[arg(long)]
    stats_interval_secs: Option<u64>,

    /// Probe restarts allowed after abnormal exits
    #[arg(long)]
    max_restarts: Option<u32>,

    /// Delay before restarting the probe
    #[arg(long)]
    restart_delay_ms: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Also append structured events to this file as JSON lines
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show the probe invocation without executing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Stream URL
    url: String,

    #[command(flatten)]
    probe: ProbeFlags,

    /// Output the stream description as JSON
    #[arg(long)]
    json_output: bool,
}

/// Probe settings shared by both subcommands
#[derive(Args, Debug)]
struct ProbeFlags {
    /// Path to the ffprobe binary
    #[arg(long)]
    probe_path: Option<PathBuf>,

    /// Network read timeout
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How long the probe analyzes the input before reporting
    #[arg(long)]
    analyze_duration_ms: Option<u64>,

    /// Upper bound on buffered, not yet decoded probe output
    #[arg(long)]
    buffer_max_length: Option<usize>,

    /// ffprobe log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace)
    #[arg(long)]
    probe_log_level: Option<String>,

    /// Grace period between SIGTERM and SIGKILL when stopping
    #[arg(long)]
    stop_guard_timeout_ms: Option<u64>,
}

impl ProbeFlags {
    fn to_options(&self) -> MonitorOptions {
        MonitorOptions {
            probe_path: self.probe_path.clone(),
            timeout_ms: self.timeout_ms,
            analyze_duration_ms: self.analyze_duration_ms,
            buffer_max_length: self.buffer_max_length,
            log_level: self.probe_log_level.clone(),
            stop_guard_timeout_ms: self.stop_guard_timeout_ms,
        }
    }

    /// Flags win over the config file, the file over built-in defaults.
    fn resolve(&self, project: &ProjectConfig) -> Result<MonitorConfig> {
        let options = self.to_options().or(project.probe.clone());
        MonitorConfig::from_options(options).context("Invalid probe configuration")
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    let level = if cli.debug { "debug" } else { "warn" };

    match cli.command {
        Command::Monitor(args) => {
            init_tracing(level, args.log_format.into());
            run_monitor(args, &project).await
        }
        Command::Probe(args) => {
            init_tracing(level, LogFormat::Pretty);
            run_probe(args, &project).await
        }
    }
}

async fn run_monitor(args: MonitorArgs, project: &ProjectConfig) -> Result<()> {
    let config = args.probe.resolve(project)?;
    let settings = runner_settings(&args, &project.monitor)?;

    if args.dry_run {
        println!("=== Dry Run ===");
        println!("URL: {}", args.url);
        println!(
            "Command: {} {}",
            config.probe_path().display(),
            build_args(&config, &args.url).join(" ")
        );
        println!("Stats interval: {:.1}s", settings.stats_interval.as_secs_f64());
        println!("Max restarts: {}", settings.max_restarts);
        println!("Restart delay: {:.1}s", settings.restart_delay.as_secs_f64());
        println!(
            "Stop guard: {:.1}s",
            config.stop_guard_timeout().as_secs_f64()
        );
        return Ok(());
    }

    let log_format: LogFormat = args.log_format.into();
    let logger = match args.log_file {
        Some(ref path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let (monitor, events) = ProbeMonitor::new(args.url.clone(), config);
    let runner = MonitorRunner::new(monitor, events, Arc::new(logger)).with_settings(settings);

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping probe...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let outcome = runner.run().await?;

    if args.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    std::process::exit(outcome.exit_code());
}

fn runner_settings(args: &MonitorArgs, file: &MonitorSection) -> Result<RunnerSettings> {
    let defaults = RunnerSettings::default();

    let stats_interval = match args.stats_interval_secs.or(file.stats_interval_secs) {
        Some(0) => anyhow::bail!("stats_interval_secs must be a positive integer"),
        Some(secs) => Duration::from_secs(secs),
        None => defaults.stats_interval,
    };
    let max_pending_frames = match file.max_pending_frames {
        Some(0) => anyhow::bail!("max_pending_frames must be a positive integer"),
        Some(n) => n,
        None => defaults.max_pending_frames,
    };

    Ok(RunnerSettings {
        stats_interval,
        max_restarts: args
            .max_restarts
            .or(file.max_restarts)
            .unwrap_or(defaults.max_restarts),
        restart_delay: args
            .restart_delay_ms
            .or(file.restart_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.restart_delay),
        max_pending_frames,
    })
}

async fn run_probe(args: ProbeArgs, project: &ProjectConfig) -> Result<()> {
    let config = args.probe.resolve(project)?;
    let client = FfprobeClient::new(&config);

    let info = client
        .probe(&args.url)
        .await
        .with_context(|| format!("Failed to probe {}", args.url))?;

    if args.json_output {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_stream_info(&args.url, &info);
    }
    Ok(())
}

fn print_stream_info(url: &str, info: &StreamInfo) {
    println!("{} {}", "Input:".dimmed(), url.bold());
    if info.videos.is_empty() && info.audios.is_empty() {
        println!("  {}", "no audio or video streams".bright_yellow());
        return;
    }
    for stream in &info.videos {
        println!(
            "  {} {} {}x{} SAR {} DAR {}",
            "video".bright_cyan(),
            describe(stream),
            stream.width.unwrap_or_default(),
            stream.height.unwrap_or_default(),
            stream.sample_aspect_ratio.as_deref().unwrap_or("?"),
            stream.display_aspect_ratio.as_deref().unwrap_or("?")
        );
    }
    for stream in &info.audios {
        println!("  {} {}", "audio".bright_magenta(), describe(stream));
    }
}

fn describe(stream: &StreamRecord) -> String {
    format!(
        "#{} {}",
        stream
            .index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "?".to_string()),
        stream.codec_name.as_deref().unwrap_or("unknown")
    )
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed {
            samples,
            restarts,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("=== STREAM ENDED ===");
            eprintln!("Samples: {}", samples);
            eprintln!("Restarts: {}", restarts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        RunOutcome::Interrupted {
            samples,
            restarts,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("=== INTERRUPTED ===");
            eprintln!("Stopped after {} sample(s), {} restart(s)", samples, restarts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        RunOutcome::Failed {
            samples,
            restarts,
            error,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("=== FAILED ===");
            eprintln!(
                "Error after {} sample(s), {} restart(s): {}",
                samples, restarts, error
            );
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
    }
}
