use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use framewatch_analysis::AnalysisError;
use framewatch_logging::{LogEvent, Logger};
use framewatch_probe::{ExitOutcome, MonitorEvent, MonitorEvents, ProbeMonitor};
use tracing::{debug, info, warn};

use crate::context::{StatsSample, StatsWindow};
use crate::error::RunError;
use crate::outcome::RunOutcome;

const INTERRUPT_POLL: Duration = Duration::from_millis(250);

/// Knobs for a monitoring run
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    /// How often stats are sampled
    pub stats_interval: Duration,
    /// Restarts allowed after abnormal probe exits
    pub max_restarts: u32,
    pub restart_delay: Duration,
    /// Upper bound on frames held while waiting for a GOP to close
    pub max_pending_frames: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(10),
            max_restarts: 3,
            restart_delay: Duration::from_secs(1),
            max_pending_frames: 10_000,
        }
    }
}

/// Drives a [`ProbeMonitor`]: collects frames, samples stats periodically and
/// restarts the probe after recoverable failures.
pub struct MonitorRunner {
    monitor: ProbeMonitor,
    events: MonitorEvents,
    logger: Arc<Logger>,
    settings: RunnerSettings,
    interrupted: Arc<AtomicBool>,
}

impl MonitorRunner {
    pub fn new(monitor: ProbeMonitor, events: MonitorEvents, logger: Arc<Logger>) -> Self {
        Self {
            monitor,
            events,
            logger,
            settings: RunnerSettings::default(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Get a handle to signal interruption
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Monitor until the stream ends, the run is interrupted, or restarts run out
    pub async fn run(mut self) -> Result<RunOutcome, RunError> {
        let started = Instant::now();
        self.logger.log(&LogEvent::MonitorStarted {
            url: self.monitor.url().to_string(),
            probe_path: self.monitor.config().probe_path().display().to_string(),
        });

        let mut window = StatsWindow::new(self.settings.max_pending_frames);
        let mut samples = 0usize;
        let mut restarts = 0u32;
        let mut stopping = false;

        self.monitor.listen()?;

        let interval = self.settings.stats_interval;
        let mut stats_ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        let mut interrupt_poll = tokio::time::interval(INTERRUPT_POLL);

        let outcome = loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        return Err(RunError::EventsClosed);
                    };
                    let exit = match event {
                        MonitorEvent::Frame(frame) => {
                            window.push(frame);
                            continue;
                        }
                        MonitorEvent::Stderr(diagnostic) => {
                            self.logger.log(&LogEvent::ProbeStderr {
                                line: diagnostic.message,
                            });
                            continue;
                        }
                        MonitorEvent::Error(error) => {
                            warn!(error = %error, "Monitor reported an error");
                            self.logger.log(&LogEvent::ProbeError {
                                kind: error.kind().to_string(),
                                message: error.to_string(),
                            });
                            continue;
                        }
                        MonitorEvent::Exit(exit) => exit,
                    };

                    self.log_exit(&exit);

                    if stopping || self.interrupted.load(Ordering::SeqCst) {
                        break RunOutcome::interrupted(samples, restarts, started.elapsed());
                    }

                    match exit {
                        ExitOutcome::NormalExit { .. } => {
                            info!("Stream ended");
                            break RunOutcome::completed(samples, restarts, started.elapsed());
                        }
                        ExitOutcome::StartError { error } => {
                            break RunOutcome::failed(samples, restarts, error.to_string(), started.elapsed());
                        }
                        ExitOutcome::ExternalSignal { signal } => {
                            break RunOutcome::failed(
                                samples,
                                restarts,
                                format!("probe terminated by {}", signal),
                                started.elapsed(),
                            );
                        }
                        exit @ (ExitOutcome::AbnormalExit { .. } | ExitOutcome::ProcessingError { .. }) => {
                            if restarts >= self.settings.max_restarts {
                                break RunOutcome::failed(
                                    samples,
                                    restarts,
                                    format!("{} (gave up after {} restarts)", exit.short_description(), restarts),
                                    started.elapsed(),
                                );
                            }

                            restarts += 1;
                            self.logger.log(&LogEvent::ProbeRestarting {
                                attempt: restarts,
                                max_restarts: self.settings.max_restarts,
                                delay_secs: self.settings.restart_delay.as_secs_f64(),
                            });
                            if self.wait_or_interrupt(self.settings.restart_delay).await {
                                break RunOutcome::interrupted(samples, restarts, started.elapsed());
                            }

                            window.reset();
                            self.monitor.listen()?;
                        }
                    }
                }

                _ = stats_ticker.tick() => {
                    samples += 1;
                    let sample = window.sample();
                    self.report(sample);
                }

                _ = interrupt_poll.tick(), if !stopping => {
                    if self.interrupted.load(Ordering::SeqCst) {
                        info!("Run interrupted, stopping probe");
                        stopping = true;
                        // the session's exit event ends the loop
                        match self.monitor.stop_listen().await {
                            Ok(exit) => debug!(code = ?exit.code, signal = ?exit.signal, "Probe stopped"),
                            Err(e) => debug!(error = %e, "Probe was not running"),
                        }
                    }
                }
            }
        };

        self.logger.log(&LogEvent::MonitorStopped {
            samples,
            restarts,
            duration_secs: outcome.total_duration_secs(),
        });

        Ok(outcome)
    }

    /// Sleep for `delay`; true if interrupted meanwhile
    async fn wait_or_interrupt(&self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep((deadline - now).min(INTERRUPT_POLL)).await;
        }
    }

    fn log_exit(&self, exit: &ExitOutcome) {
        let detail = match exit {
            ExitOutcome::AbnormalExit { stderr_output, .. } if !stderr_output.is_empty() => {
                Some(stderr_output.clone())
            }
            _ => None,
        };
        self.logger.log(&LogEvent::ProbeExited {
            outcome: exit.short_description(),
            detail,
        });
    }

    fn report(&self, sample: StatsSample) {
        match sample.network {
            Ok(network) => {
                for (media_type, stats) in network {
                    self.logger.log(&LogEvent::NetworkStats {
                        media_type,
                        frames: stats.frames,
                        frame_rate: stats.frame_rate,
                        bitrate_kbps: stats.bitrate,
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "Network stats failed");
                self.logger.log(&LogEvent::AnalysisFailed {
                    error: e.to_string(),
                });
            }
        }

        match sample.encoder {
            Ok(payload) => self.logger.log(&LogEvent::EncoderStats {
                gops: payload.gop_count,
                bitrate_min: payload.bitrate.min,
                bitrate_mean: payload.bitrate.mean,
                bitrate_max: payload.bitrate.max,
                fps_mean: payload.fps.mean,
                gop_duration_mean: payload.gop_duration.mean,
                aspect_ratio: payload.display_aspect_ratio,
                width: payload.width,
                height: payload.height,
                has_audio: payload.has_audio_stream,
                identical_gops: payload.are_all_gops_identical,
            }),
            Err(AnalysisError::NoGops) => self.logger.log(&LogEvent::StatsPending {
                frames: sample.pending_frames,
            }),
            Err(e) => {
                warn!(error = %e, "Encoder stats failed, dropping pending frames");
                self.logger.log(&LogEvent::AnalysisFailed {
                    error: e.to_string(),
                });
            }
        }
    }
}
