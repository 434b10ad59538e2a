//! Gaze-away detection
//!
//! A two-state hysteresis machine converting the raw 3-axis deviation stream
//! (produced upstream from landmark geometry) into discrete, debounced
//! away-duration events. Only the away flag and the excursion start instant
//! are retained between samples, so the detector is restartable between
//! sessions.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use lps_common::{AwaySample, GazeDeviation};

use crate::config::GazeConfig;

pub struct GazeDetector {
    x_threshold: f64,
    y_threshold: f64,
    min_duration: Duration,
    away_since: Option<Instant>,
}

impl GazeDetector {
    pub fn new(x_threshold: f64, y_threshold: f64, min_duration: Duration) -> Self {
        Self {
            x_threshold,
            y_threshold,
            min_duration,
            away_since: None,
        }
    }

    pub fn from_config(config: &GazeConfig) -> Self {
        Self::new(config.x_threshold, config.y_threshold, config.min_away())
    }

    /// Whether the subject is currently looking away
    pub fn is_away(&self) -> bool {
        self.away_since.is_some()
    }

    /// Feed one deviation sample observed at `now`.
    ///
    /// Returns a completed interval when the gaze comes back within both
    /// thresholds after an excursion longer than the minimum duration;
    /// shorter excursions are discarded as noise.
    pub fn observe_at(&mut self, sample: GazeDeviation, now: Instant) -> Option<AwaySample> {
        let outside =
            sample.x.abs() > self.x_threshold || sample.y.abs() > self.y_threshold;

        if outside {
            if self.away_since.is_none() {
                self.away_since = Some(now);
            }
            return None;
        }

        let start = self.away_since.take()?;
        let duration = now.saturating_duration_since(start);
        if duration > self.min_duration {
            Some(AwaySample::new(duration.as_secs_f64()))
        } else {
            None
        }
    }

    /// Feed one sample stamped with the current time
    pub fn observe(&mut self, sample: GazeDeviation) -> Option<AwaySample> {
        self.observe_at(sample, Instant::now())
    }

    pub fn reset(&mut self) {
        self.away_since = None;
    }
}

/// Worker draining the deviation channel and forwarding debounced away
/// events onto the gaze event channel
pub struct GazeWorker {
    detector: GazeDetector,
    deviation_rx: mpsc::UnboundedReceiver<GazeDeviation>,
    away_tx: mpsc::UnboundedSender<AwaySample>,
}

impl GazeWorker {
    pub fn new(
        detector: GazeDetector,
        deviation_rx: mpsc::UnboundedReceiver<GazeDeviation>,
        away_tx: mpsc::UnboundedSender<AwaySample>,
    ) -> Self {
        Self {
            detector,
            deviation_rx,
            away_tx,
        }
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!("gaze monitor started");
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                sample = self.deviation_rx.recv() => {
                    match sample {
                        Some(sample) => {
                            if let Some(away) = self.detector.observe(sample) {
                                tracing::debug!(seconds = away.seconds, "gaze-away interval completed");
                                if self.away_tx.send(away).is_err() {
                                    tracing::debug!("gaze channel closed, event dropped");
                                }
                            }
                        }
                        // Upstream sample source went away.
                        None => break,
                    }
                }
            }
        }
        tracing::info!("gaze monitor stopped");
    }
}
