use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::MediaCatalog;
use crate::config::{Configuration, PanelGeometry};
use crate::engine::{CycleOutcome, Effect, EngineState, FrameRequest, PlaybackMode};
use crate::platform::ffmpeg::{Extraction, FrameSource};
use crate::platform::panel::DisplaySink;
use crate::processing::dither::dither_frame;
use crate::resolver;
use crate::store::{KeyValueStore, ProgressStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerOptions {
    pub mode: PlaybackMode,
    pub increment: u64,
    pub refresh_delay: Duration,
    pub frame_duration_ms: f64,
    pub panel: PanelGeometry,
}

impl From<&Configuration> for PlayerOptions {
    fn from(cfg: &Configuration) -> Self {
        Self {
            mode: cfg.mode,
            increment: cfg.increment,
            refresh_delay: cfg.refresh_delay,
            frame_duration_ms: cfg.frame_duration_ms,
            panel: cfg.panel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    Resolving,
    Playing,
    ShuttingDown,
}

/// What one refresh did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub request: FrameRequest,
    pub outcome: CycleOutcome,
    /// Set when the cycle finished a video and moved on.
    pub next_video: Option<String>,
    pub elapsed: Duration,
}

/// How long to wait before the next refresh. An overrun means "go now".
pub fn pacing(refresh_delay: Duration, elapsed: Duration) -> Duration {
    refresh_delay.saturating_sub(elapsed)
}

/// Drives the panel: extract, dither, display, persist, wait, repeat.
///
/// Extraction failures are absorbed by the engine (they shorten the video).
/// Dithering, panel and store failures end the loop.
pub struct Player<F, D, S> {
    options: PlayerOptions,
    catalog: MediaCatalog,
    engine: EngineState,
    frames: F,
    sink: D,
    store: ProgressStore<S>,
    rng: StdRng,
    phase: PlayerPhase,
}

impl<F, D, S> Player<F, D, S>
where
    F: FrameSource,
    D: DisplaySink,
    S: KeyValueStore,
{
    /// Resolve the video to resume and get ready to play it.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        options: PlayerOptions,
        catalog: MediaCatalog,
        mut store: ProgressStore<S>,
        frames: F,
        sink: D,
        requested: Option<&str>,
        start: Option<u64>,
        mut rng: StdRng,
    ) -> Result<Self> {
        debug!(phase = ?PlayerPhase::Resolving, "player starting");
        let resolution = resolver::resolve(&catalog, &mut store, requested, start, &mut rng)
            .context("failed to resolve the video to play")?;
        let engine = EngineState::new(
            catalog.videos().to_vec(),
            &resolution.video_id,
            resolution.position,
        )?;
        Ok(Self {
            options,
            catalog,
            engine,
            frames,
            sink,
            store,
            rng,
            phase: PlayerPhase::Playing,
        })
    }

    pub fn engine(&self) -> &EngineState {
        &self.engine
    }

    pub fn phase(&self) -> PlayerPhase {
        self.phase
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn frames(&self) -> &F {
        &self.frames
    }

    pub fn store(&self) -> &ProgressStore<S> {
        &self.store
    }

    /// Run one refresh without waiting afterwards.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        self.ensure_frame_count()?;

        let PlayerOptions {
            mode,
            increment,
            frame_duration_ms,
            panel,
            ..
        } = self.options;
        let request = self.engine.plan(mode, frame_duration_ms, &mut self.rng);
        let path = self.catalog.path_for(&request.video_id);

        let extraction = self
            .frames
            .extract(&path, request.timestamp, panel)
            .with_context(|| format!("failed to run frame extraction for {}", path.display()))?;
        let outcome = match extraction {
            Extraction::FrameProduced(frame) => {
                let bitmap = dither_frame(&frame, panel).context("failed to dither frame")?;
                self.sink
                    .display(&bitmap)
                    .context("failed to display frame")?;
                info!(
                    video = %request.video_id,
                    frame = request.frame,
                    timestamp_ms = request.timestamp.as_millis() as u64,
                    "displaying frame"
                );
                CycleOutcome::Displayed
            }
            Extraction::ExtractionFailed(reason) => {
                warn!(
                    video = %request.video_id,
                    frame = request.frame,
                    position = self.engine.position(),
                    %reason,
                    "frame not created; treating position as end of video"
                );
                CycleOutcome::ExtractionFailed(reason)
            }
        };

        let finished = request.video_id.clone();
        let completed = self.engine.completed();
        let (engine, effects) = self.engine.clone().step(&outcome, increment);
        self.engine = engine;
        self.apply(&effects)?;

        let next_video = (self.engine.completed() > completed)
            .then(|| self.engine.video_id().to_string());
        if let Some(next) = &next_video {
            info!(finished = %finished, next = %next, "end of video; moving on");
        }

        Ok(CycleReport {
            request,
            outcome,
            next_video,
            elapsed: started.elapsed(),
        })
    }

    fn ensure_frame_count(&mut self) -> Result<()> {
        if !self.engine.needs_frame_count() {
            return Ok(());
        }
        let video_id = self.engine.video_id().to_string();
        let path = self.catalog.path_for(&video_id);
        let total = match self
            .frames
            .frame_count(&path)
            .with_context(|| format!("failed to probe {}", path.display()))?
        {
            Some(total) => total,
            None => {
                warn!(video = %video_id, "frame count unknown; treating video as empty");
                0
            }
        };
        info!(video = %video_id, total_frames = total, "frames in this video");
        self.engine = self.engine.clone().with_frame_count(total);
        Ok(())
    }

    fn apply(&mut self, effects: &[Effect]) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::SaveProgress { video_id, position } => self
                    .store
                    .save(video_id, *position)
                    .with_context(|| format!("failed to save progress for {video_id}"))?,
                Effect::SavePointer(video_id) => {
                    self.store
                        .save_pointer(video_id)
                        .context("failed to save now-playing pointer")?;
                    info!(video = %video_id, "now playing");
                }
            }
        }
        Ok(())
    }

    /// Refresh forever, until `cancel` fires or something fatal happens.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Self> {
        info!(
            mode = %self.options.mode,
            delay = %humantime::format_duration(self.options.refresh_delay),
            increment = self.options.increment,
            "playback started"
        );
        self.sink.init().context("failed to initialise panel")?;
        self.sink.clear().context("failed to clear panel")?;
        while !cancel.is_cancelled() {
            let report = match self.cycle() {
                Ok(report) => report,
                Err(err) => {
                    if let Err(sleep_err) = self.sink.sleep() {
                        warn!("failed to put panel to sleep after error: {sleep_err:#}");
                    }
                    return Err(err);
                }
            };
            let pause = pacing(self.options.refresh_delay, report.elapsed);
            if report.elapsed > self.options.refresh_delay {
                warn!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    delay_ms = self.options.refresh_delay.as_millis() as u64,
                    "processing took longer than the refresh delay; increase the delay"
                );
            }

            select! {
                _ = cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
            self.sink.init().context("failed to re-initialise panel")?;
        }
        self.shutdown()?;
        Ok(self)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.phase = PlayerPhase::ShuttingDown;
        info!(
            video = %self.engine.video_id(),
            position = self.engine.position(),
            "shutting down; putting panel to sleep"
        );
        self.sink.sleep().context("failed to put panel to sleep")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_subtracts_processing_time() {
        let delay = Duration::from_secs(180);
        assert_eq!(
            pacing(delay, Duration::from_secs(30)),
            Duration::from_secs(150)
        );
        assert_eq!(pacing(delay, delay), Duration::ZERO);
    }

    #[test]
    fn overrun_proceeds_immediately() {
        assert_eq!(
            pacing(Duration::from_secs(1), Duration::from_secs(5)),
            Duration::ZERO
        );
    }
}
