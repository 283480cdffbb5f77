//! Playback progression state machine.
//!
//! [`EngineState`] is the in-memory working copy of what is playing: the
//! catalog order, the active video, its frame position and its known length.
//! A refresh cycle is split in two pure halves so it can be tested without
//! ffmpeg, files or a panel:
//!
//! - [`EngineState::plan`] picks the frame to extract.
//! - [`EngineState::step`] folds the extraction outcome back in and returns the
//!   persistence [`Effect`]s the caller must apply.
//!
//! Position always advances by the configured increment, in random mode too.
//! The roll-over to the next video is driven by that bookkeeping position, not
//! by which frame ended up on the panel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackMode {
    /// Advance by a fixed increment each refresh.
    #[default]
    Sequential,
    /// Show a uniformly random frame each refresh.
    Random,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequential => "play-through",
            Self::Random => "random",
        })
    }
}

/// Seek offset of `frame` when every frame lasts `frame_duration_ms`.
///
/// Truncated to whole milliseconds.
pub fn frame_timestamp(frame: u64, frame_duration_ms: f64) -> Duration {
    let millis = (frame as f64 * frame_duration_ms).max(0.0);
    Duration::from_millis(millis as u64)
}

/// A frame the engine wants on the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub video_id: String,
    pub frame: u64,
    pub timestamp: Duration,
}

/// What happened to a [`FrameRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The frame was extracted, dithered and sent to the panel.
    Displayed,
    /// No frame came out of the extractor; the video is shorter than believed.
    ExtractionFailed(String),
}

/// Persistence work produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SaveProgress { video_id: String, position: u64 },
    SavePointer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    catalog: Arc<[String]>,
    active: usize,
    position: u64,
    total_frames: Option<u64>,
    completed: u64,
}

impl EngineState {
    /// Start playing `video_id` at `position`. The frame count is unknown until
    /// [`EngineState::with_frame_count`] supplies it.
    ///
    /// # Errors
    /// Returns [`Error::UnknownVideo`] if `video_id` is not in `catalog`.
    pub fn new(catalog: Vec<String>, video_id: &str, position: u64) -> Result<Self, Error> {
        let active = catalog
            .iter()
            .position(|v| v == video_id)
            .ok_or_else(|| Error::UnknownVideo(video_id.to_string()))?;
        Ok(Self {
            catalog: catalog.into(),
            active,
            position,
            total_frames: None,
            completed: 0,
        })
    }

    pub fn video_id(&self) -> &str {
        &self.catalog[self.active]
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// How many times playback has reached the end of a video.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    /// The active video's length has not been probed yet.
    pub fn needs_frame_count(&self) -> bool {
        self.total_frames.is_none()
    }

    /// Record the active video's frame count. A position at or past the end is
    /// rewound to the first frame.
    #[must_use]
    pub fn with_frame_count(mut self, total_frames: u64) -> Self {
        if self.position >= total_frames {
            self.position = 0;
        }
        self.total_frames = Some(total_frames);
        self
    }

    /// Choose the frame for this cycle.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        mode: PlaybackMode,
        frame_duration_ms: f64,
        rng: &mut R,
    ) -> FrameRequest {
        let frame = match mode {
            PlaybackMode::Sequential => self.position,
            // Inclusive of the end, so the last draw can overshoot the video.
            PlaybackMode::Random => rng.random_range(0..=self.total_frames.unwrap_or(0)),
        };
        FrameRequest {
            video_id: self.video_id().to_string(),
            frame,
            timestamp: frame_timestamp(frame, frame_duration_ms),
        }
    }

    /// Apply one cycle's outcome.
    ///
    /// A failed extraction shrinks the known length to the current position and
    /// does not advance. Reaching the end rewinds the finished video to zero and
    /// rotates to the next catalog entry, wrapping after the last one. The
    /// known length is kept when the rotation lands on the same video.
    #[must_use]
    pub fn step(mut self, outcome: &CycleOutcome, increment: u64) -> (Self, Vec<Effect>) {
        match outcome {
            CycleOutcome::Displayed => {
                self.position = self.position.saturating_add(increment);
            }
            CycleOutcome::ExtractionFailed(_) => {
                self.total_frames = Some(self.position);
            }
        }

        let mut effects = Vec::with_capacity(3);
        let finished = self
            .total_frames
            .is_some_and(|total| self.position >= total);

        if finished {
            let previous = self.active;
            effects.push(Effect::SaveProgress {
                video_id: self.video_id().to_string(),
                position: 0,
            });
            self.position = 0;
            self.completed += 1;
            self.active = (self.active + 1) % self.catalog.len();
            if self.active != previous {
                self.total_frames = None;
                effects.push(Effect::SaveProgress {
                    video_id: self.video_id().to_string(),
                    position: self.position,
                });
                effects.push(Effect::SavePointer(self.video_id().to_string()));
            }
        } else {
            effects.push(Effect::SaveProgress {
                video_id: self.video_id().to_string(),
                position: self.position,
            });
        }

        (self, effects)
    }
}
