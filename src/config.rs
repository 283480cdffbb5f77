use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::engine::PlaybackMode;
use crate::error::Error;

/// Frame duration used to turn a frame index into a seek timestamp (24 fps).
pub const DEFAULT_FRAME_DURATION_MS: f64 = 41.666_666;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory scanned (non-recursively) for `.mp4`/`.mkv` files.
    pub video_library_path: PathBuf,
    /// Directory holding the now-playing pointer and per-video progress records.
    pub state_path: PathBuf,
    /// Time between two panel refreshes.
    #[serde(with = "humantime_serde")]
    pub refresh_delay: Duration,
    /// Frames the play position advances per refresh.
    pub increment: u64,
    /// Sequential play-through or a random frame every refresh.
    pub mode: PlaybackMode,
    /// Optional deterministic seed for random video and frame picks.
    pub random_seed: Option<u64>,
    /// Milliseconds of video per frame index.
    pub frame_duration_ms: f64,
    /// Convert `.mkv` files to `.mp4` (removing the original) when scanning.
    pub convert_mkv: bool,
    /// Target panel resolution.
    pub panel: PanelGeometry,
    /// External ffmpeg/ffprobe binaries.
    pub ffmpeg: FfmpegOptions,
    /// Where dithered frames are sent.
    pub display: DisplayConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            video_library_path: PathBuf::from("Videos"),
            state_path: PathBuf::from("state"),
            refresh_delay: Duration::from_secs(180),
            increment: 10,
            mode: PlaybackMode::Sequential,
            random_seed: None,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            convert_mkv: true,
            panel: PanelGeometry::default(),
            ffmpeg: FfmpegOptions::default(),
            display: DisplayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PanelGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for PanelGeometry {
    fn default() -> Self {
        // Waveshare 7.5" HD
        Self {
            width: 880,
            height: 528,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FfmpegOptions {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DisplayConfig {
    /// Write each dithered frame to a PNG file.
    Preview { path: PathBuf },
    /// Drive a panel helper through shell commands.
    #[serde(rename_all = "kebab-case")]
    Command {
        #[serde(default)]
        init_command: Option<String>,
        #[serde(default)]
        clear_command: Option<String>,
        /// Receives the packed 1-bit frame buffer on stdin.
        display_command: String,
        #[serde(default)]
        sleep_command: Option<String>,
        #[serde(default)]
        preview_path: Option<PathBuf>,
    },
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::Preview {
            path: PathBuf::from("dither_tmp.png"),
        }
    }
}

impl Configuration {
    /// # Errors
    /// [`Error::Io`] if the file cannot be read, [`Error::Config`] if it is not
    /// a valid configuration document.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.refresh_delay.is_zero(),
            "refresh-delay must be greater than zero"
        );
        ensure!(self.increment > 0, "increment must be greater than zero");
        ensure!(
            self.frame_duration_ms.is_finite() && self.frame_duration_ms > 0.0,
            "frame-duration-ms must be a positive number"
        );
        ensure!(
            self.panel.width > 0 && self.panel.height > 0,
            "panel width and height must be greater than zero"
        );
        ensure!(
            !self.ffmpeg.ffmpeg_path.as_os_str().is_empty(),
            "ffmpeg-path must not be empty"
        );
        ensure!(
            !self.ffmpeg.ffprobe_path.as_os_str().is_empty(),
            "ffprobe-path must not be empty"
        );
        self.display
            .validate()
            .context("invalid display configuration")?;
        Ok(self)
    }
}

impl DisplayConfig {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Preview { path } => {
                ensure!(path.file_name().is_some(), "preview path must name a file");
            }
            Self::Command {
                init_command,
                clear_command,
                display_command,
                sleep_command,
                ..
            } => {
                ensure!(
                    !display_command.trim().is_empty(),
                    "display-command must not be blank"
                );
                for (label, cmd) in [
                    ("init-command", init_command),
                    ("clear-command", clear_command),
                    ("sleep-command", sleep_command),
                ] {
                    if let Some(cmd) = cmd {
                        ensure!(!cmd.trim().is_empty(), "{label} must not be blank");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_player() {
        let cfg = Configuration::default().validated().unwrap();
        assert_eq!(cfg.refresh_delay, Duration::from_secs(180));
        assert_eq!(cfg.increment, 10);
        assert_eq!(cfg.mode, PlaybackMode::Sequential);
        assert_eq!(cfg.panel, PanelGeometry { width: 880, height: 528 });
    }

    #[test]
    fn zero_increment_is_rejected() {
        let cfg = Configuration {
            increment: 0,
            ..Configuration::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn blank_display_command_is_rejected() {
        let cfg = Configuration {
            display: DisplayConfig::Command {
                init_command: None,
                clear_command: None,
                display_command: "  ".into(),
                sleep_command: None,
                preview_path: None,
            },
            ..Configuration::default()
        };
        let err = cfg.validated().unwrap_err();
        assert!(format!("{err:#}").contains("display-command"));
    }
}
