//! Frame extraction, length probing and container conversion via ffmpeg.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::MediaConverter;
use crate::config::{FfmpegOptions, PanelGeometry};

/// Result of asking for one frame.
#[derive(Debug, Clone)]
pub enum Extraction {
    FrameProduced(DynamicImage),
    ExtractionFailed(String),
}

/// Decodes single frames of a video.
///
/// `Err` is reserved for not being able to run the decoder at all; a video
/// that simply yields no frame at the requested time is
/// [`Extraction::ExtractionFailed`].
pub trait FrameSource {
    /// Number of frames in `video`, or `None` if it cannot be determined.
    fn frame_count(&mut self, video: &Path) -> Result<Option<u64>>;

    /// Grab the frame at `timestamp`, scaled and padded to `panel`.
    fn extract(
        &mut self,
        video: &Path,
        timestamp: Duration,
        panel: PanelGeometry,
    ) -> Result<Extraction>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Ffmpeg {
    pub fn new(options: &FfmpegOptions) -> Self {
        Self {
            ffmpeg: options.ffmpeg_path.clone(),
            ffprobe: options.ffprobe_path.clone(),
        }
    }

    fn run(&self, program: &Path, args: &[String]) -> Result<Output> {
        debug!(program = %program.display(), ?args, "spawning");
        Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", program.display()))
    }
}

impl FrameSource for Ffmpeg {
    fn frame_count(&mut self, video: &Path) -> Result<Option<u64>> {
        let args = vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            "stream=nb_frames,r_frame_rate:format=duration".into(),
            "-print_format".into(),
            "json".into(),
            path_arg(video)?,
        ];
        let out = self.run(&self.ffprobe, &args)?;
        if !out.status.success() {
            warn!(
                video = %video.display(),
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "ffprobe could not read video"
            );
            return Ok(None);
        }
        let probe: ProbeOutput = match serde_json::from_slice(&out.stdout) {
            Ok(probe) => probe,
            Err(err) => {
                warn!(video = %video.display(), "unreadable ffprobe output: {err}");
                return Ok(None);
            }
        };
        Ok(frame_count_from_probe(video, &probe))
    }

    fn extract(
        &mut self,
        video: &Path,
        timestamp: Duration,
        panel: PanelGeometry,
    ) -> Result<Extraction> {
        let PanelGeometry { width, height } = panel;
        let filter = format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease,pad={width}:{height}:-1:-1"
        );
        let args = vec![
            "-loglevel".into(),
            "error".into(),
            "-ss".into(),
            format!("{}ms", timestamp.as_millis()),
            "-i".into(),
            path_arg(video)?,
            "-vf".into(),
            filter,
            "-frames:v".into(),
            "1".into(),
            "-f".into(),
            "image2pipe".into(),
            "-vcodec".into(),
            "png".into(),
            "pipe:1".into(),
        ];
        let out = self.run(&self.ffmpeg, &args)?;
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();

        if !out.status.success() {
            let code = out.status.code().unwrap_or(-1);
            return Ok(Extraction::ExtractionFailed(format!(
                "ffmpeg exited with status {code}: {stderr}"
            )));
        }
        if out.stdout.is_empty() {
            return Ok(Extraction::ExtractionFailed(
                "output file is empty, nothing was encoded".into(),
            ));
        }
        match image::load_from_memory(&out.stdout) {
            Ok(frame) => Ok(Extraction::FrameProduced(frame)),
            Err(err) => Ok(Extraction::ExtractionFailed(format!(
                "undecodable frame: {err}"
            ))),
        }
    }
}

impl MediaConverter for Ffmpeg {
    fn convert_to_mp4(&mut self, source: &Path, target: &Path) -> Result<()> {
        let args = vec![
            "-loglevel".into(),
            "error".into(),
            "-n".into(),
            "-i".into(),
            path_arg(source)?,
            path_arg(target)?,
        ];
        let out = self.run(&self.ffmpeg, &args)?;
        if out.status.success() {
            Ok(())
        } else {
            Err(anyhow!(
                "ffmpeg exited with status {}: {}",
                out.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&out.stderr).trim()
            ))
        }
    }
}

fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("path is not valid UTF-8: {}", path.display()))
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// mp4 files carry an exact frame count; anything else (or an mp4 without
/// one) is estimated as whole seconds times the frame rate.
fn frame_count_from_probe(video: &Path, probe: &ProbeOutput) -> Option<u64> {
    let stream = probe.streams.first()?;
    let is_mp4 = video
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));

    if is_mp4
        && let Some(frames) = stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok())
    {
        return Some(frames);
    }

    let duration = probe
        .format
        .as_ref()?
        .duration
        .as_deref()?
        .parse::<f64>()
        .ok()?;
    let rate = parse_frame_rate(stream.r_frame_rate.as_deref()?)?;
    let frames = duration.trunc() * rate;
    (frames.is_finite() && frames >= 0.0).then_some(frames as u64)
}

/// Parse ffprobe rationals such as `24000/1001` or plain `25`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
