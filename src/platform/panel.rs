use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use image::{GrayImage, Luma};
use tracing::debug;

use crate::config::{DisplayConfig, PanelGeometry};
use crate::processing::dither::Bitmap;

/// An e-paper panel, or anything standing in for one.
///
/// Panels of this class must be re-initialised before every write and put to
/// sleep when idle for long periods.
pub trait DisplaySink {
    fn init(&mut self) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    fn display(&mut self, frame: &Bitmap) -> Result<()>;
    fn sleep(&mut self) -> Result<()>;
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn display(&mut self, frame: &Bitmap) -> Result<()> {
        (**self).display(frame)
    }

    fn sleep(&mut self) -> Result<()> {
        (**self).sleep()
    }
}

pub fn from_config(config: &DisplayConfig, panel: PanelGeometry) -> Result<Box<dyn DisplaySink>> {
    Ok(match config {
        DisplayConfig::Preview { path } => Box::new(PreviewPanel::new(path.clone(), panel)),
        DisplayConfig::Command {
            init_command,
            clear_command,
            display_command,
            sleep_command,
            preview_path,
        } => Box::new(CommandPanel::new(
            CommandPlan {
                init_command: init_command.clone(),
                clear_command: clear_command.clone(),
                display_command: display_command.clone(),
                sleep_command: sleep_command.clone(),
                preview_path: preview_path.clone(),
            },
            panel,
        )?),
    })
}

/// Writes every frame to a PNG file instead of a physical panel.
#[derive(Debug, Clone)]
pub struct PreviewPanel {
    path: PathBuf,
    panel: PanelGeometry,
}

impl PreviewPanel {
    pub fn new(path: PathBuf, panel: PanelGeometry) -> Self {
        Self { path, panel }
    }
}

impl DisplaySink for PreviewPanel {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let blank = GrayImage::from_pixel(self.panel.width, self.panel.height, Luma([255]));
        save_png(&blank, &self.path)
    }

    fn display(&mut self, frame: &Bitmap) -> Result<()> {
        save_png(&frame.to_luma(), &self.path)
    }

    fn sleep(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandPlan {
    pub init_command: Option<String>,
    pub clear_command: Option<String>,
    pub display_command: String,
    pub sleep_command: Option<String>,
    pub preview_path: Option<PathBuf>,
}

/// Drives a panel helper program through `sh -c`.
///
/// The display command receives the packed frame on stdin and the panel size
/// in `PANEL_WIDTH`/`PANEL_HEIGHT`.
#[derive(Debug, Clone)]
pub struct CommandPanel {
    plan: CommandPlan,
    panel: PanelGeometry,
}

impl CommandPanel {
    pub fn new(plan: CommandPlan, panel: PanelGeometry) -> Result<Self> {
        ensure_not_blank(&plan.display_command, "display command")?;
        for (label, cmd) in [
            ("init command", &plan.init_command),
            ("clear command", &plan.clear_command),
            ("sleep command", &plan.sleep_command),
        ] {
            if let Some(cmd) = cmd.as_deref() {
                ensure_not_blank(cmd, label)?;
            }
        }
        Ok(Self { plan, panel })
    }

    fn shell(&self, command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env("PANEL_WIDTH", self.panel.width.to_string())
            .env("PANEL_HEIGHT", self.panel.height.to_string());
        cmd
    }

    fn run_optional(&self, command: Option<&str>) -> Result<()> {
        match command {
            Some(command) => run_command(self.shell(command), command),
            None => Ok(()),
        }
    }
}

impl DisplaySink for CommandPanel {
    fn init(&mut self) -> Result<()> {
        self.run_optional(self.plan.init_command.as_deref())
    }

    fn clear(&mut self) -> Result<()> {
        self.run_optional(self.plan.clear_command.as_deref())
    }

    fn display(&mut self, frame: &Bitmap) -> Result<()> {
        if let Some(path) = &self.plan.preview_path {
            save_png(&frame.to_luma(), path)?;
        }

        let command = self.plan.display_command.as_str();
        let mut child = self
            .shell(command)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn shell for command: {command}"))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(frame.as_bytes())
                .with_context(|| format!("failed to send frame to: {command}"))?;
        }
        let status = child
            .wait()
            .with_context(|| format!("failed to wait for command: {command}"))?;
        if status.success() {
            debug!(command, bytes = frame.as_bytes().len(), "frame sent to panel");
            Ok(())
        } else {
            Err(anyhow!(
                "command exited with status {}: {command}",
                status.code().unwrap_or(-1)
            ))
        }
    }

    fn sleep(&mut self) -> Result<()> {
        self.run_optional(self.plan.sleep_command.as_deref())
    }
}

fn save_png(image: &GrayImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write frame to {}", path.display()))
}

fn run_command(mut cmd: Command, command: &str) -> Result<()> {
    let status = cmd
        .status()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "command exited with status {}: {command}",
            status.code().unwrap_or(-1)
        ))
    }
}

fn ensure_not_blank(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(anyhow!("{label} must not be blank"))
    } else {
        Ok(())
    }
}
