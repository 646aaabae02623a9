use std::path::PathBuf;
use std::process::Command;

use packer_traits::{Frame, FrameSource};
use tracing::debug;

use crate::error::HwError;

/// Camera driven through an external still-capture tool (e.g. `rpicam-still`).
///
/// Each `grab` runs `command` with its arguments, then decodes the file at
/// `path`. With no command configured the file is only read, which lets a
/// bench fixture stand in for a real camera.
#[derive(Debug, Clone)]
pub struct StillImageCamera {
    command: Option<Vec<String>>,
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(command: Option<Vec<String>>, path: impl Into<PathBuf>) -> Self {
        Self {
            command: command.filter(|c| !c.is_empty()),
            path: path.into(),
        }
    }

    fn run_capture(&self) -> Result<(), HwError> {
        let Some(argv) = &self.command else {
            return Ok(());
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HwError::Camera("empty capture command".into()))?;
        debug!(program = %program, path = %self.path.display(), "capturing still");
        let status = Command::new(program).args(args).status()?;
        if !status.success() {
            return Err(HwError::Camera(format!("{program} exited with {status}")));
        }
        Ok(())
    }

    fn decode(&self) -> Result<Frame, HwError> {
        let img = image::open(&self.path)?.to_rgb8();
        let (w, h) = img.dimensions();
        Frame::from_rgb(w, h, img.into_raw())
            .ok_or_else(|| HwError::Camera(format!("bad buffer for {w}x{h} image")))
    }
}

impl FrameSource for StillImageCamera {
    fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error + Send + Sync>> {
        self.run_capture()?;
        Ok(self.decode()?)
    }
}
