//! Pushing combined images to an external display.

use crate::io::{write_image, ImageHeader};
use crate::prelude::{GgmError, GgmResult, Image};
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub trait ImageViewer {
    fn display(&self, image: &Image, header: Option<&ImageHeader>) -> GgmResult<()>;
}

/// Sends images to a running DS9 through `xpaset`.
#[derive(Debug, Clone)]
pub struct Ds9Viewer {
    target: String,
    program: PathBuf,
}

impl Ds9Viewer {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            program: PathBuf::from("xpaset"),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for Ds9Viewer {
    fn default() -> Self {
        Self::new("ds9")
    }
}

impl ImageViewer for Ds9Viewer {
    fn display(&self, image: &Image, header: Option<&ImageHeader>) -> GgmResult<()> {
        let temp = tempfile::Builder::new()
            .prefix("ggm_xpa_")
            .suffix(".fits")
            .tempfile()?;
        write_image(temp.path(), image, header)?;

        let status = Command::new(&self.program)
            .arg(&self.target)
            .arg("fits")
            .stdin(Stdio::from(File::open(temp.path())?))
            .status()
            .map_err(|source| GgmError::ExternalToolLaunch {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(GgmError::ExternalToolFailure {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }
}

/// Discards every image; used for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullViewer;

impl ImageViewer for NullViewer {
    fn display(&self, _image: &Image, _header: Option<&ImageHeader>) -> GgmResult<()> {
        Ok(())
    }
}

impl<V: ImageViewer + ?Sized> ImageViewer for Box<V> {
    fn display(&self, image: &Image, header: Option<&ImageHeader>) -> GgmResult<()> {
        (**self).display(image, header)
    }
}
