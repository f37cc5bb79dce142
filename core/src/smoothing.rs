//! Orchestration of the external adaptive smoothing program.
//!
//! The program is run twice: once to derive a scale map reaching a target
//! signal-to-noise, and once to apply Gaussian smoothing with that map.
//! Both runs block until the program exits.

use crate::prelude::{GgmError, GgmResult};
use crate::telemetry::log::LogManager;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const PROGRAM_NAME: &str = "accumulate_counts";

const SHELL_SPECIAL: &str = " \t[]<>|()$\"#!*?~&;";

/// Quote arguments the way a shell user would need to type them.
pub fn escape_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| {
            let escaped = arg.as_ref().replace('\'', "\\'");
            if escaped.chars().any(|c| SHELL_SPECIAL.contains(c)) {
                format!("'{}'", escaped)
            } else {
                escaped
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn flag(name: &str, value: impl std::fmt::Display) -> OsString {
    OsString::from(format!("--{}={}", name, value))
}

fn path_flag(name: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(format!("--{}=", name));
    arg.push(path.as_os_str());
    arg
}

/// Handle on the adaptive smoothing program.
#[derive(Debug, Clone)]
pub struct AccumulateCounts {
    program: PathBuf,
    threads: usize,
    mask: Option<PathBuf>,
    logger: LogManager,
}

impl AccumulateCounts {
    /// Program looked up on `PATH`, or inside `contbin_dir` when given.
    pub fn new(contbin_dir: Option<&Path>, threads: usize, mask: Option<PathBuf>) -> Self {
        let program = match contbin_dir {
            Some(dir) => dir.join(PROGRAM_NAME),
            None => PathBuf::from(PROGRAM_NAME),
        };
        Self::with_program(program, threads, mask)
    }

    pub fn with_program(program: PathBuf, threads: usize, mask: Option<PathBuf>) -> Self {
        Self {
            program,
            threads,
            mask,
            logger: LogManager::new("smoothing"),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn push_mask(&self, args: &mut Vec<OsString>) {
        if let Some(mask) = &self.mask {
            args.push(path_flag("mask", mask));
        }
    }

    pub fn scale_map_args(&self, counts: &Path, scale_out: &Path, sn: f64) -> Vec<OsString> {
        let mut args = vec![
            counts.as_os_str().to_owned(),
            path_flag("scale", scale_out),
            flag("sn", sn),
            flag("threads", self.threads),
        ];
        self.push_mask(&mut args);
        args
    }

    pub fn smoothing_args(&self, image: &Path, scale: &Path, applied: &Path) -> Vec<OsString> {
        let mut args = vec![
            image.as_os_str().to_owned(),
            OsString::from("--apply"),
            path_flag("scale", scale),
            path_flag("applied", applied),
            flag("threads", self.threads),
            OsString::from("--gaussian"),
        ];
        self.push_mask(&mut args);
        args
    }

    /// Pass 1: write a scale map for `counts` reaching signal-to-noise `sn`.
    pub fn build_scale_map(&self, counts: &Path, sn: f64, scale_out: &Path) -> GgmResult<()> {
        self.call(&self.scale_map_args(counts, scale_out, sn))
    }

    /// Pass 2: smooth `image` with the scale map, writing `applied`.
    pub fn apply_smoothing(&self, image: &Path, scale: &Path, applied: &Path) -> GgmResult<()> {
        self.call(&self.smoothing_args(image, scale, applied))
    }

    fn call(&self, args: &[OsString]) -> GgmResult<()> {
        let mut shown = vec![self.program.to_string_lossy().into_owned()];
        shown.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        self.logger.record(&format!("+ {}", escape_args(&shown)));

        let status = Command::new(&self.program)
            .args(args)
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
