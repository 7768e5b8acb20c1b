//! logging — persisted per-step record of a calibration run.
//!
//! Purpose
//! -------
//! Let a calibration be audited and resumed: every calibration step that
//! notifies loggers appends one row `likelihood<TAB>value1<TAB>...` to a
//! plain-text, UTF-8, tab-separated file.
//!
//! Key behaviors
//! -------------
//! - [`CalibrationLogger`] is the hook the calibrator calls after each
//!   step; [`CoefficientLog`] is the file-based implementation.
//! - Before the first row the log writes an optional documentation block
//!   (followed by a blank line) and the header `likelihood<TAB>name1...`.
//! - [`CoefficientLog::reload`] picks the best logged row and re-applies it
//!   through the calibrator without logging the re-evaluation.
//!
//! Invariants & assumptions
//! ------------------------
//! - The file is append-only during a run; activation refuses to clobber
//!   an existing file unless `overwrite` is set.
//! - Values are written with Rust's shortest round-trip float formatting,
//!   so a reloaded row reproduces the logged vector bit for bit.
//!
//! Testing notes
//! -------------
//! - Unit tests write logs into `tempfile` directories and cover layout,
//!   overwrite protection, reload, and corrupted files.
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    calibration::Calibrator,
    errors::{MprError, MprResult},
    simulation::Simulation,
};

/// Hook notified after every logged calibration step.
pub trait CalibrationLogger: Send {
    /// Prepare the log; called once at calibrator activation.
    fn activate(&mut self) -> MprResult<()>;

    /// Record step `step` with its likelihood and coefficient vector.
    fn log(&mut self, step: usize, likelihood: f64, names: &[String], values: &[f64]) -> MprResult<()>;
}

/// Tab-separated coefficient log.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientLog {
    path: PathBuf,
    documentation: Option<Vec<String>>,
    overwrite: bool,
    header_written: bool,
}

impl CoefficientLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), documentation: None, overwrite: false, header_written: false }
    }

    /// Lines written before the header.
    pub fn with_documentation<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.documentation = Some(lines.into_iter().map(Into::into).collect());
        self
    }

    /// Replace an existing file on activation instead of failing.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-apply the best row of the log and return the recomputed
    /// likelihood.
    ///
    /// `maximisation` selects the largest likelihood, otherwise the
    /// smallest. A recomputed value that differs from the logged one only
    /// raises a warning.
    ///
    /// # Errors
    /// - [`MprError::Io`] if the file cannot be read.
    /// - [`MprError::CorruptedLog`] if it holds no header or no parsable
    ///   row.
    /// - Every error of [`Calibrator::perform_calibrationstep`].
    pub fn reload<S: Simulation>(
        &self, calibrator: &mut Calibrator<S>, maximisation: bool,
    ) -> MprResult<f64> {
        let text = fs::read_to_string(&self.path).map_err(|err| MprError::io(&self.path, err))?;
        let (logged, values) = self.best_row(&text, maximisation)?;
        let recomputed = calibrator.perform_calibrationstep(&values, false)?;
        if !is_close(logged, recomputed) {
            warn!(
                path = %self.path.display(),
                logged,
                recomputed,
                "re-applying the best logged coefficients gives a different likelihood"
            );
        }
        Ok(recomputed)
    }

    fn best_row(&self, text: &str, maximisation: bool) -> MprResult<(f64, Vec<f64>)> {
        let corrupted = || MprError::CorruptedLog { path: self.path.display().to_string() };
        let mut rows = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .skip_while(|line| line.split_whitespace().next() != Some("likelihood"))
            .skip(1)
            .peekable();
        rows.peek().ok_or_else(corrupted)?;
        let mut best: Option<(f64, Vec<f64>)> = None;
        for row in rows {
            let numbers = row
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| corrupted())?;
            let (&likelihood, values) = numbers.split_first().ok_or_else(corrupted)?;
            let better = match &best {
                None => true,
                Some((incumbent, _)) if maximisation => likelihood > *incumbent,
                Some((incumbent, _)) => likelihood < *incumbent,
            };
            if better {
                best = Some((likelihood, values.to_vec()));
            }
        }
        best.ok_or_else(corrupted)
    }
}

fn is_close(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

impl CalibrationLogger for CoefficientLog {
    fn activate(&mut self) -> MprResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| MprError::io(parent, err))?;
        }
        if self.path.exists() {
            if !self.overwrite {
                return Err(MprError::LogExists { path: self.path.display().to_string() });
            }
            fs::remove_file(&self.path).map_err(|err| MprError::io(&self.path, err))?;
        }
        self.header_written = false;
        debug!(path = %self.path.display(), "coefficient log activated");
        Ok(())
    }

    fn log(&mut self, _step: usize, likelihood: f64, names: &[String], values: &[f64]) -> MprResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| MprError::io(&self.path, err))?;
        let mut text = String::new();
        if !self.header_written {
            if let Some(documentation) = &self.documentation {
                text.push_str(&documentation.join("\n"));
                text.push_str("\n\n");
            }
            text.push_str("likelihood");
            for name in names {
                text.push('\t');
                text.push_str(name);
            }
            text.push('\n');
        }
        text.push_str(&likelihood.to_string());
        for value in values {
            text.push('\t');
            text.push_str(&value.to_string());
        }
        text.push('\n');
        file.write_all(text.as_bytes()).map_err(|err| MprError::io(&self.path, err))?;
        self.header_written = true;
        Ok(())
    }
}
