//! Outcome of closing a session.

use std::path::PathBuf;

use crate::Error;

/// What [`crate::project::Session::close`] wrote and what failed.
///
/// Each module is written independently; a failure for one module leaves its original file
/// untouched and does not affect the others.
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Modules written back, with the final image path
    pub written: Vec<(String, PathBuf)>,
    /// Copies placed into the mirror directory
    pub copied: Vec<PathBuf>,
    /// Modules that could not be written
    pub failed: Vec<(String, Error)>,
}

impl CloseReport {
    /// Number of modules written back.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.written.len()
    }

    /// Number of modules that failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Converts into the names of the written modules, or the first failure.
    ///
    /// # Errors
    /// Returns the error of the first module that failed.
    pub fn into_result(self) -> crate::Result<Vec<String>> {
        match self.failed.into_iter().next() {
            Some((_, error)) => Err(error),
            None => Ok(self.written.into_iter().map(|(name, _)| name).collect()),
        }
    }
}
