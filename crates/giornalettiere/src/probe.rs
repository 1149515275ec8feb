//! Size-stability probe used to guess when a file has finished writing.
//!
//! Two size reads one sampling interval apart; equal sizes mean "stable".
//! A writer that pauses for exactly one interval fools it, so callers keep
//! re-probing in a bounded loop instead of trusting one sample.

use crate::types::{GiornalettiereError, GiornalettiereResult};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

/// Default gap between the two size reads.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Blocking size-stability check.
#[derive(Debug, Clone, Copy)]
pub struct StabilityProbe {
    interval: Duration,
}

impl StabilityProbe {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns whether `path` kept the same size across one interval.
    ///
    /// A path that disappears before either read yields
    /// [`GiornalettiereError::Missing`].
    pub fn is_stable(&self, path: &Path) -> GiornalettiereResult<bool> {
        let initial = size_of(path)?;
        std::thread::sleep(self.interval);
        let current = size_of(path)?;
        Ok(initial == current)
    }
}

impl Default for StabilityProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

fn size_of(path: &Path) -> GiornalettiereResult<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(GiornalettiereError::Missing(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
