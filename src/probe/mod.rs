//! Context probes.
//!
//! Each scanner wraps a platform backend behind a trait and owns its own
//! at-most-one-active-operation flag and cancellation token. A scan resolves to
//! `Some(outcome)` exactly once, or to `None` when it was cancelled; backend
//! errors never propagate past the scanner.

pub mod cell;
pub mod fixed;
pub mod position;
pub mod proximity;

pub use cell::{CellScanner, CellSource};
pub use position::{
    ModuleChooser, ModuleId, ModuleInfo, PositionScanner, PositionUpdate, PositioningService,
};
pub use proximity::{
    expand_address, DiscoveryCode, DiscoveryService, DiscoverySession, ProximityScanner, RawDevice,
};

/// Result of one probe run
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome<T> {
    Success(T),
    Failure,
}

impl<T> ScanOutcome<T> {
    /// Value for the card field: a failure degrades the field to absent.
    pub fn into_option(self) -> Option<T> {
        match self {
            ScanOutcome::Success(value) => Some(value),
            ScanOutcome::Failure => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success(_))
    }
}

impl<T, E> From<Result<T, E>> for ScanOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ScanOutcome::Success(value),
            Err(_) => ScanOutcome::Failure,
        }
    }
}
