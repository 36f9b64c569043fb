//! Serving-cell probe.

use super::ScanOutcome;
use crate::card::CellInfo;
use crate::error::ProbeError;
use crate::task::ActiveOp;
use std::sync::Arc;
use tracing::{debug, warn};

/// Platform lookup of the current serving cell. Synchronous.
pub trait CellSource: Send + Sync {
    fn lookup(&self) -> Result<CellInfo, ProbeError>;
}

/// Single-shot cell probe
pub struct CellScanner {
    source: Arc<dyn CellSource>,
    op: ActiveOp,
}

impl CellScanner {
    pub fn new(source: Arc<dyn CellSource>) -> Self {
        Self {
            source,
            op: ActiveOp::new(),
        }
    }

    /// Look up the serving cell.
    ///
    /// The lookup itself is synchronous; its completion is delivered after a
    /// trip through the scheduler so it never lands inside the caller's own
    /// call. Lookup errors become [`ScanOutcome::Failure`]. Returns `None` if
    /// [`cancel`](Self::cancel) was called first.
    pub async fn scan(&self) -> Option<ScanOutcome<CellInfo>> {
        let guard = self.op.begin_replacing();
        let outcome = match self.source.lookup() {
            Ok(cell) => {
                debug!(
                    country_code = cell.country_code,
                    network_code = cell.network_code,
                    area_code = cell.area_code,
                    cell_id = cell.cell_id,
                    "Cell lookup succeeded"
                );
                ScanOutcome::Success(cell)
            }
            Err(e) => {
                warn!(error = %e, "Cell lookup failed");
                ScanOutcome::Failure
            }
        };

        tokio::select! {
            biased;
            _ = guard.token().cancelled() => None,
            _ = tokio::task::yield_now() => Some(outcome),
        }
    }

    /// Discard any pending completion.
    pub fn cancel(&self) {
        self.op.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.op.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<CellInfo>);

    impl CellSource for Fixed {
        fn lookup(&self) -> Result<CellInfo, ProbeError> {
            self.0
                .ok_or_else(|| ProbeError::Lookup("no network".to_string()))
        }
    }

    const CELL: CellInfo = CellInfo {
        country_code: 244,
        network_code: 5,
        area_code: 42,
        cell_id: 9001,
    };

    #[tokio::test]
    async fn scan_reports_cell() {
        let scanner = CellScanner::new(Arc::new(Fixed(Some(CELL))));
        assert_eq!(scanner.scan().await, Some(ScanOutcome::Success(CELL)));
        assert!(!scanner.is_active());
    }

    #[tokio::test]
    async fn lookup_error_is_swallowed() {
        let scanner = CellScanner::new(Arc::new(Fixed(None)));
        assert_eq!(scanner.scan().await, Some(ScanOutcome::Failure));
    }

    #[tokio::test]
    async fn cancel_discards_completion() {
        let scanner = Arc::new(CellScanner::new(Arc::new(Fixed(Some(CELL)))));
        let task = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan().await })
        };
        // Let the scan start and park on its yield.
        while !scanner.is_active() {
            tokio::task::yield_now().await;
        }
        scanner.cancel();
        assert_eq!(task.await.unwrap(), None);
    }
}
