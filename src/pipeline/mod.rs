//! Context scan and delivery orchestration.
//!
//! One run walks `Idle -> ScanningCell -> ScanningProximity -> Delivering ->
//! Idle`. Probes run strictly one after another; a failed probe only leaves its
//! card field absent. Delivery either uploads the encoded card or stores it
//! locally. Every run that is not cancelled ends with exactly one terminal
//! status; a cancelled run ends silently.

pub mod store;

pub use store::LocalStore;

use crate::card::SharedCard;
use crate::encode::{CardForm, MultipartEncoder};
use crate::error::{PipelineError, UploadError};
use crate::probe::{CellScanner, ProximityScanner};
use crate::settings::SettingsStore;
use crate::upload::{UploadOutcome, Uploader};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ScanningCell,
    ScanningProximity,
    Delivering,
}

/// Status reported to the caller of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Non-terminal, names the current step
    Progress(String),
    Ok(String),
    Fail(String),
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Progress(_))
    }

    pub fn message(&self) -> &str {
        match self {
            DeliveryStatus::Progress(m) | DeliveryStatus::Ok(m) | DeliveryStatus::Fail(m) => m,
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn status(&self, status: DeliveryStatus);
}

impl<F> StatusSink for F
where
    F: Fn(DeliveryStatus) + Send + Sync,
{
    fn status(&self, status: DeliveryStatus) {
        self(status)
    }
}

fn progress(message: &str) -> DeliveryStatus {
    DeliveryStatus::Progress(message.to_string())
}

fn ok(message: &str) -> DeliveryStatus {
    DeliveryStatus::Ok(message.to_string())
}

fn fail(message: &str) -> DeliveryStatus {
    DeliveryStatus::Fail(message.to_string())
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    cell: CellScanner,
    proximity: ProximityScanner,
    uploader: Uploader,
    encoder: MultipartEncoder,
    store: LocalStore,
    settings: SettingsStore,
    state: Mutex<PipelineState>,
    active: Mutex<Option<ActiveRun>>,
    next_id: AtomicU64,
}

/// Sequences the probes and the delivery step into one cancellable run.
///
/// Cheap to clone; clones share the same run slot.
#[derive(Clone)]
pub struct ContextScanPipeline {
    inner: Arc<Inner>,
}

impl ContextScanPipeline {
    pub fn new(
        cell: CellScanner,
        proximity: ProximityScanner,
        uploader: Uploader,
        encoder: MultipartEncoder,
        store: LocalStore,
        settings: SettingsStore,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cell,
                proximity,
                uploader,
                encoder,
                store,
                settings,
                state: Mutex::new(PipelineState::Idle),
                active: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.inner.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    pub fn uploader(&self) -> &Uploader {
        &self.inner.uploader
    }

    /// Start a scan-and-send run for `card`.
    ///
    /// Fails with [`PipelineError::Busy`] if a run is active. Otherwise clears
    /// the card's cell and proximity fields and drives the run on a spawned
    /// task, reporting through `sink`. Must be called within a Tokio runtime.
    pub fn run(&self, card: SharedCard, sink: Arc<dyn StatusSink>) -> Result<(), PipelineError> {
        let (id, token) = {
            let mut active = self.inner.active.lock();
            if active.is_some() {
                debug!("Run refused, pipeline busy");
                return Err(PipelineError::Busy);
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            *active = Some(ActiveRun {
                id,
                token: token.clone(),
            });
            (id, token)
        };

        {
            let mut card = card.lock();
            card.set_cell(None);
            card.set_proximity(None);
        }

        info!(run = id, "Scan-and-send run started");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            match inner.cycle(&card, sink.as_ref(), &token).await {
                Some(terminal) => {
                    if inner.finish(id) {
                        info!(run = id, status = %terminal.message(), "Run finished");
                        sink.status(terminal);
                    }
                }
                None => debug!(run = id, "Run cancelled"),
            }
        });
        Ok(())
    }

    /// Abort the active run. No status is reported for it.
    pub fn cancel(&self) {
        let Some(run) = self.inner.active.lock().take() else {
            return;
        };
        run.token.cancel();
        self.inner.cell.cancel();
        self.inner.proximity.cancel();
        self.inner.uploader.cancel();
        self.inner.set_state(PipelineState::Idle);
        info!(run = run.id, "Scan-and-send run cancelled");
    }

    /// Cancel any run and release the uploader's connection resources.
    pub fn close(&self) {
        self.cancel();
        self.inner.uploader.close();
    }
}

impl Inner {
    fn set_state(&self, state: PipelineState) {
        *self.state.lock() = state;
    }

    /// Enter `state` unless the run was cancelled.
    fn enter(&self, state: PipelineState, token: &CancellationToken) -> Option<()> {
        if token.is_cancelled() {
            return None;
        }
        self.set_state(state);
        debug!(?state, "Pipeline state");
        Some(())
    }

    /// Free the run slot if it still belongs to run `id`.
    fn finish(&self, id: u64) -> bool {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.id == id) {
            *active = None;
            self.set_state(PipelineState::Idle);
            true
        } else {
            false
        }
    }

    /// Drive one run. `None` means cancelled.
    async fn cycle(
        &self,
        card: &SharedCard,
        sink: &dyn StatusSink,
        token: &CancellationToken,
    ) -> Option<DeliveryStatus> {
        if !self.settings.pipeline_config().scanning_disabled {
            self.enter(PipelineState::ScanningCell, token)?;
            sink.status(progress("Scanning context"));
            let cell = self.cell.scan().await?;
            if token.is_cancelled() {
                return None;
            }
            card.lock().set_cell(cell.into_option());

            let config = self.settings.pipeline_config();
            if config.proximity_scan_enabled && !config.scanning_disabled {
                self.enter(PipelineState::ScanningProximity, token)?;
                sink.status(progress("Scanning proximity"));
                let devices = self.proximity.scan().await?;
                if token.is_cancelled() {
                    return None;
                }
                card.lock().set_proximity(devices.into_option());
            }
        }

        self.enter(PipelineState::Delivering, token)?;
        let store_instead = self.settings.pipeline_config().store_instead_of_send;
        let failed = if store_instead { "Storing failed" } else { "Sending failed" };

        let form = CardForm::from_card(&card.lock());
        let request = match form.and_then(|form| self.encoder.encode(&form)) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not encode card");
                return Some(fail(failed));
            }
        };

        if token.is_cancelled() {
            return None;
        }

        if store_instead {
            sink.status(progress("Storing card"));
            if token.is_cancelled() {
                return None;
            }
            return Some(match self.store.store(&request) {
                Ok(_) => ok("Card stored"),
                Err(e) => {
                    warn!(error = %e, "Could not store card");
                    fail(failed)
                }
            });
        }

        sink.status(progress("Sending card"));
        match self.uploader.send_until(request, token).await {
            Ok(Some(outcome)) => Some(self.status_for(outcome)),
            Ok(None) => None,
            Err(UploadError::StillSending) => {
                warn!("Uploader still busy with an earlier card");
                Some(fail(failed))
            }
        }
    }

    fn status_for(&self, outcome: UploadOutcome) -> DeliveryStatus {
        match outcome {
            UploadOutcome::Accepted => ok("Card sent"),
            UploadOutcome::Refused => fail("Server did not accept card"),
            UploadOutcome::Other(_) => fail("Unexpected response from server"),
            UploadOutcome::TransportError(e) => {
                if self.settings.set_access_point(None) {
                    info!(error = %e, "Cleared access point after transport error");
                }
                fail("Sending failed")
            }
        }
    }
}
