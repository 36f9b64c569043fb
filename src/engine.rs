//! Composition root for the postcard composer.
//!
//! The engine owns the runtime settings, the card, the scan-and-send pipeline
//! and the background position scanner, and wires them together: position
//! fixes flow into the card, sends are validated first, and the card's
//! temporary fields are cleared after every finished send.

use crate::card::{ContextSnapshot, GpsFix, SharedCard};
use crate::clock::{Clock, SystemClock};
use crate::config::CardpostConfig;
use crate::encode::MultipartEncoder;
use crate::error::{CardpostError, InboxError, ProbeError, SendRefusal};
use crate::inbox::{ArrivalCallback, AttachmentInbox};
use crate::logging::LogHandle;
use crate::notice::{LogNotifier, Notifier};
use crate::pipeline::{ContextScanPipeline, DeliveryStatus, LocalStore, StatusSink};
use crate::probe::fixed::{FixedCellSource, FixedDiscovery, FixedPositioning};
use crate::probe::{
    CellScanner, CellSource, DiscoveryService, ModuleChooser, ModuleId, ModuleInfo,
    PositionScanner, PositionUpdate, PositioningService, ProximityScanner,
};
use crate::settings::{SettingsListener, SettingsStore};
use crate::upload::{NetworkService, TcpNetwork, Uploader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Platform backends behind the probes and the uploader
#[derive(Clone)]
pub struct Backends {
    pub cell: Arc<dyn CellSource>,
    pub discovery: Arc<dyn DiscoveryService>,
    pub positioning: Arc<dyn PositioningService>,
    pub network: Arc<dyn NetworkService>,
}

impl Backends {
    /// Configured probe data plus real TCP networking.
    pub fn from_config(config: &CardpostConfig) -> Self {
        Self {
            cell: Arc::new(FixedCellSource::from_config(&config.fixtures)),
            discovery: Arc::new(FixedDiscovery::from_config(&config.fixtures)),
            positioning: Arc::new(FixedPositioning::from_config(&config.fixtures)),
            network: Arc::new(TcpNetwork::from_config(&config.network)),
        }
    }
}

/// Clears the card's temporary fields before passing a terminal status on.
struct ClearingSink {
    card: SharedCard,
    inner: Arc<dyn StatusSink>,
}

impl StatusSink for ClearingSink {
    fn status(&self, status: DeliveryStatus) {
        if status.is_terminal() {
            self.card.lock().clear_temporary();
        }
        self.inner.status(status);
    }
}

pub struct Engine {
    settings: SettingsStore,
    card: SharedCard,
    pipeline: ContextScanPipeline,
    position: PositionScanner,
    inbox: AttachmentInbox,
    log: LogHandle,
    gps_live: Arc<AtomicBool>,
    fixes: watch::Receiver<Option<GpsFix>>,
    apply_task: JoinHandle<()>,
}

impl Engine {
    /// Build the engine. Must be called within a Tokio runtime.
    pub fn new(
        config: &CardpostConfig,
        settings: SettingsStore,
        backends: Backends,
        log: LogHandle,
    ) -> Result<Self, CardpostError> {
        Self::with_parts(
            config,
            settings,
            backends,
            log,
            Arc::new(LogNotifier),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        config: &CardpostConfig,
        settings: SettingsStore,
        backends: Backends,
        log: LogHandle,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CardpostError> {
        log.set_debug(settings.debug());

        let card = ContextSnapshot::new(&settings.card_defaults(), clock.clone())
            .with_default_attachment(config.attachments.default_file.clone())
            .with_listener(Arc::new(SettingsListener::new(settings.clone())))
            .into_shared();

        let uploader = Uploader::new(
            backends.network,
            config.server.endpoint(),
            settings.clone(),
            log.clone(),
        )
        .with_debug_read_chunk(config.scan.debug_read_chunk);
        let pipeline = ContextScanPipeline::new(
            CellScanner::new(backends.cell),
            ProximityScanner::new(backends.discovery, notifier)
                .with_timeout(config.scan.proximity_timeout()),
            uploader,
            MultipartEncoder::new(config.server.endpoint()),
            LocalStore::new(config.storage.uploads_dir.clone(), clock),
            settings.clone(),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let position = match PositionScanner::new(
            backends.positioning.clone(),
            settings.positioning_module(),
            tx.clone(),
        ) {
            Ok(scanner) => scanner,
            Err(e) => {
                warn!(error = %e, "Saved positioning module unusable, using default");
                PositionScanner::new(backends.positioning, None, tx)?
            }
        }
        .with_interval(config.scan.position_interval());

        let inbox = AttachmentInbox::new(&config.attachments, card.clone());

        let gps_live = Arc::new(AtomicBool::new(false));
        let (fix_tx, fixes) = watch::channel(None);
        let apply_task = tokio::spawn(apply_fixes(rx, card.clone(), gps_live.clone(), fix_tx));

        info!(
            host = %config.server.host,
            port = config.server.port,
            "Engine ready"
        );
        Ok(Self {
            settings,
            card,
            pipeline,
            position,
            inbox,
            log,
            gps_live,
            fixes,
            apply_task,
        })
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn card(&self) -> SharedCard {
        self.card.clone()
    }

    pub fn pipeline(&self) -> &ContextScanPipeline {
        &self.pipeline
    }

    /// Latest position fix applied to the card.
    pub fn watch_position(&self) -> watch::Receiver<Option<GpsFix>> {
        self.fixes.clone()
    }

    /// Validate the card and start a scan-and-send run.
    pub fn send_card(&self, sink: Arc<dyn StatusSink>) -> Result<(), SendRefusal> {
        self.card.lock().validate()?;
        let sink = Arc::new(ClearingSink {
            card: self.card.clone(),
            inner: sink,
        });
        self.pipeline.run(self.card.clone(), sink)?;
        Ok(())
    }

    pub fn cancel_send(&self) {
        self.pipeline.cancel();
    }

    /// Reset the card to the saved defaults.
    pub fn clear_card(&self) {
        self.card.lock().clear(&self.settings.card_defaults());
    }

    /// Start background context scanning. No-op while scanning is disabled.
    pub fn context_start_scanning(&self) {
        if self.settings.scanning_disabled() {
            debug!("Context scanning disabled");
            return;
        }
        if self.settings.gps_scan_enabled() {
            self.gps_live.store(true, Ordering::SeqCst);
            self.position.start();
        }
    }

    /// Stop background scanning and drop the position from the card.
    pub fn context_stop_scanning(&self) {
        self.stop_position();
    }

    fn stop_position(&self) {
        self.gps_live.store(false, Ordering::SeqCst);
        self.position.stop();
        self.card.lock().set_gps(None);
    }

    pub fn set_scanning_disabled(&self, disabled: bool) {
        self.settings.set_scanning_disabled(disabled);
        if disabled {
            self.context_stop_scanning();
        } else {
            self.context_start_scanning();
        }
    }

    pub fn set_gps_scan(&self, on: bool) {
        self.settings.set_gps_scan_enabled(on);
        if on {
            self.context_start_scanning();
        } else {
            self.stop_position();
        }
    }

    pub fn is_position_active(&self) -> bool {
        self.position.is_active()
    }

    pub fn positioning_modules(&self) -> Vec<ModuleInfo> {
        self.position.list_available_modules()
    }

    pub fn positioning_module_name(&self) -> Option<String> {
        self.position.module_name()
    }

    /// Let the user pick a positioning module; persist and apply the choice.
    pub fn edit_gps_config(
        &self,
        chooser: &dyn ModuleChooser,
    ) -> Result<Option<ModuleId>, ProbeError> {
        let Some(id) = self.position.choose_module(chooser) else {
            return Ok(None);
        };
        self.settings.set_positioning_module(Some(id));
        self.position.switch_module(id)?;
        Ok(Some(id))
    }

    /// Watch the attachment inbox. `on_arrival` runs after each arriving
    /// document has been put on the card.
    pub fn start_observing_attachments(
        &self,
        on_arrival: ArrivalCallback,
    ) -> Result<(), InboxError> {
        self.inbox.start_observing(on_arrival)
    }

    pub fn stop_observing_attachments(&self) {
        self.inbox.stop_observing();
    }

    pub fn is_observing_attachments(&self) -> bool {
        self.inbox.is_observing()
    }

    pub fn clear_access_point(&self) {
        if self.settings.set_access_point(None) {
            info!("Access point cleared");
        }
    }

    /// Toggle diagnostic mode, persisting the choice.
    pub fn set_debug(&self, on: bool) {
        self.settings.set_debug(on);
        self.log.set_debug(on);
    }

    /// Stop scanning, cancel any send and release network resources.
    pub fn shutdown(&self) {
        self.gps_live.store(false, Ordering::SeqCst);
        self.position.stop();
        self.inbox.stop_observing();
        self.pipeline.close();
        debug!("Engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        self.apply_task.abort();
    }
}

async fn apply_fixes(
    mut rx: mpsc::UnboundedReceiver<PositionUpdate>,
    card: SharedCard,
    live: Arc<AtomicBool>,
    fixes: watch::Sender<Option<GpsFix>>,
) {
    while let Some(update) = rx.recv().await {
        // Fixes still queued after a stop are stale.
        if !live.load(Ordering::SeqCst) {
            continue;
        }
        card.lock().set_gps(Some(update.fix));
        fixes.send_replace(Some(update.fix));
    }
}
