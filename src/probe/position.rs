//! Background position scanning.
//!
//! Unlike the per-send probes, the position scanner is a long-lived
//! subscription: once started it requests a fix from the selected positioning
//! module at a fixed interval and publishes every fix on a channel until
//! stopped.

use crate::card::GpsFix;
use crate::error::ProbeError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_FIX_INTERVAL: Duration = Duration::from_secs(30);

pub type ModuleId = u32;

/// A positioning technology offered by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub name: String,
    pub available: bool,
}

#[async_trait]
pub trait PositioningService: Send + Sync {
    fn default_module(&self) -> ModuleId;
    fn modules(&self) -> Vec<ModuleInfo>;
    fn select_module(&self, id: ModuleId) -> Result<(), ProbeError>;
    /// Wait for the next fix from the selected module.
    async fn next_fix(&self) -> Result<GpsFix, ProbeError>;
}

/// Interactive selection among available modules (presentation layer)
pub trait ModuleChooser {
    /// Index of the chosen entry, or `None` if the user made no choice.
    fn choose(&self, modules: &[ModuleInfo]) -> Option<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub module: ModuleId,
    pub fix: GpsFix,
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct ScannerState {
    module: ModuleId,
    running: Option<Running>,
}

pub struct PositionScanner {
    service: Arc<dyn PositioningService>,
    interval: Duration,
    updates: mpsc::UnboundedSender<PositionUpdate>,
    state: Mutex<ScannerState>,
}

impl PositionScanner {
    /// Create a stopped scanner using `module`, or the platform default.
    pub fn new(
        service: Arc<dyn PositioningService>,
        module: Option<ModuleId>,
        updates: mpsc::UnboundedSender<PositionUpdate>,
    ) -> Result<Self, ProbeError> {
        let module = module.unwrap_or_else(|| service.default_module());
        service.select_module(module)?;
        Ok(Self {
            service,
            interval: DEFAULT_FIX_INTERVAL,
            updates,
            state: Mutex::new(ScannerState {
                module,
                running: None,
            }),
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn module_id(&self) -> ModuleId {
        self.state.lock().module
    }

    /// Display name of the current module.
    pub fn module_name(&self) -> Option<String> {
        let id = self.module_id();
        self.service
            .modules()
            .into_iter()
            .find(|m| m.id == id)
            .map(|m| m.name)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().running.is_some()
    }

    /// Start delivering fixes. No-op if already active. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.running.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(fix_loop(
            self.service.clone(),
            state.module,
            self.interval,
            self.updates.clone(),
            token.clone(),
        ));
        state.running = Some(Running { token, handle });
        info!(module = state.module, "Position scanning started");
    }

    /// Stop delivering fixes. No-op if not active.
    pub fn stop(&self) {
        if let Some(running) = self.state.lock().running.take() {
            running.token.cancel();
            running.handle.abort();
            info!("Position scanning stopped");
        }
    }

    /// Take another positioning module into use.
    ///
    /// An active scanner is stopped for the switch and restarted afterwards,
    /// whether or not the platform accepted the new module.
    pub fn switch_module(&self, id: ModuleId) -> Result<(), ProbeError> {
        if self.module_id() == id {
            return Ok(());
        }
        let was_active = self.is_active();
        if was_active {
            self.stop();
        }

        let result = self.service.select_module(id);
        match &result {
            Ok(()) => {
                self.state.lock().module = id;
                info!(module = id, "Selected positioning module");
            }
            Err(e) => warn!(module = id, error = %e, "Could not select positioning module"),
        }

        if was_active {
            self.start();
        }
        result
    }

    pub fn list_available_modules(&self) -> Vec<ModuleInfo> {
        self.service
            .modules()
            .into_iter()
            .filter(|m| m.available)
            .collect()
    }

    /// Let the user pick a module. The choice takes effect only through
    /// [`switch_module`](Self::switch_module).
    pub fn choose_module(&self, chooser: &dyn ModuleChooser) -> Option<ModuleId> {
        let modules = self.list_available_modules();
        chooser
            .choose(&modules)
            .and_then(|index| modules.get(index))
            .map(|m| m.id)
    }
}

impl Drop for PositionScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fix_loop(
    service: Arc<dyn PositioningService>,
    module: ModuleId,
    interval: Duration,
    updates: mpsc::UnboundedSender<PositionUpdate>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fix = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            fix = service.next_fix() => fix,
        };

        match fix {
            Ok(fix) => {
                debug!(
                    latitude = fix.position.latitude,
                    longitude = fix.position.longitude,
                    "Position fix"
                );
                if updates.send(PositionUpdate { module, fix }).is_err() {
                    debug!("Position receiver gone, ending scan");
                    break;
                }
            }
            Err(e) => warn!(module, error = %e, "Position request failed"),
        }
    }
}
