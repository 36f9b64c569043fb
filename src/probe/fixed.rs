//! Probe backends fed from the `[fixtures]` configuration table.
//!
//! Used where no radio hardware is present. A backend without configured data
//! reports itself unavailable, so the corresponding card field stays absent.

use super::position::{ModuleId, ModuleInfo, PositioningService};
use super::proximity::{DiscoveryCode, DiscoveryService, DiscoverySession, RawDevice};
use super::CellSource;
use crate::card::{CellInfo, GpsFix, Position};
use crate::config::FixtureConfig;
use crate::error::ProbeError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct FixedCellSource {
    cell: Option<CellInfo>,
}

impl FixedCellSource {
    pub fn new(cell: Option<CellInfo>) -> Self {
        Self { cell }
    }

    pub fn from_config(fixtures: &FixtureConfig) -> Self {
        Self::new(fixtures.cell)
    }
}

impl CellSource for FixedCellSource {
    fn lookup(&self) -> Result<CellInfo, ProbeError> {
        self.cell
            .ok_or_else(|| ProbeError::Unavailable("no cell configured".to_string()))
    }
}

/// Discovery that reports a configured device list, one device per step
#[derive(Debug, Clone, Default)]
pub struct FixedDiscovery {
    devices: Option<Vec<RawDevice>>,
    step_delay: Duration,
}

impl FixedDiscovery {
    pub fn new(devices: Option<Vec<RawDevice>>) -> Self {
        Self {
            devices,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Device addresses in the config are hex strings, with or without colons.
    /// Entries that do not decode are skipped.
    pub fn from_config(fixtures: &FixtureConfig) -> Self {
        let devices = fixtures.devices.as_ref().map(|devices| {
            devices
                .iter()
                .filter_map(|d| match hex::decode(d.address.replace(':', "")) {
                    Ok(address) => Some(RawDevice {
                        address,
                        name: d.name.clone(),
                    }),
                    Err(e) => {
                        warn!(address = %d.address, error = %e, "Skipping fixture device");
                        None
                    }
                })
                .collect()
        });
        Self::new(devices).with_step_delay(Duration::from_millis(fixtures.step_delay_ms))
    }
}

struct FixedSession {
    remaining: VecDeque<RawDevice>,
    step_delay: Duration,
}

impl FixedSession {
    async fn step(&mut self) -> Result<RawDevice, DiscoveryCode> {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        self.remaining
            .pop_front()
            .ok_or(DiscoveryCode::END_OF_RESULTS)
    }
}

#[async_trait]
impl DiscoverySession for FixedSession {
    async fn find_first(&mut self) -> Result<RawDevice, DiscoveryCode> {
        self.step().await
    }

    async fn find_next(&mut self) -> Result<RawDevice, DiscoveryCode> {
        self.step().await
    }

    fn cancel(&mut self) {
        self.remaining.clear();
    }
}

#[async_trait]
impl DiscoveryService for FixedDiscovery {
    async fn open(&self) -> Result<Box<dyn DiscoverySession>, ProbeError> {
        let devices = self
            .devices
            .clone()
            .ok_or_else(|| ProbeError::Unavailable("no devices configured".to_string()))?;
        Ok(Box::new(FixedSession {
            remaining: devices.into(),
            step_delay: self.step_delay,
        }))
    }
}

const FIXED_MODULE: ModuleId = 1;

/// Positioning that reports one configured fix
#[derive(Debug, Clone, Default)]
pub struct FixedPositioning {
    fix: Option<GpsFix>,
}

impl FixedPositioning {
    pub fn new(fix: Option<GpsFix>) -> Self {
        Self { fix }
    }

    pub fn from_config(fixtures: &FixtureConfig) -> Self {
        let fix = fixtures.position.as_ref().map(|p| GpsFix {
            position: Position {
                latitude: p.latitude,
                longitude: p.longitude,
                altitude: p.altitude.unwrap_or(f64::NAN),
                horizontal_accuracy: p.horizontal_accuracy.unwrap_or(f64::NAN),
                vertical_accuracy: p.vertical_accuracy.unwrap_or(f64::NAN),
            },
            course: None,
        });
        Self::new(fix)
    }
}

#[async_trait]
impl PositioningService for FixedPositioning {
    fn default_module(&self) -> ModuleId {
        FIXED_MODULE
    }

    fn modules(&self) -> Vec<ModuleInfo> {
        vec![ModuleInfo {
            id: FIXED_MODULE,
            name: "Configured position".to_string(),
            available: self.fix.is_some(),
        }]
    }

    fn select_module(&self, id: ModuleId) -> Result<(), ProbeError> {
        if id == FIXED_MODULE {
            Ok(())
        } else {
            Err(ProbeError::UnknownModule(id))
        }
    }

    async fn next_fix(&self) -> Result<GpsFix, ProbeError> {
        self.fix
            .ok_or_else(|| ProbeError::Positioning("no position configured".to_string()))
    }
}
