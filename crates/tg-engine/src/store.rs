//! Device storage port.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tg_core::{ComplianceResult, Device, DeviceId, PostureReport, StoreError, StoreResult};

/// Persistent device records.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Load a device.
    async fn load(&self, id: DeviceId) -> StoreResult<Option<Device>>;

    /// Replace the device's latest posture and compliance in one write and
    /// return the updated record.
    async fn record_posture(
        &self,
        id: DeviceId,
        report: PostureReport,
        result: &ComplianceResult,
        at: DateTime<Utc>,
    ) -> StoreResult<Device>;
}

/// In-memory device repository.
#[derive(Debug, Default)]
pub struct MemoryDeviceRepository {
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl MemoryDeviceRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device.
    pub fn insert(&self, device: Device) {
        self.devices.write().insert(device.id(), device);
    }

    /// Snapshot of a device.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<Device> {
        self.devices.read().get(&id).cloned()
    }
}

#[async_trait]
impl DeviceRepository for MemoryDeviceRepository {
    async fn load(&self, id: DeviceId) -> StoreResult<Option<Device>> {
        Ok(self.get(id))
    }

    async fn record_posture(
        &self,
        id: DeviceId,
        report: PostureReport,
        result: &ComplianceResult,
        at: DateTime<Utc>,
    ) -> StoreResult<Device> {
        let mut devices = self.devices.write();
        let device = devices
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("device {id}")))?;
        device.record_posture(report, result, at);
        Ok(device.clone())
    }
}
