use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::auth::secret::{hash_secret, verify_secret};
use crate::error::{AttendanceError, AttendanceResult};
use crate::model::device::{Device, DeviceConfigUpdate, DeviceStatus, NewDevice, SyncOutcome};
use crate::service::attendance_service::require_tenant;
use crate::store::DeviceStore;

fn clean_name(name: &str) -> AttendanceResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AttendanceError::InvalidDeviceName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Device configuration, sync lock and sync bookkeeping
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    sync_lease: Duration,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn DeviceStore>, sync_lease: Duration) -> Self {
        Self { store, sync_lease }
    }

    pub fn sync_lease(&self) -> Duration {
        self.sync_lease
    }

    #[instrument(skip(self, device), fields(name = %device.name))]
    pub async fn register(&self, tenant_id: &str, mut device: NewDevice) -> AttendanceResult<Device> {
        let tenant_id = require_tenant(tenant_id)?;
        device.name = clean_name(&device.name)?;
        let push_secret_hash = device
            .push_secret
            .take()
            .filter(|s| !s.is_empty())
            .map(|s| hash_secret(&s))
            .transpose()?;

        let device = self.store.insert(tenant_id, device, push_secret_hash).await?;
        info!(device_id = device.id, "Device registered");
        Ok(device)
    }

    pub async fn get(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<Device> {
        let tenant_id = require_tenant(tenant_id)?;
        self.store
            .get(tenant_id, device_id)
            .await?
            .ok_or(AttendanceError::DeviceNotFound(device_id))
    }

    pub async fn list(&self, tenant_id: &str) -> AttendanceResult<Vec<Device>> {
        let tenant_id = require_tenant(tenant_id)?;
        self.store.list(tenant_id).await
    }

    /// Apply a configuration change. Config columns and the enable toggle are
    /// written separately; the toggle never touches a device while it syncs.
    #[instrument(skip(self, update))]
    pub async fn update_config(
        &self,
        tenant_id: &str,
        device_id: u64,
        update: DeviceConfigUpdate,
    ) -> AttendanceResult<Device> {
        let mut device = self.get(tenant_id, device_id).await?;

        if let Some(name) = update.name {
            device.name = clean_name(&name)?;
        }
        if let Some(connection) = update.connection {
            device.connection = connection;
        }
        if let Some(auto_sync) = update.auto_sync {
            device.auto_sync = auto_sync;
        }
        if let Some(minutes) = update.sync_interval_minutes {
            device.sync_interval_minutes = minutes;
        }
        if let Some(secret) = update.push_secret {
            device.push_secret_hash = if secret.is_empty() {
                None
            } else {
                Some(hash_secret(&secret)?)
            };
        }
        self.store.update(&device).await?;

        if let Some(enabled) = update.enabled {
            let status = if enabled {
                DeviceStatus::Active
            } else {
                DeviceStatus::Inactive
            };
            // a running sync keeps its status; the outcome will overwrite it
            if !self
                .store
                .set_enabled(&device.tenant_id, device_id, status)
                .await?
            {
                warn!(%status, "Device status left unchanged, a sync may be running");
            }
        }

        info!("Device configuration updated");
        self.get(tenant_id, device_id).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<()> {
        let tenant_id = require_tenant(tenant_id)?;
        if !self.store.delete(tenant_id, device_id).await? {
            return Err(AttendanceError::DeviceNotFound(device_id));
        }
        info!("Device deleted");
        Ok(())
    }

    /// Auto-sync pull devices that are not switched off and not currently
    /// held by a sync run
    pub async fn list_for_sync(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> AttendanceResult<Vec<Device>> {
        let devices = self.list(tenant_id).await?;

        // push-only devices have nothing to pull, and inactive ones are
        // switched off by an operator; both stay out of scheduled syncs
        Ok(devices
            .into_iter()
            .filter(|d| d.auto_sync && d.device_type.supports_pull())
            .filter(|d| match d.status {
                DeviceStatus::Active | DeviceStatus::Error => true,
                DeviceStatus::Syncing => !d.is_sync_locked(now, self.sync_lease),
                DeviceStatus::Inactive => false,
            })
            .collect())
    }

    /// `list_for_sync` narrowed to devices whose interval has elapsed
    pub async fn list_due_for_sync(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> AttendanceResult<Vec<Device>> {
        let devices = self.list_for_sync(tenant_id, now).await?;
        Ok(devices.into_iter().filter(|d| d.is_due(now)).collect())
    }

    /// Take the device's sync lock. Fails with `DeviceBusy` while another run
    /// holds an unexpired lease.
    #[instrument(skip(self))]
    pub async fn mark_sync_start(
        &self,
        tenant_id: &str,
        device_id: u64,
        now: DateTime<Utc>,
    ) -> AttendanceResult<()> {
        let tenant_id = require_tenant(tenant_id)?;
        let acquired = self
            .store
            .try_begin_sync(tenant_id, device_id, now, now - self.sync_lease)
            .await?;

        if acquired {
            return Ok(());
        }
        match self.store.get(tenant_id, device_id).await? {
            Some(_) => {
                warn!("Device is already syncing");
                Err(AttendanceError::DeviceBusy(device_id))
            }
            None => Err(AttendanceError::DeviceNotFound(device_id)),
        }
    }

    /// Release the lock and fold the outcome into the device stats
    #[instrument(skip(self, outcome), fields(success = outcome.success, processed = outcome.processed))]
    pub async fn record_sync_outcome(
        &self,
        tenant_id: &str,
        device_id: u64,
        outcome: SyncOutcome,
    ) -> AttendanceResult<Device> {
        let tenant_id = require_tenant(tenant_id)?;
        let device = self
            .store
            .finish_sync(tenant_id, device_id, &outcome)
            .await?
            .ok_or(AttendanceError::DeviceNotFound(device_id))?;

        info!(status = %device.status, "Device sync finished");
        Ok(device)
    }

    /// Resolve a pushing device from its id and shared secret
    pub async fn authenticate_push(&self, device_id: u64, secret: &str) -> AttendanceResult<Device> {
        let device = self
            .store
            .get_by_id(device_id)
            .await?
            .ok_or(AttendanceError::DeviceUnauthorized(device_id))?;

        let authorized = device
            .push_secret_hash
            .as_deref()
            .is_some_and(|hash| verify_secret(secret, hash));
        if !authorized || device.status == DeviceStatus::Inactive {
            warn!(device_id, "Rejected device push");
            return Err(AttendanceError::DeviceUnauthorized(device_id));
        }

        Ok(device)
    }
}
