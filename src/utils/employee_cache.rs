use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::error::AttendanceResult;
use crate::model::employee::EmployeeProfile;
use crate::store::EmployeeDirectory;

/// Cached front of the employee directory.
/// Only hits are cached; an unknown code is asked again next time.
pub struct EmployeeResolver {
    directory: Arc<dyn EmployeeDirectory>,
    /// (tenant, employee code) => profile
    by_code: Cache<(String, String), EmployeeProfile>,
    /// (tenant, employee id) => profile
    by_id: Cache<(String, u64), EmployeeProfile>,
}

impl EmployeeResolver {
    pub fn new(directory: Arc<dyn EmployeeDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            by_code: Cache::builder()
                .max_capacity(100_000) // tune based on memory
                .time_to_live(ttl)
                .build(),
            by_id: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    async fn remember(&self, tenant_id: &str, profile: &EmployeeProfile) {
        self.by_code
            .insert(
                (tenant_id.to_string(), profile.employee_code.clone()),
                profile.clone(),
            )
            .await;
        self.by_id
            .insert((tenant_id.to_string(), profile.employee_id), profile.clone())
            .await;
    }

    /// Map a device-side employee code to the employee
    pub async fn resolve_code(
        &self,
        tenant_id: &str,
        employee_code: &str,
    ) -> AttendanceResult<Option<EmployeeProfile>> {
        let key = (tenant_id.to_string(), employee_code.to_string());
        if let Some(profile) = self.by_code.get(&key).await {
            return Ok(Some(profile));
        }

        debug!(tenant_id, employee_code, "Employee code cache miss");
        let found = self.directory.find_by_code(tenant_id, employee_code).await?;
        if let Some(profile) = &found {
            self.remember(tenant_id, profile).await;
        }
        Ok(found)
    }

    pub async fn resolve_id(
        &self,
        tenant_id: &str,
        employee_id: u64,
    ) -> AttendanceResult<Option<EmployeeProfile>> {
        let key = (tenant_id.to_string(), employee_id);
        if let Some(profile) = self.by_id.get(&key).await {
            return Ok(Some(profile));
        }

        let found = self.directory.find_by_id(tenant_id, employee_id).await?;
        if let Some(profile) = &found {
            self.remember(tenant_id, profile).await;
        }
        Ok(found)
    }

    /// Drop cached entries, e.g. after a shift or code change
    pub fn invalidate_all(&self) {
        self.by_code.invalidate_all();
        self.by_id.invalidate_all();
    }
}
