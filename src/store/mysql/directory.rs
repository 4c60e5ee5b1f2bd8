use anyhow::Context;
use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::error::AttendanceResult;
use crate::model::employee::EmployeeProfile;
use crate::store::EmployeeDirectory;

/// Reads the employees table owned by the HR master-data side.
/// Only active employees resolve.
pub struct MySqlEmployeeDirectory {
    pool: MySqlPool,
}

impl MySqlEmployeeDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlEmployeeDirectory {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        employee_id: u64,
    ) -> AttendanceResult<Option<EmployeeProfile>> {
        let profile = sqlx::query_as::<_, EmployeeProfile>(
            r#"
            SELECT id AS employee_id, employee_code, department_id,
                   job_title_id AS position_id, shift_start, shift_end
            FROM employees
            WHERE tenant_id = ? AND id = ? AND status = 'active'
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch employee")?;

        Ok(profile)
    }

    async fn find_by_code(
        &self,
        tenant_id: &str,
        employee_code: &str,
    ) -> AttendanceResult<Option<EmployeeProfile>> {
        let profile = sqlx::query_as::<_, EmployeeProfile>(
            r#"
            SELECT id AS employee_id, employee_code, department_id,
                   job_title_id AS position_id, shift_start, shift_end
            FROM employees
            WHERE tenant_id = ? AND employee_code = ? AND status = 'active'
            "#,
        )
        .bind(tenant_id)
        .bind(employee_code)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch employee by code")?;

        Ok(profile)
    }
}
