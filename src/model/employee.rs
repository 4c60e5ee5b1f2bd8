use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::model::attendance::WorkSchedule;

/// The slice of employee master data attendance needs.
/// Department and position are opaque ids copied onto records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeProfile {
    pub employee_id: u64,
    /// Code the biometric devices know the employee by
    pub employee_code: String,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub shift_start: Option<NaiveTime>,
    pub shift_end: Option<NaiveTime>,
}

impl EmployeeProfile {
    /// Own shift when both ends are set, otherwise the given fallback
    pub fn schedule_or(&self, fallback: WorkSchedule) -> WorkSchedule {
        match (self.shift_start, self.shift_end) {
            (Some(start), Some(end)) => WorkSchedule::new(start, end),
            _ => fallback,
        }
    }
}
