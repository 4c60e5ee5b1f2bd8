use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Casual,
    Sick,
    Mission,
    Unpaid,
    Maternity,
    Other,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

/// Leave owned by the leave subsystem; attendance only reads it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "employee_id": 1000,
    "department_id": 10,
    "position_id": 3,
    "leave_type": "mission",
    "start_date": "2026-01-04",
    "end_date": "2026-01-06",
    "status": "approved"
}))]
pub struct Leave {
    pub id: u64,
    pub employee_id: u64,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub leave_type: LeaveType,
    #[schema(example = "2026-01-04", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-06", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub status: LeaveStatus,
}

impl Leave {
    pub fn is_approved(&self) -> bool {
        self.status == LeaveStatus::Approved
    }

    /// Every calendar day of the leave, both ends inclusive
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |day| *day <= self.end_date)
    }
}
