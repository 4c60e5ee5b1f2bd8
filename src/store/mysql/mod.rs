mod attendance;
mod device;
mod directory;
mod settings;

pub use attendance::MySqlAttendanceStore;
pub use device::MySqlDeviceStore;
pub use directory::MySqlEmployeeDirectory;
pub use settings::{load_policy_overrides, warmup_holiday_calendar};
