pub mod attendance_service;
pub mod device_registry;
pub mod ingestion;

pub use attendance_service::{AttendanceService, PunchInput};
pub use device_registry::DeviceRegistry;
pub use ingestion::{DeviceSyncReport, ImportRow, IngestionPipeline, IngestionResult};
