//! Attendance subsystem of the HRM platform: per-day attendance records,
//! the rules deriving their status, biometric device management and log
//! ingestion. The HTTP layer in `api` is a thin shell over `service`.

pub mod adapter;
pub mod api;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod model;
pub mod models;
pub mod policy;
pub mod routes;
pub mod service;
pub mod status_engine;
pub mod store;
pub mod utils;
