use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use hrm_attendance::adapter::BioTimeLogSource;
use hrm_attendance::calendar::HolidayCalendar;
use hrm_attendance::config::Config;
use hrm_attendance::db::init_db;
use hrm_attendance::docs::ApiDoc;
use hrm_attendance::policy::AttendancePolicyBook;
use hrm_attendance::routes;
use hrm_attendance::service::{AttendanceService, DeviceRegistry, IngestionPipeline};
use hrm_attendance::store::mysql::{
    MySqlAttendanceStore, MySqlDeviceStore, MySqlEmployeeDirectory, load_policy_overrides,
    warmup_holiday_calendar,
};
use hrm_attendance::utils::employee_cache::EmployeeResolver;

#[get("/")]
async fn index() -> impl Responder {
    "HRM attendance service"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await;

    let calendar = Arc::new(HolidayCalendar::new(config.weekend_days.clone()));
    if let Err(e) = warmup_holiday_calendar(&pool, &calendar).await {
        error!(error = ?e, "Failed to warm up holiday calendar");
    }

    let default_policy = config.default_policy();
    let overrides = load_policy_overrides(&pool, &default_policy)
        .await
        .map_err(|e| std::io::Error::other(format!("{:#}", e)))?;
    let policies = Arc::new(AttendancePolicyBook::new(default_policy).with_overrides(overrides));

    let employees = Arc::new(EmployeeResolver::new(
        Arc::new(MySqlEmployeeDirectory::new(pool.clone())),
        Duration::from_secs(config.employee_cache_ttl_secs),
    ));
    let attendance = Arc::new(AttendanceService::new(
        Arc::new(MySqlAttendanceStore::new(pool.clone())),
        employees.clone(),
        calendar,
        policies,
    ));
    let registry = Arc::new(DeviceRegistry::new(
        Arc::new(MySqlDeviceStore::new(pool.clone())),
        chrono::Duration::minutes(config.sync_lease_minutes),
    ));
    let source = BioTimeLogSource::new(Duration::from_secs(config.device_http_timeout_secs))
        .map_err(|e| std::io::Error::other(format!("{:#}", e)))?;
    let pipeline = Arc::new(IngestionPipeline::new(
        attendance.clone(),
        registry.clone(),
        employees,
        Arc::new(source),
    ));

    // Clone values for the closure (avoid move issues)
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(config.clone()))
            .app_data(Data::from(attendance.clone()))
            .app_data(Data::from(registry.clone()))
            .app_data(Data::from(pipeline.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
