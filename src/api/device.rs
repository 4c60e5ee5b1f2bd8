use crate::auth::auth::AuthUser;
use crate::model::device::{Device, DeviceConfigUpdate, NewDevice, RawLogEntry};
use crate::service::{DeviceRegistry, DeviceSyncReport, IngestionPipeline, IngestionResult};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

pub const DEVICE_SECRET_HEADER: &str = "X-Device-Secret";

/// Register a device
#[utoipa::path(
    post,
    path = "/api/devices",
    request_body = NewDevice,
    responses(
        (status = 201, description = "Device registered", body = Device),
        (status = 400, description = "Invalid device name"),
        (status = 409, description = "Name already used in this tenant"),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn register_device(
    auth: AuthUser,
    registry: web::Data<DeviceRegistry>,
    body: web::Json<NewDevice>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let device = registry.register(auth.tenant(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(device))
}

/// List the tenant's devices
#[utoipa::path(
    get,
    path = "/api/devices",
    responses(
        (status = 200, description = "Devices ordered by name", body = [Device]),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn list_devices(
    auth: AuthUser,
    registry: web::Data<DeviceRegistry>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let devices = registry.list(auth.tenant()).await?;
    Ok(HttpResponse::Ok().json(devices))
}

#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    params(
        ("id" = u64, Path, description = "Device ID")
    ),
    responses(
        (status = 200, description = "Device", body = Device),
        (status = 404, description = "Device not found"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn get_device(
    auth: AuthUser,
    registry: web::Data<DeviceRegistry>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let device = registry.get(auth.tenant(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(device))
}

#[utoipa::path(
    put,
    path = "/api/devices/{id}",
    params(
        ("id" = u64, Path, description = "Device ID")
    ),
    request_body = DeviceConfigUpdate,
    responses(
        (status = 200, description = "Updated device", body = Device),
        (status = 404, description = "Device not found"),
        (status = 409, description = "Name already used in this tenant"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn update_device(
    auth: AuthUser,
    registry: web::Data<DeviceRegistry>,
    path: web::Path<u64>,
    body: web::Json<DeviceConfigUpdate>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let device = registry
        .update_config(auth.tenant(), path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(device))
}

#[utoipa::path(
    delete,
    path = "/api/devices/{id}",
    params(
        ("id" = u64, Path, description = "Device ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Device not found"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn delete_device(
    auth: AuthUser,
    registry: web::Data<DeviceRegistry>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    registry.delete(auth.tenant(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Pull and ingest new logs from one device
#[utoipa::path(
    post,
    path = "/api/devices/{id}/sync",
    params(
        ("id" = u64, Path, description = "Device ID")
    ),
    responses(
        (status = 200, description = "Batch outcome", body = IngestionResult),
        (status = 400, description = "Device type cannot be pulled"),
        (status = 409, description = "Device is already syncing"),
        (status = 502, description = "Device could not be reached"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn sync_device(
    auth: AuthUser,
    pipeline: web::Data<IngestionPipeline>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let result = pipeline
        .sync_device(auth.tenant(), path.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Sync every device whose interval has elapsed
#[utoipa::path(
    post,
    path = "/api/devices/sync",
    responses(
        (status = 200, description = "One report per device", body = [DeviceSyncReport]),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn sync_due_devices(
    auth: AuthUser,
    pipeline: web::Data<IngestionPipeline>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let reports = pipeline.sync_all_due(auth.tenant(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(reports))
}

#[derive(Deserialize, ToSchema)]
pub struct PushLogsRequest {
    pub logs: Vec<RawLogEntry>,
}

/// Devices push their own logs here, authenticated by their secret
#[utoipa::path(
    post,
    path = "/device-push/{id}",
    params(
        ("id" = u64, Path, description = "Device ID"),
        ("X-Device-Secret" = String, Header, description = "Secret set at registration")
    ),
    request_body = PushLogsRequest,
    responses(
        (status = 200, description = "Batch outcome", body = IngestionResult),
        (status = 401, description = "Unknown device or wrong secret"),
        (status = 409, description = "Device is already syncing"),
        (status = 429, description = "Too many requests"),
    ),
    tag = "Device"
)]
pub async fn push_logs(
    req: HttpRequest,
    pipeline: web::Data<IngestionPipeline>,
    path: web::Path<u64>,
    body: web::Json<PushLogsRequest>,
) -> actix_web::Result<impl Responder> {
    let secret = req
        .headers()
        .get(DEVICE_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| actix_web::error::ErrorUnauthorized("Missing device secret"))?;

    let result = pipeline
        .push_logs(path.into_inner(), secret, body.into_inner().logs)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}
