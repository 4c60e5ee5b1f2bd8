use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::{Value, json};
use tracing::debug;

fn reject(req: ServiceRequest, body: Value) -> ServiceResponse<BoxBody> {
    let resp = HttpResponse::Unauthorized().json(body);
    req.into_response(resp.map_into_boxed_body())
}

/// Resolve the bearer token of the request into the caller's claims
fn caller_claims(req: &ServiceRequest, secret: &str) -> Result<Claims, Value> {
    let header_value = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| json!({"error": "Missing Authorization header"}))?
        .to_str()
        .map_err(|_| json!({"error": "Invalid Authorization header encoding"}))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| json!({"error": "Authorization header must start with Bearer"}))?;

    let claims = verify_token(token, secret)
        .map_err(|e| json!({"error": "Invalid or expired token", "details": e}))?;
    if claims.token_type != TokenType::Access {
        return Err(json!({"error": "Refresh tokens cannot call the API"}));
    }
    Ok(claims)
}

/// Puts an `AuthUser` carrying the caller's tenant into the request
/// extensions. A token without a tenant still passes; the attendance
/// services refuse to act without one.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let claims = match caller_claims(&req, &config.jwt_secret) {
        Ok(claims) => claims,
        Err(body) => return Ok(reject(req, body)),
    };

    let Some(role) = Role::from_id(claims.role) else {
        return Ok(reject(req, json!({"error": "Invalid role"})));
    };

    let auth_user = AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        tenant_id: claims.tenant_id.filter(|t| !t.trim().is_empty()),
        employee_id: claims.employee_id,
    };
    debug!(user_id = auth_user.user_id, tenant = ?auth_user.tenant_id, "Authenticated caller");

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
