mod common;

use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{App, test};
use chrono::{NaiveTime, Weekday};
use serde_json::{Value, json};

use common::*;
use hrm_attendance::auth::jwt::generate_access_token;
use hrm_attendance::config::Config;
use hrm_attendance::routes;

const SECRET: &str = "test-secret";

fn config() -> Config {
    Config {
        database_url: "mysql://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        api_prefix: "/api".to_string(),
        rate_protected_per_min: 1000,
        rate_push_per_min: 1000,
        late_tolerance_minutes: 0,
        default_timezone: chrono_tz::UTC,
        default_shift_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        default_shift_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        weekend_days: vec![Weekday::Fri, Weekday::Sat],
        sync_lease_minutes: 30,
        employee_cache_ttl_secs: 60,
        device_http_timeout_secs: 5,
    }
}

fn token(role: u8, employee_id: Option<u64>) -> String {
    let jwt = generate_access_token(
        7,
        "tester".to_string(),
        role,
        Some(TENANT.to_string()),
        employee_id,
        SECRET,
        3600,
    )
    .unwrap();
    format!("Bearer {}", jwt)
}

macro_rules! app {
    ($h:expr) => {{
        let config = config();
        test::init_service(
            App::new()
                .app_data(Data::new(config.clone()))
                .app_data(Data::from($h.attendance.clone()))
                .app_data(Data::from($h.registry.clone()))
                .app_data(Data::from($h.pipeline.clone()))
                .configure(|cfg| routes::configure(cfg, config.clone())),
        )
        .await
    }};
}

fn peer() -> std::net::SocketAddr {
    "10.1.1.1:40000".parse().unwrap()
}

#[actix_web::test]
async fn test_missing_token_is_rejected() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri("/api/attendance?start=2026-01-01&end=2026-01-31")
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_employee_checks_in() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/attendance")
        .insert_header(("Authorization", token(3, Some(1000))))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["employee_id"], 1000);
    assert_eq!(h.records.len(), 1);
}

#[actix_web::test]
async fn test_employee_cannot_manage_devices() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri("/api/devices")
        .insert_header(("Authorization", token(3, Some(1000))))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_registered_device_pushes_logs() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/devices")
        .insert_header(("Authorization", token(2, None)))
        .peer_addr(peer())
        .set_json(json!({
            "name": "Main gate",
            "device_type": "push",
            "push_secret": "s3cret"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let device: Value = test::read_body_json(resp).await;
    assert!(device.get("push_secret_hash").is_none());
    let id = device["id"].as_u64().unwrap();

    let logs = json!({
        "logs": [
            {"external_employee_id": "EMP-001", "timestamp": "2026-01-04T08:55:00Z"},
            {"external_employee_id": "EMP-001", "timestamp": "2026-01-04T17:10:00Z"}
        ]
    });

    let req = test::TestRequest::post()
        .uri(&format!("/device-push/{}", id))
        .insert_header(("X-Device-Secret", "wrong"))
        .peer_addr(peer())
        .set_json(&logs)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&format!("/device-push/{}", id))
        .insert_header(("X-Device-Secret", "s3cret"))
        .peer_addr(peer())
        .set_json(&logs)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let result: Value = test::read_body_json(resp).await;
    assert_eq!(result["processed"], 2);
    assert_eq!(result["errors"], 0);
}

#[actix_web::test]
async fn test_token_without_tenant_is_forbidden() {
    let h = Harness::new();
    let app = app!(h);

    let jwt = generate_access_token(7, "tester".to_string(), 2, None, None, SECRET, 3600).unwrap();
    let req = test::TestRequest::get()
        .uri("/api/devices")
        .insert_header(("Authorization", format!("Bearer {}", jwt)))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
