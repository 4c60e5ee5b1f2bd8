use crate::{
    api::{attendance, device},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("invalid rate limiter configuration");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let push_limiter = Arc::new(build_limiter(config.rate_push_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public: devices authenticate with their own secret
    cfg.service(
        web::resource("/device-push/{id}")
            .wrap(push_limiter)
            .route(web::post().to(device::push_logs)),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(
                        web::resource("")
                            .route(web::post().to(attendance::check_in))
                            .route(web::put().to(attendance::check_out))
                            .route(web::get().to(attendance::list_records)),
                    )
                    .service(web::resource("/metrics").route(web::get().to(attendance::metrics)))
                    .service(
                        web::resource("/manual").route(web::post().to(attendance::manual_entry)),
                    )
                    .service(web::resource("/leave").route(web::post().to(attendance::from_leave)))
                    .service(
                        web::resource("/recompute").route(web::post().to(attendance::recompute)),
                    )
                    .service(web::resource("/approve").route(web::post().to(attendance::approve)))
                    .service(
                        web::resource("/wfh").route(web::post().to(attendance::work_from_home)),
                    )
                    .service(web::resource("/day-off").route(web::post().to(attendance::day_off)))
                    .service(web::resource("/import").route(web::post().to(attendance::import))),
            )
            .service(
                web::scope("/devices")
                    // /devices
                    .service(
                        web::resource("")
                            .route(web::post().to(device::register_device))
                            .route(web::get().to(device::list_devices)),
                    )
                    // /devices/sync, registered before /{id}
                    .service(
                        web::resource("/sync").route(web::post().to(device::sync_due_devices)),
                    )
                    // /devices/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(device::get_device))
                            .route(web::put().to(device::update_device))
                            .route(web::delete().to(device::delete_device)),
                    )
                    .service(
                        web::resource("/{id}/sync").route(web::post().to(device::sync_device)),
                    ),
            ),
    );
}
