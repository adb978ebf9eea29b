//! Route configuration for the lock API

use actix_web::web;

use super::lock;

/// Lock routes under `/v1/locks`.
///
/// Keys may contain `/`, so the watch route is registered before the fetch
/// route that would otherwise swallow its suffix.
pub fn lock_routes() -> actix_web::Scope {
    web::scope("/v1/locks")
        .route("", web::get().to(lock::fetch_all))
        .route("/acquire", web::post().to(lock::acquire))
        .route("/renew", web::post().to(lock::renew))
        .route("/release", web::post().to(lock::release))
        .route("/{key:.+}/watch", web::get().to(lock::watch))
        .route("/{key:.+}", web::get().to(lock::fetch))
}

/// All routes of the lock server.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(lock_routes())
        .route("/health", web::get().to(lock::health));
}
