//! HTTP server setup

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};

use crate::api;
use crate::service::LockHandler;

/// Creates and binds the lock API server.
pub fn lock_server(
    handler: LockHandler,
    address: String,
    port: u16,
    shutdown_timeout_secs: u64,
) -> Result<Server, std::io::Error> {
    let handler = web::Data::new(handler);
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(handler.clone())
            .configure(api::routes)
    })
    .shutdown_timeout(shutdown_timeout_secs)
    .disable_signals()
    .bind((address, port))?
    .run())
}
