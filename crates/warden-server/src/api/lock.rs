//! Lock API HTTP handlers

use std::time::Duration;

use actix_web::{HttpResponse, Responder, web};
use warden_common::LockResult;

use crate::model::lock::{
    AcquireRequest, FetchQuery, LockRecordView, ReleaseRequest, WatchQuery, WatchView,
    validate_body,
};
use crate::model::response::{ErrorResult, Result};
use crate::service::LockHandler;

fn respond<T, V>(result: LockResult<T>, view: impl FnOnce(T) -> V) -> HttpResponse
where
    V: serde::Serialize,
{
    match result {
        Ok(value) => Result::<V>::http_success(view(value)),
        Err(err) => ErrorResult::http_response(&err),
    }
}

/// POST /v1/locks/acquire
pub async fn acquire(
    handler: web::Data<LockHandler>,
    body: web::Json<AcquireRequest>,
) -> impl Responder {
    let request = body.into_inner();
    let parsed = validate_body(&request)
        .and_then(|_| Ok((request.to_resource()?, request.ttl()?)));
    let result = match parsed {
        Ok((resource, ttl)) => handler.acquire(resource, ttl).await,
        Err(err) => Err(err),
    };
    respond(result, LockRecordView::from)
}

/// POST /v1/locks/renew
pub async fn renew(
    handler: web::Data<LockHandler>,
    body: web::Json<AcquireRequest>,
) -> impl Responder {
    let request = body.into_inner();
    let parsed = validate_body(&request)
        .and_then(|_| Ok((request.to_resource()?, request.ttl()?)));
    let result = match parsed {
        Ok((resource, ttl)) => handler.renew(resource, ttl).await,
        Err(err) => Err(err),
    };
    respond(result, LockRecordView::from)
}

/// POST /v1/locks/release
pub async fn release(
    handler: web::Data<LockHandler>,
    body: web::Json<ReleaseRequest>,
) -> impl Responder {
    let result = match validate_body(&body.0) {
        Ok(()) => handler.release(&body.key, &body.owner).await,
        Err(err) => Err(err),
    };
    respond(result, |_| true)
}

/// GET /v1/locks/{key}
pub async fn fetch(
    handler: web::Data<LockHandler>,
    path: web::Path<String>,
    query: web::Query<FetchQuery>,
) -> impl Responder {
    let result = handler.fetch(&path, query.kind).await;
    respond(result, LockRecordView::from)
}

/// GET /v1/locks
pub async fn fetch_all(
    handler: web::Data<LockHandler>,
    query: web::Query<FetchQuery>,
) -> impl Responder {
    let result = handler.fetch_all(query.kind).await;
    respond(result, |records| {
        records
            .into_iter()
            .map(LockRecordView::from)
            .collect::<Vec<_>>()
    })
}

/// GET /v1/locks/{key}/watch
///
/// Long poll. Without `wait_ms` the configured maximum wait applies.
pub async fn watch(
    handler: web::Data<LockHandler>,
    path: web::Path<String>,
    query: web::Query<WatchQuery>,
) -> impl Responder {
    let timeout = query
        .wait_ms
        .map(Duration::from_millis)
        .unwrap_or(handler.pick().config().watch_max_wait);
    let result = handler.watch(&path, query.kind, query.index, timeout).await;
    respond(result, |record| WatchView {
        record: record.map(LockRecordView::from),
    })
}

/// GET /health
pub async fn health(handler: web::Data<LockHandler>) -> impl Responder {
    match handler.health_check().await {
        Ok(()) => Result::<&str>::http_success("UP"),
        Err(err) => ErrorResult::http_response(&err),
    }
}
