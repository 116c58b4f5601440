//! Notification inbox for the caller's fingerprint

use crate::error::BoardError;
use crate::identity::Identity;
use crate::notifications::{self, MarkRead};
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::Serialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_notifications).service(mark_notifications_read);
}

#[get("/notifications")]
async fn view_notifications(
    identity: Identity,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BoardError> {
    let fingerprint = identity.require_fingerprint()?;
    let inbox = notifications::inbox(&state.db, fingerprint).await?;
    Ok(HttpResponse::Ok().json(inbox))
}

#[derive(Serialize)]
struct MarkReadResponse {
    updated: u64,
}

/// Body `{ids?}`; without ids every notification is marked read.
#[post("/notifications/read")]
async fn mark_notifications_read(
    identity: Identity,
    state: web::Data<AppState>,
    body: Option<web::Json<MarkRead>>,
) -> Result<HttpResponse, BoardError> {
    let fingerprint = identity.require_fingerprint()?;
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let updated = notifications::mark_read(&state.db, fingerprint, request.ids.as_deref()).await?;
    Ok(HttpResponse::Ok().json(MarkReadResponse { updated }))
}
