//! Ban status and presence for the current visitor

use crate::ban;
use crate::error::BoardError;
use crate::identity::Identity;
use crate::state::AppState;
use crate::stats;
use actix_web::{get, post, web, HttpResponse};
use serde::Serialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_access).service(heartbeat);
}

/// `{banned, blocked, viewBlocked, permissions, expiresAt}` for gating the UI.
#[get("/access")]
async fn view_access(
    identity: Identity,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BoardError> {
    let summary = ban::access_summary(&state.db, &identity).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[derive(Serialize)]
struct HeartbeatResponse {
    online: usize,
}

#[post("/heartbeat")]
async fn heartbeat(
    identity: Identity,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BoardError> {
    let online = state.presence.touch(&identity.session_id);
    stats::record_visit(&state.db, &identity.session_id).await?;
    Ok(HttpResponse::Ok().json(HeartbeatResponse { online }))
}
