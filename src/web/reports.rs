//! Report submission and the single-report admin action

use crate::error::BoardError;
use crate::identity::Identity;
use crate::middleware::AdminCtx;
use crate::moderation::{self, ReportActionRequest};
use crate::reports::{self, NewReport};
use crate::state::AppState;
use actix_web::{post, web, HttpResponse};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(submit_report).service(act_on_report);
}

#[post("/reports")]
async fn submit_report(
    identity: Identity,
    state: web::Data<AppState>,
    body: web::Json<NewReport>,
) -> Result<HttpResponse, BoardError> {
    let receipt = reports::submit_report(&state, &identity, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(receipt))
}

#[post("/reports/{id}/action")]
async fn act_on_report(
    admin: AdminCtx,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ReportActionRequest>,
) -> Result<HttpResponse, BoardError> {
    let outcome =
        moderation::act_on_report(&state, &admin.actor, &path.into_inner(), body.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(outcome))
}
