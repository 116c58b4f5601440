//! Comment endpoints, nested under their post

use crate::ban::{self, Capability};
use crate::comments::{self, NewComment};
use crate::error::BoardError;
use crate::identity::Identity;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_comments).service(create_comment);
}

/// Threads as `[{root, replies}]`, oldest first.
#[get("/posts/{id}/comments")]
async fn view_comments(
    identity: Identity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BoardError> {
    ban::ensure_allowed(&state.db, &identity, Capability::View).await?;

    let threads = comments::list_threads(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[post("/posts/{id}/comments")]
async fn create_comment(
    identity: Identity,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NewComment>,
) -> Result<HttpResponse, BoardError> {
    let comment =
        comments::submit_comment(&state, &identity, &path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(comment))
}
