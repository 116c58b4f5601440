//! Public post endpoints

use crate::ban::{self, Capability};
use crate::error::BoardError;
use crate::identity::Identity;
use crate::orm::post_reactions::ReactionKind;
use crate::posts::{self, FeedQuery, NewPost};
use crate::reactions;
use crate::state::AppState;
use crate::stats;
use actix_web::{get, post, web, HttpResponse};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_feed)
        .service(create_post)
        .service(view_post)
        .service(like_post)
        .service(dislike_post);
}

/// Ranked feed. Also counts the caller as online and as today's visitor.
#[get("/posts/feed")]
async fn view_feed(
    identity: Identity,
    state: web::Data<AppState>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, BoardError> {
    ban::ensure_allowed(&state.db, &identity, Capability::View).await?;

    state.presence.touch(&identity.session_id);
    stats::record_visit(&state.db, &identity.session_id).await?;

    let page = posts::feed(&state.db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/posts")]
async fn create_post(
    identity: Identity,
    state: web::Data<AppState>,
    body: web::Json<NewPost>,
) -> Result<HttpResponse, BoardError> {
    let post = posts::submit_post(&state, &identity, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[get("/posts/{id}")]
async fn view_post(
    identity: Identity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BoardError> {
    ban::ensure_allowed(&state.db, &identity, Capability::View).await?;

    let post = posts::post_detail(&state.db, &identity, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[post("/posts/{id}/like")]
async fn like_post(
    identity: Identity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BoardError> {
    let outcome =
        reactions::toggle(&state, &identity, &path.into_inner(), ReactionKind::Like).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/posts/{id}/dislike")]
async fn dislike_post(
    identity: Identity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BoardError> {
    let outcome =
        reactions::toggle(&state, &identity, &path.into_inner(), ReactionKind::Dislike).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
