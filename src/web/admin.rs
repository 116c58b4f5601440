//! Admin endpoints
//!
//! Everything here sits behind [`AdminCtx`] except login and the session
//! probe. When the admin surface is not configured every route answers 404.

use crate::admin::{self, LoginForm, VocabularyForm};
use crate::announcements::{self, NewAnnouncement};
use crate::audit::{self, AuditQuery};
use crate::ban::{self, BanKind};
use crate::error::BoardError;
use crate::identity::Identity;
use crate::middleware::admin::{session_admin, ADMIN_SESSION_KEY};
use crate::middleware::csrf::{clear_csrf_token, current_csrf_token, rotate_csrf_token};
use crate::middleware::AdminCtx;
use crate::moderation::{
    self, BanAction, BanRequest, BatchPostRequest, BatchReportRequest, ContentActionRequest,
};
use crate::posts::{self, AdminNewPost, AdminPostQuery, PostEdit};
use crate::reports::{self, ReportQuery};
use crate::state::AppState;
use crate::stats;
use actix_session::Session;
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(login)
        .service(logout)
        .service(view_session)
        .service(view_posts)
        .service(create_post)
        .service(batch_posts)
        .service(act_on_post)
        .service(edit_post)
        .service(act_on_comment)
        .service(view_bans)
        .service(create_ban)
        .service(ban_action)
        .service(view_audit_logs)
        .service(view_settings)
        .service(update_settings)
        .service(view_reports)
        .service(batch_reports)
        .service(view_vocabulary)
        .service(add_word)
        .service(remove_word)
        .service(create_announcement)
        .service(delete_announcement)
        .service(view_stats);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    logged_in: bool,
    username: Option<String>,
    csrf_token: Option<String>,
}

#[post("/admin/login")]
async fn login(
    identity: Identity,
    state: web::Data<AppState>,
    session: Session,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, BoardError> {
    admin::login(&state, &identity.client_ip, &form)?;

    session.renew();
    session
        .insert(ADMIN_SESSION_KEY, form.username.clone())
        .map_err(|_| BoardError::Internal("Failed to store admin session".into()))?;
    let csrf_token = rotate_csrf_token(&session)?;

    Ok(HttpResponse::Ok().json(SessionResponse {
        logged_in: true,
        username: Some(form.username.clone()),
        csrf_token: Some(csrf_token),
    }))
}

#[post("/admin/logout")]
async fn logout(admin: AdminCtx, session: Session) -> Result<HttpResponse, BoardError> {
    session.remove(ADMIN_SESSION_KEY);
    clear_csrf_token(&session);
    log::info!("Admin {} logged out", admin.actor.admin_username);

    Ok(HttpResponse::Ok().json(SessionResponse {
        logged_in: false,
        username: None,
        csrf_token: None,
    }))
}

#[get("/admin/session")]
async fn view_session(
    state: web::Data<AppState>,
    session: Session,
) -> Result<HttpResponse, BoardError> {
    if !state.admin.is_enabled() {
        return Err(BoardError::AdminDisabled);
    }

    let username = session_admin(&session).filter(|name| *name == state.admin.username);
    let csrf_token = username.as_ref().and_then(|_| current_csrf_token(&session));

    Ok(HttpResponse::Ok().json(SessionResponse {
        logged_in: username.is_some(),
        username,
        csrf_token,
    }))
}

#[get("/admin/posts")]
async fn view_posts(
    _admin: AdminCtx,
    state: web::Data<AppState>,
    query: web::Query<AdminPostQuery>,
) -> Result<HttpResponse, BoardError> {
    let page = posts::admin_list(&state.db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/admin/posts")]
async fn create_post(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<AdminNewPost>,
) -> Result<HttpResponse, BoardError> {
    let post = posts::admin_create(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[post("/admin/posts/batch")]
async fn batch_posts(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<BatchPostRequest>,
) -> Result<HttpResponse, BoardError> {
    let outcome = moderation::act_on_posts(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/admin/posts/{id}/action")]
async fn act_on_post(
    admin: AdminCtx,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ContentActionRequest>,
) -> Result<HttpResponse, BoardError> {
    let outcome =
        moderation::act_on_post(&state, &admin.actor, &path.into_inner(), body.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/admin/posts/{id}/edit")]
async fn edit_post(
    admin: AdminCtx,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PostEdit>,
) -> Result<HttpResponse, BoardError> {
    let post =
        posts::admin_edit(&state, &admin.actor, &path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[post("/admin/comments/{id}/action")]
async fn act_on_comment(
    admin: AdminCtx,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ContentActionRequest>,
) -> Result<HttpResponse, BoardError> {
    let outcome =
        moderation::act_on_comment(&state, &admin.actor, &path.into_inner(), body.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[derive(Deserialize)]
struct BanListQuery {
    kind: Option<BanKind>,
}

/// Active bans, expired rows pruned. Both kinds when `kind` is absent.
#[get("/admin/bans")]
async fn view_bans(
    _admin: AdminCtx,
    state: web::Data<AppState>,
    query: web::Query<BanListQuery>,
) -> Result<HttpResponse, BoardError> {
    let kinds = match query.kind {
        Some(kind) => vec![kind],
        None => vec![BanKind::Ip, BanKind::Fingerprint],
    };

    let mut items = Vec::new();
    for kind in kinds {
        items.extend(ban::list_bans(&state.db, kind).await?);
    }
    Ok(HttpResponse::Ok().json(items))
}

#[post("/admin/bans")]
async fn create_ban(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<BanRequest>,
) -> Result<HttpResponse, BoardError> {
    let entry = moderation::create_ban(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(entry))
}

#[post("/admin/bans/action")]
async fn ban_action(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<BanAction>,
) -> Result<HttpResponse, BoardError> {
    let outcome = moderation::apply_ban_action(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/admin/audit-logs")]
async fn view_audit_logs(
    _admin: AdminCtx,
    state: web::Data<AppState>,
    query: web::Query<AuditQuery>,
) -> Result<HttpResponse, BoardError> {
    let page = audit::list(&state.db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/admin/settings")]
async fn view_settings(
    _admin: AdminCtx,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BoardError> {
    Ok(HttpResponse::Ok().json(state.settings.all()))
}

/// Body is an object of `key: value` pairs.
#[post("/admin/settings")]
async fn update_settings(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<BTreeMap<String, serde_json::Value>>,
) -> Result<HttpResponse, BoardError> {
    let settings = admin::update_settings(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settings))
}

#[get("/admin/reports")]
async fn view_reports(
    _admin: AdminCtx,
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, BoardError> {
    let page = reports::list_reports(&state.db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/admin/reports/batch")]
async fn batch_reports(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<BatchReportRequest>,
) -> Result<HttpResponse, BoardError> {
    let outcome = moderation::act_on_reports(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[derive(Serialize)]
struct VocabularyResponse {
    words: Vec<String>,
}

#[derive(Serialize)]
struct ChangedResponse {
    changed: bool,
}

#[get("/admin/vocabulary")]
async fn view_vocabulary(
    _admin: AdminCtx,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BoardError> {
    Ok(HttpResponse::Ok().json(VocabularyResponse {
        words: state.word_filter.list(),
    }))
}

#[post("/admin/vocabulary")]
async fn add_word(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<VocabularyForm>,
) -> Result<HttpResponse, BoardError> {
    let changed = admin::add_word(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ChangedResponse { changed }))
}

#[post("/admin/vocabulary/delete")]
async fn remove_word(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<VocabularyForm>,
) -> Result<HttpResponse, BoardError> {
    let changed = admin::remove_word(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ChangedResponse { changed }))
}

#[post("/admin/announcements")]
async fn create_announcement(
    admin: AdminCtx,
    state: web::Data<AppState>,
    body: web::Json<NewAnnouncement>,
) -> Result<HttpResponse, BoardError> {
    let announcement = announcements::create(&state, &admin.actor, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(announcement))
}

#[post("/admin/announcements/{id}/delete")]
async fn delete_announcement(
    admin: AdminCtx,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, BoardError> {
    announcements::delete(&state, &admin.actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ChangedResponse { changed: true }))
}

#[get("/admin/stats")]
async fn view_stats(
    _admin: AdminCtx,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BoardError> {
    let dashboard = stats::dashboard(&state.db, state.presence.as_ref()).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}
