//! Public announcement listing

use crate::announcements;
use crate::error::BoardError;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_announcements);
}

#[get("/announcements")]
async fn view_announcements(state: web::Data<AppState>) -> Result<HttpResponse, BoardError> {
    let items = announcements::list(&state.db).await?;
    Ok(HttpResponse::Ok().json(items))
}
