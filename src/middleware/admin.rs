//! Admin session extractor.

use super::csrf::{validate_csrf_token, CSRF_HEADER};
use crate::admin;
use crate::audit::AuditActor;
use crate::error::BoardError;
use crate::identity::Identity;
use crate::state::AppState;
use actix_session::{Session, SessionExt};
use actix_web::dev::Payload;
use actix_web::http::Method;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ready, Ready};

pub const ADMIN_SESSION_KEY: &str = "admin";

/// Logged-in admin for the current request.
///
/// Extraction fails with 404 when the admin surface is disabled, 401 without
/// an admin session, and 403 when a state-changing request lacks a matching
/// `X-CSRF-Token` header.
#[derive(Clone, Debug)]
pub struct AdminCtx {
    pub actor: AuditActor,
    pub identity: Identity,
}

/// Username stored in the session, if an admin is logged in.
pub fn session_admin(session: &Session) -> Option<String> {
    session.get::<String>(ADMIN_SESSION_KEY).ok().flatten()
}

impl AdminCtx {
    fn from_request_parts(req: &HttpRequest) -> Result<Self, BoardError> {
        let state = req
            .app_data::<Data<AppState>>()
            .ok_or_else(|| BoardError::Internal("application state is not registered".into()))?;

        if !state.admin.is_enabled() {
            return Err(BoardError::AdminDisabled);
        }

        let session = req.get_session();
        match session_admin(&session) {
            Some(username) if username == state.admin.username => {}
            _ => return Err(BoardError::Unauthorized("Admin login required".into())),
        }

        if req.method() != Method::GET && req.method() != Method::HEAD {
            let provided = req
                .headers()
                .get(CSRF_HEADER)
                .and_then(|v| v.to_str().ok());
            validate_csrf_token(&session, provided)?;
        }

        let identity = Identity::from_request_parts(req)?;
        let actor = admin::actor(state, &identity.client_ip, &identity.session_id);

        Ok(Self { actor, identity })
    }
}

impl FromRequest for AdminCtx {
    type Error = BoardError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_request_parts(req))
    }
}
