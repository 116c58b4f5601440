/// CSRF (Cross-Site Request Forgery) protection for the admin surface
///
/// A token is generated when an admin logs in and stored in the session
/// cookie. The login response and `GET /admin/session` hand it to the client,
/// which must echo it in the `X-CSRF-Token` header on every state-changing
/// admin request.
///
/// Usage in handlers goes through [`super::admin::AdminCtx`], which validates
/// the header for every non-GET request before the handler runs.
use crate::error::BoardError;
use actix_session::Session;
use rand::{distributions::Alphanumeric, Rng};

pub const CSRF_TOKEN_LENGTH: usize = 32;
pub const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_SESSION_KEY: &str = "csrf_token";

/// Generate a new CSRF token
pub fn generate_csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Replace the session's token with a fresh one and return it
pub fn rotate_csrf_token(session: &Session) -> Result<String, BoardError> {
    let token = generate_csrf_token();
    session
        .insert(CSRF_SESSION_KEY, token.clone())
        .map_err(|_| BoardError::Internal("Failed to store CSRF token".into()))?;
    Ok(token)
}

/// Token currently held by the session, if any
pub fn current_csrf_token(session: &Session) -> Option<String> {
    session.get::<String>(CSRF_SESSION_KEY).ok().flatten()
}

/// Drop the token, e.g. on logout
pub fn clear_csrf_token(session: &Session) {
    session.remove(CSRF_SESSION_KEY);
}

/// Validate a token supplied by the client
pub fn validate_csrf_token(session: &Session, provided_token: Option<&str>) -> Result<(), BoardError> {
    let expected_token = current_csrf_token(session)
        .ok_or_else(|| BoardError::Forbidden("CSRF token not found in session".into()))?;

    match provided_token {
        Some(token) if tokens_match(token, &expected_token) => Ok(()),
        _ => {
            log::warn!("CSRF token validation failed");
            Err(BoardError::Forbidden("Invalid CSRF token".into()))
        }
    }
}

fn tokens_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
