//! Per-request anonymous identity.
//!
//! Three independent signals are derived for every request: the server
//! assigned session id, the client IP and a salted hash of the client supplied
//! device fingerprint. They feed bans and rate limits only. None of them is an
//! authentication credential.

use crate::error::BoardError;
use crate::state::AppState;
use actix_session::SessionExt;
use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{web::Data, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;

type HmacSha256 = Hmac<Sha256>;

/// Session key holding the anonymous session id.
pub const SESSION_ID_KEY: &str = "sid";

/// Header carrying the raw client fingerprint.
pub const FINGERPRINT_HEADER: &str = "x-fingerprint";

/// Headers consulted for the client IP, most trusted first. The socket peer
/// address is the last resort.
const IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "true-client-ip", "x-forwarded-for"];

const DEV_SALT: &str = "rumormill-development-salt";

/// Resolve the client IP from proxy headers and the peer address.
///
/// The first IPv4 candidate wins, IPv4-mapped IPv6 included. If no candidate
/// is IPv4 the first valid address of any family is used.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let mut candidates: Vec<IpAddr> = Vec::new();

    for name in IP_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            candidates.extend(
                value
                    .split(',')
                    .filter_map(|part| part.trim().parse::<IpAddr>().ok()),
            );
        }
    }
    candidates.extend(peer);

    let ipv4 = candidates.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    });

    match (ipv4, candidates.first()) {
        (Some(v4), _) => v4.to_string(),
        (None, Some(first)) => first.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Keyed hash over raw fingerprints. The raw value is never stored.
#[derive(Clone)]
pub struct FingerprintHasher {
    salt: String,
}

impl FingerprintHasher {
    pub fn new(salt: &str) -> Self {
        let salt = if salt.is_empty() {
            DEV_SALT.to_string()
        } else {
            salt.to_string()
        };
        Self { salt }
    }

    /// Hex encoded HMAC-SHA256, or None for a blank fingerprint.
    pub fn hash(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let mut mac = HmacSha256::new_from_slice(self.salt.as_bytes()).ok()?;
        mac.update(raw.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

/// The identity triple for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub session_id: String,
    pub client_ip: String,
    pub fingerprint: Option<String>,
}

impl Identity {
    /// Fingerprint hash, required for identity-gated writes.
    pub fn require_fingerprint(&self) -> Result<&str, BoardError> {
        self.fingerprint
            .as_deref()
            .ok_or(BoardError::MissingFingerprint)
    }

    pub(crate) fn from_request_parts(req: &HttpRequest) -> Result<Self, BoardError> {
        let state = req
            .app_data::<Data<AppState>>()
            .ok_or_else(|| BoardError::Internal("application state is not registered".into()))?;

        let session = req.get_session();
        let session_id = match session.get::<String>(SESSION_ID_KEY) {
            Ok(Some(sid)) => sid,
            _ => {
                let sid = uuid::Uuid::new_v4().to_string();
                if let Err(err) = session.insert(SESSION_ID_KEY, sid.clone()) {
                    log::warn!("Failed to store session id: {}", err);
                }
                sid
            }
        };

        let client_ip = resolve_client_ip(req.headers(), req.peer_addr().map(|addr| addr.ip()));

        let fingerprint = req
            .headers()
            .get(FINGERPRINT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| state.hasher.hash(raw));

        Ok(Self {
            session_id,
            client_ip,
            fingerprint,
        })
    }
}

impl FromRequest for Identity {
    type Error = BoardError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_request_parts(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let map = headers(&[
            ("cf-connecting-ip", "203.0.113.7"),
            ("x-forwarded-for", "198.51.100.1"),
        ]);
        assert_eq!(
            resolve_client_ip(&map, Some("10.0.0.1".parse().unwrap())),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_ipv4_preferred_over_earlier_ipv6() {
        let map = headers(&[
            ("cf-connecting-ip", "2001:db8::1"),
            ("x-forwarded-for", "198.51.100.1, 10.0.0.2"),
        ]);
        assert_eq!(resolve_client_ip(&map, None), "198.51.100.1");
    }

    #[test]
    fn test_ipv6_used_when_nothing_else() {
        let map = headers(&[("true-client-ip", "2001:db8::1")]);
        assert_eq!(resolve_client_ip(&map, None), "2001:db8::1");
    }

    #[test]
    fn test_mapped_ipv6_is_unwrapped() {
        let map = HeaderMap::new();
        let peer: IpAddr = "::ffff:192.0.2.9".parse().unwrap();
        assert_eq!(resolve_client_ip(&map, Some(peer)), "192.0.2.9");
    }

    #[test]
    fn test_garbage_headers_fall_back_to_peer() {
        let map = headers(&[("x-forwarded-for", "not-an-ip, also bad")]);
        assert_eq!(
            resolve_client_ip(&map, Some("192.0.2.1".parse().unwrap())),
            "192.0.2.1"
        );
        assert_eq!(resolve_client_ip(&map, None), "unknown");
    }

    #[test]
    fn test_fingerprint_hash_is_stable_and_salted() {
        let a = FingerprintHasher::new("salt-a");
        let b = FingerprintHasher::new("salt-b");

        let first = a.hash("device-123").unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(a.hash("device-123").unwrap(), first);
        assert_ne!(b.hash("device-123").unwrap(), first);
        assert_ne!(first, "device-123");
    }

    #[test]
    fn test_blank_fingerprint_is_absent() {
        let hasher = FingerprintHasher::new("");
        assert!(hasher.hash("   ").is_none());
        assert!(hasher.hash("x").is_some());
    }

    #[test]
    fn test_require_fingerprint() {
        let identity = Identity {
            session_id: "s".into(),
            client_ip: "127.0.0.1".into(),
            fingerprint: None,
        };
        assert!(matches!(
            identity.require_fingerprint(),
            Err(BoardError::MissingFingerprint)
        ));
    }
}
