mod common;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{test, App};
use common::{database::*, fixtures::*};
use rumormill::identity::FINGERPRINT_HEADER;
use rumormill::middleware::csrf::CSRF_HEADER;
use serde_json::{json, Value};

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(Data::new($state))
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[7u8; 64][..]))
                        .cookie_secure(false)
                        .build(),
                )
                .configure(rumormill::web::configure),
        )
        .await
    };
}

fn session_cookie<B>(resp: &ServiceResponse<B>) -> Cookie<'static> {
    resp.response()
        .cookies()
        .find(|c| c.name() == "id")
        .expect("No session cookie set")
        .into_owned()
}

const OWNER_IP: &str = "198.51.100.10";
const READER_IP: &str = "198.51.100.20";

#[actix_rt::test]
async fn test_post_react_report_moderate() {
    let db = setup_test_database().await;
    let app = test_app!(test_state(db).await);

    // Anonymous post
    let req = test::TestRequest::post()
        .uri("/posts")
        .insert_header((FINGERPRINT_HEADER, "device-owner"))
        .insert_header(("cf-connecting-ip", OWNER_IP))
        .set_json(json!({ "content": "今天食堂的饭太难吃了", "tags": ["校园"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post: Value = test::read_body_json(resp).await;
    let post_id = post["id"].as_str().unwrap().to_string();
    assert_eq!(post["tags"], json!(["校园"]));

    // Someone else reads and likes it
    let req = test::TestRequest::get()
        .uri(&format!("/posts/{}", post_id))
        .insert_header((FINGERPRINT_HEADER, "device-reader"))
        .insert_header(("cf-connecting-ip", READER_IP))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let detail: Value = test::read_body_json(resp).await;
    assert_eq!(detail["viewsCount"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/posts/{}/like", post_id))
        .insert_header((FINGERPRINT_HEADER, "device-reader"))
        .insert_header(("cf-connecting-ip", READER_IP))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let reaction: Value = test::read_body_json(resp).await;
    assert_eq!(reaction["likes"], 1);
    assert_eq!(reaction["reaction"], "like");

    // The owner hears about it
    let req = test::TestRequest::get()
        .uri("/notifications")
        .insert_header((FINGERPRINT_HEADER, "device-owner"))
        .to_request();
    let inbox: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(inbox["unread"], 1);
    assert_eq!(inbox["items"][0]["type"], "post_like");

    // The reader reports it
    let req = test::TestRequest::post()
        .uri("/reports")
        .insert_header((FINGERPRINT_HEADER, "device-reader"))
        .insert_header(("cf-connecting-ip", READER_IP))
        .set_json(json!({ "postId": post_id, "reason": "这是谣言" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let receipt: Value = test::read_body_json(resp).await;
    let report_id = receipt["id"].as_str().unwrap().to_string();

    // Admin logs in
    let req = test::TestRequest::post()
        .uri("/admin/login")
        .set_json(json!({ "username": ADMIN_USERNAME, "password": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/admin/login")
        .set_json(json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    let login: Value = test::read_body_json(resp).await;
    assert_eq!(login["loggedIn"], true);
    let csrf = login["csrfToken"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/admin/reports?status=pending")
        .cookie(cookie.clone())
        .to_request();
    let queue: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(queue["total"], 1);
    assert_eq!(queue["items"][0]["riskLevel"], "medium");

    // State-changing admin calls need the CSRF header
    let req = test::TestRequest::post()
        .uri(&format!("/reports/{}/action", report_id))
        .cookie(cookie.clone())
        .set_json(json!({ "action": "delete" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/reports/{}/action", report_id))
        .cookie(cookie.clone())
        .insert_header((CSRF_HEADER, csrf.as_str()))
        .set_json(json!({ "action": "delete" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = test::read_body_json(resp).await;
    assert_eq!(outcome["report"]["status"], "resolved");

    // Acting twice conflicts
    let req = test::TestRequest::post()
        .uri(&format!("/reports/{}/action", report_id))
        .cookie(cookie.clone())
        .insert_header((CSRF_HEADER, csrf.as_str()))
        .set_json(json!({ "action": "ignore" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // The post is gone for everyone
    let req = test::TestRequest::get()
        .uri(&format!("/posts/{}", post_id))
        .insert_header((FINGERPRINT_HEADER, "device-reader"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/admin/audit-logs")
        .cookie(cookie.clone())
        .to_request();
    let logs: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["items"][0]["action"], "report_delete");
}

#[actix_rt::test]
async fn test_admin_routes_require_login() {
    let db = setup_test_database().await;
    let app = test_app!(test_state(db).await);

    let req = test::TestRequest::get().uri("/admin/stats").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/admin/session").to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(session["loggedIn"], false);
}

#[actix_rt::test]
async fn test_admin_surface_hidden_when_unconfigured() {
    let db = setup_test_database().await;
    let mut config = test_config();
    config.admin.session_secret.clear();
    let app = test_app!(build_state(db, &config, StubVerifier::Unconfigured).await);

    for uri in ["/admin/session", "/admin/stats", "/admin/reports"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
    }

    let req = test::TestRequest::post()
        .uri("/admin/login")
        .set_json(json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_error_bodies_and_rate_limit_header() {
    let db = setup_test_database().await;
    let app = test_app!(test_state(db).await);

    let req = test::TestRequest::post()
        .uri("/posts")
        .insert_header((FINGERPRINT_HEADER, "device-a"))
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());

    let req = test::TestRequest::post()
        .uri("/posts")
        .set_json(json!({ "content": "no device" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let mut last = None;
    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/posts")
            .insert_header((FINGERPRINT_HEADER, "device-a"))
            .insert_header(("cf-connecting-ip", OWNER_IP))
            .set_json(json!({ "content": "again and again" }))
            .to_request();
        last = Some(test::call_service(&app, req).await);
    }
    let resp = last.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
}

#[actix_rt::test]
async fn test_view_ban_blocks_feed_and_is_reported() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    rumormill::ban::ban(
        &db,
        rumormill::ban::BanKind::Ip,
        "203.0.113.99",
        &rumormill::ban::BanOptions {
            permissions: rumormill::ban::Permissions::VIEW,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/posts/feed")
        .insert_header(("cf-connecting-ip", "203.0.113.99"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/access")
        .insert_header(("cf-connecting-ip", "203.0.113.99"))
        .to_request();
    let access: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(access["banned"], true);
    assert_eq!(access["blocked"], false);
    assert_eq!(access["viewBlocked"], true);
    assert_eq!(access["permissions"], json!(["view"]));

    let req = test::TestRequest::get()
        .uri("/posts/feed")
        .insert_header(("cf-connecting-ip", "203.0.113.100"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
