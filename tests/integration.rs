use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use axum_test::TestServer;
use bytes::Bytes;
use http::{header, HeaderName, HeaderValue, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tower_sentinel::{cookie::SameSite, Algorithm, Context, Csrf, Extractor, Jwt};

fn csrf_header(value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-csrf-token"),
        HeaderValue::from_str(value).expect("couldn't create HeaderValue"),
    )
}

/// Replaces the last hex digit (inside the salt) with a different one.
fn alter_salt(token: &str) -> String {
    let mut bytes = token.as_bytes().to_vec();
    let last = bytes.len() - 1;
    bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };

    String::from_utf8(bytes).expect("token is ascii")
}

async fn echo_csrf(context: Context) -> String {
    context
        .csrf_token("csrf")
        .map(ToString::to_string)
        .unwrap_or_default()
}

async fn echo_user(context: Context) -> String {
    context
        .jwt("user")
        .map(|token| token.claims["sub"].to_string())
        .unwrap_or_default()
}

fn counting_app(csrf: Csrf, hits: Arc<AtomicUsize>) -> Result<Router> {
    let app = Router::new()
        .route(
            "/",
            get(echo_csrf).post(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .layer(csrf.build()?);

    Ok(app)
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("couldn't create HeaderValue")
}

fn sign(algorithm: Algorithm, key: &str) -> String {
    encode(
        &Header::new(algorithm),
        &json!({ "sub": "alice" }),
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .expect("couldn't sign token")
}

#[tokio::test]
async fn safe_method_issues_cookie_and_context() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = TestServer::new(counting_app(Csrf::new("k"), hits.clone())?)?;

    let response = server.get("/").await;
    response.assert_status_ok();

    let cookie = response.cookie("csrf");
    assert_eq!(response.text(), cookie.value());
    assert!(cookie.value().contains(':'));

    let again = server.get("/").await.cookie("csrf");
    assert_ne!(again.value(), cookie.value());
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn guards_mutation() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = TestServer::new(counting_app(Csrf::new("k"), hits.clone())?)?;

    let token = server.get("/").await.cookie("csrf").value().to_owned();

    // Issued token sent back unmodified.
    let (name, value) = csrf_header(&token);
    server.post("/").add_header(name, value).await.assert_status_ok();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // One salt digit altered.
    let (name, value) = csrf_header(&alter_salt(&token));
    server
        .post("/")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // Not a token at all.
    let (name, value) = csrf_header("oh howdy doody");
    server
        .post("/")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // Salt isn't hex.
    let (name, value) = csrf_header("abcd:zz");
    server
        .post("/")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // No token sent.
    server.post("/").await.assert_status(StatusCode::FORBIDDEN);

    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn rejects_token_from_other_secret() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = TestServer::new(counting_app(Csrf::new("k"), hits.clone())?)?;
    let other = TestServer::new(counting_app(Csrf::new("k2"), hits.clone())?)?;

    let token = other.get("/").await.cookie("csrf").value().to_owned();

    let (name, value) = csrf_header(&token);
    server
        .post("/")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn reads_token_from_form() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let csrf = Csrf::new("k").extractor(Extractor::Form("csrf".into()));
    let server = TestServer::new(counting_app(csrf, hits.clone())?)?;

    let token = server.get("/").await.cookie("csrf").value().to_owned();

    server
        .post("/")
        .form(&[("csrf", token.as_str()), ("name", "alice")])
        .await
        .assert_status_ok();

    server
        .post("/")
        .form(&[("name", "alice")])
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn reads_token_from_multipart_form() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let csrf = Csrf::new("k").extractor(Extractor::Form("csrf".into()));
    let server = TestServer::new(counting_app(csrf, hits.clone())?)?;

    let token = server.get("/").await.cookie("csrf").value().to_owned();
    let body = format!(
        "--XX\r\n\
Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\
Content-Type: image/png\r\n\
\r\n\
not really a png\r\n\
--XX\r\n\
Content-Disposition: form-data; name=\"csrf\"\r\n\
\r\n\
{token}\r\n\
--XX--\r\n"
    );

    server
        .post("/")
        .content_type("multipart/form-data; boundary=XX")
        .bytes(Bytes::from(body))
        .await
        .assert_status_ok();

    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn rejects_oversized_form_body() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let csrf = Csrf::new("k")
        .extractor(Extractor::Form("csrf".into()))
        .body_limit(64 * 1024);
    let server = TestServer::new(counting_app(csrf, hits.clone())?)?;

    let token = server.get("/").await.cookie("csrf").value().to_owned();
    let body = format!("csrf={token}&padding={}", "a".repeat(128 * 1024));

    server
        .post("/")
        .content_type("application/x-www-form-urlencoded")
        .bytes(Bytes::from(body))
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    assert_eq!(hits.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn reads_token_from_query() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let csrf = Csrf::new("k").extractor(Extractor::Query("csrf".into()));
    let server = TestServer::new(counting_app(csrf, hits.clone())?)?;

    let token = server.get("/").await.cookie("csrf").value().to_owned();

    server
        .post("/")
        .add_query_param("csrf", &token)
        .await
        .assert_status_ok();

    server
        .post("/")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn applies_cookie_attributes() -> Result<()> {
    let csrf = Csrf::new("k")
        .cookie_name("token")
        .cookie_domain("example.com")
        .cookie_path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .context_key("token");
    let app = Router::new()
        .route(
            "/",
            get(|context: Context| async move {
                context
                    .csrf_token("token")
                    .map(ToString::to_string)
                    .unwrap_or_default()
            }),
        )
        .layer(csrf.build()?);
    let server = TestServer::new(app)?;

    let response = server.get("/").await;
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    assert!(set_cookie.starts_with(&format!("token={}", response.text())));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Domain=example.com"));
    assert!(set_cookie.contains("Max-Age=86400"));

    Ok(())
}

#[tokio::test]
async fn jwt_forwards_verified_claims() -> Result<()> {
    let app = Router::new()
        .route("/", get(echo_user))
        .layer(Jwt::new("k").build()?);
    let server = TestServer::new(app)?;

    let response = server
        .get("/")
        .add_header(header::AUTHORIZATION, bearer(&sign(Algorithm::HS256, "k")))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "\"alice\"");

    Ok(())
}

#[tokio::test]
async fn jwt_rejections_keep_status_classes() -> Result<()> {
    let app = Router::new()
        .route("/", get(echo_user))
        .layer(Jwt::new("k").algorithm(Algorithm::HS256).build()?);
    let server = TestServer::new(app)?;

    // Signed with another key.
    server
        .get("/")
        .add_header(header::AUTHORIZATION, bearer(&sign(Algorithm::HS256, "k2")))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Right key, declared algorithm differs from the expected one.
    server
        .get("/")
        .add_header(header::AUTHORIZATION, bearer(&sign(Algorithm::HS384, "k")))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // No Authorization header.
    server
        .get("/")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Wrong scheme.
    server
        .get("/")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", sign(Algorithm::HS256, "k")))?,
        )
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn jwt_reads_query_parameter() -> Result<()> {
    let app = Router::new().route("/", get(echo_user)).layer(
        Jwt::new("k")
            .extractor(Extractor::Query("jwt".into()))
            .build()?,
    );
    let server = TestServer::new(app)?;

    server
        .get("/")
        .add_query_param("jwt", sign(Algorithm::HS256, "k"))
        .await
        .assert_status_ok();

    server
        .get("/")
        .add_query_param("jwt", "")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn layers_share_one_context() -> Result<()> {
    let app = Router::new()
        .route(
            "/",
            post(|context: Context| async move {
                let csrf = context.csrf_token("csrf").is_some();
                let user = context.jwt("user").is_some();
                format!("{csrf} {user}")
            }),
        )
        .layer(Jwt::new("jwt-key").build()?)
        .layer(Csrf::new("csrf-key").build()?);
    let server = TestServer::new(app)?;

    let token = server.get("/").await.cookie("csrf").value().to_owned();
    let (name, value) = csrf_header(&token);

    let response = server
        .post("/")
        .add_header(name, value)
        .add_header(header::AUTHORIZATION, bearer(&sign(Algorithm::HS256, "jwt-key")))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "true true");

    Ok(())
}
