use std::net::SocketAddr;

use axum::{
    response::Html,
    routing::{get, post},
    Router,
};
use http::StatusCode;
use tower_sentinel::{Context, Csrf, Extractor, Jwt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("tower_sentinel=debug")
        .init();

    let app = Router::new()
        .route("/", get(root))
        .route("/submit", post(submit))
        .route("/me", get(me).layer(Jwt::new("jwt-secret").build()?))
        .layer(
            Csrf::new("csrf-secret")
                .extractor(Extractor::Form("csrf".into()))
                .build()?,
        );

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn root(context: Context) -> Result<Html<String>, StatusCode> {
    let token = context
        .csrf_token("csrf")
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Html(format!(
        r#"<form method="post" action="/submit">
    <input type="hidden" name="csrf" value="{token}">
    <label for="hotdogs">How do you like your hotdogs?</label>
    <select name="hotdogs">
        <option value="ketchup">Ketchup</option>
        <option value="more-ketchup">More ketchup</option>
    </select>
    <button type="submit">Submit with token</button>
</form>
<form method="post" action="/submit">
    <button type="submit">Submit without token</button>
</form>"#
    )))
}

async fn submit() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Success!")
}

async fn me(context: Context) -> Result<String, StatusCode> {
    let token = context.jwt("user").ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(format!("Hello, {}", token.claims["sub"]))
}
