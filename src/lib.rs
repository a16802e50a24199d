//! ## Overview
//!
//! Two [`tower`][crate-tower] layers that guard a service with stateless tokens:
//!
//! - [`Csrf`] mitigates [CSRF][owasp-csrf] with salted, keyed tokens.
//! - [`Jwt`] authenticates bearer tokens by checking their algorithm and signature.
//!
//! Both read the token through an [`Extractor`] (header, bearer header, form field
//! or query parameter) and store what they verified in the request's [`Context`].
//!
//! ### CSRF tokens
//!
//! - **Secret key**: You provide a **secret key** used to sign tokens (See: [OWASP's Cryptographic Storage Cheat Sheet][owasp-cryptographic-storage]).
//! - **Token creation**:
//!   - We draw an 8 byte **salt** from the operating system's random source.
//!   - We compute an HMAC-SHA256 **signature** of the salt under the **secret key**.
//!   - The token is `hex(signature):hex(salt)`.
//! - **Token storage**:
//!   - Every response carries a freshly issued token as a cookie.
//!   - Handlers can read the same token from the [`Context`] to render it into forms.
//! - **Token validation**:
//!   - `GET`, `HEAD`, `OPTIONS` and `TRACE` requests are never checked.
//!   - For any other method we extract the token, recompute the signature from its
//!     salt and compare both in constant time. A mismatch answers `403 Forbidden`.
//!
//! ### JWTs
//!
//! The expected algorithm is fixed when the layer is built. A token declaring any
//! other algorithm is rejected before its signature is checked, so a token claiming
//! `none` can never pass. Extraction failures answer `400 Bad Request`, everything
//! else `401 Unauthorized`.
//!
//! ## Usage
//!
//! ### With [`axum`][crate-axum]
//!
//! ```rust, no_run
//! use std::net::SocketAddr;
//!
//! use axum::{routing::{get, post}, Router};
//! use http::StatusCode;
//! use tower_sentinel::{Context, Csrf, Jwt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Router::new()
//!         .route("/form", get(form).post(submit))
//!         .route("/me", get(me).layer(Jwt::new("jwt-key").build()?))
//!         .layer(Csrf::new("csrf-key").build()?);
//!
//!     let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
//!     let listener = tokio::net::TcpListener::bind(&addr).await?;
//!
//!     axum::serve(listener, app.into_make_service()).await?;
//!
//!     Ok(())
//! }
//!
//! async fn form(context: Context) -> Result<String, StatusCode> {
//!     let token = context.csrf_token("csrf").ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
//!
//!     Ok(format!("<input type=\"hidden\" name=\"csrf\" value=\"{token}\">"))
//! }
//!
//! async fn submit() -> StatusCode {
//!     StatusCode::OK
//! }
//!
//! async fn me(context: Context) -> Result<String, StatusCode> {
//!     let user = context.jwt("user").ok_or(StatusCode::UNAUTHORIZED)?;
//!
//!     Ok(user.claims["sub"].to_string())
//! }
//! ```
//!
//! [crate-axum]: https://github.com/tokio-rs/axum
//! [crate-tower]: https://github.com/tower-rs/tower
//! [owasp-cryptographic-storage]: https://cheatsheetseries.owasp.org/cheatsheets/Cryptographic_Storage_Cheat_Sheet.html
//! [owasp-csrf]: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html

use hmac::Hmac;
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

pub use context::{Context, Value};
pub use csrf::{Csrf, CsrfLayer, CsrfService};
pub use error::Error;
pub use extractor::{BoxError, Extractor, DEFAULT_BODY_LIMIT};
pub use guard::GuardService;
pub use jsonwebtoken::Algorithm;
pub use jwt::{Jwt, JwtLayer, JwtService};
pub use signature::{verify, VerifiedToken};
pub use token::{CsrfToken, SALT_LEN};
pub use tower_cookies::cookie;

mod context;
mod csrf;
mod error;
mod extractor;
mod guard;
mod jwt;
mod signature;
mod token;

#[cfg(feature = "axum")]
mod extract;
