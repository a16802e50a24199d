use std::convert::Infallible;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, Request, Uri};
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::Error;

const BEARER: &str = "Bearer";
const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Default cap on a buffered form body: 1MB.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where a layer looks for the token on an incoming request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extractor {
    /// The raw value of a header. A missing or empty header yields an empty token
    /// and leaves it to verification to reject it.
    Header(HeaderName),
    /// The `Authorization` header in the form `Bearer <token>`.
    Bearer,
    /// A field of an urlencoded or multipart form body, falling back to the query
    /// string when the body doesn't carry it.
    Form(String),
    /// A query string parameter.
    Query(String),
}

enum FormBody {
    UrlEncoded,
    Multipart(String),
}

impl Extractor {
    /// Pulls the token out of `request`, handing the request back for forwarding.
    ///
    /// [`Extractor::Form`] buffers at most `body_limit` bytes of the body and rebuilds
    /// it, every other variant only reads the head.
    pub(crate) async fn extract<B>(
        &self,
        request: Request<B>,
        body_limit: usize,
    ) -> Result<(Request<B>, String), Error>
    where
        B: Body + From<Bytes>,
        B::Error: Into<BoxError>,
    {
        let Extractor::Form(name) = self else {
            let token = self.extract_head(request.headers(), request.uri())?;
            return Ok((request, token));
        };

        let Some(kind) = form_body(request.headers()) else {
            let token = query_value(request.uri(), name)
                .ok_or(Error::Extraction("empty token in form parameter"))?;
            return Ok((request, token));
        };

        if content_length(request.headers()).is_some_and(|length| length > body_limit) {
            return Err(Error::PayloadTooLarge);
        }

        let (parts, body) = request.into_parts();
        let bytes = match Limited::new(body, body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<LengthLimitError>() => return Err(Error::PayloadTooLarge),
            Err(err) => {
                tracing::debug!(err = %err, "couldn't buffer form body");
                return Err(Error::Extraction("couldn't read form body"));
            }
        };

        let token = match kind {
            FormBody::UrlEncoded => find_pair(&bytes, name),
            FormBody::Multipart(boundary) => multipart_field(bytes.clone(), boundary, name).await,
        }
        .or_else(|| query_value(&parts.uri, name))
        .ok_or(Error::Extraction("empty token in form parameter"))?;

        Ok((Request::from_parts(parts, B::from(bytes)), token))
    }

    /// Extraction for the variants that only need the request head.
    ///
    /// [`Extractor::Form`] only sees the query string here since the body isn't available.
    pub fn extract_head(&self, headers: &HeaderMap, uri: &Uri) -> Result<String, Error> {
        match self {
            Extractor::Header(name) => Ok(headers
                .get(name)
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .unwrap_or_default()),
            Extractor::Bearer => headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(bearer_token)
                .map(str::to_owned)
                .ok_or(Error::Extraction(
                    "empty or invalid jwt in authorization header",
                )),
            Extractor::Query(name) => {
                query_value(uri, name).ok_or(Error::Extraction("empty token in query parameter"))
            }
            Extractor::Form(name) => {
                query_value(uri, name).ok_or(Error::Extraction("empty token in form parameter"))
            }
        }
    }
}

/// Strips the `Bearer ` scheme, requiring a non-empty credential after it.
fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix(BEARER)
        .and_then(|rest| rest.strip_prefix(' '))
        .filter(|token| !token.is_empty())
}

fn form_body(headers: &HeaderMap) -> Option<FormBody> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let media_type = content_type.split(';').next()?.trim();

    if media_type.eq_ignore_ascii_case(URLENCODED) {
        Some(FormBody::UrlEncoded)
    } else if media_type.eq_ignore_ascii_case(MULTIPART) {
        multer::parse_boundary(content_type)
            .ok()
            .map(FormBody::Multipart)
    } else {
        None
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn query_value(uri: &Uri, name: &str) -> Option<String> {
    uri.query().and_then(|query| find_pair(query.as_bytes(), name))
}

/// First non-empty value for `name` in an urlencoded string.
fn find_pair(encoded: &[u8], name: &str) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(encoded)
        .ok()?
        .into_iter()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// First non-empty value of the multipart field `name`.
async fn multipart_field(body: Bytes, boundary: String, name: &str) -> Option<String> {
    let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some(name) {
            continue;
        }

        match field.text().await {
            Ok(value) if !value.is_empty() => return Some(value),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }

    None
}
