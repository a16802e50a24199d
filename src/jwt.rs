use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use jsonwebtoken::Algorithm;
use std::{
    fmt,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    context::{Context, Value},
    extractor::{BoxError, DEFAULT_BODY_LIMIT},
    signature::{self, is_hmac},
    Error, Extractor,
};

pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::HS256;
pub const DEFAULT_CONTEXT_KEY: &str = "user";

pub(crate) struct Config {
    pub(crate) signing_key: Vec<u8>,
    pub(crate) algorithm: Algorithm,
    pub(crate) context_key: String,
    pub(crate) extractor: Extractor,
    pub(crate) leeway: u64,
    pub(crate) body_limit: usize,
}

/// Builder for the JWT layer. Unset fields get their defaults in [`Jwt::build`].
#[derive(Clone, Default)]
pub struct Jwt {
    signing_key: Vec<u8>,
    algorithm: Option<Algorithm>,
    context_key: Option<String>,
    extractor: Option<Extractor>,
    leeway: u64,
    body_limit: Option<usize>,
}

impl Jwt {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            ..Self::default()
        }
    }

    /// The only algorithm tokens may declare. Defaults to `HS256`.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);

        self
    }

    /// Key the verified token is stored under in the request [`Context`]. Defaults to `"user"`.
    pub fn context_key(mut self, context_key: impl Into<String>) -> Self {
        self.context_key = Some(context_key.into());

        self
    }

    /// Where to look for the token. Defaults to [`Extractor::Bearer`].
    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Some(extractor);

        self
    }

    /// Seconds of slack when checking `exp` and `nbf`.
    pub fn leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;

        self
    }

    /// Largest form body buffered by [`Extractor::Form`]. Defaults to 1MB.
    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = Some(body_limit);

        self
    }

    /// Validates the key and algorithm and resolves every default, once.
    pub fn build(self) -> Result<JwtLayer, Error> {
        if self.signing_key.is_empty() {
            return Err(Error::Config("jwt middleware requires signing key"));
        }

        let algorithm = self.algorithm.unwrap_or(DEFAULT_ALGORITHM);
        if !is_hmac(algorithm) {
            return Err(Error::Config(
                "jwt signing key is a shared secret, algorithm must be HS256, HS384 or HS512",
            ));
        }

        let config = Config {
            signing_key: self.signing_key,
            algorithm,
            context_key: self
                .context_key
                .unwrap_or_else(|| DEFAULT_CONTEXT_KEY.into()),
            extractor: self.extractor.unwrap_or(Extractor::Bearer),
            leeway: self.leeway,
            body_limit: self.body_limit.unwrap_or(DEFAULT_BODY_LIMIT),
        };

        Ok(JwtLayer {
            config: Arc::new(config),
        })
    }
}

impl fmt::Debug for Jwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwt")
            .field("signing_key", &"***")
            .field("algorithm", &self.algorithm)
            .field("context_key", &self.context_key)
            .field("extractor", &self.extractor)
            .field("leeway", &self.leeway)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

/// Verifies a signed token on every request and stores it in the request [`Context`].
///
/// Extraction failures answer `400 Bad Request` (`413 Payload Too Large` for an
/// oversized form body), verification failures `401 Unauthorized`.
#[derive(Clone)]
pub struct JwtLayer {
    pub(crate) config: Arc<Config>,
}

impl<S> Layer<S> for JwtLayer {
    type Service = JwtService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtService {
            config: self.config.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct JwtService<S> {
    config: Arc<Config>,
    inner: S,
}

impl<S, Q, R> Service<Request<Q>> for JwtService<S>
where
    S: Service<Request<Q>, Response = Response<R>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Q: Body + From<Bytes> + Send + 'static,
    Q::Data: Send,
    Q::Error: Into<BoxError>,
    R: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Q>) -> Self::Future {
        let config = self.config.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (mut request, token) = match config.extractor.extract(request, config.body_limit).await {
                Ok(extracted) => extracted,
                Err(err) => return err.make_layer_response(),
            };

            let verified = match signature::verify(
                &token,
                config.algorithm,
                &config.signing_key,
                config.leeway,
            ) {
                Ok(verified) => verified,
                Err(err) => return err.make_layer_response(),
            };

            Context::insert(
                request.extensions_mut(),
                &config.context_key,
                Value::Jwt(Arc::new(verified)),
            );

            inner.call(request).await
        })
    }
}
