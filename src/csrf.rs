use futures_util::future::BoxFuture;
use http::{HeaderName, Request, Response};
use std::{
    fmt,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};
use tower_cookies::{
    cookie::{time::Duration, Expiration, SameSite},
    Cookie, CookieManager, Cookies,
};
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    context::{Context, Value},
    extractor::DEFAULT_BODY_LIMIT,
    guard::GuardService,
    CsrfToken, Error, Extractor,
};

pub const DEFAULT_CONTEXT_KEY: &str = "csrf";
pub const DEFAULT_COOKIE_NAME: &str = "csrf";
pub const DEFAULT_HEADER_NAME: &str = "x-csrf-token";

/// Resolved CSRF settings, shared read-only by every request.
pub(crate) struct Config {
    pub(crate) secret: Vec<u8>,
    pub(crate) context_key: String,
    pub(crate) extractor: Extractor,
    pub(crate) cookie_name: String,
    pub(crate) cookie_domain: Option<String>,
    pub(crate) cookie_path: Option<String>,
    pub(crate) expires: Option<Expiration>,
    pub(crate) max_age: Duration,
    pub(crate) http_only: bool,
    pub(crate) same_site: Option<SameSite>,
    pub(crate) secure: bool,
    pub(crate) body_limit: usize,
}

impl Config {
    pub(crate) fn cookie(&self, token: &CsrfToken) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), token.as_str().to_owned()))
            .max_age(self.max_age)
            .http_only(self.http_only)
            .secure(self.secure);

        if let Some(expires) = self.expires {
            cookie = cookie.expires(expires);
        }
        if let Some(path) = &self.cookie_path {
            cookie = cookie.path(path.clone());
        }
        if let Some(domain) = &self.cookie_domain {
            cookie = cookie.domain(domain.clone());
        }
        if let Some(same_site) = self.same_site {
            cookie = cookie.same_site(same_site);
        }

        cookie.build()
    }
}

/// Builder for the CSRF layer. Unset fields get their defaults in [`Csrf::build`].
#[derive(Clone, Default)]
pub struct Csrf {
    secret: Vec<u8>,
    context_key: Option<String>,
    extractor: Option<Extractor>,
    cookie_name: Option<String>,
    cookie_domain: Option<String>,
    cookie_path: Option<String>,
    expires: Option<Expiration>,
    max_age: Option<Duration>,
    http_only: bool,
    same_site: Option<SameSite>,
    secure: bool,
    body_limit: Option<usize>,
}

impl Csrf {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Key the issued token is stored under in the request [`Context`]. Defaults to `"csrf"`.
    pub fn context_key(mut self, context_key: impl Into<String>) -> Self {
        self.context_key = Some(context_key.into());

        self
    }

    /// Where to look for the token on state-changing requests.
    /// Defaults to the `X-CSRF-Token` header.
    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Some(extractor);

        self
    }

    pub fn cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = Some(cookie_name.into());

        self
    }

    pub fn cookie_domain(mut self, cookie_domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(cookie_domain.into());

        self
    }

    pub fn cookie_path(mut self, cookie_path: impl Into<String>) -> Self {
        self.cookie_path = Some(cookie_path.into());

        self
    }

    pub fn expires(mut self, expires: Expiration) -> Self {
        self.expires = Some(expires);

        self
    }

    /// Cookie lifetime. Defaults to 24 hours.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);

        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;

        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);

        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;

        self
    }

    /// Largest form body buffered by [`Extractor::Form`]. Defaults to 1MB.
    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = Some(body_limit);

        self
    }

    /// Validates the secret and resolves every default, once.
    pub fn build(self) -> Result<CsrfLayer, Error> {
        if self.secret.is_empty() {
            return Err(Error::Config("csrf secret must be provided"));
        }

        let config = Config {
            secret: self.secret,
            context_key: self
                .context_key
                .unwrap_or_else(|| DEFAULT_CONTEXT_KEY.into()),
            extractor: self.extractor.unwrap_or_else(default_extractor),
            cookie_name: self
                .cookie_name
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.into()),
            cookie_domain: self.cookie_domain,
            cookie_path: self.cookie_path,
            expires: self.expires,
            max_age: self.max_age.unwrap_or_else(|| Duration::hours(24)),
            http_only: self.http_only,
            same_site: self.same_site,
            secure: self.secure,
            body_limit: self.body_limit.unwrap_or(DEFAULT_BODY_LIMIT),
        };

        Ok(CsrfLayer {
            config: Arc::new(config),
        })
    }
}

impl fmt::Debug for Csrf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Csrf")
            .field("secret", &"***")
            .field("context_key", &self.context_key)
            .field("extractor", &self.extractor)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

fn default_extractor() -> Extractor {
    Extractor::Header(HeaderName::from_static(DEFAULT_HEADER_NAME))
}

/// Issues a fresh token on every request and verifies the presented one on
/// state-changing requests.
#[derive(Clone)]
pub struct CsrfLayer {
    pub(crate) config: Arc<Config>,
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CookieManager<CsrfService<GuardService<S>>>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieManager::new(CsrfService {
            config: self.config.clone(),
            inner: GuardService::new(inner, self.config.clone()),
        })
    }
}

#[derive(Clone)]
pub struct CsrfService<S> {
    config: Arc<Config>,
    inner: S,
}

impl<S, Q, R> Service<Request<Q>> for CsrfService<S>
where
    S: Service<Request<Q>, Response = Response<R>> + Send + 'static,
    S::Future: Send + 'static,
    Q: Send + 'static,
    R: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Q>) -> Self::Future {
        let cookies = match request
            .extensions()
            .get::<Cookies>()
            .ok_or(Error::ExtensionNotFound("Cookies".into()))
        {
            Ok(cookies) => cookies.clone(),
            Err(err) => return Box::pin(async move { err.make_layer_response() }),
        };

        let token = match CsrfToken::issue(&self.config.secret) {
            Ok(token) => token,
            Err(err) => return Box::pin(async move { err.make_layer_response() }),
        };

        cookies.add(self.config.cookie(&token));
        Context::insert(
            request.extensions_mut(),
            &self.config.context_key,
            Value::CsrfToken(token),
        );

        Box::pin(self.inner.call(request))
    }
}
