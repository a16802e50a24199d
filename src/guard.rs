use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower_service::Service;

use crate::{csrf::Config, extractor::BoxError, CsrfToken, Error};

/// Extracts and verifies the presented CSRF token on state-changing requests.
/// `GET`, `HEAD`, `OPTIONS` and `TRACE` pass straight through.
#[derive(Clone)]
pub struct GuardService<S> {
    config: Arc<Config>,
    inner: S,
}

impl<S> GuardService<S> {
    pub(crate) fn new(inner: S, config: Arc<Config>) -> Self {
        Self { config, inner }
    }

    pub(crate) fn validate(secret: &[u8], token: &str) -> Result<(), Error> {
        if CsrfToken::verify(token, secret)? {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

impl<S, Q, R> Service<Request<Q>> for GuardService<S>
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

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Q>) -> Self::Future {
        if request.method().is_safe() {
            return Box::pin(self.inner.call(request));
        }

        let config = self.config.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (request, token) = match config.extractor.extract(request, config.body_limit).await {
                Ok(extracted) => extracted,
                Err(err) => return err.make_layer_response(),
            };

            match GuardService::<S>::validate(&config.secret, &token) {
                Ok(()) => inner.call(request).await,
                Err(err) => err.make_layer_response(),
            }
        })
    }
}
