//! Tower integration.
//!
//! `RetryLayer` wraps any client service that takes `Request<RetryBody>`,
//! for example `hyper_util::client::legacy::Client<HttpConnector, RetryBody>`.

use std::fmt::Display;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use tower::{Layer, Service, ServiceExt};

use crate::http::RetryBody;
use crate::resilience::error::RetryError;
use crate::resilience::orchestrator::execute;
use crate::resilience::policy::RetryPolicy;
use crate::BoxError;

/// Layer that applies a [`RetryPolicy`] to an inner client service.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service produced by [`RetryLayer`].
#[derive(Debug, Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryService<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<S, B> Service<Request<RetryBody>> for RetryService<S>
where
    S: Service<Request<RetryBody>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display + Send,
{
    type Response = Response<B>;
    type Error = RetryError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| RetryError::Transport(e.into()))
    }

    fn call(&mut self, req: Request<RetryBody>) -> Self::Future {
        // Take the instance that was poll_ready'd, leave a clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();

        Box::pin(async move {
            execute(&policy, req, move |request| attempt(inner.clone(), request)).await
        })
    }
}

/// One exchange through a fresh clone of the inner service.
async fn attempt<S, B>(mut svc: S, request: Request<RetryBody>) -> Result<Response<B>, BoxError>
where
    S: Service<Request<RetryBody>, Response = Response<B>>,
    S::Error: Into<BoxError>,
{
    let ready = svc.ready().await.map_err(Into::into)?;
    ready.call(request).await.map_err(Into::into)
}
