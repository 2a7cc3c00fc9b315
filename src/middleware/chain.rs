//! Ordered interceptor composition.
//!
//! A [`Pipeline`] is a terminal [`Handler`] wrapped by a fixed list of
//! [`Interceptor`]s, applied outermost-first. Each interceptor receives the
//! request plus a [`Next`] and either forwards by calling [`Next::run`] or
//! short-circuits by returning its own response. `Next::run` takes `self`,
//! so the rest of the chain can be entered at most once per request.

use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Terminal request handler at the end of a pipeline.
pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| -> BoxFuture<'static, Response> { Box::pin(f(req)) })
}

/// A cross-cutting step around a handler.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Either forward with `next.run(req).await` (optionally decorating the
    /// response) or return a terminal response without touching `next`.
    async fn intercept(&self, req: Request, next: Next) -> Response;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// The remainder of a pipeline from some interceptor onwards.
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    position: usize,
    terminal: Handler,
}

impl Next {
    /// Run the rest of the chain. Consumes `self`.
    pub fn run(self, req: Request) -> BoxFuture<'static, Response> {
        Box::pin(async move {
            let current = self.interceptors.get(self.position).cloned();
            match current {
                Some(interceptor) => {
                    let next = Next {
                        interceptors: self.interceptors,
                        position: self.position + 1,
                        terminal: self.terminal,
                    };
                    interceptor.intercept(req, next).await
                }
                None => (self.terminal)(req).await,
            }
        })
    }
}

/// A handler wrapped by an ordered list of interceptors.
#[derive(Clone)]
pub struct Pipeline {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    terminal: Handler,
}

impl Pipeline {
    pub async fn handle(&self, req: Request) -> Response {
        Next {
            interceptors: self.interceptors.clone(),
            position: 0,
            terminal: self.terminal.clone(),
        }
        .run(req)
        .await
    }

    /// Interceptor names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }
}

/// Compose `interceptors` (outermost first) around `terminal`.
pub fn compose(interceptors: Vec<Arc<dyn Interceptor>>, terminal: Handler) -> Pipeline {
    Pipeline {
        interceptors: interceptors.into(),
        terminal,
    }
}

impl Service<Request> for Pipeline {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { Ok(pipeline.handle(req).await) })
    }
}
