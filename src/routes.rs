//! HTTP surface.
//!
//! Every route under `/auth` is a [`Pipeline`] bound as a service, so its
//! interceptors run in the order listed here. OPTIONS is routed to the same
//! pipeline so preflights reach the CORS interceptor.

use crate::auth::{api as auth_api, AuthState, AuthenticationGuard};
use crate::middleware::{
    compose, handler_fn, AccessLogInterceptor, CorsInterceptor, Handler, Interceptor, Pipeline,
    RateLimitInterceptor, RateLimiter,
};
use axum::{
    response::IntoResponse,
    routing::{get, on_service, MethodFilter},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

/// Shared pieces every route pipeline is built from
#[derive(Clone)]
pub struct RouteContext {
    pub state: AuthState,
    pub limiter: RateLimiter,
    pub cors: CorsInterceptor,
}

impl RouteContext {
    /// `cors → access log → rate limit`
    fn public_chain(&self) -> Vec<Arc<dyn Interceptor>> {
        vec![
            Arc::new(self.cors.clone()) as Arc<dyn Interceptor>,
            Arc::new(AccessLogInterceptor::new()),
            Arc::new(RateLimitInterceptor::new(self.limiter.clone())),
        ]
    }

    /// `cors → access log → rate limit → guard`
    fn protected_chain(&self) -> Vec<Arc<dyn Interceptor>> {
        let mut chain = self.public_chain();
        chain.push(Arc::new(AuthenticationGuard::new(self.state.tokens.clone())));
        chain
    }

    pub fn register_pipeline(&self) -> Pipeline {
        let state = self.state.clone();
        let handler: Handler = handler_fn(move |req| {
            let state = state.clone();
            async move { auth_api::register(state, req).await.into_response() }
        });
        compose(self.public_chain(), handler)
    }

    pub fn login_pipeline(&self) -> Pipeline {
        let state = self.state.clone();
        let handler: Handler = handler_fn(move |req| {
            let state = state.clone();
            async move { auth_api::login(state, req).await.into_response() }
        });
        compose(self.public_chain(), handler)
    }

    pub fn me_pipeline(&self) -> Pipeline {
        let handler: Handler =
            handler_fn(|req| async move { auth_api::me(req).await.into_response() });
        compose(self.protected_chain(), handler)
    }
}

/// Build the application router
pub fn build_router(ctx: RouteContext, request_timeout: Duration) -> Router {
    let post_or_preflight = MethodFilter::POST.or(MethodFilter::OPTIONS);
    let get_or_preflight = MethodFilter::GET.or(MethodFilter::OPTIONS);

    Router::new()
        .route(
            "/auth/register",
            on_service(post_or_preflight, ctx.register_pipeline()),
        )
        .route(
            "/auth/login",
            on_service(post_or_preflight, ctx.login_pipeline()),
        )
        .route("/auth/me", on_service(get_or_preflight, ctx.me_pipeline()))
        .route("/health", get(auth_api::health))
        .layer(TimeoutLayer::new(request_timeout))
}
