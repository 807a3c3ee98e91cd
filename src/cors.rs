//! CORS for the admin API.
//!
//! `tower_http::cors::Cors` answers every `OPTIONS` request as a preflight and
//! never calls the router, which would hide the GridOptions action. Here only a
//! request carrying `Access-Control-Request-Method` is a preflight; any other
//! `OPTIONS` request is routed normally.

use std::convert::Infallible;
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use tower::{Layer, Service};
use tower_http::cors::{Any, Cors, CorsLayer};

type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

pub fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS && request.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

#[derive(Debug, Clone)]
pub struct AdminCorsLayer {
    cors: CorsLayer,
}

impl AdminCorsLayer {
    /// Any origin and header, the methods the admin routes use.
    pub fn permissive() -> Self {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_origin(Any)
            .allow_headers(Any);
        Self { cors }
    }
}

impl<S: Clone> Layer<S> for AdminCorsLayer {
    type Service = AdminCors<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminCors {
            cors: self.cors.layer(inner.clone()),
            inner,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminCors<S> {
    inner: S,
    cors: Cors<S>,
}

impl<S> Service<Request> for AdminCors<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // readiness is checked on the clone that serves the call
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        if request.method() == Method::OPTIONS && !is_preflight(&request) {
            let mut inner = self.inner.clone();
            return Box::pin(async move {
                poll_fn(|cx| inner.poll_ready(cx)).await?;
                let mut response = inner.call(request).await?;
                // same answer the permissive policy gives actual requests
                response
                    .headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
                Ok(response)
            });
        }

        let mut cors = self.cors.clone();
        Box::pin(async move {
            poll_fn(|cx| cors.poll_ready(cx)).await?;
            cors.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::options;
    use axum::Router;
    use tower::util::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/grid", options(|| async { "columns" }).get(|| async { "rows" }))
            .layer(AdminCorsLayer::permissive())
    }

    #[tokio::test]
    async fn plain_options_reaches_the_handler() {
        let request = Request::builder().method(Method::OPTIONS).uri("/grid").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"columns");
    }

    #[tokio::test]
    async fn preflight_is_answered_by_cors() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/grid")
            .header(header::ORIGIN, "https://admin.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn actual_requests_get_allow_origin() {
        let request = Request::builder()
            .uri("/grid")
            .header(header::ORIGIN, "https://admin.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
