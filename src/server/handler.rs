// src/server/handler.rs
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use tower::Service;

/// Liveness endpoint served on every listener: `GET|HEAD /_ping` answers `OK`.
#[derive(Clone, Debug, Default)]
pub struct PingHandler;

impl PingHandler {
    pub fn new() -> Self {
        Self
    }

    fn respond(req: &Request<Body>) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/_ping") => *response.body_mut() = Body::from("OK"),
            (&Method::HEAD, "/_ping") => {}
            (_, "/_ping") => *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED,
            _ => {
                *response.status_mut() = StatusCode::NOT_FOUND;
                *response.body_mut() = Body::from("Not Found");
            }
        }
        response
    }
}

impl Service<Request<Body>> for PingHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let response = Self::respond(&req);
        tracing::debug!(method = %req.method(), path = req.uri().path(), status = %response.status(), "request");
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    async fn status_of(method: Method, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = PingHandler::new().oneshot(req).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn ping_answers_ok() {
        assert_eq!(status_of(Method::GET, "/_ping").await, (StatusCode::OK, b"OK".to_vec()));
        assert_eq!(status_of(Method::HEAD, "/_ping").await, (StatusCode::OK, Vec::new()));
    }

    #[tokio::test]
    async fn other_requests_are_rejected() {
        assert_eq!(status_of(Method::POST, "/_ping").await.0, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(status_of(Method::GET, "/containers").await.0, StatusCode::NOT_FOUND);
    }
}
