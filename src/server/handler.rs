// src/server/handler.rs
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::clients::{ClientRegistry, ClientSnapshot};
use crate::metrics::MetricsRegistry;
use crate::proxy::{Backend, BackendPool};

/// Read-only diagnostics: client table, active backends, Prometheus text.
#[derive(Clone)]
pub struct DiagnosticsHandler {
    clients: Arc<ClientRegistry>,
    pool: Arc<BackendPool>,
    metrics: Arc<MetricsRegistry>,
    metrics_path: Arc<str>,
}

impl DiagnosticsHandler {
    pub fn new(
        clients: Arc<ClientRegistry>,
        pool: Arc<BackendPool>,
        metrics: Arc<MetricsRegistry>,
        metrics_path: &str,
    ) -> Self {
        Self {
            clients,
            pool,
            metrics,
            metrics_path: Arc::from(metrics_path),
        }
    }

    pub fn route(&self, req: &Request<Body>) -> Response<Body> {
        if req.method() != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        match req.uri().path() {
            "/clients" => {
                let table: BTreeMap<String, ClientSnapshot> = self
                    .clients
                    .snapshot()
                    .into_iter()
                    .map(|(ip, session)| (ip.to_string(), session))
                    .collect();
                json(&table)
            }
            "/backends" => {
                let snapshot = self.pool.active();
                let active: Vec<&Backend> = snapshot.iter().map(|b| b.as_ref()).collect();
                json(&active)
            }
            path if path == &*self.metrics_path => {
                let mut response = Response::new(Body::from(self.metrics.gather()));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            _ => text(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}

impl Service<Request<Body>> for DiagnosticsHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        futures::future::ready(Ok(self.route(&req)))
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize diagnostics");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
