use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::service::{ClassificationRequest, ClassificationResponse, ClassificationService};

const API_PATH: &str = "/api/attachment";

const INVALID_REQUEST_PAGE: &str = concat!(
    "<!DOCTYPE html>",
    "<html>",
    "  <head>",
    "    <title>Invalid request</title>",
    "  </head>",
    "  <body>",
    "    <p>API server got invalid request</p>",
    "  </body>",
    "</html>",
);

/// HTTP boundary for the classification service. Accepts the add-in's
/// JSON contract on a single endpoint, answers CORS preflights, and
/// bounds in-flight classification work with a semaphore instead of
/// spawning unbounded per-connection workers.
pub struct ApiServer {
    service: Arc<ClassificationService>,
    limiter: Semaphore,
    allowed_origin: String,
    max_request_bytes: usize,
}

impl ApiServer {
    pub fn new(service: Arc<ClassificationService>, config: &Config) -> Self {
        ApiServer {
            service,
            limiter: Semaphore::new(config.max_concurrent_requests),
            allowed_origin: config.allowed_origin.clone(),
            max_request_bytes: config.max_request_bytes,
        }
    }

    pub async fn run(self: Arc<Self>, listen_addr: &str) -> anyhow::Result<()> {
        let addr: SocketAddr = listen_addr.parse()?;
        let server = Arc::clone(&self);

        let make_svc = make_service_fn(move |_conn| {
            let server = Arc::clone(&server);
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                }))
            }
        });

        log::info!("Listening for connections on {}", addr);
        Server::try_bind(&addr)?
            .serve(make_svc)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        log::info!("{} {}", req.method(), req.uri().path());

        if req.uri().path() != API_PATH {
            return html_response(StatusCode::NOT_FOUND, INVALID_REQUEST_PAGE);
        }

        match req.method().as_str() {
            "OPTIONS" => self.preflight_response(),
            "POST" => self.classify(req).await,
            _ => html_response(StatusCode::METHOD_NOT_ALLOWED, INVALID_REQUEST_PAGE),
        }
    }

    async fn classify(&self, req: Request<Body>) -> Response<Body> {
        // Backpressure: reject outright rather than queueing unboundedly.
        let _permit = match self.limiter.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                log::warn!("Concurrency limit reached, rejecting request");
                return self.json_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &ClassificationResponse::failure("server busy"),
                );
            }
        };

        let body = match self.read_body(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let request: ClassificationRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("Rejecting malformed request: {}", e);
                return self.json_response(
                    StatusCode::BAD_REQUEST,
                    &ClassificationResponse::failure(format!("invalid request: {e}")),
                );
            }
        };

        let result = self.service.classify(&request).await;
        self.json_response(StatusCode::OK, &result)
    }

    async fn read_body(&self, req: Request<Body>) -> Result<Vec<u8>, Response<Body>> {
        let mut body = req.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(self.json_response(
                        StatusCode::BAD_REQUEST,
                        &ClassificationResponse::failure(format!("unreadable request body: {e}")),
                    ))
                }
            };
            if bytes.len() + chunk.len() > self.max_request_bytes {
                log::warn!("Request body exceeds {} bytes, rejecting", self.max_request_bytes);
                return Err(self.json_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &ClassificationResponse::failure("request body too large"),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    fn preflight_response(&self) -> Response<Body> {
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", self.allowed_origin.as_str())
            .header("Access-Control-Allow-Methods", "POST")
            .header("Access-Control-Allow-Private-Network", "true")
            .header("Access-Control-Allow-Headers", "*")
            .header("Access-Control-Max-Age", "86400")
            .body(Body::empty())
            .unwrap()
    }

    fn json_response(&self, status: StatusCode, payload: &ClassificationResponse) -> Response<Body> {
        let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", self.allowed_origin.as_str())
            .body(Body::from(body))
            .unwrap()
    }
}

fn html_response(status: StatusCode, page: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Body::from(page))
        .unwrap()
}
