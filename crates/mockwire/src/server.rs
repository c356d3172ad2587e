//! Minimal HTTP/1 host around a [`Dispatcher`].

use crate::dispatch::Dispatcher;
use crate::error::MappingError;
use crate::mapping::{Mapping, ProvidedResponse, ResponseMessage, StaticResponse};
use crate::matchers::Matcher;
use crate::metrics::gather_metrics;
use crate::request::{RequestMatcher, RequestMessage};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Paths under this prefix go to the internal admin mappings.
pub const ADMIN_PREFIX: &str = "/__admin";

/// Register the built-in admin endpoints (health, metrics).
pub fn register_admin_mappings(dispatcher: &Dispatcher) -> Result<(), MappingError> {
    let health = Mapping::builder()
        .title("admin health")
        .admin()
        .given(
            RequestMatcher::new()
                .with_path(Matcher::exact(format!("{ADMIN_PREFIX}/health")))
                .using_get(),
        )
        .respond_with(StaticResponse::json(
            200,
            &serde_json::json!({"status": "healthy"}),
        ))
        .build()?;

    let metrics = Mapping::builder()
        .title("admin metrics")
        .admin()
        .given(
            RequestMatcher::new()
                .with_path(Matcher::exact(format!("{ADMIN_PREFIX}/metrics")))
                .using_get(),
        )
        .respond_with(|_: &Mapping, _: &RequestMessage| {
            ProvidedResponse::from(
                ResponseMessage::ok()
                    .with_header("Content-Type", "text/plain; version=0.0.4")
                    .with_body(gather_metrics()),
            )
        })
        .build()?;

    dispatcher.add_mapping(health);
    dispatcher.add_mapping(metrics);
    Ok(())
}

/// Convert a hyper request into the engine's request form.
pub async fn to_request_message<B>(
    req: Request<B>,
    client_addr: SocketAddr,
) -> Result<RequestMessage, String>
where
    B: Body,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let host = parts
        .headers
        .get(hyper::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let url = format!("http://{host}{path_and_query}");
    let mut message = RequestMessage::new(parts.method.as_str(), &url)
        .with_client_ip(client_addr.ip().to_string());
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => message = message.with_header(name.as_str(), value),
            Err(_) => debug!("Skipping non-text header {}", name),
        }
    }

    let bytes = body
        .collect()
        .await
        .map_err(|e| format!("Failed to read request body: {e}"))?
        .to_bytes();
    Ok(message.with_body(bytes.to_vec()))
}

pub fn to_hyper_response(response: ResponseMessage) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Full::new(Bytes::from("Invalid response headers")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    dispatcher: Arc<Dispatcher>,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let message = match to_request_message(req, client_addr).await {
        Ok(message) => message,
        Err(e) => {
            warn!("{}", e);
            return Ok(to_hyper_response(ResponseMessage::new(400).with_body(e)));
        }
    };

    let admin = message
        .path
        .starts_with(ADMIN_PREFIX)
        .then(|| dispatcher.dispatch_admin(&message))
        .flatten();
    let response = match admin {
        Some(result) => result.response,
        None => dispatcher.dispatch(&message).response,
    };
    Ok(to_hyper_response(response))
}

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let local_addr = listener.local_addr()?;
    info!("Listening on {}", local_addr);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let dispatcher = Arc::clone(&dispatcher);
                                async move { handle_request(req, dispatcher, addr).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on {}: {}", local_addr, e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Server on {} shutting down", local_addr);
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.1.2.3:5555".parse().unwrap()
    }

    #[tokio::test]
    async fn test_to_request_message() {
        let req = Request::builder()
            .method("POST")
            .uri("/orders?id=7")
            .header("Host", "api.local:9091")
            .header("Cookie", "session=abc")
            .body(Full::new(Bytes::from(r#"{"qty": 2}"#)))
            .unwrap();

        let message = to_request_message(req, addr()).await.unwrap();
        assert_eq!(message.method, "POST");
        assert_eq!(message.url, "http://api.local:9091/orders?id=7");
        assert_eq!(message.path, "/orders");
        assert_eq!(message.query["id"], vec!["7"]);
        assert_eq!(message.cookies["session"], "abc");
        assert_eq!(message.client_ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(
            message.body.unwrap().json,
            Some(serde_json::json!({"qty": 2}))
        );
    }

    #[test]
    fn test_to_hyper_response() {
        let response = to_hyper_response(ResponseMessage::no_match());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "application/json");

        let invalid = to_hyper_response(ResponseMessage::new(42));
        assert_eq!(invalid.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_admin_mappings_registered() {
        let dispatcher = Dispatcher::default();
        register_admin_mappings(&dispatcher).unwrap();
        assert!(dispatcher.export_mappings().is_empty());

        let health = dispatcher
            .dispatch_admin(&RequestMessage::new("GET", "/__admin/health"))
            .unwrap();
        assert_eq!(health.response.status_code, 200);

        let metrics = dispatcher
            .dispatch_admin(&RequestMessage::new("GET", "/__admin/metrics"))
            .unwrap();
        assert!(metrics.response.body_text().unwrap().contains("mockwire_mappings"));
    }
}
