use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::aggregator::{Aggregator, IngestAck};
use crate::publisher::Publisher;
use crate::record::PacketRecord;

/// How long shutdown waits for accepted connections to finish their in-flight
/// requests before abandoning them.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// A validated request: what the caller asked the relay to do.
enum IngestRequest {
    /// POST /v1/packets, raw body still to be parsed.
    Packet(Bytes),
    /// GET /healthz liveness probe.
    Health,
}

/// Validate the incoming request: route, method, and body.
async fn validate<B>(req: Request<B>) -> Result<IngestRequest, (StatusCode, String)>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    match path.as_str() {
        "/v1/packets" if method == Method::POST => {
            let body = req.collect().await.map(|c| c.to_bytes()).map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("POST {path} — failed to read body"),
                )
            })?;
            Ok(IngestRequest::Packet(body))
        }
        "/healthz" if method == Method::GET => Ok(IngestRequest::Health),
        "/v1/packets" | "/healthz" => Err((
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{method} {path}"),
        )),
        _ => Err((StatusCode::NOT_FOUND, format!("unknown path: {path}"))),
    }
}

fn ack_response(ack: IngestAck) -> Response<Full<Bytes>> {
    match ack {
        IngestAck::Buffered { pending } => json_response(
            StatusCode::OK,
            json!({ "status": "buffered", "pending": pending }),
        ),
        IngestAck::Flushed { sent, pending } => json_response(
            StatusCode::OK,
            json!({ "status": "flushed", "sent": sent, "pending": pending }),
        ),
        // The record itself is safe in the buffer; the 502 reports the batch
        // that was lost trying to make room for it.
        IngestAck::PublishFailed { dropped } => json_response(
            StatusCode::BAD_GATEWAY,
            json!({ "status": "publish_failed", "dropped": dropped }),
        ),
    }
}

async fn handle<B, P>(
    req: Request<B>,
    aggregator: Arc<Aggregator<P>>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    P: Publisher,
{
    let request = match validate(req).await {
        Ok(request) => request,
        Err((status, reason)) => {
            tracing::warn!(reason, "ingest request rejected");
            return Ok(json_response(status, json!({ "error": reason })));
        }
    };

    match request {
        IngestRequest::Health => Ok(json_response(StatusCode::OK, json!({ "status": "ok" }))),
        IngestRequest::Packet(body) => {
            let record = match PacketRecord::parse(&body) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "rejected malformed packet record");
                    return Ok(json_response(
                        StatusCode::BAD_REQUEST,
                        json!({ "error": e.to_string() }),
                    ));
                }
            };

            let ack = aggregator.on_ingest(record).await;
            Ok(ack_response(ack))
        }
    }
}

pub async fn serve<P: Publisher>(
    listener: TcpListener,
    aggregator: Arc<Aggregator<P>>,
    cancel: CancellationToken,
) {
    let connections = TaskTracker::new();
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = result.expect("failed to accept connection");
                let aggregator = Arc::clone(&aggregator);
                let cancel = cancel.clone();
                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let aggregator = Arc::clone(&aggregator);
                        handle(req, aggregator)
                    });
                    let builder = Builder::new(hyper_util::rt::TokioExecutor::new());
                    let conn = builder.serve_connection(TokioIo::new(stream), service);
                    tokio::pin!(conn);
                    tokio::select! {
                        result = conn.as_mut() => {
                            let _ = result;
                        }
                        _ = cancel.cancelled() => {
                            // Idle keep-alive connections close now; a request
                            // already in flight runs to completion, so its
                            // record reaches the buffer before any final drain.
                            conn.as_mut().graceful_shutdown();
                            let _ = conn.as_mut().await;
                        }
                    }
                });
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    connections.close();
    if tokio::time::timeout(DRAIN_GRACE, connections.wait())
        .await
        .is_err()
    {
        tracing::warn!("open connections did not drain before shutdown");
    }
}
