//! # Stage: Webhook Server
//!
//! ## Responsibility
//! Minimal HTTP/1.1 surface over an [`ImprovementLoop`]:
//!
//! | Route | Response |
//! |---|---|
//! | `POST /observe` | records the JSON body as an outcome; `201 {"id", "issue"}` |
//! | `GET /health` | `200 {"health_score"}` |
//! | `GET /patterns` | runs a cycle; `200 {"health_score", "patterns"}` |
//! | anything else | `404` |
//!
//! One request per connection (`Connection: close`). Request heads are parsed
//! with `httparse`; bodies are read up to `Content-Length`.
//!
//! ## NOT Responsible For
//! - TLS, keep-alive, chunked bodies or authentication

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::cycle::ImprovementLoop;
use crate::error::{Result, RsiError};
use crate::types::Outcome;

const MAX_HEADERS: usize = 32;
const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// A JSON response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn json(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn error(status: u16, detail: impl std::fmt::Display) -> Self {
        Self::json(status, json!({ "error": detail.to_string() }))
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            413 => "Payload Too Large",
            _ => "Internal Server Error",
        }
    }

    /// Serialize as a complete HTTP/1.1 response.
    pub fn to_http(&self) -> Vec<u8> {
        let body = self.body.to_string();
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            body.len(),
            body
        )
        .into_bytes()
    }
}

impl From<RsiError> for Response {
    fn from(e: RsiError) -> Self {
        match e {
            RsiError::Http { status, detail } => Response::error(status, detail),
            RsiError::Json { .. } => Response::error(400, e),
            RsiError::CycleInProgress => Response::error(409, e),
            other => Response::error(500, other),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a request head. `Ok(None)` means more bytes are needed. On success
/// returns the request (without body), the head length and the declared
/// content length.
pub fn parse_head(buf: &[u8]) -> Result<Option<(Request, usize, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(RsiError::Http { status: 400, detail: format!("malformed request: {}", e) }),
    };

    let content_length = match req.headers.iter().find(|h| h.name.eq_ignore_ascii_case("content-length")) {
        Some(h) => std::str::from_utf8(h.value)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| RsiError::Http { status: 400, detail: "invalid Content-Length".into() })?,
        None => 0,
    };

    let path = req.path.unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path).to_string();
    let request = Request { method: req.method.unwrap_or("GET").to_string(), path, body: Vec::new() };
    Ok(Some((request, head_len, content_length)))
}

async fn read_request(stream: &mut TcpStream) -> Result<Request> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let (mut request, head_len, content_length) = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| RsiError::Http { status: 400, detail: format!("read failed: {}", e) })?;
        if n == 0 {
            return Err(RsiError::Http { status: 400, detail: "connection closed mid-request".into() });
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(parsed) = parse_head(&buf)? {
            break parsed;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RsiError::Http { status: 400, detail: "request head too large".into() });
        }
    };

    if content_length > MAX_BODY_BYTES {
        return Err(RsiError::Http { status: 413, detail: format!("body exceeds {} bytes", MAX_BODY_BYTES) });
    }

    let mut body = buf.split_off(head_len);
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| RsiError::Http { status: 400, detail: format!("read failed: {}", e) })?;
        if n == 0 {
            return Err(RsiError::Http { status: 400, detail: "body shorter than Content-Length".into() });
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;
    Ok(request)
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Dispatch one request against the loop. Blocking: runs store I/O and, for
/// `/patterns`, a full cycle.
pub fn route(rsi: &ImprovementLoop, request: &Request) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/observe") => observe(rsi, &request.body).unwrap_or_else(Response::from),
        ("GET", "/health") => match rsi.health_score() {
            Ok(score) => Response::json(200, json!({ "health_score": score })),
            Err(e) => e.into(),
        },
        ("GET", "/patterns") => match rsi.run_cycle() {
            Ok(report) => Response::json(
                200,
                json!({ "health_score": report.health, "patterns": report.patterns }),
            ),
            Err(e) => e.into(),
        },
        _ => Response::error(404, "not found"),
    }
}

fn observe(rsi: &ImprovementLoop, body: &[u8]) -> Result<Response> {
    let outcome: Outcome = serde_json::from_slice(body).map_err(|e| RsiError::json("request body", e))?;
    let recorded = rsi.observer().record(outcome)?;
    Ok(Response::json(201, json!({ "id": recorded.id, "issue": recorded.issue })))
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Bind `addr` and serve until the task is cancelled.
pub async fn serve(addr: &str, rsi: Arc<ImprovementLoop>) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| RsiError::io(addr, e))?;
    serve_listener(listener, rsi).await
}

/// Serve connections from an already-bound listener.
pub async fn serve_listener(listener: TcpListener, rsi: Arc<ImprovementLoop>) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!(target: "rsi_loop::webhook", addr = %local, "webhook listening");
    }
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| RsiError::io("webhook listener", e))?;
        let rsi = Arc::clone(&rsi);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, rsi).await {
                warn!(target: "rsi_loop::webhook", peer = %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, rsi: Arc<ImprovementLoop>) -> Result<()> {
    let response = match read_request(&mut stream).await {
        Ok(request) => {
            let (method, path) = (request.method.clone(), request.path.clone());
            let response = tokio::task::spawn_blocking(move || route(&rsi, &request))
                .await
                .unwrap_or_else(|e| Response::from(RsiError::from(e)));
            debug!(
                target: "rsi_loop::webhook",
                method = %method,
                path = %path,
                status = response.status,
                "request served"
            );
            response
        }
        Err(e) => Response::from(e),
    };
    stream
        .write_all(&response.to_http())
        .await
        .map_err(|e| RsiError::io("webhook connection", e))?;
    stream.shutdown().await.map_err(|e| RsiError::io("webhook connection", e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
