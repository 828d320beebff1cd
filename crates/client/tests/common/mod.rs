//! In-process fake dispatch server for integration tests.
//!
//! Serves every path from one handler that records the request and
//! answers with the next scripted [`Reply`], falling back to a default
//! reply once the script runs out.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use depot_client::{ClientConfig, DispatchClient, RetryPolicy};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, &'static str),
}

/// A request as seen by the fake server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Value,
    pub authorization: Option<String>,
    pub at: Instant,
}

pub struct ServerState {
    script: Mutex<VecDeque<Reply>>,
    default_reply: Reply,
    requests: Mutex<Vec<Recorded>>,
}

pub struct FakeServer {
    pub port: u16,
    state: Arc<ServerState>,
}

impl FakeServer {
    /// Start a server that answers with `script` in order, then `default_reply`.
    pub async fn start(script: Vec<Reply>, default_reply: Reply) -> Self {
        let state = Arc::new(ServerState {
            script: Mutex::new(script.into()),
            default_reply,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { port, state }
    }

    /// Server that always answers with `reply`.
    pub async fn always(reply: Reply) -> Self {
        Self::start(Vec::new(), reply).await
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("http://127.0.0.1")
            .with_port(self.port)
            .with_retry(fast_retry())
    }

    pub fn client(&self) -> DispatchClient {
        DispatchClient::new(self.config()).unwrap()
    }
}

/// Default retry policy with a millisecond-scale backoff factor.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        backoff_factor: Duration::from_millis(20),
        ..Default::default()
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state.requests.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        body,
        authorization,
        at: Instant::now(),
    });

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| state.default_reply.clone());

    match reply {
        Reply::Json(status, value) => (code(status), Json(value)).into_response(),
        Reply::Text(status, text) => (code(status), text).into_response(),
    }
}

fn code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap()
}

// ---------------------------------------------------------------------------
// Raw HTTP/1.1 servers
// ---------------------------------------------------------------------------

const SELF_SIGNED_CERT: &[u8] = include_bytes!("../fixtures/self_signed_cert.pem");
const SELF_SIGNED_KEY: &[u8] = include_bytes!("../fixtures/self_signed_key.pem");

/// Build a raw HTTP/1.1 response with a correct `Content-Length`.
pub fn raw_response(status_line: &str, body: &str) -> String {
    format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

/// Hand-written HTTP/1.1 server answering every request with the same
/// bytes, optionally behind TLS with a self-signed certificate.
///
/// Connections stay open between requests so pooling is observable
/// through [`RawServer::connections`].
pub struct RawServer {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    tls_sessions: Arc<AtomicUsize>,
}

impl RawServer {
    pub async fn plain(response: String) -> Self {
        Self::start(response, None).await
    }

    pub async fn tls(response: String) -> Self {
        Self::start(response, Some(tls_acceptor())).await
    }

    async fn start(response: String, acceptor: Option<tokio_rustls::TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let tls_sessions = Arc::new(AtomicUsize::new(0));

        let accepted = connections.clone();
        let negotiated = tls_sessions.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                match &acceptor {
                    Some(acceptor) => {
                        let acceptor = acceptor.clone();
                        let negotiated = negotiated.clone();
                        tokio::spawn(async move {
                            if let Ok(tls) = acceptor.accept(stream).await {
                                negotiated.fetch_add(1, Ordering::SeqCst);
                                serve_raw(tls, response).await;
                            }
                        });
                    }
                    None => {
                        tokio::spawn(serve_raw(stream, response));
                    }
                }
            }
        });

        Self {
            port,
            connections,
            tls_sessions,
        }
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// TLS handshakes completed so far.
    pub fn tls_sessions(&self) -> usize {
        self.tls_sessions.load(Ordering::SeqCst)
    }
}

fn tls_acceptor() -> tokio_rustls::TlsAcceptor {
    let certs = CertificateDer::pem_slice_iter(SELF_SIGNED_CERT)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = PrivateKeyDer::from_pem_slice(SELF_SIGNED_KEY).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();

    tokio_rustls::TlsAcceptor::from(Arc::new(config))
}

async fn serve_raw<S>(mut stream: S, response: String)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while read_request(&mut stream).await {
        if stream.write_all(response.as_bytes()).await.is_err() {
            break;
        }
        if stream.flush().await.is_err() {
            break;
        }
    }
}

/// Read one request (head plus `Content-Length` body). `false` on EOF.
async fn read_request<S>(stream: &mut S) -> bool
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    true
}
