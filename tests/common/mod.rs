//! Shared mock backends and gateway harness for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_gateway::config::{GatewayConfig, ServiceConfig};
use api_gateway::health::ServiceRegistry;
use api_gateway::{HttpServer, Shutdown};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as WsRequest, Response as WsResponse};
use tokio_tungstenite::tungstenite::Message;

/// HTTP backend that echoes what it received and counts proxied calls.
#[derive(Clone)]
pub struct MockService {
    pub addr: SocketAddr,
    /// Requests received, excluding health probes.
    pub hits: Arc<AtomicU32>,
    pub healthy: Arc<AtomicBool>,
}

impl MockService {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

pub async fn spawn_service_backend(name: &'static str) -> MockService {
    let service = MockService {
        addr: "127.0.0.1:0".parse().unwrap(),
        hits: Arc::new(AtomicU32::new(0)),
        healthy: Arc::new(AtomicBool::new(true)),
    };

    let router = Router::new()
        .route(
            "/health",
            get(|State((_, service)): State<(&'static str, MockService)>| async move {
                if service.healthy.load(Ordering::SeqCst) {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        )
        .fallback(echo)
        .with_state((name, service.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    MockService { addr, ..service }
}

async fn echo(State((name, service)): State<(&'static str, MockService)>, request: Request) -> Json<Value> {
    service.hits.fetch_add(1, Ordering::SeqCst);

    let header = |headers: &HeaderMap, name: &str| {
        headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    };
    let headers = request.headers().clone();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let delay_ms = query
        .as_deref()
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("delay_ms="))
        .and_then(|ms| ms.parse::<u64>().ok());
    if let Some(ms) = delay_ms {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap_or_default();

    Json(json!({
        "service": name,
        "method": method,
        "path": path,
        "query": query,
        "host": header(&headers, "host"),
        "forwardedFor": header(&headers, "x-forwarded-for"),
        "requestId": header(&headers, "x-request-id"),
        "body": String::from_utf8_lossy(&body),
    }))
}

/// TCP backend that reads the request and drops the connection without answering.
pub async fn spawn_aborting_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        drop(socket);
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// TCP backend that sends headers promising 100 bytes, writes five, then goes quiet.
pub async fn spawn_stalling_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
                    .await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });
    addr
}

type Rooms = Arc<Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<String>)>>>>;

/// WebSocket chat server with rooms.
///
/// Text protocol, JSON per message:
/// - `{"type":"join","room":R}` answered with `{"type":"joined","room":R}`
/// - `{"type":"send","room":R,"text":T}` delivered to every other member as
///   `{"type":"message","room":R,"text":T}`
///
/// A `chat.v1` subprotocol offer is accepted.
pub async fn spawn_room_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rooms: Rooms = Arc::default();

    tokio::spawn(async move {
        let mut next_id = 0u64;
        while let Ok((stream, _)) = listener.accept().await {
            next_id += 1;
            tokio::spawn(serve_room_client(stream, next_id, rooms.clone()));
        }
    });
    addr
}

async fn serve_room_client(stream: tokio::net::TcpStream, id: u64, rooms: Rooms) {
    let select_protocol = |request: &WsRequest, mut response: WsResponse| -> Result<WsResponse, ErrorResponse> {
        let offered = request
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if offered.split(',').any(|p| p.trim() == "chat.v1") {
            response
                .headers_mut()
                .insert("sec-websocket-protocol", "chat.v1".parse().unwrap());
        }
        Ok(response)
    };
    let Ok(socket) = tokio_tungstenite::accept_hdr_async(stream, select_protocol).await else {
        return;
    };
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(event) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let room = event["room"].as_str().unwrap_or_default().to_string();

        match event["type"].as_str() {
            Some("join") => {
                rooms
                    .lock()
                    .unwrap()
                    .entry(room.clone())
                    .or_default()
                    .push((id, tx.clone()));
                let _ = tx.send(json!({"type": "joined", "room": room}).to_string());
            }
            Some("send") => {
                let payload = json!({"type": "message", "room": room, "text": event["text"]}).to_string();
                let rooms = rooms.lock().unwrap();
                for (member, member_tx) in rooms.get(&room).into_iter().flatten() {
                    if *member != id {
                        let _ = member_tx.send(payload.clone());
                    }
                }
            }
            _ => {}
        }
    }

    for members in rooms.lock().unwrap().values_mut() {
        members.retain(|(member, _)| *member != id);
    }
    drop(tx);
    let _ = writer.await;
}

/// Default config with every service pointed at `base_urls` (by name) and
/// background probing off unless a test turns it on.
pub fn gateway_config(base_urls: &[(&str, String)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.health_check.enabled = false;
    config.services = config
        .services
        .iter()
        .map(|service| {
            let url = base_urls
                .iter()
                .find(|(name, _)| *name == service.name)
                .map(|(_, url)| url.clone())
                .unwrap_or_else(|| service.base_url.clone());
            ServiceConfig::new(service.name.clone(), url)
        })
        .collect();
    config
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    pub registry: Arc<ServiceRegistry>,
    pub shutdown: Shutdown,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let server = HttpServer::new(config).expect("valid gateway config");
    let registry = server.registry();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    RunningGateway {
        addr,
        registry,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
