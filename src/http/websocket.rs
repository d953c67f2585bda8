//! WebSocket tunnel for the messaging backend.
//!
//! # Responsibilities
//! - Open a WebSocket connection to the backend before upgrading the client
//! - Relay text, binary and close frames in both directions
//! - Forward non-upgrade requests on the same prefix (long-polling) as plain HTTP
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - No health gate: an unhealthy flag is logged and the connection is attempted
//! - The client is only upgraded once the backend handshake succeeded
//! - Ping/pong are answered by each side locally, never relayed
//! - Either direction ending tears down the whole tunnel

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{
        ws::{
            rejection::WebSocketUpgradeRejection, CloseFrame as ClientCloseFrame,
            Message as ClientMessage, WebSocket, WebSocketUpgrade,
        },
        ConnectInfo, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame},
        Message as UpstreamMessage,
    },
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::error::GatewayError;
use crate::http::proxy::{forward, path_and_query};
use crate::http::request::RequestIdExt;
use crate::http::server::AppState;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::ForwardPlan;
use crate::security::headers::X_FORWARDED_FOR;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client headers carried over to the backend handshake.
const FORWARDED_HANDSHAKE_HEADERS: [HeaderName; 5] = [
    header::COOKIE,
    header::AUTHORIZATION,
    header::USER_AGENT,
    header::ORIGIN,
    header::SEC_WEBSOCKET_PROTOCOL,
];

/// Handler for every path under the upgrade prefix.
pub async fn upgrade_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let service = state.upgrade_service.clone();
    let request_id = request.request_id().to_string();
    let path_and_query = path_and_query(request.uri());

    let Some(base_url) = state.registry.base_url(&service).map(str::to_string) else {
        tracing::error!(service = %service, "Upgrade target is not registered");
        return GatewayError::ServiceUnavailable { service }.into_response();
    };

    let plan = ForwardPlan {
        service,
        base_url,
        path_and_query,
    };

    match ws {
        Ok(ws) => match open_tunnel(&state, ws, request.headers(), addr, &plan).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(request_id = %request_id, service = %plan.service, error = ?err, "WebSocket proxy error");
                err.into_response()
            }
        },
        Err(_) => {
            let method = request.method().to_string();
            let outcome = forward(&state.client, &plan, request, addr.ip(), state.upgrade_timeout).await;
            let response = outcome.unwrap_or_else(|err| {
                tracing::error!(request_id = %request_id, service = %plan.service, error = ?err, "Polling request failed");
                err.into_response()
            });
            metrics::record_request(&method, response.status().as_u16(), &plan.service, start);
            response
        }
    }
}

/// Connect to the backend, then upgrade the client and start relaying.
async fn open_tunnel(
    state: &AppState,
    ws: WebSocketUpgrade,
    headers: &HeaderMap,
    client: SocketAddr,
    plan: &ForwardPlan,
) -> Result<Response, GatewayError> {
    let establishment_error = |reason: String| GatewayError::UpgradeEstablishment {
        service: plan.service.clone(),
        reason,
    };

    if !state.registry.is_healthy(&plan.service) {
        tracing::warn!(service = %plan.service, "Service flagged unhealthy, attempting upgrade anyway");
    }

    let target = websocket_url(&plan.base_url, &plan.path_and_query)
        .map_err(|e| establishment_error(e.to_string()))?;
    let mut upstream_request = target
        .as_str()
        .into_client_request()
        .map_err(|e| establishment_error(e.to_string()))?;

    let upstream_headers = upstream_request.headers_mut();
    for name in FORWARDED_HANDSHAKE_HEADERS {
        if let Some(value) = headers.get(&name) {
            upstream_headers.insert(name, value.clone());
        }
    }
    if let Ok(value) = HeaderValue::from_str(&client.ip().to_string()) {
        upstream_headers.insert(X_FORWARDED_FOR, value);
    }

    let (upstream, handshake) = match time::timeout(state.upgrade_timeout, connect_async(upstream_request)).await {
        Ok(Ok(connected)) => connected,
        Ok(Err(e)) => return Err(establishment_error(e.to_string())),
        Err(_) => {
            return Err(establishment_error(format!(
                "handshake not completed within {:?}",
                state.upgrade_timeout
            )))
        }
    };

    tracing::info!(service = %plan.service, client = %client, path = %plan.path_and_query, "WebSocket tunnel established");

    let subprotocol = handshake
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ws = match subprotocol {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };

    let shutdown = state.shutdown.clone();
    let service = plan.service.clone();
    Ok(ws
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "Client upgrade failed"))
        .on_upgrade(move |socket| relay(socket, upstream, shutdown, service)))
}

/// `ws://` (or `wss://`) URL for the backend with the request's path and query.
fn websocket_url(base_url: &str, path_and_query: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base_url)?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    // special-scheme swap, cannot fail
    let _ = base.set_scheme(scheme);
    Url::parse(&format!("{}{}", base.as_str().trim_end_matches('/'), path_and_query))
}

async fn relay(client: WebSocket, upstream: UpstreamSocket, mut shutdown: ShutdownSignal, service: String) {
    metrics::tunnel_opened();
    let opened = Instant::now();

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(message) = client_rx.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(error = %e, "Client read failed");
                    break;
                }
            };
            let Some(message) = to_upstream(message) else { continue };
            let closing = message.is_close();
            if let Err(e) = upstream_tx.send(message).await {
                tracing::debug!(error = %e, "Backend write failed");
                return;
            }
            if closing {
                return;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(message) = upstream_rx.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(error = %e, "Backend read failed");
                    break;
                }
            };
            let Some(message) = to_client(message) else { continue };
            let closing = matches!(message, ClientMessage::Close(_));
            if let Err(e) = client_tx.send(message).await {
                tracing::debug!(error = %e, "Client write failed");
                return;
            }
            if closing {
                return;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => tracing::debug!(service = %service, "Client side of tunnel ended"),
        _ = upstream_to_client => tracing::debug!(service = %service, "Backend side of tunnel ended"),
        _ = shutdown.recv() => tracing::info!(service = %service, "Closing tunnel for shutdown"),
    }

    metrics::tunnel_closed();
    tracing::info!(service = %service, duration = ?opened.elapsed(), "WebSocket tunnel closed");
}

fn to_upstream(message: ClientMessage) -> Option<UpstreamMessage> {
    match message {
        ClientMessage::Text(text) => Some(UpstreamMessage::Text(text.as_str().to_owned().into())),
        ClientMessage::Binary(data) => Some(UpstreamMessage::Binary(data)),
        ClientMessage::Close(frame) => Some(UpstreamMessage::Close(frame.map(|frame| {
            UpstreamCloseFrame {
                code: CloseCode::from(frame.code),
                reason: frame.reason.as_str().to_owned().into(),
            }
        }))),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => None,
    }
}

fn to_client(message: UpstreamMessage) -> Option<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text.as_str().to_owned().into())),
        UpstreamMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|frame| {
            ClientCloseFrame {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned().into(),
            }
        }))),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => None,
    }
}
