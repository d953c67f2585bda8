//! Transactional request forwarding.
//!
//! # Responsibilities
//! - Run the dispatch stage (route, health gate, rewrite) for each request
//! - Forward method, headers and streamed body to the resolved backend
//! - Stream the backend response back unchanged
//! - Convert transport failures into gateway errors, never panics or hangs

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;
use tower_http::timeout::TimeoutBody;

use crate::error::GatewayError;
use crate::http::request::RequestIdExt;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::ForwardPlan;
use crate::security::headers::{set_forwarded_headers, strip_hop_by_hop};

/// Pooled HTTP/1.1 client shared by all proxied requests.
pub type HttpClient = Client<HttpConnector, Body>;

pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Fallback handler: every path without a dedicated route is proxied.
pub async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request.request_id().to_string();
    let path_and_query = path_and_query(request.uri());

    let plan = match state.routes.dispatch(&state.registry, &path_and_query) {
        Ok(plan) => plan,
        Err(err) => {
            match &err {
                GatewayError::ServiceUnavailable { service } => {
                    tracing::warn!(request_id = %request_id, service = %service, path = %path_and_query, "Rejected: service unhealthy");
                }
                _ => {
                    tracing::debug!(request_id = %request_id, path = %path_and_query, "No route matched");
                }
            }
            metrics::record_request(&method, err.status_code().as_u16(), service_label(&err), start);
            return err.into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path_and_query,
        target = %plan.target_uri(),
        "Proxying request"
    );

    match forward(&state.client, &plan, request, addr.ip(), state.upstream_timeout).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), &plan.service, start);
            response
        }
        Err(err) => {
            tracing::error!(request_id = %request_id, service = %plan.service, error = ?err, "Upstream error");
            metrics::record_request(&method, err.status_code().as_u16(), &plan.service, start);
            err.into_response()
        }
    }
}

/// Send `request` to the plan's target and return the backend's response.
///
/// `timeout` bounds the wait for response headers and then every gap between
/// body frames. A backend that goes quiet mid-body aborts the client connection.
pub async fn forward(
    client: &HttpClient,
    plan: &ForwardPlan,
    request: Request<Body>,
    client_ip: IpAddr,
    timeout: Duration,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();

    let uri: Uri = plan
        .target_uri()
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| transport_error(plan, e))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    set_forwarded_headers(&mut headers, client_ip);
    if let Some(authority) = uri.authority() {
        let host = HeaderValue::from_str(authority.as_str()).map_err(|e| transport_error(plan, e))?;
        headers.insert(header::HOST, host);
    }

    let mut upstream = Request::new(body);
    *upstream.method_mut() = parts.method;
    *upstream.uri_mut() = uri;
    *upstream.headers_mut() = headers;

    match time::timeout(timeout, client.request(upstream)).await {
        Ok(Ok(response)) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, Body::new(TimeoutBody::new(timeout, body))))
        }
        Ok(Err(e)) => Err(transport_error(plan, e)),
        Err(_) => Err(transport_error(plan, format!("no response within {timeout:?}"))),
    }
}

fn transport_error(plan: &ForwardPlan, reason: impl ToString) -> GatewayError {
    GatewayError::UpstreamTransport {
        service: plan.service.clone(),
        reason: reason.to_string(),
    }
}

pub(crate) fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn service_label(err: &GatewayError) -> &str {
    match err {
        GatewayError::ServiceUnavailable { service }
        | GatewayError::UpstreamTransport { service, .. }
        | GatewayError::UpgradeEstablishment { service, .. } => service,
        _ => "none",
    }
}
