//! HTTP client for the routing backend.
//!
//! Posts route requests to the backend's `/route` endpoint and maps its
//! failures onto [`RoutingError`]:
//! - Connection pooling and keep-alive for repeated re-route requests
//! - Per-request timeout (default 15s)
//! - No automatic retry on 429; the re-route cooldown governs backoff

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use log::{debug, info, warn};
use reqwest::Client;

use crate::routing::{BackendErrorBody, RouteProvider, RouteRequest, RouteResponse, RoutingError};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const ROUTE_PATH: &str = "route";

/// Routing backend client.
#[derive(Debug, Clone)]
pub struct RoutingClient {
    client: Client,
    endpoint: String,
}

impl RoutingClient {
    /// Create a client for the backend at `base_url` with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, RoutingError> {
        Self::with_timeout(base_url, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .map_err(|e| RoutingError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: route_endpoint(base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request a route.
    pub async fn calculate(&self, request: &RouteRequest) -> Result<RouteResponse, RoutingError> {
        Self::send(&self.client, &self.endpoint, request).await
    }

    async fn send(client: &Client, url: &str, request: &RouteRequest) -> Result<RouteResponse, RoutingError> {
        let req_start = Instant::now();

        // Phase 1: Send request, receive headers
        let response = client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let headers_elapsed = req_start.elapsed();
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("[RoutingClient] 429 Too Many Requests after {:?}", headers_elapsed);
            return Err(RoutingError::RateLimited);
        }

        // Phase 2: Download response body
        let bytes = response.bytes().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let body: BackendErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
            let error = RoutingError::from_backend(status.as_u16(), &body);
            warn!("[RoutingClient] HTTP {} after {:?}: {}", status, headers_elapsed, error);
            return Err(error);
        }

        // Phase 3: JSON deserialization
        let route: RouteResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RoutingError::InvalidResponse(format!("JSON parse error: {}", e)))?;

        info!(
            "[RoutingClient] Route {:.0}m / {:.0}s, {} points, {} warnings in {:?} ({:.1}KB)",
            route.distance,
            route.duration,
            route.geometry.coordinates.len(),
            route.warnings.len(),
            req_start.elapsed(),
            bytes.len() as f64 / 1024.0
        );

        Ok(route)
    }
}

impl RouteProvider for RoutingClient {
    fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, Result<RouteResponse, RoutingError>> {
        let client = self.client.clone();
        let url = self.endpoint.clone();
        debug!(
            "[RoutingClient] Requesting {:?} route from ({:.5}, {:.5})",
            request.profile, request.origin.longitude, request.origin.latitude
        );
        Box::pin(async move { Self::send(&client, &url, &request).await })
    }
}

fn map_transport_error(e: reqwest::Error) -> RoutingError {
    if e.is_timeout() {
        RoutingError::Timeout
    } else {
        RoutingError::Network(e.to_string())
    }
}

fn route_endpoint(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), ROUTE_PATH)
}
