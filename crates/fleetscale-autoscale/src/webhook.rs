//! Webhook policy transport.
//!
//! The evaluator posts a `FleetAutoscaleReview` to the endpoint named by a
//! `WebhookPolicy` and reads the suggested replica count back. The HTTP
//! exchange sits behind [`WebhookCaller`] so tests can swap in canned
//! responses; [`HttpWebhookCaller`] is the real hyper-based client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use fleetscale_state::{FleetStatus, WebhookPolicy, DEFAULT_NAMESPACE};

/// Port used for service references that do not name one.
pub const DEFAULT_SERVICE_PORT: u16 = 8000;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from resolving or calling a webhook endpoint.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook policy names neither a service nor a url")]
    NoEndpoint,

    #[error("invalid webhook url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Raw HTTP result of a webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs the HTTP exchange for the webhook policy.
///
/// Implementations own the timeout; the evaluator never retries.
pub trait WebhookCaller: Send + Sync {
    fn invoke<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<WebhookResponse, WebhookError>>;
}

// ── Review payloads ───────────────────────────────────────────────

/// Envelope exchanged with the webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscaleReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<FleetAutoscaleRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<FleetAutoscaleResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscaleRequest {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub status: FleetStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscaleResponse {
    #[serde(default)]
    pub uid: String,
    /// False means "leave the fleet as it is".
    pub scale: bool,
    #[serde(default)]
    pub replicas: u32,
}

// ── Endpoint resolution ───────────────────────────────────────────

/// Resolve the URL a webhook policy points at.
///
/// Service references become `http://{name}.{namespace}.svc:{port}{path}`.
pub fn endpoint_url(policy: &WebhookPolicy) -> Result<String, WebhookError> {
    match (&policy.service, &policy.url) {
        (Some(svc), _) => {
            let namespace = svc.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
            let port = svc.port.unwrap_or(DEFAULT_SERVICE_PORT);
            let path = svc.path.as_deref().unwrap_or("");
            let path = if path.is_empty() || path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            };
            Ok(format!("http://{}.{namespace}.svc:{port}{path}", svc.name))
        }
        (None, Some(url)) => Ok(url.clone()),
        (None, None) => Err(WebhookError::NoEndpoint),
    }
}

// ── HTTP client ───────────────────────────────────────────────────

/// Plain-HTTP webhook client bounded by a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpWebhookCaller {
    timeout: Duration,
}

impl HttpWebhookCaller {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<WebhookResponse, WebhookError> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            WebhookError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        if uri.scheme_str() != Some("http") {
            return Err(WebhookError::InvalidUrl {
                url: url.to_string(),
                reason: "only http:// endpoints are supported".to_string(),
            });
        }
        let host = uri.host().ok_or_else(|| WebhookError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let address = format!("{host}:{}", uri.port_u16().unwrap_or(80));
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| WebhookError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| WebhookError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("POST")
            .uri(path)
            .header("host", address.as_str())
            .header("content-type", "application/json")
            .header("user-agent", "fleetscale-autoscale/0.1")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| WebhookError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| WebhookError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| WebhookError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_bytes();

        debug!(%url, status, bytes = body.len(), "webhook responded");
        Ok(WebhookResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl WebhookCaller for HttpWebhookCaller {
    fn invoke<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<WebhookResponse, WebhookError>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.post(url, body)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%url, "webhook call timed out");
                    Err(WebhookError::Timeout {
                        url: url.to_string(),
                        timeout: self.timeout,
                    })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_state::ServiceReference;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn service_policy(namespace: Option<&str>, path: Option<&str>) -> WebhookPolicy {
        WebhookPolicy {
            service: Some(ServiceReference {
                name: "fleetautoscaler-service".to_string(),
                namespace: namespace.map(str::to_string),
                path: path.map(str::to_string),
                port: None,
            }),
            url: None,
            min_replicas: 0,
            max_replicas: 50,
        }
    }

    #[test]
    fn service_reference_resolves_to_cluster_dns() {
        let url = endpoint_url(&service_policy(None, Some("/autoscaler"))).unwrap();
        assert_eq!(
            url,
            "http://fleetautoscaler-service.default.svc:8000/autoscaler"
        );

        let url = endpoint_url(&service_policy(Some("games"), Some("scale"))).unwrap();
        assert_eq!(url, "http://fleetautoscaler-service.games.svc:8000/scale");
    }

    #[test]
    fn url_is_used_verbatim() {
        let policy = WebhookPolicy {
            service: None,
            url: Some("http://10.0.0.5:9000/scale".to_string()),
            min_replicas: 0,
            max_replicas: 10,
        };
        assert_eq!(endpoint_url(&policy).unwrap(), "http://10.0.0.5:9000/scale");
    }

    #[test]
    fn missing_endpoint_is_an_error() {
        let policy = WebhookPolicy {
            service: None,
            url: None,
            min_replicas: 0,
            max_replicas: 10,
        };
        assert!(matches!(endpoint_url(&policy), Err(WebhookError::NoEndpoint)));
    }

    #[test]
    fn review_round_trips_camel_case() {
        let raw = r#"{"response":{"uid":"abc","scale":true,"replicas":7}}"#;
        let review: FleetAutoscaleReview = serde_json::from_str(raw).unwrap();
        let resp = review.response.unwrap();
        assert!(resp.scale);
        assert_eq!(resp.replicas, 7);
        assert!(review.request.is_none());
    }

    #[tokio::test]
    async fn http_caller_rejects_https() {
        let caller = HttpWebhookCaller::new(Duration::from_secs(1));
        let err = caller
            .invoke("https://scaler.example.com/scale", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn http_caller_reports_connection_failure() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let caller = HttpWebhookCaller::new(Duration::from_secs(2));
        let url = format!("http://{addr}/scale");
        let err = caller.invoke(&url, Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Connect { .. } | WebhookError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn http_caller_posts_and_reads_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let body = r#"{"response":{"uid":"x","scale":true,"replicas":9}}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });

        let caller = HttpWebhookCaller::new(Duration::from_secs(5));
        let url = format!("http://{addr}/scale");
        let resp = caller.invoke(&url, b"{}".to_vec()).await.unwrap();
        assert_eq!(resp.status, 200);

        let review: FleetAutoscaleReview = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(review.response.unwrap().replicas, 9);
    }
}
