use super::SendError;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

const AUTH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-auth-token");

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Applied to every request, including identity-independent lookups.
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            connection_timeout: Duration::from_secs(10),
            user_agent: format!("openstack-telemetry-forwarder/{}", env!("CARGO_PKG_VERSION")),
            enable_compression: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl ClientStats {
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ConnectionStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        ConnectionStats {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

/// A request ready to be dispatched: method, absolute URL, optional query
/// pairs (sent in the given order) and optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn put(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::PUT,
            url: url.into(),
            query: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn get(url: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query,
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Thin wrapper over a pooled reqwest client that classifies responses
/// into the outcomes the sender reacts to.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
    stats: Arc<ClientStats>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, SendError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .gzip(config.enable_compression)
            .build()?;

        Ok(Self {
            client,
            config,
            stats: Arc::new(ClientStats::default()),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn build_headers(&self, token: Option<&str>) -> Result<HeaderMap, SendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(token)
                .map_err(|e| SendError::InvalidHeaderValue(format!("Invalid auth token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTH_TOKEN_HEADER, value);
        }

        Ok(headers)
    }

    /// Performs `request`; 2xx is `Ok`, 401/404/other statuses and
    /// timeouts come back as the matching `SendError`.
    pub async fn perform(
        &self,
        request: &PreparedRequest,
        token: Option<&str>,
    ) -> Result<TransportResponse, SendError> {
        debug!(
            method = %request.method,
            url = %request.url,
            payload = request.body.as_deref().unwrap_or(""),
            "Performing request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(self.build_headers(token)?);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let outcome = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        let (status, body) = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.stats.record_request(false, start.elapsed());
                if e.is_timeout() {
                    return Err(SendError::Timeout {
                        url: request.url.clone(),
                    });
                }
                return Err(SendError::Network(e));
            }
        };

        self.stats.record_request(status.is_success(), start.elapsed());
        debug!(
            status = status.as_u16(),
            reason = status.canonical_reason().unwrap_or("unknown"),
            body = %body,
            "Request result"
        );

        classify(status, &request.url, body)
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.stats.snapshot()
    }
}

fn classify(status: StatusCode, url: &str, body: String) -> Result<TransportResponse, SendError> {
    if status.is_success() {
        return Ok(TransportResponse {
            status: status.as_u16(),
            body,
        });
    }

    let url = url.to_string();
    Err(match status {
        StatusCode::UNAUTHORIZED => SendError::Unauthorized { url },
        StatusCode::NOT_FOUND => SendError::NotFound { url, body },
        _ => SendError::Http {
            status: status.as_u16(),
            url,
            body,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert!(classify(StatusCode::CREATED, "u", String::new()).is_ok());
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "u", String::new()),
            Err(SendError::Unauthorized { .. })
        ));
        assert!(classify(StatusCode::NOT_FOUND, "u", String::new())
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            classify(StatusCode::BAD_GATEWAY, "u", "down".into())
                .unwrap_err()
                .status(),
            Some(502)
        );
    }

    #[test]
    fn test_token_header_omitted_when_empty() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();

        let headers = transport.build_headers(Some("")).unwrap();
        assert!(headers.get(AUTH_TOKEN_HEADER).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

        let headers = transport.build_headers(Some("abc")).unwrap();
        assert_eq!(headers.get(AUTH_TOKEN_HEADER).unwrap(), "abc");
    }
}
