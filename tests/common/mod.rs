#![allow(dead_code)]

use openstack_telemetry_forwarder::identity::{AuthError, IdentityClient, UrlType};
use openstack_telemetry_forwarder::reliability::RetryPolicy;
use openstack_telemetry_forwarder::sender::{
    AuthenticatedSender, Backend, HttpTransport, TransportConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Identity fake handing out `token-1`, `token-2`, ... and a fixed endpoint
/// for every service.
#[derive(Clone)]
pub struct CountingIdentity {
    endpoint: String,
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingIdentity {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
        }
    }

    /// Makes every authentication take `delay`, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl IdentityClient for CountingIdentity {
    async fn authenticate(&self) -> Result<String, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::InvalidResponse {
                message: "identity service answered 401 Unauthorized".to_string(),
                body: Some(r#"{"error":{"code":401}}"#.to_string()),
            });
        }
        Ok(format!("token-{call}"))
    }

    fn service_endpoint(&self, _service: &str, _url_type: UrlType) -> Result<String, AuthError> {
        Ok(self.endpoint.clone())
    }
}

pub fn transport(timeout: Duration) -> HttpTransport {
    HttpTransport::new(TransportConfig {
        timeout,
        ..TransportConfig::default()
    })
    .unwrap()
}

pub fn sender<B: Backend>(
    backend: B,
    identity: CountingIdentity,
) -> AuthenticatedSender<B, CountingIdentity> {
    AuthenticatedSender::new(
        backend,
        identity,
        transport(Duration::from_millis(500)),
        UrlType::Internal,
        RetryPolicy::fixed(Duration::from_millis(10)),
    )
}
