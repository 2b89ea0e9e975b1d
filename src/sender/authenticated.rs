use super::backend::{Backend, RequestContext, SendOptions};
use super::{HttpTransport, SendError};
use crate::identity::{AuthError, IdentityClient, UrlType};
use crate::reliability::RetryPolicy;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotAuthenticated,
    MissingEndpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { status: u16 },
    /// Nothing was sent; the payload is lost.
    Dropped(DropReason),
    /// The backend decided there was nothing to send.
    Skipped,
}

#[derive(Debug)]
struct AuthState {
    token: Option<String>,
    endpoint: Option<String>,
    /// Only used to keep repeated auth failures out of the error log.
    last_auth_failed: bool,
    phase: AuthPhase,
}

/// Owns the token lifecycle and the request/recovery algorithm shared by
/// every backend.
///
/// `state` is only written while `auth_lock` is held; readers take the
/// short read lock without it. A token may be replaced by another task
/// while a request using the old one is in flight; tokens are
/// interchangeable so that is harmless.
pub struct AuthenticatedSender<B, I> {
    backend: B,
    identity: I,
    transport: HttpTransport,
    url_type: UrlType,
    retry_policy: RetryPolicy,
    state: RwLock<AuthState>,
    auth_lock: Mutex<()>,
}

impl<B: Backend, I: IdentityClient> AuthenticatedSender<B, I> {
    pub fn new(
        backend: B,
        identity: I,
        transport: HttpTransport,
        url_type: UrlType,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            identity,
            transport,
            url_type,
            retry_policy,
            state: RwLock::new(AuthState {
                token: None,
                endpoint: None,
                last_auth_failed: false,
                phase: AuthPhase::Unauthenticated,
            }),
            auth_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn phase(&self) -> AuthPhase {
        self.state.read().phase
    }

    pub fn endpoint(&self) -> Option<String> {
        self.state.read().endpoint.clone()
    }

    /// Returns a usable token, authenticating if none is cached.
    /// Identity failures are logged here and never propagate.
    pub async fn ensure_authenticated(&self) -> Option<String> {
        let cached = self.state.read().token.clone();
        if cached.is_some() {
            return cached;
        }

        let _guard = self.auth_lock.lock().await;

        // Another task may have finished authenticating while we waited.
        let cached = self.state.read().token.clone();
        if cached.is_some() {
            return cached;
        }

        self.refresh_token().await
    }

    /// Replaces `stale` after the service rejected it. When another task
    /// already renewed the token, that token is returned without a second
    /// identity round trip.
    pub async fn reauthenticate(&self, stale: &str) -> Option<String> {
        let _guard = self.auth_lock.lock().await;

        {
            let mut state = self.state.write();
            if let Some(current) = state.token.as_ref().filter(|t| t.as_str() != stale) {
                return Some(current.clone());
            }
            state.token = None;
            state.phase = AuthPhase::Unauthenticated;
        }

        self.refresh_token().await
    }

    /// Caller must hold `auth_lock`.
    async fn refresh_token(&self) -> Option<String> {
        self.state.write().phase = AuthPhase::Authenticating;
        debug!(service = B::SERVICE, "Authenticating request");

        match self.authenticate().await {
            Ok((token, endpoint)) => {
                let mut state = self.state.write();
                state.token = Some(token.clone());
                state.endpoint = Some(endpoint);
                state.last_auth_failed = false;
                state.phase = AuthPhase::Authenticated;
                drop(state);

                info!(service = B::SERVICE, "Authenticating request - success");
                Some(token)
            }
            Err(e) => {
                let first_failure = {
                    let mut state = self.state.write();
                    let first_failure = !state.last_auth_failed;
                    state.token = None;
                    state.last_auth_failed = true;
                    state.phase = AuthPhase::Unauthenticated;
                    first_failure
                };

                if first_failure {
                    error!("Suspending error logs until successful auth");
                    error!(error = %e, "Authentication error");
                } else {
                    debug!(error = %e, "Authentication error");
                }
                if let Some(body) = e.response_body() {
                    debug!(response = body, "Identity service response");
                }
                None
            }
        }
    }

    async fn authenticate(&self) -> Result<(String, String), AuthError> {
        let token = self.identity.authenticate().await?;
        let endpoint = self.backend.on_authenticated(&self.identity, self.url_type)?;
        Ok((token, endpoint))
    }

    /// Sends `payload` for `meter_name`. Timeouts are retried up to `retry`
    /// times with the configured backoff before the timeout propagates.
    pub async fn send(
        &self,
        meter_name: &str,
        payload: &str,
        options: &SendOptions,
        retry: u32,
    ) -> Result<SendOutcome, SendError> {
        let mut attempt = 0;
        loop {
            match self.send_once(meter_name, payload, options).await {
                Err(e) if e.is_timeout() && attempt < retry => {
                    let delay = self.retry_policy.delay_for(attempt);
                    attempt += 1;
                    debug!(
                        meter = meter_name,
                        attempt,
                        retry,
                        ?delay,
                        "Request timed out, trying again"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_timeout() => {
                    error!(meter = meter_name, error = %e, "Too many timeouts trying to send");
                    return Err(e);
                }
                result => return result,
            }
        }
    }

    async fn send_once(
        &self,
        meter_name: &str,
        payload: &str,
        options: &SendOptions,
    ) -> Result<SendOutcome, SendError> {
        let Some(token) = self.ensure_authenticated().await else {
            debug!(meter = meter_name, "Unable to send data. Not authenticated");
            return Ok(SendOutcome::Dropped(DropReason::NotAuthenticated));
        };

        let Some(endpoint) = self.endpoint() else {
            debug!(
                meter = meter_name,
                "Unable to send data. Missing endpoint from identity service"
            );
            return Ok(SendOutcome::Dropped(DropReason::MissingEndpoint));
        };

        let ctx = RequestContext {
            transport: &self.transport,
            endpoint: &endpoint,
            token: &token,
        };

        let Some(request) = self
            .backend
            .build_request_url(&ctx, meter_name, payload, options)
            .await?
        else {
            debug!(meter = meter_name, "No request to perform, aborting send");
            return Ok(SendOutcome::Skipped);
        };

        match self.transport.perform(&request, Some(&token)).await {
            Ok(response) => Ok(SendOutcome::Delivered {
                status: response.status,
            }),
            Err(SendError::Unauthorized { url }) => {
                info!(url = %url, "Renewing authentication");
                let Some(renewed) = self.reauthenticate(&token).await else {
                    warn!(meter = meter_name, "Re-authentication failed, dropping payload");
                    return Ok(SendOutcome::Dropped(DropReason::NotAuthenticated));
                };

                // Exactly one retry; a second 401 propagates.
                let response = self.transport.perform(&request, Some(&renewed)).await?;
                Ok(SendOutcome::Delivered {
                    status: response.status,
                })
            }
            Err(e) if e.is_not_found() => {
                debug!(meter = meter_name, error = %e, "Resource not found, attempting recovery");
                self.backend
                    .handle_not_found(&ctx, e, meter_name, payload, options)
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

impl<B, I> std::fmt::Debug for AuthenticatedSender<B, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("AuthenticatedSender")
            .field("url_type", &self.url_type)
            .field("phase", &state.phase)
            .field("endpoint", &state.endpoint)
            .field("has_token", &state.token.is_some())
            .finish()
    }
}
