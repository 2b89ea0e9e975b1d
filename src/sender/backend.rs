use super::{HttpTransport, PreparedRequest, SendError, SendOutcome};
use crate::domain::{AlarmState, Severity};
use crate::identity::{AuthError, IdentityClient, UrlType};
use std::future::Future;

/// Backend-specific fields passed opaquely from the forwarder to the
/// backend hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub resource_id: Option<String>,
    pub unit: Option<String>,
    pub severity: Severity,
    pub alarm_state: Option<AlarmState>,
}

/// What a backend hook gets to work with while a send is in flight.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub transport: &'a HttpTransport,
    /// Service root URL resolved right after authentication.
    pub endpoint: &'a str,
    pub token: &'a str,
}

impl RequestContext<'_> {
    pub async fn perform(
        &self,
        request: &PreparedRequest,
    ) -> Result<super::TransportResponse, SendError> {
        self.transport.perform(request, Some(self.token)).await
    }
}

/// The policy half of the sender: everything that differs between the
/// metering, alarm and metric services.
pub trait Backend: Send + Sync {
    /// Service name looked up in the identity catalog.
    const SERVICE: &'static str;

    /// Runs once per successful authentication and returns the base
    /// endpoint every later request is built from.
    fn on_authenticated<I: IdentityClient>(
        &self,
        identity: &I,
        url_type: UrlType,
    ) -> Result<String, AuthError> {
        identity.service_endpoint(Self::SERVICE, url_type)
    }

    /// Local name of the remote resource a send targets, if the backend
    /// keys remote resources by name.
    fn derive_resource_name(&self, meter_name: &str, options: &SendOptions) -> Option<String>;

    /// Builds the request for `payload`. May resolve (and create) remote
    /// resources on the way. `None` means there is nothing left to send.
    fn build_request_url(
        &self,
        ctx: &RequestContext<'_>,
        meter_name: &str,
        payload: &str,
        options: &SendOptions,
    ) -> impl Future<Output = Result<Option<PreparedRequest>, SendError>> + Send;

    /// Recovery for a 404 on the request built above. Either recovers with
    /// at most one more request or returns the error to propagate.
    fn handle_not_found(
        &self,
        ctx: &RequestContext<'_>,
        error: SendError,
        meter_name: &str,
        payload: &str,
        options: &SendOptions,
    ) -> impl Future<Output = Result<SendOutcome, SendError>> + Send;
}
