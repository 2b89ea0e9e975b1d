//! Identity service boundary.
//!
//! The sender only needs two things from the identity service: a bearer
//! token and the base URL of a named service. `IdentityClient` is that
//! contract; `KeystoneClient` speaks the identity v2 wire protocol.

pub mod keystone;

pub use keystone::{KeystoneClient, KeystoneCredentials};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid response from identity service: {message}")]
    InvalidResponse {
        message: String,
        body: Option<String>,
    },
    #[error("Missing service '{service}' in identity catalog: {reason}")]
    MissingService { service: String, reason: String },
    #[error("No service catalog available, authenticate first")]
    NotAuthenticated,
}

impl AuthError {
    /// Raw identity service response attached to the failure, if any.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            AuthError::InvalidResponse { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

/// Which catalog URL of a service to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum UrlType {
    #[default]
    #[value(name = "internalURL")]
    #[serde(rename = "internalURL")]
    Internal,
    #[value(name = "publicURL")]
    #[serde(rename = "publicURL")]
    Public,
    #[value(name = "adminURL")]
    #[serde(rename = "adminURL")]
    Admin,
}

impl UrlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlType::Internal => "internalURL",
            UrlType::Public => "publicURL",
            UrlType::Admin => "adminURL",
        }
    }
}

impl std::fmt::Display for UrlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait IdentityClient: Send + Sync {
    /// Obtains a fresh token and refreshes the service catalog.
    fn authenticate(&self) -> impl Future<Output = Result<String, AuthError>> + Send;

    /// Base URL of `service` from the catalog captured by the last
    /// successful `authenticate`, without a trailing slash.
    fn service_endpoint(&self, service: &str, url_type: UrlType) -> Result<String, AuthError>;
}
