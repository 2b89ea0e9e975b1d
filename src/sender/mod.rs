pub mod authenticated;
pub mod backend;
pub mod client;
pub mod error;

pub use authenticated::{AuthPhase, AuthenticatedSender, DropReason, SendOutcome};
pub use backend::{Backend, RequestContext, SendOptions};
pub use client::{
    ConnectionStats, HttpTransport, PreparedRequest, TransportConfig, TransportResponse,
};
pub use error::SendError;
