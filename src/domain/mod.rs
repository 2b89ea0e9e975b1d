//! Domain layer for openstack-telemetry-forwarder.
//!
//! Contains the canonical types shared across all modules:
//! - `Sample`: one measurement or notification, immutable once built
//! - `Event`: the inbound collector event shape
//! - `ForwarderError`: Top-level error type

pub mod error;
pub mod event;
pub mod sample;

pub use error::ForwarderError;
pub use event::{Event, EventIdentity, NotificationEvent, NotificationSeverity, ValuesEvent};
pub use sample::{AlarmState, Sample, SampleKind, Severity};
