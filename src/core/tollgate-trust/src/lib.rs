//! # Tollgate Trust
//!
//! Keeps a running OpenVPN daemon's trust state in step with the PKI.
//!
//! ## Features
//!
//! - Atomic CRL publishing with content digests
//! - Daemon restart through the service supervisor
//! - Connected-client snapshot from the status report

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod digest;
pub mod error;
pub mod publisher;
pub mod reloader;
pub mod status;

pub use digest::short_digest;
pub use error::TrustError;
pub use publisher::{CrlPublisher, Published};
pub use reloader::{ServiceReloader, SystemdReloader};
pub use status::{parse_status_report, ConnectionSnapshot, ConnectionTracker};
