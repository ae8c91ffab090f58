//! # Tollgate PKI
//!
//! Boundary to the easy-rsa certificate authority used by an OpenVPN server.
//!
//! ## Features
//!
//! - Identity name validation and the `client_<n>` convention
//! - `index.txt` parsing with `CN=` / `/CN=` normalization
//! - Gap-filling identity allocation
//! - easy-rsa / openssl / installer invocation with an explicit environment

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod index;
pub mod layout;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tool;

pub use allocator::IdentityAllocator;
pub use error::PkiError;
pub use gateway::{GatewayTools, IssuedBundle, PkiGateway};
pub use identity::{validate_name, ClientIdentity, IdentityStatus};
pub use index::{IndexRecord, PkiIndex, RecordStatus};
pub use layout::PkiLayout;
pub use tool::{ToolCommand, ToolError, ToolOutput};
