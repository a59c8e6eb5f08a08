//! Common types shared across the certkeeper crates.
//!
//! This crate holds the pieces both the configuration loader and the
//! lifecycle engine need to agree on: identifier newtypes, the CA
//! environment selector, and logging initialisation.

pub mod ids;
pub mod types;

#[cfg(feature = "runtime")]
pub mod observability;

pub use ids::{CertificateId, TenantId, UserId};
pub use types::{CaEnvironment, LogFormat, ParseCaEnvironmentError};
