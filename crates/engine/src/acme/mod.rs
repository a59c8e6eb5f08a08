//! ACME certificate management
//!
//! Talks to Let's Encrypt (or any RFC 8555 CA) over HTTP-01.
//!
//! # Architecture
//!
//! - [`AcmeConnector`] / [`AcmeSession`] - protocol seam, implemented over
//!   `instant-acme` by [`InstantAcmeConnector`]
//! - [`SettingsManager`] - TLS settings and the ACME account stored in them
//! - [`ChallengeBridge`] - persists pending HTTP-01 challenges for the
//!   port-80 responder
//! - [`RenewalScheduler`] - background task renewing expiring certificates
//!
//! # Challenge Flow
//!
//! 1. The lifecycle engine creates an order for a single domain
//! 2. The CA hands out a token per authorization
//! 3. [`ChallengeBridge`] stores the token and key authorization
//! 4. The CA fetches `/.well-known/acme-challenge/<token>` and gets the key
//!    authorization from [`ChallengeBridge::respond`]
//! 5. Once the order is ready it is finalized with a CSR and the chain is
//!    downloaded

mod account;
mod challenge;
mod client;
mod error;
pub mod keys;
mod scheduler;

pub use account::SettingsManager;
pub use challenge::{ChallengeBridge, ACME_CHALLENGE_PREFIX, DEFAULT_CHALLENGE_TTL_SECS};
pub use client::{
    AccountKey, AcmeConnector, AcmeSession, Http01Challenge, InstantAcmeConnector,
    InstantAcmeSession, OrderHandle,
};
pub use error::AcmeError;
pub use scheduler::{RenewalScheduler, DEFAULT_CHECK_INTERVAL};
