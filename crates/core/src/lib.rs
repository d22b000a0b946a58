//! Likeness Core - identity types and pure identity logic.
//!
//! This crate holds everything about identity resolution that does not need
//! a database or a network. It is shared by:
//! - `likeness-identity` - the engine (storage, DNS classification, services)
//! - `likeness-cli` - operator commands built on top of the engine
//!
//! # Architecture
//!
//! No I/O lives here. Normalization, fingerprinting and credential-set
//! predicates are plain functions so they can be exercised anywhere,
//! including inside a database transaction or a test without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, credentials, users and password records
//! - [`normalize`] - Canonical email forms and fingerprints
//! - [`predicates`] - Questions about an account's credential set
//! - [`validation`] - Field-level violation lists

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod normalize;
pub mod predicates;
pub mod types;
pub mod validation;

pub use normalize::{CanonicalEmail, Fingerprint};
pub use types::*;
pub use validation::{Violation, Violations};
