//! HTTP client for the target test management system.
//!
//! [`QaseClient`] implements [`casebridge_core::remote::TargetApi`] against
//! the v1 REST API, authenticating with a `Token` header. [`ScimClient`]
//! provisions workspace users and groups over SCIM with a bearer token.

pub mod client;
pub mod envelope;
pub mod scim;

pub use client::{QaseClient, QaseConfig};
pub use scim::{ScimClient, ScimConfig};
