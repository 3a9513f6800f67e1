//! HTTP client for the source test management system.
//!
//! [`TestrailClient`] implements [`casebridge_core::remote::SourceApi`] on top
//! of the v2 REST API. When a web session can be established it is also used
//! for the bulk attachment listing and for direct attachment downloads.

pub mod client;
pub mod listing;
pub mod session;

pub use client::{TestrailClient, TestrailConfig};
pub use listing::ListingPage;
