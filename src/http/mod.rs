//! HTTP session client
//!
//! # Module Layout
//!
//! - [`client`]   -- [`ApiClient`], credential injection and the 401
//!   recovery chain
//! - [`classify`] -- pure rules for project-key vs session failures,
//!   auth endpoints and tunnel hosts
//! - [`refresh`]  -- single-flight [`RefreshCoordinator`]

pub mod classify;
pub mod client;
pub mod refresh;

pub use client::{ApiClient, ApiRequest, FilePart, RequestBody, API_KEY_HEADER};
pub use refresh::RefreshCoordinator;
