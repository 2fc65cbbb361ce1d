//! # API Shared
//!
//! Shared utilities and definitions for HQM APIs.
//!
//! Contains:
//! - Wire types (`dto` module), serialised in camelCase and documented for OpenAPI
//! - Shared services like `HealthService`
//! - Authentication utilities for staff-only operations
//!
//! Used by `api-rest` and the `hqm-run` binary.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{validate_api_key, AuthError, API_KEY_HEADER};
pub use dto::*;
pub use health::HealthService;
