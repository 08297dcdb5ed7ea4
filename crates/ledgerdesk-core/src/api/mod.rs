//! REST API client module for the ledger service.
//!
//! This module provides the `ApiClient` for communicating with the ledger
//! API to manage customers, currencies, balances, users and financial
//! records.
//!
//! Every request carries the session's bearer token. A 401 from any
//! endpoint is reported to the installed unauthorized hook.

pub mod client;
pub mod error;

pub use client::{ApiClient, HookId, UnauthorizedHook, MIN_PASSWORD_LENGTH};
pub use error::ApiError;
