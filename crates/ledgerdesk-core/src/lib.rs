//! Ledgerdesk core - everything the admin console needs that is not terminal I/O.
//!
//! The session guard in [`auth::guard`] keeps a console signed in only while its
//! bearer token is valid, the operator is active, the API accepts the token and
//! no other console has signed out.

pub mod api;
pub mod auth;
pub mod config;
pub mod i18n;
pub mod models;
pub mod storage;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{LogoutReason, Navigator, SessionGuard, SessionStore};
pub use config::{Config, GuardConfig};
pub use i18n::{t, Language};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageEvent};
