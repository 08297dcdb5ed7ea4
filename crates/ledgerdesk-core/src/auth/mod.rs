//! Authentication and session lifecycle.
//!
//! This module provides:
//! - `decode_claims`: reads the expiry out of a bearer token without verifying it
//! - `SessionStore`: the token and signed-in identity kept in session storage
//! - `SessionGuard`: ends the session on expiry, inactivity, 401 or logout elsewhere
//! - `CredentialStore`: optional saved passwords in the OS keychain

pub mod claims;
pub mod credentials;
pub mod guard;
pub mod session;

pub use claims::{decode_claims, Claims, DecodeError};
pub use credentials::CredentialStore;
pub use guard::{
    ActivityKind, ExpirySchedule, GuardState, LogoutReason, Navigator, SessionGuard,
    TRACKED_ACTIVITY,
};
pub use session::{SessionStore, LANGUAGE_KEY, TOKEN_KEY, USER_KEY};
