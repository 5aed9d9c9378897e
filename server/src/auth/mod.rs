//! Token issuance, verification and session control.
//!
//! Dependency order: [`claims`] and [`codec`] are pure; [`policy`] adds the
//! session store; [`manager`] (login, re-issue) and [`gate`] (per-request
//! check) sit on top.

pub mod claims;
pub mod codec;
pub mod errors;
pub mod gate;
pub mod manager;
pub mod policy;

pub use claims::ClaimsBuilder;
pub use codec::{IssuedToken, TokenCodec};
pub use errors::{AuthError, SigningError, TokenError};
pub use gate::{AuthContext, AuthorizationGate};
pub use manager::{AuthSessionManager, LoginOutcome};
pub use policy::{SessionPolicy, SingleSessionPolicy, StatelessPolicy};
