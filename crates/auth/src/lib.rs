//! `stocktake-auth`: authentication/authorization boundary.
//!
//! User and session management live outside this system; this crate only
//! validates bearer tokens and answers "may this principal run this command
//! in this tenant". It is decoupled from HTTP and storage.

pub mod claims;
pub mod permissions;
pub mod principal;

pub use claims::{
    Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims,
};
pub use permissions::{Permission, Role};
pub use principal::{
    AuthzError, CommandAuthorization, Principal, PrincipalId, TenantMembership, authorize,
};
