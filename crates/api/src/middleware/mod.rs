//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- the authenticated user from a Bearer token.
//! - [`rbac::RequireSender`] -- `instructor` or `admin`.
//! - [`rbac::RequireAdmin`] -- `admin` only.

pub mod auth;
pub mod rbac;
