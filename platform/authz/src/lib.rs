//! Request-time authorization.
//!
//! [`PermissionResolver`] answers "does this actor hold this code" against
//! the relational store; [`AuthorizationGate`] wraps it with the public and
//! elevated-role short-circuits; [`routing`] mounts gates on axum routes.

pub mod elevated;
pub mod gate;
pub mod resolver;
pub mod routing;

use sea_orm::DbErr;
use thiserror::Error;

pub use elevated::{ELEVATED_ROLE_CODES, ELEVATED_ROLE_NAMES, is_elevated_role};
pub use gate::{Access, AccessMetadata, AuthorizationGate, Decision, Denial, Grant, Identity};
pub use resolver::PermissionResolver;
pub use routing::{Controller, Endpoint, authenticate};

/// Infrastructure failures while authorizing.
///
/// Never a denial: callers must surface this as a server error.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("permission store query failed: {0}")]
    Store(#[from] DbErr),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

#[cfg(test)]
pub(crate) mod fixtures;
