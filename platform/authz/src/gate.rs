//! The per-request authorization decision.
//!
//! A gate walks `PublicCheck → IdentityCheck → ElevatedCheck → PermissionCheck`
//! and stops at the first state that settles the outcome. It reads the store
//! but never writes to it.

use std::sync::Arc;

use axum::http::StatusCode;
use platform_api::ApiError;
use platform_authn::SessionClaims;
use uuid::Uuid;

use crate::{AuthzResult, PermissionResolver};

/// Access mode declared by route metadata.
///
/// `Authenticated` documents the default; only `Anonymous` changes the outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Anonymous,
    Authenticated,
}

/// Access declarations at the three levels a route can carry them.
///
/// Levels are searched endpoint, then method, then controller for an
/// anonymous marker; the first one found opens the route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessMetadata {
    pub endpoint: Option<Access>,
    pub method: Option<Access>,
    pub controller: Option<Access>,
}

impl AccessMetadata {
    /// The level carrying the anonymous marker, if any.
    pub fn anonymous_level(&self) -> Option<&'static str> {
        [
            ("endpoint", self.endpoint),
            ("method", self.method),
            ("controller", self.controller),
        ]
        .into_iter()
        .find(|(_, access)| *access == Some(Access::Anonymous))
        .map(|(level, _)| level)
    }

    pub fn allows_anonymous(&self) -> bool {
        self.anonymous_level().is_some()
    }
}

/// The authenticated identity attached to a request by [`crate::authenticate`].
#[derive(Clone, Debug)]
pub struct Identity {
    pub claims: SessionClaims,
}

impl Identity {
    pub fn new(claims: SessionClaims) -> Self {
        Self { claims }
    }

    pub fn actor_id(&self) -> Option<Uuid> {
        self.claims.actor_id()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    Public,
    Elevated,
    Permission,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    /// No identity on the request.
    Unauthenticated,
    /// Identity present but unusable, or the grant is missing.
    Forbidden,
}

impl Denial {
    pub fn status(self) -> StatusCode {
        match self {
            Denial::Unauthenticated => StatusCode::UNAUTHORIZED,
            Denial::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl From<Denial> for ApiError {
    fn from(value: Denial) -> Self {
        match value {
            Denial::Unauthenticated => ApiError::Unauthenticated,
            Denial::Forbidden => ApiError::Forbidden,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allowed(Grant),
    Denied(Denial),
}

/// One required permission code bound to the resolver that checks it.
#[derive(Clone, Debug)]
pub struct AuthorizationGate {
    resolver: PermissionResolver,
    required: Arc<str>,
}

impl AuthorizationGate {
    pub fn new(resolver: PermissionResolver, required: impl Into<Arc<str>>) -> Self {
        Self {
            resolver,
            required: required.into(),
        }
    }

    /// Decide one request. `Err` means the store failed and the request must
    /// not be treated as denied.
    pub async fn evaluate(
        &self,
        access: &AccessMetadata,
        identity: Option<&Identity>,
    ) -> AuthzResult<Decision> {
        if let Some(level) = access.anonymous_level() {
            tracing::trace!(level, "anonymous access declared");
            return Ok(Decision::Allowed(Grant::Public));
        }
        let Some(identity) = identity else {
            return Ok(Decision::Denied(Denial::Unauthenticated));
        };
        let Some(actor_id) = identity.actor_id() else {
            tracing::info!("identity carries no parseable actor id");
            return Ok(Decision::Denied(Denial::Forbidden));
        };

        if let Some(role) = self.resolver.elevated_role(actor_id).await? {
            tracing::debug!(%actor_id, role = %role.code, "elevated role bypasses permission check");
            return Ok(Decision::Allowed(Grant::Elevated));
        }

        if self
            .resolver
            .has_permission(actor_id, &self.required)
            .await?
        {
            Ok(Decision::Allowed(Grant::Permission))
        } else {
            tracing::info!(%actor_id, permission = %self.required, "permission denied");
            Ok(Decision::Denied(Denial::Forbidden))
        }
    }
}
