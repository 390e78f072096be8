//! axum adapters: identity extraction and per-route gates.
//!
//! Routes are declared through [`Controller`] and [`Endpoint`] so that the
//! gate layers always sit inside the access metadata they read:
//!
//! ```ignore
//! let auth = Controller::new(resolver.clone())
//!     .require("session.refresh")
//!     .route("/auth/login", Endpoint::new().post(login).method_access(Access::Anonymous))
//!     .route("/auth/refresh", Endpoint::new().post(refresh))
//!     .into_router();
//! ```

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Request, State},
    handler::Handler,
    http::{HeaderMap, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
};
use platform_api::ApiError;
use platform_authn::SessionTokens;

use crate::{
    PermissionResolver,
    gate::{Access, AccessMetadata, AuthorizationGate, Decision, Identity},
};

/// Attach an [`Identity`] when the request carries a valid bearer token.
///
/// Missing or invalid tokens leave the request anonymous; the gate decides
/// whether that matters.
pub async fn authenticate(
    State(tokens): State<SessionTokens>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = bearer_token(request.headers()).and_then(|token| tokens.validate(token));
    if let Some(claims) = claims {
        request.extensions_mut().insert(Identity::new(claims));
    }
    next.run(request).await
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

async fn enforce(State(gate): State<AuthorizationGate>, request: Request, next: Next) -> Response {
    let access = request
        .extensions()
        .get::<AccessMetadata>()
        .copied()
        .unwrap_or_default();
    let identity = request.extensions().get::<Identity>().cloned();
    match gate.evaluate(&access, identity.as_ref()).await {
        Ok(Decision::Allowed(_)) => next.run(request).await,
        Ok(Decision::Denied(denial)) => ApiError::from(denial).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "authorization aborted by store failure");
            ApiError::internal(err.into()).into_response()
        }
    }
}

/// A group of routes sharing access metadata and required permissions.
pub struct Controller<S = ()> {
    resolver: PermissionResolver,
    access: Option<Access>,
    required: Vec<Arc<str>>,
    router: Router<S>,
}

impl<S> Controller<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(resolver: PermissionResolver) -> Self {
        Self {
            resolver,
            access: None,
            required: Vec::new(),
            router: Router::new(),
        }
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    /// Every route in this controller needs `code`.
    pub fn require(mut self, code: &str) -> Self {
        self.required.push(Arc::from(code));
        self
    }

    pub fn route(mut self, path: &str, endpoint: Endpoint<S>) -> Self {
        let method_router = endpoint.build(self.access, &self.required, &self.resolver);
        self.router = self.router.route(path, method_router);
        self
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}

/// One path with its handlers, endpoint-level access and extra requirements.
pub struct Endpoint<S = ()> {
    access: Option<Access>,
    required: Vec<Arc<str>>,
    handlers: Vec<(Option<Access>, MethodRouter<S>)>,
}

impl<S> Default for Endpoint<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Endpoint<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            access: None,
            required: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    pub fn require(mut self, code: &str) -> Self {
        self.required.push(Arc::from(code));
        self
    }

    pub fn on<H, T>(mut self, filter: MethodFilter, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.handlers
            .push((None, axum::routing::on(filter, handler)));
        self
    }

    pub fn get<H, T>(self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.on(MethodFilter::GET, handler)
    }

    pub fn post<H, T>(self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.on(MethodFilter::POST, handler)
    }

    /// Access declared on the most recently added handler.
    pub fn method_access(mut self, access: Access) -> Self {
        if let Some((slot, _)) = self.handlers.last_mut() {
            *slot = Some(access);
        }
        self
    }

    fn build(
        self,
        controller: Option<Access>,
        controller_codes: &[Arc<str>],
        resolver: &PermissionResolver,
    ) -> MethodRouter<S> {
        let mut merged = MethodRouter::new();
        for (method, mut handler) in self.handlers {
            // One gate per code; any of them may deny.
            for code in controller_codes.iter().chain(self.required.iter()) {
                let gate = AuthorizationGate::new(resolver.clone(), code.clone());
                handler = handler.layer(middleware::from_fn_with_state(gate, enforce));
            }
            let metadata = AccessMetadata {
                endpoint: self.access,
                method,
                controller,
            };
            handler = handler.layer(Extension(metadata));
            merged = merged.merge(handler);
        }
        merged
    }
}
