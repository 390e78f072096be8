use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{self, HeaderName, HeaderValue, Method},
    middleware,
    response::IntoResponse,
    routing::get,
};
use entity::actors;
use platform_api::{ApiError, ApiResult};
use platform_authn::{
    FieldCipher, SessionTokens, TokenSubject, reject_missing_account, verify_password,
};
use platform_authz::{Access, Controller, Endpoint, Identity, PermissionResolver, authenticate};
use platform_db::{self, DbPool};
use sea_orm::{ConnectionTrait, Statement};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    graphql::{self, GraphqlData, MePayload, SchemaType},
    permissions::{PROFILE_READ, SESSION_REFRESH, USER_READ},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub schema: SchemaType,
    pub config: Arc<AppConfig>,
    pub tokens: SessionTokens,
    pub cipher: FieldCipher,
    pub resolver: PermissionResolver,
}

impl AppState {
    pub fn new(pool: DbPool, config: Arc<AppConfig>) -> Self {
        let cipher = config.auth.field_cipher();
        let resolver = PermissionResolver::new(pool.clone());
        let schema = graphql::build_schema(GraphqlData {
            pool: pool.clone(),
            resolver: resolver.clone(),
            cipher: cipher.clone(),
        });
        Self {
            tokens: config.auth.session_tokens(),
            pool,
            schema,
            config,
            cipher,
            resolver,
        }
    }

    fn graphql_data(&self) -> GraphqlData {
        GraphqlData {
            pool: self.pool.clone(),
            resolver: self.resolver.clone(),
            cipher: self.cipher.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "warden server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::POST, Method::GET])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let resolver = state.resolver.clone();

    // Login is anonymous at method level; everything else here needs a session.
    let auth = Controller::new(resolver.clone())
        .require(SESSION_REFRESH)
        .route(
            "/auth/login",
            Endpoint::new()
                .post(login_handler)
                .method_access(Access::Anonymous),
        )
        .route("/auth/refresh", Endpoint::new().post(refresh_handler))
        .into_router();

    let profile = Controller::new(resolver.clone())
        .access(Access::Authenticated)
        .require(PROFILE_READ)
        .route("/me", Endpoint::new().get(me_handler))
        .route("/me/permissions", Endpoint::new().get(my_permissions_handler))
        .route("/graphql", Endpoint::new().post(graphql_handler))
        .into_router();

    let directory = Controller::new(resolver)
        .require(USER_READ)
        .route("/actors/{id}", Endpoint::new().get(actor_handler))
        .into_router();

    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .merge(auth)
        .merge(profile)
        .merge(directory)
        .layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            authenticate,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    login: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
    token_type: &'static str,
    expires_in: i64,
}

#[derive(Serialize)]
struct ActorView {
    id: Uuid,
    username: String,
    email: Option<String>,
    role_label: String,
    is_active: bool,
}

impl From<actors::Model> for ActorView {
    fn from(actor: actors::Model) -> Self {
        Self {
            id: actor.id,
            username: actor.username,
            email: actor.email,
            role_label: actor.role_label,
            is_active: actor.is_active,
        }
    }
}

#[derive(Serialize)]
struct PermissionsView {
    elevated: bool,
    permissions: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let actor = find_login_actor(&state, &body.login).await?;
    // One answer for unknown login, wrong password and disabled account.
    let Some(actor) = actor.filter(|actor| actor.is_active) else {
        reject_missing_account(&body.password);
        info!("login rejected");
        return Err(ApiError::Unauthenticated);
    };
    if !verify_password(&body.password, &actor.password_hash) {
        info!(actor_id = %actor.id, "login rejected");
        return Err(ApiError::Unauthenticated);
    }
    info!(actor_id = %actor.id, "login accepted");
    issue_for(&state, &actor).map(Json)
}

async fn refresh_handler(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
) -> ApiResult<Json<TokenResponse>> {
    let actor_id = actor_id(identity)?;
    let actor = platform_db::actors::find_by_id(&state.pool, actor_id)
        .await
        .map_err(|err| ApiError::internal(err.into()))?
        .filter(|actor| actor.is_active)
        .ok_or(ApiError::Unauthenticated)?;
    issue_for(&state, &actor).map(Json)
}

async fn me_handler(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
) -> ApiResult<Json<MePayload>> {
    let actor_id = actor_id(identity)?;
    MePayload::load(&state.graphql_data(), actor_id)
        .await
        .map(Json)
}

async fn my_permissions_handler(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
) -> ApiResult<Json<PermissionsView>> {
    let actor_id = actor_id(identity)?;
    let elevated = state
        .resolver
        .elevated_role(actor_id)
        .await
        .map_err(|err| ApiError::internal(err.into()))?
        .is_some();
    let permissions = state
        .resolver
        .list_permissions(actor_id)
        .await
        .map_err(|err| ApiError::internal(err.into()))?;
    Ok(Json(PermissionsView {
        elevated,
        permissions: permissions.into_iter().collect(),
    }))
}

async fn actor_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ActorView>> {
    platform_db::actors::find_by_id(&state.pool, id)
        .await
        .map_err(|err| ApiError::internal(err.into()))?
        .map(|actor| Json(ActorView::from(actor)))
        .ok_or(ApiError::NotFound)
}

async fn graphql_handler(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = request.into_inner();
    if let Some(Extension(identity)) = identity {
        req = req.data(identity);
    }
    state.schema.execute(req).await.into()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.pool.get_database_backend();
    let db_ok = state
        .pool
        .execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
        .is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Username or email first, then the encrypted phone column.
async fn find_login_actor(state: &AppState, login: &str) -> ApiResult<Option<actors::Model>> {
    let by_name = platform_db::actors::find_by_login(&state.pool, login)
        .await
        .map_err(|err| ApiError::internal(err.into()))?;
    if by_name.is_some() {
        return Ok(by_name);
    }
    let phone = state.cipher.encrypt(login.trim());
    if phone.is_empty() {
        return Ok(None);
    }
    platform_db::actors::find_by_phone(&state.pool, &phone)
        .await
        .map_err(|err| ApiError::internal(err.into()))
}

fn issue_for(state: &AppState, actor: &actors::Model) -> ApiResult<TokenResponse> {
    let token = state
        .tokens
        .issue(&TokenSubject {
            actor_id: actor.id,
            username: &actor.username,
            role_label: &actor.role_label,
        })
        .map_err(|err| ApiError::internal(err.into()))?;
    Ok(TokenResponse {
        token,
        token_type: "Bearer",
        expires_in: state.tokens.ttl().num_seconds(),
    })
}

fn actor_id(identity: Option<Extension<Identity>>) -> ApiResult<Uuid> {
    let Extension(identity) = identity.ok_or(ApiError::Unauthenticated)?;
    identity.actor_id().ok_or(ApiError::Forbidden)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use platform_authn::AuthSettings;
    use platform_db::DatabaseSettings;
    use sea_orm::Database;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::seed;

    const PASSWORD: &str = "correct horse";

    async fn state() -> AppState {
        let pool = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&pool, None).await.unwrap();
        let config = Arc::new(AppConfig {
            auth: AuthSettings::default(),
            database: DatabaseSettings::new("sqlite::memory:"),
            cors_allowed_origins: Vec::new(),
        });
        seed::run(&pool, &config.auth.field_cipher(), PASSWORD)
            .await
            .unwrap();
        AppState::new(pool, config)
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn login(state: &AppState, login: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "login": login, "password": password }).to_string(),
            ))
            .unwrap();
        send(state, request).await
    }

    async fn bearer(state: &AppState, username: &str) -> String {
        let (status, body) = login(state, username, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login for {username} failed: {body}");
        format!("Bearer {}", body["token"].as_str().unwrap())
    }

    async fn get(state: &AppState, uri: &str, auth: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::get(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        send(state, builder.body(Body::empty()).unwrap()).await
    }

    async fn actor_id_of(state: &AppState, username: &str) -> Uuid {
        platform_db::actors::find_by_username(&state.pool, username)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn health_is_public() {
        let state = state().await;
        let (status, body) = get(&state, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db_ok"], json!(true));
    }

    #[tokio::test]
    async fn login_is_anonymous_and_issues_a_bearer_token() {
        let state = state().await;
        let (status, body) = login(&state, "house@clinic.test", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], json!("Bearer"));
        assert_eq!(body["expires_in"], json!(3600));
        let claims = state
            .tokens
            .validate(body["token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.username, seed::DOCTOR_USERNAME);
        assert_eq!(claims.role, "Doctor");
    }

    #[tokio::test]
    async fn login_accepts_the_plain_phone_number() {
        let state = state().await;
        let (status, _) = login(&state, seed::DOCTOR_PHONE, PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn login_failures_share_one_answer() {
        let state = state().await;
        for (name, password) in [
            (seed::DOCTOR_USERNAME, "wrong"),
            ("nobody", PASSWORD),
            ("former.staff", PASSWORD),
        ] {
            let (status, body) = login(&state, name, password).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{name}");
            assert_eq!(body["code"], json!("UNAUTHENTICATED"));
        }
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let state = state().await;
        let (status, _) = get(&state, "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get(&state, "/me", Some("Bearer garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn actor_without_roles_is_forbidden() {
        let state = state().await;
        let auth = bearer(&state, "newcomer").await;
        let (status, body) = get(&state, "/me", Some(&auth)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!body.to_string().contains("profile.read"));
    }

    #[tokio::test]
    async fn elevated_actor_bypasses_grants() {
        let state = state().await;
        let auth = bearer(&state, "admin").await;
        let target = actor_id_of(&state, seed::DOCTOR_USERNAME).await;
        let (status, body) = get(&state, &format!("/actors/{target}"), Some(&auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], json!(seed::DOCTOR_USERNAME));
        assert!(body.get("password_hash").is_none());

        let (status, body) = get(&state, "/me/permissions", Some(&auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elevated"], json!(true));
    }

    #[tokio::test]
    async fn grants_decide_for_ordinary_roles() {
        let state = state().await;
        let doctor = bearer(&state, seed::DOCTOR_USERNAME).await;
        let desk = bearer(&state, "front.desk").await;
        let target = actor_id_of(&state, "admin").await;

        let (status, _) = get(&state, &format!("/actors/{target}"), Some(&doctor)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = get(&state, &format!("/actors/{target}"), Some(&desk)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get(&state, &format!("/actors/{}", Uuid::new_v4()), Some(&desk)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inactive_grants_are_not_listed() {
        let state = state().await;
        let auth = bearer(&state, seed::DOCTOR_USERNAME).await;
        let (status, body) = get(&state, "/me/permissions", Some(&auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elevated"], json!(false));
        let permissions = body["permissions"].as_array().unwrap();
        assert!(permissions.contains(&json!("consultation.read")));
        assert!(!permissions.contains(&json!("billing.export")));
    }

    #[tokio::test]
    async fn refresh_reissues_for_active_actor() {
        let state = state().await;
        let auth = bearer(&state, "front.desk").await;
        let request = Request::post("/auth/refresh")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.tokens.validate(body["token"].as_str().unwrap()).is_some());
    }

    #[tokio::test]
    async fn me_returns_the_decrypted_phone() {
        let state = state().await;
        let auth = bearer(&state, seed::DOCTOR_USERNAME).await;
        let (status, body) = get(&state, "/me", Some(&auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phone"], json!(seed::DOCTOR_PHONE));
    }
}
