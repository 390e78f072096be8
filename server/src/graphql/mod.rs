mod me;

use async_graphql::{Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Schema};
use platform_api::{ApiError, ApiResult};
use platform_authn::FieldCipher;
use platform_authz::{Identity, PermissionResolver};
use platform_db::DbPool;
use tracing::instrument;

pub use me::MePayload;

pub type SchemaType = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

#[derive(Clone)]
pub struct GraphqlData {
    pub pool: DbPool,
    pub resolver: PermissionResolver,
    pub cipher: FieldCipher,
}

pub fn build_schema(data: GraphqlData) -> SchemaType {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(data)
        .finish()
}

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> ApiResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }

    /// The calling actor with their effective permissions.
    #[instrument(name = "graphql.me", skip_all)]
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<MePayload> {
        let data = ctx.data::<GraphqlData>()?;
        let actor_id = ctx
            .data_opt::<Identity>()
            .and_then(Identity::actor_id)
            .ok_or_else(|| ApiError::Unauthenticated.extend())?;
        MePayload::load(data, actor_id).await.map_err(|err| err.extend())
    }
}
