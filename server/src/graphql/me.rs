use async_graphql::SimpleObject;
use platform_api::ApiError;
use platform_db::actors;
use serde::Serialize;
use uuid::Uuid;

use crate::graphql::GraphqlData;

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct MePayload {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Decrypted from the stored ciphertext; empty when it cannot be read.
    pub phone: Option<String>,
    pub role_label: String,
    pub elevated: bool,
    pub permissions: Vec<String>,
}

impl MePayload {
    pub async fn load(data: &GraphqlData, actor_id: Uuid) -> Result<Self, ApiError> {
        let actor = actors::find_by_id(&data.pool, actor_id)
            .await
            .map_err(|err| ApiError::internal(err.into()))?
            .ok_or(ApiError::NotFound)?;
        let elevated = data
            .resolver
            .elevated_role(actor_id)
            .await
            .map_err(|err| ApiError::internal(err.into()))?
            .is_some();
        let permissions = data
            .resolver
            .list_permissions(actor_id)
            .await
            .map_err(|err| ApiError::internal(err.into()))?
            .into_iter()
            .collect();
        Ok(Self {
            id: actor.id.to_string(),
            username: actor.username,
            email: actor.email,
            phone: actor.phone.map(|stored| data.cipher.decrypt(&stored)),
            role_label: actor.role_label,
            elevated,
            permissions,
        })
    }
}
