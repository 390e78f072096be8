//! Actor lookups by exact match on id, username, email or phone.

use entity::actors;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::DbResult;

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> DbResult<Option<actors::Model>> {
    Ok(actors::Entity::find_by_id(id).one(db).await?)
}

pub async fn find_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> DbResult<Option<actors::Model>> {
    find_one(db, actors::Column::Username, username).await
}

pub async fn find_by_email<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> DbResult<Option<actors::Model>> {
    find_one(db, actors::Column::Email, email).await
}

pub async fn find_by_phone<C: ConnectionTrait>(
    db: &C,
    phone: &str,
) -> DbResult<Option<actors::Model>> {
    find_one(db, actors::Column::Phone, phone).await
}

/// Resolve a login name: a username match wins over an email match.
///
/// Phone numbers are not tried here because deployments may store them
/// encrypted; callers look those up with [`find_by_phone`].
pub async fn find_by_login<C: ConnectionTrait>(
    db: &C,
    login: &str,
) -> DbResult<Option<actors::Model>> {
    let login = login.trim();
    if login.is_empty() {
        return Ok(None);
    }
    if let Some(actor) = find_by_username(db, login).await? {
        return Ok(Some(actor));
    }
    find_by_email(db, login).await
}

async fn find_one<C: ConnectionTrait>(
    db: &C,
    column: actors::Column,
    value: &str,
) -> DbResult<Option<actors::Model>> {
    Ok(actors::Entity::find()
        .filter(column.eq(value))
        .one(db)
        .await?)
}
