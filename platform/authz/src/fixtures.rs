use chrono::Utc;
use entity::{actors, permissions, role_assignments, role_permissions, roles};
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use uuid::Uuid;

use crate::{AuthorizationGate, PermissionResolver};

/// In-memory SQLite store with the real migrations applied.
pub struct Fixture {
    pub db: DatabaseConnection,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        Self { db }
    }

    pub fn resolver(&self) -> PermissionResolver {
        PermissionResolver::new(self.db.clone())
    }

    pub fn gate(&self, code: &str) -> AuthorizationGate {
        AuthorizationGate::new(self.resolver(), code)
    }

    pub async fn actor(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        actors::ActiveModel {
            id: Set(id),
            username: Set(username.into()),
            email: Set(None),
            phone: Set(None),
            password_hash: Set("unused".into()),
            role_label: Set(String::new()),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .unwrap();
        id
    }

    /// Create a role granting `(code, active)` permissions, reusing existing codes.
    pub async fn role_with(&self, code: &str, name: &str, grants: &[(&str, bool)]) -> Uuid {
        let role_id = Uuid::new_v4();
        roles::ActiveModel {
            id: Set(role_id),
            code: Set(code.into()),
            name: Set(name.into()),
        }
        .insert(&self.db)
        .await
        .unwrap();
        for (permission_code, active) in grants {
            let permission_id = self.permission(permission_code, *active).await;
            role_permissions::ActiveModel {
                role_id: Set(role_id),
                permission_id: Set(permission_id),
            }
            .insert(&self.db)
            .await
            .unwrap();
        }
        role_id
    }

    /// Drop the assignment table so every role lookup fails at the store.
    pub async fn break_store(&self) {
        self.db
            .execute_unprepared("DROP TABLE role_assignments")
            .await
            .unwrap();
    }

    pub async fn assign(&self, actor_id: Uuid, role_id: Uuid) {
        role_assignments::ActiveModel {
            actor_id: Set(actor_id),
            role_id: Set(role_id),
        }
        .insert(&self.db)
        .await
        .unwrap();
    }

    async fn permission(&self, code: &str, active: bool) -> Uuid {
        if let Some(existing) = permissions::Entity::find()
            .filter(permissions::Column::Code.eq(code))
            .one(&self.db)
            .await
            .unwrap()
        {
            return existing.id;
        }
        let id = Uuid::new_v4();
        permissions::ActiveModel {
            id: Set(id),
            code: Set(code.into()),
            description: Set(None),
            is_active: Set(active),
        }
        .insert(&self.db)
        .await
        .unwrap();
        id
    }
}
