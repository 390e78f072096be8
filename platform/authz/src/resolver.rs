use std::collections::BTreeSet;

use entity::{permissions, role_assignments, role_permissions, roles};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QuerySelect,
    RelationTrait, Select,
};
use uuid::Uuid;

use crate::{AuthzResult, elevated::is_elevated_role};

/// Resolves an actor's effective permission codes through
/// role_assignments → roles → role_permissions → permissions.
///
/// Every call goes to the store; nothing is cached between calls.
#[derive(Clone, Debug)]
pub struct PermissionResolver {
    db: DatabaseConnection,
}

impl PermissionResolver {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// True when at least one of the actor's roles grants the active `code`.
    pub async fn has_permission(&self, actor_id: Uuid, code: &str) -> AuthzResult<bool> {
        let hit = granted_permissions(actor_id)
            .filter(permissions::Column::Code.eq(code))
            .select_only()
            .column(permissions::Column::Id)
            .into_tuple::<Uuid>()
            .one(&self.db)
            .await?;
        Ok(hit.is_some())
    }

    /// Distinct active codes reachable from any of the actor's roles.
    pub async fn list_permissions(&self, actor_id: Uuid) -> AuthzResult<BTreeSet<String>> {
        let codes = granted_permissions(actor_id)
            .select_only()
            .column(permissions::Column::Code)
            .distinct()
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(codes.into_iter().collect())
    }

    pub async fn assigned_roles(&self, actor_id: Uuid) -> AuthzResult<Vec<roles::Model>> {
        let assigned = roles::Entity::find()
            .join(JoinType::InnerJoin, roles::Relation::RoleAssignment.def())
            .filter(role_assignments::Column::ActorId.eq(actor_id))
            .all(&self.db)
            .await?;
        Ok(assigned)
    }

    /// The first assigned role that implicitly grants everything, if any.
    pub async fn elevated_role(&self, actor_id: Uuid) -> AuthzResult<Option<roles::Model>> {
        let assigned = self.assigned_roles(actor_id).await?;
        Ok(assigned.into_iter().find(is_elevated_role))
    }
}

fn granted_permissions(actor_id: Uuid) -> Select<permissions::Entity> {
    permissions::Entity::find()
        .join(JoinType::InnerJoin, permissions::Relation::RolePermission.def())
        .join(JoinType::InnerJoin, role_permissions::Relation::Role.def())
        .join(JoinType::InnerJoin, roles::Relation::RoleAssignment.def())
        .filter(role_assignments::Column::ActorId.eq(actor_id))
        .filter(permissions::Column::IsActive.eq(true))
}
