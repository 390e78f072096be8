use sea_orm::entity::prelude::*;
use uuid::Uuid;

use crate::role_permissions;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Dot-namespaced capability code, e.g. `user.create`.
    #[sea_orm(unique)]
    pub code: String,
    pub description: Option<String>,
    /// Deactivated permissions are ignored even while still granted to roles.
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "role_permissions::Entity")]
    RolePermission,
}

impl Related<role_permissions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RolePermission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
