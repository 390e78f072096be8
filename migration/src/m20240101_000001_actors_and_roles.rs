use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
pub(crate) enum Actors {
    Table,
    Id,
    Username,
    Email,
    Phone,
    PasswordHash,
    RoleLabel,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Roles {
    Table,
    Id,
    Code,
    Name,
}

#[derive(DeriveIden)]
enum RoleAssignments {
    Table,
    ActorId,
    RoleId,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Actors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Actors::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Actors::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Actors::Email).string())
                    .col(ColumnDef::new(Actors::Phone).string())
                    .col(ColumnDef::new(Actors::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Actors::RoleLabel)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Actors::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Actors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_actors_email")
                    .table(Actors::Table)
                    .col(Actors::Email)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_actors_phone")
                    .table(Actors::Table)
                    .col(Actors::Phone)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Roles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Roles::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(Roles::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        // Foreign keys are declared inline so the schema also applies on SQLite.
        manager
            .create_table(
                Table::create()
                    .table(RoleAssignments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RoleAssignments::ActorId).uuid().not_null())
                    .col(ColumnDef::new(RoleAssignments::RoleId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_role_assignments")
                            .col(RoleAssignments::ActorId)
                            .col(RoleAssignments::RoleId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_assignments_actor")
                            .from(RoleAssignments::Table, RoleAssignments::ActorId)
                            .to(Actors::Table, Actors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_assignments_role")
                            .from(RoleAssignments::Table, RoleAssignments::RoleId)
                            .to(Roles::Table, Roles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_role_assignments_role")
                    .table(RoleAssignments::Table)
                    .col(RoleAssignments::RoleId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RoleAssignments::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Actors::Table).if_exists().to_owned())
            .await
    }
}
