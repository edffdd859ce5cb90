use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SecurityLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SecurityLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SecurityLogs::UserId).integer().null())
                    .col(ColumnDef::new(SecurityLogs::Action).string().not_null())
                    .col(ColumnDef::new(SecurityLogs::IpAddress).string().null())
                    .col(ColumnDef::new(SecurityLogs::UserAgent).string().null())
                    .col(ColumnDef::new(SecurityLogs::Success).boolean().not_null())
                    .col(ColumnDef::new(SecurityLogs::Details).string().null())
                    .col(ColumnDef::new(SecurityLogs::CreatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_security_logs_user_id")
                            .from(SecurityLogs::Table, SecurityLogs::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_security_logs_user_id")
                    .table(SecurityLogs::Table)
                    .col(SecurityLogs::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Newest-first listing
        manager
            .create_index(
                Index::create()
                    .name("idx_security_logs_created_at")
                    .table(SecurityLogs::Table)
                    .col(SecurityLogs::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SecurityLogs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SecurityLogs {
    Table,
    Id,
    UserId,
    Action,
    IpAddress,
    UserAgent,
    Success,
    Details,
    CreatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
