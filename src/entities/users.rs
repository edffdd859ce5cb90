use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Lowercased, trimmed address.
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id PHC string
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    pub phone: Option<String>,

    pub address: Option<String>,

    pub birth_date: Option<String>,

    /// `customer`, `admin` or `staff`
    pub role: String,

    pub is_active: bool,

    pub email_verified: bool,

    pub failed_login_attempts: i32,

    pub locked_until: Option<String>,

    pub last_login: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::security_logs::Entity")]
    SecurityLogs,
}

impl Related<super::security_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SecurityLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
