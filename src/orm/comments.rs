//! SeaORM Entity for comments table

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "comments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub post_id: String,
    /// Always a root comment id; replies are never nested deeper.
    pub parent_id: Option<String>,
    /// The comment literally replied to, which may itself be a reply.
    pub reply_to_id: Option<String>,
    pub content: String,
    pub author: String,
    pub created_at: DateTime,
    pub deleted: bool,
    pub deleted_at: Option<DateTime>,
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub fingerprint: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::posts::Entity",
        from = "Column::PostId",
        to = "super::posts::Column::Id"
    )]
    Post,
}

impl Related<super::posts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
