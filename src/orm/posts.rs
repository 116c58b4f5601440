//! SeaORM Entity for posts table

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub content: String,
    pub author: String,
    /// JSON array of tag strings
    pub tags: String,
    pub created_at: DateTime,
    pub updated_at: Option<DateTime>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime>,
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub fingerprint: Option<String>,
    pub likes_count: i32,
    pub dislikes_count: i32,
    pub comments_count: i32,
    pub views_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::comments::Entity")]
    Comments,
}

impl Related<super::comments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}
