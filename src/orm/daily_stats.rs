//! SeaORM Entity for daily_stats table

use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Counters only ever go up.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "daily_stats")]
pub struct Model {
    /// Server-local calendar date, `YYYY-MM-DD`
    #[sea_orm(primary_key, auto_increment = false)]
    pub day: String,
    pub visits: i32,
    pub posts: i32,
    pub reports: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
