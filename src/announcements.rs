//! Site announcements shown above the feed.

use crate::audit::{self, AuditActor, AuditEntry};
use crate::error::BoardError;
use crate::orm::announcements;
use crate::state::AppState;
use chrono::Utc;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr, Set, TransactionTrait};
use serde::Deserialize;
use validator::Validate;

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewAnnouncement {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

/// Newest first.
pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<announcements::Model>, DbErr> {
    announcements::Entity::find()
        .order_by_desc(announcements::Column::CreatedAt)
        .order_by_desc(announcements::Column::Id)
        .all(db)
        .await
}

pub async fn create(
    state: &AppState,
    actor: &AuditActor,
    request: NewAnnouncement,
) -> Result<announcements::Model, BoardError> {
    request.validate()?;
    let content = request.content.trim();
    if content.is_empty() {
        return Err(BoardError::validation("Content cannot be empty"));
    }

    let txn = state.db.begin().await?;
    let announcement = announcements::ActiveModel {
        content: Set(content.to_string()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    audit::record(
        &txn,
        actor,
        AuditEntry::new(
            "create_announcement",
            "announcement",
            announcement.id.to_string(),
        )
        .after(&announcement),
    )
    .await?;
    txn.commit().await?;

    log::info!(
        "Admin {} published announcement {}",
        actor.admin_username,
        announcement.id
    );
    Ok(announcement)
}

pub async fn delete(state: &AppState, actor: &AuditActor, id: i32) -> Result<(), BoardError> {
    let txn = state.db.begin().await?;
    let existing = announcements::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| BoardError::not_found("Announcement not found"))?;

    announcements::Entity::delete_many()
        .filter(announcements::Column::Id.eq(id))
        .exec(&txn)
        .await?;

    audit::record(
        &txn,
        actor,
        AuditEntry::new("delete_announcement", "announcement", id.to_string()).before(&existing),
    )
    .await?;
    txn.commit().await?;

    log::info!("Admin {} deleted announcement {}", actor.admin_username, id);
    Ok(())
}
