//! Notifications addressed to fingerprint identities.
//!
//! There are no accounts, so the recipient of a notification is whoever
//! authored the post or comment, identified by fingerprint hash.

pub mod dispatcher;
pub mod types;

use crate::constants::NOTIFICATION_LIST_LIMIT;
use crate::orm::notifications;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, sea_query::Expr, ConnectionTrait, DbErr, Set};
use serde::{Deserialize, Serialize};

pub use types::NotificationType;

/// A notification before it is stored.
#[derive(Clone, Debug)]
pub struct NewNotification {
    pub recipient: String,
    pub actor: String,
    pub kind: NotificationType,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub preview: String,
}

/// Store a notification. Returns None when it was suppressed because the
/// recipient is the actor or is unknown.
pub async fn create_notification<C: ConnectionTrait>(
    db: &C,
    new: NewNotification,
) -> Result<Option<i32>, DbErr> {
    if new.recipient.is_empty() || new.recipient == new.actor {
        return Ok(None);
    }

    let result = notifications::Entity::insert(notifications::ActiveModel {
        recipient_fingerprint: Set(new.recipient),
        type_: Set(new.kind.as_str().to_string()),
        post_id: Set(new.post_id),
        comment_id: Set(new.comment_id),
        preview: Set(new.preview),
        actor_fingerprint: Set(new.actor),
        created_at: Set(Utc::now().naive_utc()),
        read_at: Set(None),
        ..Default::default()
    })
    .exec(db)
    .await?;

    Ok(Some(result.last_insert_id))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: i32,
    #[serde(rename = "type")]
    pub kind: String,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub preview: String,
    pub created_at: NaiveDateTime,
    pub read_at: Option<NaiveDateTime>,
}

impl From<notifications::Model> for NotificationView {
    fn from(m: notifications::Model) -> Self {
        Self {
            id: m.id,
            kind: m.type_,
            post_id: m.post_id,
            comment_id: m.comment_id,
            preview: m.preview,
            created_at: m.created_at,
            read_at: m.read_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NotificationInbox {
    pub items: Vec<NotificationView>,
    pub unread: u64,
}

/// Count unread notifications for a fingerprint
pub async fn count_unread<C: ConnectionTrait>(db: &C, fingerprint: &str) -> Result<u64, DbErr> {
    let count = notifications::Entity::find()
        .filter(notifications::Column::RecipientFingerprint.eq(fingerprint))
        .filter(notifications::Column::ReadAt.is_null())
        .count(db)
        .await?;

    Ok(count as u64)
}

/// Newest notifications plus the unread total.
pub async fn inbox<C: ConnectionTrait>(db: &C, fingerprint: &str) -> Result<NotificationInbox, DbErr> {
    let items = notifications::Entity::find()
        .filter(notifications::Column::RecipientFingerprint.eq(fingerprint))
        .order_by_desc(notifications::Column::CreatedAt)
        .order_by_desc(notifications::Column::Id)
        .limit(NOTIFICATION_LIST_LIMIT)
        .all(db)
        .await?
        .into_iter()
        .map(NotificationView::from)
        .collect();

    Ok(NotificationInbox {
        items,
        unread: count_unread(db, fingerprint).await?,
    })
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MarkRead {
    pub ids: Option<Vec<i32>>,
}

/// Mark the given notifications read, or all of them when `ids` is absent.
/// Only the caller's own unread notifications are touched.
pub async fn mark_read<C: ConnectionTrait>(
    db: &C,
    fingerprint: &str,
    ids: Option<&[i32]>,
) -> Result<u64, DbErr> {
    let mut update = notifications::Entity::update_many()
        .col_expr(
            notifications::Column::ReadAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(notifications::Column::RecipientFingerprint.eq(fingerprint))
        .filter(notifications::Column::ReadAt.is_null());

    if let Some(ids) = ids {
        if ids.is_empty() {
            return Ok(0);
        }
        update = update.filter(notifications::Column::Id.is_in(ids.to_vec()));
    }

    Ok(update.exec(db).await?.rows_affected)
}
