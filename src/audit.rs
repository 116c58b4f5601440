//! Append-only audit log of admin-initiated state changes.
//!
//! Entries are written inside the same transaction as the change they
//! describe. Anything older than the retention window is swept whenever the
//! log is read or written.

use crate::constants::{page_window, AUDIT_RETENTION_DAYS};
use crate::orm::audit_logs;
use chrono::{Duration, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr, Set};
use serde::{Deserialize, Serialize};

/// Who performed an admin action, and from where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditActor {
    pub admin_id: i32,
    pub admin_username: String,
    pub ip: String,
    pub session_id: String,
}

/// One audit record before it is written.
#[derive(Clone, Debug, Default)]
pub struct AuditEntry {
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub reason: Option<String>,
}

impl AuditEntry {
    pub fn new(action: &str, target_type: &str, target_id: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id: target_id.into(),
            ..Default::default()
        }
    }

    pub fn before<T: Serialize>(mut self, snapshot: &T) -> Self {
        self.before = serde_json::to_value(snapshot).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, snapshot: &T) -> Self {
        self.after = serde_json::to_value(snapshot).ok();
        self
    }

    pub fn reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(str::to_string);
        self
    }
}

/// Delete entries past the retention window.
pub async fn sweep<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    let cutoff = Utc::now().naive_utc() - Duration::days(AUDIT_RETENTION_DAYS);
    let result = audit_logs::Entity::delete_many()
        .filter(audit_logs::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        log::debug!("Swept {} expired audit entries", result.rows_affected);
    }
    Ok(result.rows_affected)
}

/// Append one entry.
pub async fn record<C: ConnectionTrait>(
    db: &C,
    actor: &AuditActor,
    entry: AuditEntry,
) -> Result<(), DbErr> {
    sweep(db).await?;

    audit_logs::Entity::insert(audit_logs::ActiveModel {
        admin_id: Set(actor.admin_id),
        admin_username: Set(actor.admin_username.clone()),
        action: Set(entry.action),
        target_type: Set(entry.target_type),
        target_id: Set(entry.target_id),
        before_json: Set(entry.before.map(|v| v.to_string())),
        after_json: Set(entry.after.map(|v| v.to_string())),
        reason: Set(entry.reason),
        ip: Set(actor.ip.clone()),
        session_id: Set(actor.session_id.clone()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    })
    .exec(db)
    .await?;

    Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditPage {
    pub items: Vec<audit_logs::Model>,
    pub total: u64,
}

/// Newest first.
pub async fn list<C: ConnectionTrait>(db: &C, query: &AuditQuery) -> Result<AuditPage, DbErr> {
    sweep(db).await?;

    let mut select = audit_logs::Entity::find();
    if let Some(action) = &query.action {
        select = select.filter(audit_logs::Column::Action.eq(action.as_str()));
    }
    if let Some(target_type) = &query.target_type {
        select = select.filter(audit_logs::Column::TargetType.eq(target_type.as_str()));
    }
    if let Some(target_id) = &query.target_id {
        select = select.filter(audit_logs::Column::TargetId.eq(target_id.as_str()));
    }

    let total = select.clone().count(db).await? as u64;
    let (page, limit) = page_window(query.page, query.limit);
    let items = select
        .order_by_desc(audit_logs::Column::CreatedAt)
        .order_by_desc(audit_logs::Column::Id)
        .offset((page - 1) * limit)
        .limit(limit)
        .all(db)
        .await?;

    Ok(AuditPage { items, total })
}
