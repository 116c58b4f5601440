//! Admin actions on reports, posts, comments and the ban registry.
//!
//! Each action runs in one transaction and writes its audit entries inside
//! it. Every ban written is audited on its own; the triggering action gets one
//! further entry.

use crate::audit::{self, AuditActor, AuditEntry};
use crate::ban::{self, BanEntry, BanKind, BanOptions, Capability, Permissions};
use crate::comments;
use crate::error::BoardError;
use crate::orm::reports::{self, ReportStatus, ReportTarget};
use crate::orm::{comments as comment_rows, posts as post_rows};
use crate::posts;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DbErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use validator::Validate;

/// Admin-supplied ban terms. Missing permissions mean all of them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BanParams {
    pub permissions: Option<Vec<Capability>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl BanParams {
    pub fn options(&self) -> Result<BanOptions, BoardError> {
        let permissions = match &self.permissions {
            None => Permissions::all(),
            Some(caps) if caps.is_empty() => {
                return Err(BoardError::validation("At least one permission is required"))
            }
            Some(caps) => Permissions::from_capabilities(caps),
        };

        let expires_at = self.expires_at.map(|at| at.naive_utc());
        if let Some(at) = expires_at {
            if at <= Utc::now().naive_utc() {
                return Err(BoardError::validation("Expiry must be in the future"));
            }
        }

        Ok(BanOptions {
            permissions,
            expires_at,
            reason: self
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        })
    }
}

/// Content a moderation action lands on.
#[derive(Clone, Debug)]
enum Content {
    Post(post_rows::Model),
    Comment(comment_rows::Model),
}

impl Content {
    fn ip(&self) -> Option<&str> {
        match self {
            Self::Post(p) => p.ip.as_deref(),
            Self::Comment(c) => c.ip.as_deref(),
        }
    }

    fn fingerprint(&self) -> Option<&str> {
        match self {
            Self::Post(p) => p.fingerprint.as_deref(),
            Self::Comment(c) => c.fingerprint.as_deref(),
        }
    }

    async fn soft_delete<C: ConnectionTrait>(&self, db: &C) -> Result<bool, DbErr> {
        match self {
            Self::Post(p) => posts::set_deleted(db, &p.id, true).await,
            Self::Comment(c) => comments::set_deleted(db, c, true).await,
        }
    }
}

async fn load_post<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<post_rows::Model>, DbErr> {
    post_rows::Entity::find_by_id(id.to_string()).one(db).await
}

async fn load_comment<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<comment_rows::Model>, DbErr> {
    comment_rows::Entity::find_by_id(id.to_string()).one(db).await
}

async fn report_content<C: ConnectionTrait>(
    db: &C,
    report: &reports::Model,
) -> Result<Option<Content>, DbErr> {
    Ok(match (report.target_type, report.comment_id.as_deref()) {
        (ReportTarget::Comment, Some(comment_id)) => {
            load_comment(db, comment_id).await?.map(Content::Comment)
        }
        _ => load_post(db, &report.post_id).await?.map(Content::Post),
    })
}

/// Distinct identities to ban, collected across a set of content.
#[derive(Clone, Debug, Default)]
pub struct BanTargets {
    pub ips: BTreeSet<String>,
    pub fingerprints: BTreeSet<String>,
}

impl BanTargets {
    fn add(&mut self, content: &Content) {
        if let Some(ip) = content.ip() {
            self.ips.insert(ip.to_string());
        }
        if let Some(fp) = content.fingerprint() {
            self.fingerprints.insert(fp.to_string());
        }
    }

    async fn apply<C: ConnectionTrait>(
        &self,
        db: &C,
        actor: &AuditActor,
        options: &BanOptions,
    ) -> Result<Vec<BanEntry>, DbErr> {
        let mut entries = Vec::with_capacity(self.ips.len() + self.fingerprints.len());
        for ip in &self.ips {
            entries.push(ban_with_audit(db, actor, BanKind::Ip, ip, options).await?);
        }
        for fp in &self.fingerprints {
            entries.push(ban_with_audit(db, actor, BanKind::Fingerprint, fp, options).await?);
        }
        Ok(entries)
    }
}

async fn ban_with_audit<C: ConnectionTrait>(
    db: &C,
    actor: &AuditActor,
    kind: BanKind,
    value: &str,
    options: &BanOptions,
) -> Result<BanEntry, DbErr> {
    let (previous, current) = ban::ban(db, kind, value, options).await?;
    audit::record(
        db,
        actor,
        AuditEntry::new(&format!("ban_{}", kind.as_str()), kind.as_str(), value)
            .before(&previous)
            .after(&current)
            .reason(options.reason.as_deref()),
    )
    .await?;

    log::info!(
        "Admin {} banned {} {} ({})",
        actor.admin_username,
        kind.as_str(),
        value,
        options.permissions.to_storage()
    );
    Ok(current)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Ignore,
    Resolve,
    Delete,
    Ban,
}

impl ReportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Resolve => "resolve",
            Self::Delete => "delete",
            Self::Ban => "ban",
        }
    }

    fn final_status(&self) -> ReportStatus {
        match self {
            Self::Ignore => ReportStatus::Ignored,
            _ => ReportStatus::Resolved,
        }
    }
}

/// Move a pending report to its terminal state and apply the content side of
/// the action. Returns false if the report was no longer pending.
async fn settle_report<C: ConnectionTrait>(
    db: &C,
    report: &reports::Model,
    action: ReportAction,
    targets: &mut BanTargets,
) -> Result<bool, DbErr> {
    let result = reports::Entity::update_many()
        .col_expr(reports::Column::Status, Expr::value(action.final_status()))
        .col_expr(reports::Column::Action, Expr::value(action.as_str()))
        .col_expr(
            reports::Column::ResolvedAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(reports::Column::Id.eq(report.id.as_str()))
        .filter(reports::Column::Status.eq(ReportStatus::Pending))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Ok(false);
    }

    if matches!(action, ReportAction::Delete | ReportAction::Ban) {
        if let Some(content) = report_content(db, report).await? {
            content.soft_delete(db).await?;
            if action == ReportAction::Ban {
                targets.add(&content);
            }
        }
    }

    Ok(true)
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReportActionRequest {
    pub action: ReportAction,
    #[serde(flatten)]
    pub ban: BanParams,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportActionOutcome {
    pub report: reports::Model,
    pub bans: Vec<BanEntry>,
}

/// Act on one report. A terminal report answers 409.
pub async fn act_on_report(
    state: &AppState,
    actor: &AuditActor,
    report_id: &str,
    request: ReportActionRequest,
) -> Result<ReportActionOutcome, BoardError> {
    let options = match request.action {
        ReportAction::Ban => request.ban.options()?,
        _ => BanOptions::default(),
    };

    let txn = state.db.begin().await?;
    let before = reports::Entity::find_by_id(report_id.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| BoardError::not_found("Report not found"))?;

    if before.status.is_terminal() {
        return Err(BoardError::conflict("Report has already been handled"));
    }

    let mut targets = BanTargets::default();
    if !settle_report(&txn, &before, request.action, &mut targets).await? {
        return Err(BoardError::conflict("Report has already been handled"));
    }

    let bans = targets.apply(&txn, actor, &options).await?;
    let after = reports::Entity::find_by_id(report_id.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| BoardError::not_found("Report not found"))?;

    audit::record(
        &txn,
        actor,
        AuditEntry::new(
            &format!("report_{}", request.action.as_str()),
            "report",
            report_id,
        )
        .before(&before)
        .after(&after)
        .reason(options.reason.as_deref()),
    )
    .await?;
    txn.commit().await?;

    log::info!(
        "Admin {} applied {} to report {}",
        actor.admin_username,
        request.action.as_str(),
        report_id
    );
    Ok(ReportActionOutcome {
        report: after,
        bans,
    })
}

fn check_batch(ids: &[String], max: usize) -> Result<Vec<String>, BoardError> {
    let unique: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    if unique.is_empty() {
        return Err(BoardError::validation("No ids given"));
    }
    if unique.len() > max {
        return Err(BoardError::validation(format!(
            "At most {} ids per batch",
            max
        )));
    }
    Ok(unique.into_iter().map(str::to_string).collect())
}

/// Per-item accounting for a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub affected: u64,
    /// Already in a terminal state
    pub skipped: u64,
    pub not_found: u64,
    pub bans: Vec<BanEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BatchReportRequest {
    pub ids: Vec<String>,
    pub action: ReportAction,
    #[serde(flatten)]
    pub ban: BanParams,
}

pub async fn act_on_reports(
    state: &AppState,
    actor: &AuditActor,
    request: BatchReportRequest,
) -> Result<BatchOutcome, BoardError> {
    let ids = check_batch(&request.ids, state.limits.max_batch_size)?;
    let options = match request.action {
        ReportAction::Ban => request.ban.options()?,
        _ => BanOptions::default(),
    };

    let txn = state.db.begin().await?;
    let found = reports::Entity::find()
        .filter(reports::Column::Id.is_in(ids.clone()))
        .all(&txn)
        .await?;

    let mut outcome = BatchOutcome {
        not_found: (ids.len() - found.len()) as u64,
        ..Default::default()
    };
    let mut targets = BanTargets::default();
    let mut settled: Vec<String> = Vec::new();

    for report in &found {
        if report.status.is_terminal() {
            outcome.skipped += 1;
            continue;
        }
        if settle_report(&txn, report, request.action, &mut targets).await? {
            outcome.affected += 1;
            settled.push(report.id.clone());
        } else {
            outcome.skipped += 1;
        }
    }

    outcome.bans = targets.apply(&txn, actor, &options).await?;
    audit::record(
        &txn,
        actor,
        AuditEntry::new(
            &format!("batch_report_{}", request.action.as_str()),
            "report",
            settled.join(","),
        )
        .after(&json!({
            "ids": settled,
            "affected": outcome.affected,
            "skipped": outcome.skipped,
            "notFound": outcome.not_found,
        }))
        .reason(options.reason.as_deref()),
    )
    .await?;
    txn.commit().await?;

    log::info!(
        "Admin {} applied {} to {} reports",
        actor.admin_username,
        request.action.as_str(),
        outcome.affected
    );
    Ok(outcome)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAction {
    Delete,
    Restore,
    Ban,
}

impl ContentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Restore => "restore",
            Self::Ban => "ban",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContentActionRequest {
    pub action: ContentAction,
    #[serde(flatten)]
    pub ban: BanParams,
}

#[derive(Clone, Debug, Serialize)]
pub struct ContentActionOutcome {
    /// Whether the deleted flag actually changed
    pub changed: bool,
    pub bans: Vec<BanEntry>,
}

async fn apply_content_action<C: ConnectionTrait>(
    db: &C,
    content: &Content,
    action: ContentAction,
    targets: &mut BanTargets,
) -> Result<bool, DbErr> {
    match action {
        ContentAction::Delete => content.soft_delete(db).await,
        ContentAction::Ban => {
            targets.add(content);
            content.soft_delete(db).await
        }
        ContentAction::Restore => match content {
            Content::Post(p) => posts::set_deleted(db, &p.id, false).await,
            Content::Comment(c) => comments::set_deleted(db, c, false).await,
        },
    }
}

/// Delete, restore or ban-and-delete a single post.
pub async fn act_on_post(
    state: &AppState,
    actor: &AuditActor,
    post_id: &str,
    request: ContentActionRequest,
) -> Result<ContentActionOutcome, BoardError> {
    let options = match request.action {
        ContentAction::Ban => request.ban.options()?,
        _ => BanOptions::default(),
    };

    let txn = state.db.begin().await?;
    let before = load_post(&txn, post_id)
        .await?
        .ok_or_else(|| BoardError::not_found("Post not found"))?;

    let mut targets = BanTargets::default();
    let content = Content::Post(before.clone());
    let changed = apply_content_action(&txn, &content, request.action, &mut targets).await?;
    let bans = targets.apply(&txn, actor, &options).await?;

    let after = load_post(&txn, post_id).await?;
    audit::record(
        &txn,
        actor,
        AuditEntry::new(&format!("{}_post", request.action.as_str()), "post", post_id)
            .before(&before)
            .after(&after)
            .reason(options.reason.as_deref()),
    )
    .await?;
    txn.commit().await?;

    log::info!(
        "Admin {} applied {} to post {}",
        actor.admin_username,
        request.action.as_str(),
        post_id
    );
    Ok(ContentActionOutcome { changed, bans })
}

/// Delete, restore or ban-and-delete a single comment.
pub async fn act_on_comment(
    state: &AppState,
    actor: &AuditActor,
    comment_id: &str,
    request: ContentActionRequest,
) -> Result<ContentActionOutcome, BoardError> {
    let options = match request.action {
        ContentAction::Ban => request.ban.options()?,
        _ => BanOptions::default(),
    };

    let txn = state.db.begin().await?;
    let before = load_comment(&txn, comment_id)
        .await?
        .ok_or_else(|| BoardError::not_found("Comment not found"))?;

    let mut targets = BanTargets::default();
    let content = Content::Comment(before.clone());
    let changed = apply_content_action(&txn, &content, request.action, &mut targets).await?;
    let bans = targets.apply(&txn, actor, &options).await?;

    let after = load_comment(&txn, comment_id).await?;
    audit::record(
        &txn,
        actor,
        AuditEntry::new(
            &format!("{}_comment", request.action.as_str()),
            "comment",
            comment_id,
        )
        .before(&before)
        .after(&after)
        .reason(options.reason.as_deref()),
    )
    .await?;
    txn.commit().await?;

    log::info!(
        "Admin {} applied {} to comment {}",
        actor.admin_username,
        request.action.as_str(),
        comment_id
    );
    Ok(ContentActionOutcome { changed, bans })
}

#[derive(Clone, Debug, Deserialize)]
pub struct BatchPostRequest {
    pub ids: Vec<String>,
    pub action: ContentAction,
    #[serde(flatten)]
    pub ban: BanParams,
}

/// Batch over posts. Posts already in the requested state count as skipped.
pub async fn act_on_posts(
    state: &AppState,
    actor: &AuditActor,
    request: BatchPostRequest,
) -> Result<BatchOutcome, BoardError> {
    let ids = check_batch(&request.ids, state.limits.max_batch_size)?;
    let options = match request.action {
        ContentAction::Ban => request.ban.options()?,
        _ => BanOptions::default(),
    };

    let txn = state.db.begin().await?;
    let found = post_rows::Entity::find()
        .filter(post_rows::Column::Id.is_in(ids.clone()))
        .all(&txn)
        .await?;

    let mut outcome = BatchOutcome {
        not_found: (ids.len() - found.len()) as u64,
        ..Default::default()
    };
    let mut targets = BanTargets::default();
    let mut touched: Vec<String> = Vec::new();

    for post in found {
        touched.push(post.id.clone());
        let content = Content::Post(post);
        if apply_content_action(&txn, &content, request.action, &mut targets).await? {
            outcome.affected += 1;
        } else {
            outcome.skipped += 1;
        }
    }

    outcome.bans = targets.apply(&txn, actor, &options).await?;
    audit::record(
        &txn,
        actor,
        AuditEntry::new(
            &format!("batch_post_{}", request.action.as_str()),
            "post",
            touched.join(","),
        )
        .after(&json!({
            "ids": touched,
            "affected": outcome.affected,
            "skipped": outcome.skipped,
            "notFound": outcome.not_found,
        }))
        .reason(options.reason.as_deref()),
    )
    .await?;
    txn.commit().await?;

    log::info!(
        "Admin {} applied {} to {} posts",
        actor.admin_username,
        request.action.as_str(),
        outcome.affected
    );
    Ok(outcome)
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct BanRequest {
    pub kind: BanKind,
    #[validate(length(min = 1, max = 128))]
    pub value: String,
    #[serde(flatten)]
    pub ban: BanParams,
}

/// Direct upsert from the ban management screen.
pub async fn create_ban(
    state: &AppState,
    actor: &AuditActor,
    request: BanRequest,
) -> Result<BanEntry, BoardError> {
    request.validate()?;
    let options = request.ban.options()?;
    let value = request.value.trim();
    if value.is_empty() {
        return Err(BoardError::validation("Value cannot be empty"));
    }

    let txn = state.db.begin().await?;
    let entry = ban_with_audit(&txn, actor, request.kind, value, &options).await?;
    txn.commit().await?;
    Ok(entry)
}

#[derive(Clone, Debug, Deserialize)]
pub struct BanAction {
    pub action: String,
    pub kind: BanKind,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnbanOutcome {
    pub removed: u64,
}

/// Hard-delete the listed bans. One audit entry per removed ban.
pub async fn apply_ban_action(
    state: &AppState,
    actor: &AuditActor,
    request: BanAction,
) -> Result<UnbanOutcome, BoardError> {
    if request.action != "unban" {
        return Err(BoardError::validation(format!(
            "Unknown ban action: {}",
            request.action
        )));
    }
    let values = check_batch(&request.values, state.limits.max_batch_size)?;

    let txn = state.db.begin().await?;
    let mut removed = 0;
    for value in &values {
        if let Some(previous) = ban::unban(&txn, request.kind, value).await? {
            audit::record(
                &txn,
                actor,
                AuditEntry::new(
                    &format!("unban_{}", request.kind.as_str()),
                    request.kind.as_str(),
                    value.as_str(),
                )
                .before(&previous),
            )
            .await?;
            removed += 1;
        }
    }
    txn.commit().await?;

    log::info!(
        "Admin {} removed {} {} bans",
        actor.admin_username,
        removed,
        request.kind.as_str()
    );
    Ok(UnbanOutcome { removed })
}
