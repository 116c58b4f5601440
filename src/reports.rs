//! Report submission and the admin triage queue.

use crate::ban::{self, Capability};
use crate::constants::{page_window, truncate_chars, REPORT_SNIPPET_LENGTH};
use crate::error::BoardError;
use crate::identity::Identity;
use crate::orm::reports::{self, ReportStatus, ReportTarget, RiskLevel};
use crate::orm::{comments, posts, report_fingerprint_marks, report_session_marks};
use crate::rate_limit::LimitedAction;
use crate::state::AppState;
use crate::stats;
use chrono::Utc;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr, Set, TransactionTrait};
use serde::{Deserialize, Serialize};

const HIGH_RISK_KEYWORDS: &[&str] = &["隐私", "个人信息", "人肉", "privacy", "doxx"];
const MEDIUM_RISK_KEYWORDS: &[&str] = &[
    "骚扰",
    "谣言",
    "虚假",
    "harass",
    "misinformation",
    "rumor",
    "rumour",
];

/// Keyword bucket over the reason text. Approximate by nature; it only
/// orders the admin queue.
pub fn assess_risk(reason: &str) -> RiskLevel {
    let reason = reason.to_lowercase();
    if HIGH_RISK_KEYWORDS.iter().any(|k| reason.contains(k)) {
        RiskLevel::High
    } else if MEDIUM_RISK_KEYWORDS.iter().any(|k| reason.contains(k)) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportReceipt {
    pub id: String,
}

/// The thing being reported, resolved from the request.
#[derive(Clone, Debug)]
struct ResolvedTarget {
    kind: ReportTarget,
    post_id: String,
    comment_id: Option<String>,
    content: String,
}

impl ResolvedTarget {
    fn key(&self) -> String {
        match (&self.kind, &self.comment_id) {
            (ReportTarget::Comment, Some(id)) => format!("comment:{}", id),
            _ => format!("post:{}", self.post_id),
        }
    }
}

async fn resolve_target<C: ConnectionTrait>(
    db: &C,
    request: &NewReport,
) -> Result<ResolvedTarget, BoardError> {
    if let Some(comment_id) = request.comment_id.as_deref() {
        let comment = comments::Entity::find_by_id(comment_id.to_string())
            .filter(comments::Column::Deleted.eq(false))
            .one(db)
            .await?
            .ok_or_else(|| BoardError::not_found("Comment not found"))?;

        if let Some(post_id) = request.post_id.as_deref() {
            if post_id != comment.post_id {
                return Err(BoardError::validation("Comment does not belong to that post"));
            }
        }

        return Ok(ResolvedTarget {
            kind: ReportTarget::Comment,
            post_id: comment.post_id,
            comment_id: Some(comment.id),
            content: comment.content,
        });
    }

    let post_id = request
        .post_id
        .as_deref()
        .ok_or_else(|| BoardError::validation("A post or comment must be given"))?;

    let post = posts::Entity::find_by_id(post_id.to_string())
        .filter(posts::Column::Deleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| BoardError::not_found("Post not found"))?;

    Ok(ResolvedTarget {
        kind: ReportTarget::Post,
        post_id: post.id,
        comment_id: None,
        content: post.content,
    })
}

async fn already_reported<C: ConnectionTrait>(
    db: &C,
    session_id: &str,
    fingerprint: &str,
    target_key: &str,
) -> Result<bool, DbErr> {
    let by_session = report_session_marks::Entity::find_by_id((
        session_id.to_string(),
        target_key.to_string(),
    ))
    .one(db)
    .await?
    .is_some();

    if by_session {
        return Ok(true);
    }

    Ok(report_fingerprint_marks::Entity::find_by_id((
        fingerprint.to_string(),
        target_key.to_string(),
    ))
    .one(db)
    .await?
    .is_some())
}

/// File a report. Duplicates by session or by fingerprint answer 409 before
/// the rate limit is consulted.
pub async fn submit_report(
    state: &AppState,
    identity: &Identity,
    request: NewReport,
) -> Result<ReportReceipt, BoardError> {
    let fingerprint = identity.require_fingerprint()?.to_string();

    let reason = request.reason.trim().to_string();
    if reason.is_empty() {
        return Err(BoardError::validation("Reason cannot be empty"));
    }
    if reason.chars().count() > state.limits.max_report_reason_length {
        return Err(BoardError::validation(format!(
            "Reason cannot exceed {} characters",
            state.limits.max_report_reason_length
        )));
    }

    ban::ensure_allowed(&state.db, identity, Capability::Site).await?;

    let target = resolve_target(&state.db, &request).await?;
    let target_key = target.key();

    if already_reported(&state.db, &identity.session_id, &fingerprint, &target_key).await? {
        return Err(BoardError::conflict("You have already reported this"));
    }

    state.throttle.check(LimitedAction::Report, identity)?;

    let now = Utc::now().naive_utc();
    let txn = state.db.begin().await?;

    // Re-checked under the transaction; the first read was outside it
    if already_reported(&txn, &identity.session_id, &fingerprint, &target_key).await? {
        return Err(BoardError::conflict("You have already reported this"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    reports::Entity::insert(reports::ActiveModel {
        id: Set(id.clone()),
        post_id: Set(target.post_id.clone()),
        comment_id: Set(target.comment_id.clone()),
        target_type: Set(target.kind),
        risk_level: Set(assess_risk(&reason)),
        reason: Set(reason),
        content_snippet: Set(truncate_chars(&target.content, REPORT_SNIPPET_LENGTH)),
        status: Set(ReportStatus::Pending),
        action: Set(None),
        created_at: Set(now),
        resolved_at: Set(None),
        reporter_session_id: Set(identity.session_id.clone()),
        reporter_fingerprint: Set(fingerprint.clone()),
        reporter_ip: Set(identity.client_ip.clone()),
    })
    .exec(&txn)
    .await?;

    report_session_marks::Entity::insert(report_session_marks::ActiveModel {
        session_id: Set(identity.session_id.clone()),
        target_key: Set(target_key.clone()),
        created_at: Set(now),
    })
    .exec(&txn)
    .await?;

    report_fingerprint_marks::Entity::insert(report_fingerprint_marks::ActiveModel {
        fingerprint: Set(fingerprint),
        target_key: Set(target_key),
        created_at: Set(now),
    })
    .exec(&txn)
    .await?;

    stats::increment_reports(&txn).await?;
    txn.commit().await?;

    Ok(ReportReceipt { id })
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportPage {
    pub items: Vec<reports::Model>,
    pub total: u64,
}

/// Highest risk first, then newest.
pub fn triage_order(items: &mut [reports::Model]) {
    items.sort_by(|a, b| {
        b.risk_level
            .cmp(&a.risk_level)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

pub async fn list_reports<C: ConnectionTrait>(
    db: &C,
    query: &ReportQuery,
) -> Result<ReportPage, DbErr> {
    let mut select = reports::Entity::find();
    if let Some(status) = query.status {
        select = select.filter(reports::Column::Status.eq(status));
    }

    // Risk is stored as text, so ordering happens here
    let mut items = select.all(db).await?;
    triage_order(&mut items);

    let total = items.len() as u64;
    let (page, limit) = page_window(query.page, query.limit);
    let items = items
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    Ok(ReportPage { items, total })
}
