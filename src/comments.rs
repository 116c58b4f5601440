//! Two-level comment threads.
//!
//! `parent_id` always names a root comment. Replying to a reply re-parents
//! the new comment onto that reply's root and keeps the literal target in
//! `reply_to_id`.

use crate::ban::{self, Capability};
use crate::captcha::verify_challenge;
use crate::constants::ANONYMOUS_AUTHOR;
use crate::error::BoardError;
use crate::identity::Identity;
use crate::notifications::dispatcher;
use crate::orm::{comments, posts};
use crate::posts::{find_visible, validate_content};
use crate::rate_limit::LimitedAction;
use crate::state::AppState;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseConnection, DbErr, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
    pub turnstile_token: Option<String>,
    pub parent_id: Option<String>,
    pub reply_to_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub reply_to_id: Option<String>,
    pub content: String,
    pub author: String,
    pub created_at: NaiveDateTime,
}

impl From<&comments::Model> for CommentView {
    fn from(c: &comments::Model) -> Self {
        Self {
            id: c.id.clone(),
            post_id: c.post_id.clone(),
            parent_id: c.parent_id.clone(),
            reply_to_id: c.reply_to_id.clone(),
            content: c.content.clone(),
            author: c.author.clone(),
            created_at: c.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CommentThread {
    pub root: CommentView,
    pub replies: Vec<CommentView>,
}

/// Where a new comment hangs in the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub parent_id: Option<String>,
    pub reply_to_id: Option<String>,
}

fn root_id(comment: &comments::Model) -> &str {
    comment.parent_id.as_deref().unwrap_or(&comment.id)
}

/// Flatten a requested reply target onto its root.
pub fn placement_for(target: Option<&comments::Model>) -> Placement {
    match target {
        None => Placement {
            parent_id: None,
            reply_to_id: None,
        },
        Some(target) => Placement {
            parent_id: Some(root_id(target).to_string()),
            reply_to_id: Some(target.id.clone()),
        },
    }
}

async fn find_live_comment<C: ConnectionTrait>(
    db: &C,
    post_id: &str,
    comment_id: &str,
) -> Result<Option<comments::Model>, DbErr> {
    comments::Entity::find_by_id(comment_id.to_string())
        .filter(comments::Column::PostId.eq(post_id))
        .filter(comments::Column::Deleted.eq(false))
        .one(db)
        .await
}

async fn adjust_count<C: ConnectionTrait>(db: &C, post_id: &str, delta: i32) -> Result<(), DbErr> {
    let mut update = posts::Entity::update_many()
        .col_expr(
            posts::Column::CommentsCount,
            Expr::col(posts::Column::CommentsCount).add(delta),
        )
        .filter(posts::Column::Id.eq(post_id));

    if delta < 0 {
        update = update.filter(posts::Column::CommentsCount.gte(-delta));
    }

    update.exec(db).await?;
    Ok(())
}

/// Check the post exists and find the comment being replied to, if any.
///
/// `replyToId` defaults to the parent; a bare `replyToId` acts as the parent.
async fn resolve_target<C: ConnectionTrait>(
    db: &C,
    post_id: &str,
    request: &NewComment,
) -> Result<Option<comments::Model>, BoardError> {
    if find_visible(db, post_id).await?.is_none() {
        return Err(BoardError::not_found("Post not found"));
    }

    let parent = match request.parent_id.as_deref() {
        Some(parent_id) => Some(
            find_live_comment(db, post_id, parent_id)
                .await?
                .ok_or_else(|| BoardError::not_found("Comment not found"))?,
        ),
        None => None,
    };

    let target = match request.reply_to_id.as_deref() {
        Some(reply_to_id) => Some(
            find_live_comment(db, post_id, reply_to_id)
                .await?
                .ok_or_else(|| BoardError::not_found("Comment not found"))?,
        ),
        None => parent.clone(),
    };

    if let (Some(parent), Some(target)) = (parent.as_ref(), target.as_ref()) {
        if root_id(parent) != root_id(target) {
            return Err(BoardError::validation(
                "Reply target is not in the given thread",
            ));
        }
    }

    Ok(target)
}

/// Anonymous comment submission, gated the same way as posts.
pub async fn submit_comment(
    state: &AppState,
    identity: &Identity,
    post_id: &str,
    request: NewComment,
) -> Result<CommentView, BoardError> {
    identity.require_fingerprint()?;
    let content = validate_content(
        &request.content,
        state.limits.max_comment_length,
        &state.word_filter,
    )?;

    ban::ensure_allowed(&state.db, identity, Capability::Comment).await?;
    // Unknown or mismatched targets are rejected before they cost any budget
    let target = resolve_target(&state.db, post_id, &request).await?;

    state.throttle.check(LimitedAction::Comment, identity)?;
    verify_challenge(
        state.challenge.as_ref(),
        &state.settings,
        request.turnstile_token.as_deref(),
        "comment",
        &identity.client_ip,
    )
    .await?;

    let txn = state.db.begin().await?;

    let post = find_visible(&txn, post_id)
        .await?
        .ok_or_else(|| BoardError::not_found("Post not found"))?;

    let placement = placement_for(target.as_ref());
    let comment = comments::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        post_id: Set(post_id.to_string()),
        parent_id: Set(placement.parent_id),
        reply_to_id: Set(placement.reply_to_id),
        content: Set(content),
        author: Set(ANONYMOUS_AUTHOR.to_string()),
        created_at: Set(Utc::now().naive_utc()),
        deleted: Set(false),
        deleted_at: Set(None),
        session_id: Set(Some(identity.session_id.clone())),
        ip: Set(Some(identity.client_ip.clone())),
        fingerprint: Set(identity.fingerprint.clone()),
    }
    .insert(&txn)
    .await?;

    adjust_count(&txn, post_id, 1).await?;
    txn.commit().await?;

    dispatcher::notify_comment(&state.db, &post, &comment, target.as_ref()).await;

    Ok(CommentView::from(&comment))
}

/// Group live comments into threads, oldest first.
pub fn build_threads(all: &[comments::Model]) -> Vec<CommentThread> {
    let mut threads: Vec<CommentThread> = all
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|root| CommentThread {
            root: CommentView::from(root),
            replies: Vec::new(),
        })
        .collect();

    for reply in all.iter().filter(|c| c.parent_id.is_some()) {
        if let Some(thread) = threads
            .iter_mut()
            .find(|t| Some(&t.root.id) == reply.parent_id.as_ref())
        {
            thread.replies.push(CommentView::from(reply));
        }
    }

    threads
}

pub async fn list_threads(
    db: &DatabaseConnection,
    post_id: &str,
) -> Result<Vec<CommentThread>, BoardError> {
    if find_visible(db, post_id).await?.is_none() {
        return Err(BoardError::not_found("Post not found"));
    }

    let all = comments::Entity::find()
        .filter(comments::Column::PostId.eq(post_id))
        .filter(comments::Column::Deleted.eq(false))
        .order_by_asc(comments::Column::CreatedAt)
        .order_by_asc(comments::Column::Id)
        .all(db)
        .await?;

    Ok(build_threads(&all))
}

/// Flip a comment's soft-delete flag and keep the post's count in step.
/// Returns false when the comment was already in that state.
pub async fn set_deleted<C: ConnectionTrait>(
    db: &C,
    comment: &comments::Model,
    deleted: bool,
) -> Result<bool, DbErr> {
    let deleted_at = if deleted {
        Some(Utc::now().naive_utc())
    } else {
        None
    };

    let result = comments::Entity::update_many()
        .col_expr(comments::Column::Deleted, Expr::value(deleted))
        .col_expr(comments::Column::DeletedAt, Expr::value(deleted_at))
        .filter(comments::Column::Id.eq(comment.id.as_str()))
        .filter(comments::Column::Deleted.eq(!deleted))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Ok(false);
    }

    adjust_count(db, &comment.post_id, if deleted { -1 } else { 1 }).await?;
    Ok(true)
}
