//! Like/dislike toggles.
//!
//! One reaction row per (post, fingerprint). Repeating a reaction clears it;
//! switching moves one unit between the two counters. The read, the row write
//! and both counter updates happen in one transaction.

use crate::ban::{self, Capability};
use crate::error::BoardError;
use crate::identity::Identity;
use crate::notifications::dispatcher;
use crate::orm::post_reactions::{self, ReactionKind};
use crate::orm::posts;
use crate::posts::find_visible;
use crate::state::AppState;
use chrono::Utc;
use sea_orm::{entity::*, query::*, sea_query::Expr, ConnectionTrait, DbErr, Set, TransactionTrait};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReactionOutcome {
    pub likes: i32,
    pub dislikes: i32,
    /// None once toggled off
    pub reaction: Option<ReactionKind>,
}

/// Counter changes for a toggle, as (likes delta, dislikes delta, resulting reaction).
pub fn toggle_delta(
    previous: Option<ReactionKind>,
    requested: ReactionKind,
) -> (i32, i32, Option<ReactionKind>) {
    let unit = |kind: ReactionKind| match kind {
        ReactionKind::Like => (1, 0),
        ReactionKind::Dislike => (0, 1),
    };

    match previous {
        None => {
            let (l, d) = unit(requested);
            (l, d, Some(requested))
        }
        Some(prev) if prev == requested => {
            let (l, d) = unit(requested);
            (-l, -d, None)
        }
        Some(prev) => {
            let (add_l, add_d) = unit(requested);
            let (sub_l, sub_d) = unit(prev);
            (add_l - sub_l, add_d - sub_d, Some(requested))
        }
    }
}

async fn apply_counts<C: ConnectionTrait>(
    db: &C,
    post_id: &str,
    likes: i32,
    dislikes: i32,
) -> Result<(), DbErr> {
    if likes == 0 && dislikes == 0 {
        return Ok(());
    }

    posts::Entity::update_many()
        .col_expr(
            posts::Column::LikesCount,
            Expr::col(posts::Column::LikesCount).add(likes),
        )
        .col_expr(
            posts::Column::DislikesCount,
            Expr::col(posts::Column::DislikesCount).add(dislikes),
        )
        .filter(posts::Column::Id.eq(post_id))
        .exec(db)
        .await?;

    Ok(())
}

pub async fn toggle(
    state: &AppState,
    identity: &Identity,
    post_id: &str,
    requested: ReactionKind,
) -> Result<ReactionOutcome, BoardError> {
    let fingerprint = identity.require_fingerprint()?.to_string();
    ban::ensure_allowed(&state.db, identity, Capability::Like).await?;

    let txn = state.db.begin().await?;

    if find_visible(&txn, post_id).await?.is_none() {
        return Err(BoardError::not_found("Post not found"));
    }

    let previous = post_reactions::Entity::find_by_id((post_id.to_string(), fingerprint.clone()))
        .one(&txn)
        .await?
        .map(|row| row.reaction);

    let (likes_delta, dislikes_delta, resulting) = toggle_delta(previous, requested);

    match (previous, resulting) {
        (None, Some(kind)) => {
            post_reactions::Entity::insert(post_reactions::ActiveModel {
                post_id: Set(post_id.to_string()),
                fingerprint: Set(fingerprint.clone()),
                reaction: Set(kind),
                created_at: Set(Utc::now().naive_utc()),
            })
            .exec(&txn)
            .await?;
        }
        (Some(_), None) => {
            post_reactions::Entity::delete_many()
                .filter(post_reactions::Column::PostId.eq(post_id))
                .filter(post_reactions::Column::Fingerprint.eq(fingerprint.as_str()))
                .exec(&txn)
                .await?;
        }
        (Some(_), Some(kind)) => {
            post_reactions::Entity::update_many()
                .col_expr(post_reactions::Column::Reaction, Expr::value(kind))
                .col_expr(
                    post_reactions::Column::CreatedAt,
                    Expr::value(Utc::now().naive_utc()),
                )
                .filter(post_reactions::Column::PostId.eq(post_id))
                .filter(post_reactions::Column::Fingerprint.eq(fingerprint.as_str()))
                .exec(&txn)
                .await?;
        }
        (None, None) => {}
    }

    apply_counts(&txn, post_id, likes_delta, dislikes_delta).await?;

    let post = posts::Entity::find_by_id(post_id.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| BoardError::not_found("Post not found"))?;

    txn.commit().await?;

    if resulting == Some(ReactionKind::Like) {
        dispatcher::notify_post_like(&state.db, &post, &fingerprint).await;
    }

    Ok(ReactionOutcome {
        likes: post.likes_count,
        dislikes: post.dislikes_count,
        reaction: resulting,
    })
}
