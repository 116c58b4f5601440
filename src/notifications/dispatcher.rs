//! Fan-out of engagement events into notifications.
//!
//! Every function here runs after the triggering mutation has committed and
//! swallows its own failures: a notification that cannot be written is
//! logged and dropped.

use crate::constants::{truncate_chars, NOTIFICATION_PREVIEW_LENGTH};
use crate::notifications::{create_notification, NewNotification, NotificationType};
use crate::orm::{comments, posts};
use sea_orm::ConnectionTrait;

async fn deliver<C: ConnectionTrait>(db: &C, new: NewNotification) {
    let kind = new.kind;
    if let Err(err) = create_notification(db, new).await {
        log::warn!("Failed to create {} notification: {}", kind.as_str(), err);
    }
}

/// Notify the post author of a like.
pub async fn notify_post_like<C: ConnectionTrait>(db: &C, post: &posts::Model, actor: &str) {
    let recipient = match &post.fingerprint {
        Some(fp) => fp.clone(),
        None => return,
    };

    deliver(
        db,
        NewNotification {
            recipient,
            actor: actor.to_string(),
            kind: NotificationType::PostLike,
            post_id: Some(post.id.clone()),
            comment_id: None,
            preview: truncate_chars(&post.content, NOTIFICATION_PREVIEW_LENGTH),
        },
    )
    .await;
}

/// Work out who hears about a new comment.
///
/// A reply goes to the author of the comment replied to. The post author is
/// told about every comment, unless they already received the reply
/// notification for this one.
pub fn comment_recipients(
    post: &posts::Model,
    reply_target: Option<&comments::Model>,
    actor: &str,
) -> Vec<(String, NotificationType)> {
    let mut recipients: Vec<(String, NotificationType)> = Vec::new();

    if let Some(target_fp) = reply_target.and_then(|c| c.fingerprint.as_deref()) {
        if target_fp != actor {
            recipients.push((target_fp.to_string(), NotificationType::CommentReply));
        }
    }

    if let Some(owner_fp) = post.fingerprint.as_deref() {
        let already = recipients.iter().any(|(fp, _)| fp == owner_fp);
        if owner_fp != actor && !already {
            recipients.push((owner_fp.to_string(), NotificationType::PostComment));
        }
    }

    recipients
}

/// Notify about a freshly stored comment.
pub async fn notify_comment<C: ConnectionTrait>(
    db: &C,
    post: &posts::Model,
    comment: &comments::Model,
    reply_target: Option<&comments::Model>,
) {
    let actor = match &comment.fingerprint {
        Some(fp) => fp.as_str(),
        None => return,
    };

    let preview = truncate_chars(&comment.content, NOTIFICATION_PREVIEW_LENGTH);
    for (recipient, kind) in comment_recipients(post, reply_target, actor) {
        deliver(
            db,
            NewNotification {
                recipient,
                actor: actor.to_string(),
                kind,
                post_id: Some(post.id.clone()),
                comment_id: Some(comment.id.clone()),
                preview: preview.clone(),
            },
        )
        .await;
    }
}
