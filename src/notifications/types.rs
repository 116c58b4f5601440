//! Notification type definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    PostLike,     // Someone liked your post
    PostComment,  // Someone commented on your post
    CommentReply, // Someone replied to your comment
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostLike => "post_like",
            Self::PostComment => "post_comment",
            Self::CommentReply => "comment_reply",
        }
    }
}
