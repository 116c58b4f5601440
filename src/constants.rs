//! Application-wide constants
//!
//! This module contains constants used throughout the application.

/// Author label for posts submitted through the public board.
pub const ANONYMOUS_AUTHOR: &str = "匿名";

/// Author label for posts created from the admin surface.
pub const ADMIN_AUTHOR: &str = "admin";

/// Report snippets keep this many characters of the reported content, captured
/// at submission time so they survive later edits and deletes.
pub const REPORT_SNIPPET_LENGTH: usize = 100;

/// Notification previews keep this many characters.
pub const NOTIFICATION_PREVIEW_LENGTH: usize = 50;

/// Posts at or above this hot score carry the hot badge.
pub const HOT_SCORE_THRESHOLD: f64 = 20.0;

/// The first N posts of a ranked feed window are always hot.
pub const HOT_TOP_RANK: usize = 3;

/// Audit entries older than this are swept.
pub const AUDIT_RETENTION_DAYS: i64 = 30;

/// A session counts as online if it was seen within this many seconds.
pub const ONLINE_WINDOW_SECONDS: u64 = 120;

/// There is a single configured administrator.
pub const ADMIN_ID: i32 = 1;

/// Default and maximum page sizes for listings.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Cap on notifications returned to a client in one listing.
pub const NOTIFICATION_LIST_LIMIT: u64 = 50;

/// Normalize 1-based page and page size query values.
pub fn page_window(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
