pub mod announcements;
pub mod audit_logs;
pub mod comments;
pub mod daily_stats;
pub mod daily_visits;
pub mod fingerprint_bans;
pub mod ip_bans;
pub mod notifications;
pub mod post_reactions;
pub mod post_views;
pub mod posts;
pub mod report_fingerprint_marks;
pub mod report_session_marks;
pub mod reports;
pub mod sensitive_words;
pub mod settings;
