//! Posts: submission, feed ranking, detail views and admin editing.

use crate::audit::{self, AuditActor, AuditEntry};
use crate::app_config::LimitsConfig;
use crate::ban::{self, Capability};
use crate::captcha::verify_challenge;
use crate::constants::{
    page_window, ADMIN_AUTHOR, ANONYMOUS_AUTHOR, HOT_SCORE_THRESHOLD, HOT_TOP_RANK,
};
use crate::error::BoardError;
use crate::identity::Identity;
use crate::orm::post_reactions::{self, ReactionKind};
use crate::orm::{post_views, posts};
use crate::rate_limit::LimitedAction;
use crate::state::AppState;
use crate::stats;
use crate::word_filter::WordFilter;
use chrono::{Duration, Local, NaiveDateTime, TimeZone, Utc};
use sea_orm::{
    entity::*, query::*, sea_query::{Expr, SimpleExpr}, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

/// `views*0.2 + likes*3 + comments*2`, computed on read.
pub fn hot_score(views: i32, likes: i32, comments: i32) -> f64 {
    f64::from(views) * 0.2 + f64::from(likes) * 3.0 + f64::from(comments) * 2.0
}

/// Trim and check length and vocabulary. Returns the trimmed text.
pub fn validate_content(
    content: &str,
    max_chars: usize,
    filter: &WordFilter,
) -> Result<String, BoardError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(BoardError::validation("Content cannot be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(BoardError::validation(format!(
            "Content cannot exceed {} characters",
            max_chars
        )));
    }
    if filter.find_match(content).is_some() {
        return Err(BoardError::validation("Content contains a blocked word"));
    }
    Ok(content.to_string())
}

/// Trim, drop blanks and duplicates, then enforce count and length.
pub fn validate_tags(tags: &[String], limits: &LimitsConfig) -> Result<Vec<String>, BoardError> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if tag.chars().count() > limits.max_tag_length {
            return Err(BoardError::validation(format!(
                "Tags cannot exceed {} characters",
                limits.max_tag_length
            )));
        }
        if !cleaned.iter().any(|existing| existing == tag) {
            cleaned.push(tag.to_string());
        }
    }
    if cleaned.len() > limits.max_tags {
        return Err(BoardError::validation(format!(
            "At most {} tags are allowed",
            limits.max_tags
        )));
    }
    Ok(cleaned)
}

fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Public representation of a post.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub content: String,
    pub author: String,
    pub tags: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub likes_count: i32,
    pub dislikes_count: i32,
    pub comments_count: i32,
    pub views_count: i32,
    pub hot_score: f64,
    pub is_hot: bool,
    /// The caller's reaction; only filled on detail views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<ReactionKind>,
}

impl From<&posts::Model> for PostView {
    fn from(post: &posts::Model) -> Self {
        let score = hot_score(post.views_count, post.likes_count, post.comments_count);
        Self {
            id: post.id.clone(),
            content: post.content.clone(),
            author: post.author.clone(),
            tags: post.tag_list(),
            created_at: post.created_at,
            updated_at: post.updated_at,
            likes_count: post.likes_count,
            dislikes_count: post.dislikes_count,
            comments_count: post.comments_count,
            views_count: post.views_count,
            hot_score: score,
            is_hot: score >= HOT_SCORE_THRESHOLD,
            reaction: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub turnstile_token: Option<String>,
}

async fn insert_post<C: ConnectionTrait>(
    db: &C,
    content: String,
    tags: &[String],
    author: &str,
    identity: Option<&Identity>,
) -> Result<posts::Model, DbErr> {
    let post = posts::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        content: Set(content),
        author: Set(author.to_string()),
        tags: Set(encode_tags(tags)),
        created_at: Set(Utc::now().naive_utc()),
        updated_at: Set(None),
        deleted: Set(false),
        deleted_at: Set(None),
        session_id: Set(identity.map(|i| i.session_id.clone())),
        ip: Set(identity.map(|i| i.client_ip.clone())),
        fingerprint: Set(identity.and_then(|i| i.fingerprint.clone())),
        likes_count: Set(0),
        dislikes_count: Set(0),
        comments_count: Set(0),
        views_count: Set(0),
    };
    post.insert(db).await
}

/// Anonymous submission. Gates run in a fixed order: fingerprint, input,
/// ban, rate limit, challenge.
pub async fn submit_post(
    state: &AppState,
    identity: &Identity,
    request: NewPost,
) -> Result<PostView, BoardError> {
    identity.require_fingerprint()?;
    let content = validate_content(
        &request.content,
        state.limits.max_post_length,
        &state.word_filter,
    )?;
    let tags = validate_tags(&request.tags, &state.limits)?;

    ban::ensure_allowed(&state.db, identity, Capability::Post).await?;
    state.throttle.check(LimitedAction::Post, identity)?;
    verify_challenge(
        state.challenge.as_ref(),
        &state.settings,
        request.turnstile_token.as_deref(),
        "post",
        &identity.client_ip,
    )
    .await?;

    let txn = state.db.begin().await?;
    let post = insert_post(&txn, content, &tags, ANONYMOUS_AUTHOR, Some(identity)).await?;
    stats::increment_posts(&txn).await?;
    txn.commit().await?;

    Ok(PostView::from(&post))
}

/// Feed time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFilter {
    Today,
    Week,
    All,
}

impl Default for FeedFilter {
    fn default() -> Self {
        Self::All
    }
}

impl FeedFilter {
    /// Earliest creation time included, in UTC.
    fn cutoff(&self) -> Option<NaiveDateTime> {
        match self {
            FeedFilter::Today => {
                let midnight = Local::now().date_naive().and_hms_opt(0, 0, 0)?;
                Some(
                    Local
                        .from_local_datetime(&midnight)
                        .earliest()
                        .map(|local| local.naive_utc())
                        .unwrap_or_else(|| Utc::now().naive_utc() - Duration::days(1)),
                )
            }
            FeedFilter::Week => Some(Utc::now().naive_utc() - Duration::days(7)),
            FeedFilter::All => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub filter: FeedFilter,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FeedPage {
    pub items: Vec<PostView>,
    pub total: u64,
}

/// Rank by hot score, then newest. The top ranks of the filtered window are
/// always hot.
pub fn rank(posts: &[posts::Model]) -> Vec<PostView> {
    let mut views: Vec<PostView> = posts.iter().map(PostView::from).collect();
    views.sort_by(|a, b| {
        b.hot_score
            .partial_cmp(&a.hot_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    for (rank, view) in views.iter_mut().enumerate() {
        view.is_hot = view.is_hot || rank < HOT_TOP_RANK;
    }
    views
}

/// Escape `LIKE` wildcards so user input matches literally.
pub fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Substring match on the post body.
fn content_contains(term: &str) -> SimpleExpr {
    Expr::cust_with_values(
        "content LIKE ? ESCAPE '\\'",
        vec![format!("%{}%", escape_like(term))],
    )
}

pub async fn feed(db: &DatabaseConnection, query: &FeedQuery) -> Result<FeedPage, DbErr> {
    let mut select = posts::Entity::find().filter(posts::Column::Deleted.eq(false));
    if let Some(cutoff) = query.filter.cutoff() {
        select = select.filter(posts::Column::CreatedAt.gte(cutoff));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(content_contains(search));
    }

    let ranked = rank(&select.all(db).await?);
    let total = ranked.len() as u64;
    let (page, limit) = page_window(query.page, query.limit);
    let items = ranked
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    Ok(FeedPage { items, total })
}

/// A post that has not been soft-deleted.
pub async fn find_visible<C: ConnectionTrait>(
    db: &C,
    post_id: &str,
) -> Result<Option<posts::Model>, DbErr> {
    posts::Entity::find_by_id(post_id.to_string())
        .filter(posts::Column::Deleted.eq(false))
        .one(db)
        .await
}

/// Count the first view of a post per session. Returns true if counted.
pub async fn record_view(
    db: &DatabaseConnection,
    post_id: &str,
    session_id: &str,
) -> Result<bool, DbErr> {
    let txn = db.begin().await?;

    let seen = post_views::Entity::find_by_id((post_id.to_string(), session_id.to_string()))
        .one(&txn)
        .await?
        .is_some();

    if !seen {
        post_views::Entity::insert(post_views::ActiveModel {
            post_id: Set(post_id.to_string()),
            session_id: Set(session_id.to_string()),
            created_at: Set(Utc::now().naive_utc()),
        })
        .exec(&txn)
        .await?;

        posts::Entity::update_many()
            .col_expr(
                posts::Column::ViewsCount,
                Expr::col(posts::Column::ViewsCount).add(1),
            )
            .filter(posts::Column::Id.eq(post_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    Ok(!seen)
}

/// Detail view. Counts a deduplicated view and includes the caller's reaction.
pub async fn post_detail(
    db: &DatabaseConnection,
    identity: &Identity,
    post_id: &str,
) -> Result<PostView, BoardError> {
    if find_visible(db, post_id).await?.is_none() {
        return Err(BoardError::not_found("Post not found"));
    }

    record_view(db, post_id, &identity.session_id).await?;

    let post = find_visible(db, post_id)
        .await?
        .ok_or_else(|| BoardError::not_found("Post not found"))?;
    let mut view = PostView::from(&post);

    if let Some(fingerprint) = &identity.fingerprint {
        view.reaction = post_reactions::Entity::find_by_id((post_id.to_string(), fingerprint.clone()))
            .one(db)
            .await?
            .map(|row| row.reaction);
    }

    Ok(view)
}

/// Flip the soft-delete flag. Returns false when already in that state.
pub async fn set_deleted<C: ConnectionTrait>(
    db: &C,
    post_id: &str,
    deleted: bool,
) -> Result<bool, DbErr> {
    let deleted_at = if deleted {
        Some(Utc::now().naive_utc())
    } else {
        None
    };

    let result = posts::Entity::update_many()
        .col_expr(posts::Column::Deleted, Expr::value(deleted))
        .col_expr(posts::Column::DeletedAt, Expr::value(deleted_at))
        .filter(posts::Column::Id.eq(post_id))
        .filter(posts::Column::Deleted.eq(!deleted))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Post with its moderation-only fields, for the admin listing.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPostView {
    #[serde(flatten)]
    pub post: PostView,
    pub deleted: bool,
    pub deleted_at: Option<NaiveDateTime>,
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub fingerprint: Option<String>,
}

impl From<posts::Model> for AdminPostView {
    fn from(post: posts::Model) -> Self {
        Self {
            post: PostView::from(&post),
            deleted: post.deleted,
            deleted_at: post.deleted_at,
            session_id: post.session_id,
            ip: post.ip,
            fingerprint: post.fingerprint,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdminPostQuery {
    pub search: Option<String>,
    pub deleted: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AdminPostPage {
    pub items: Vec<AdminPostView>,
    pub total: u64,
}

/// Every post, deleted ones included, newest first.
pub async fn admin_list(
    db: &DatabaseConnection,
    query: &AdminPostQuery,
) -> Result<AdminPostPage, DbErr> {
    let mut select = posts::Entity::find();
    if let Some(deleted) = query.deleted {
        select = select.filter(posts::Column::Deleted.eq(deleted));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(content_contains(search))
                .add(posts::Column::Id.eq(search))
                .add(posts::Column::Ip.eq(search))
                .add(posts::Column::Fingerprint.eq(search)),
        );
    }

    let total = select.clone().count(db).await? as u64;
    let (page, limit) = page_window(query.page, query.limit);
    let items = select
        .order_by_desc(posts::Column::CreatedAt)
        .offset((page - 1) * limit)
        .limit(limit)
        .all(db)
        .await?
        .into_iter()
        .map(AdminPostView::from)
        .collect();

    Ok(AdminPostPage { items, total })
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdminNewPost {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Admin-authored post. No ban, rate limit or challenge gates apply.
pub async fn admin_create(
    state: &AppState,
    actor: &AuditActor,
    request: AdminNewPost,
) -> Result<PostView, BoardError> {
    let content = validate_content(
        &request.content,
        state.limits.max_post_length,
        &state.word_filter,
    )?;
    let tags = validate_tags(&request.tags, &state.limits)?;

    let txn = state.db.begin().await?;
    let post = insert_post(&txn, content, &tags, ADMIN_AUTHOR, None).await?;
    stats::increment_posts(&txn).await?;
    audit::record(
        &txn,
        actor,
        AuditEntry::new("create_post", "post", post.id.clone()).after(&post),
    )
    .await?;
    txn.commit().await?;

    log::info!("Admin {} created post {}", actor.admin_username, post.id);
    Ok(PostView::from(&post))
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PostEdit {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub async fn admin_edit(
    state: &AppState,
    actor: &AuditActor,
    post_id: &str,
    edit: PostEdit,
) -> Result<PostView, BoardError> {
    if edit.content.is_none() && edit.tags.is_none() {
        return Err(BoardError::validation("Nothing to update"));
    }

    let content = edit
        .content
        .as_deref()
        .map(|c| validate_content(c, state.limits.max_post_length, &state.word_filter))
        .transpose()?;
    let tags = edit
        .tags
        .as_deref()
        .map(|t| validate_tags(t, &state.limits))
        .transpose()?;

    let txn = state.db.begin().await?;
    let before = posts::Entity::find_by_id(post_id.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| BoardError::not_found("Post not found"))?;

    let mut model: posts::ActiveModel = before.clone().into();
    if let Some(content) = content {
        model.content = Set(content);
    }
    if let Some(tags) = tags {
        model.tags = Set(encode_tags(&tags));
    }
    model.updated_at = Set(Some(Utc::now().naive_utc()));
    let after = model.update(&txn).await?;

    audit::record(
        &txn,
        actor,
        AuditEntry::new("edit_post", "post", post_id)
            .before(&before)
            .after(&after),
    )
    .await?;
    txn.commit().await?;

    log::info!("Admin {} edited post {}", actor.admin_username, post_id);
    Ok(PostView::from(&after))
}
