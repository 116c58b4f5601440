//! Ban registry keyed by IP or fingerprint hash.
//!
//! Each entry carries a permission set over a closed capability enum and an
//! optional expiry. An entry with `site` blocks everything. Expired entries are
//! deleted when a lookup runs into them.

use crate::error::BoardError;
use crate::identity::Identity;
use crate::orm::{fingerprint_bans, ip_bans};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags::bitflags! {
    /// Set of capabilities an entry blocks.
    pub struct Permissions: u8 {
        const POST = 1 << 0;
        const COMMENT = 1 << 1;
        const LIKE = 1 << 2;
        const VIEW = 1 << 3;
        const SITE = 1 << 4;
    }
}

/// A gated action class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Post,
    Comment,
    Like,
    View,
    Site,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Post,
        Capability::Comment,
        Capability::Like,
        Capability::View,
        Capability::Site,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Like => "like",
            Self::View => "view",
            Self::Site => "site",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.as_str() == name)
    }

    pub fn flag(&self) -> Permissions {
        match self {
            Self::Post => Permissions::POST,
            Self::Comment => Permissions::COMMENT,
            Self::Like => Permissions::LIKE,
            Self::View => Permissions::VIEW,
            Self::Site => Permissions::SITE,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Permissions {
    pub fn from_capabilities(caps: &[Capability]) -> Self {
        caps.iter().fold(Self::empty(), |acc, cap| acc | cap.flag())
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| self.contains(cap.flag()))
            .collect()
    }

    /// `site` supersedes every other capability.
    pub fn blocks(&self, cap: Capability) -> bool {
        self.contains(Permissions::SITE) || self.contains(cap.flag())
    }

    pub fn to_storage(&self) -> String {
        self.capabilities()
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_storage(stored: &str) -> Self {
        stored
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .fold(Self::empty(), |acc, name| match Capability::parse(name) {
                Some(cap) => acc | cap.flag(),
                None => {
                    log::warn!("Ignoring unknown ban permission {:?}", name);
                    acc
                }
            })
    }
}

/// Which registry table an entry lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanKind {
    Ip,
    Fingerprint,
}

impl BanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Fingerprint => "fingerprint",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    pub kind: BanKind,
    pub value: String,
    pub banned_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
    pub permissions: Vec<Capability>,
    pub reason: Option<String>,
}

impl BanEntry {
    pub fn permission_set(&self) -> Permissions {
        Permissions::from_capabilities(&self.permissions)
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at.map_or(false, |expires| expires <= now)
    }
}

impl From<ip_bans::Model> for BanEntry {
    fn from(m: ip_bans::Model) -> Self {
        Self {
            kind: BanKind::Ip,
            permissions: Permissions::from_storage(&m.permissions).capabilities(),
            value: m.value,
            banned_at: m.banned_at,
            expires_at: m.expires_at,
            reason: m.reason,
        }
    }
}

impl From<fingerprint_bans::Model> for BanEntry {
    fn from(m: fingerprint_bans::Model) -> Self {
        Self {
            kind: BanKind::Fingerprint,
            permissions: Permissions::from_storage(&m.permissions).capabilities(),
            value: m.value,
            banned_at: m.banned_at,
            expires_at: m.expires_at,
            reason: m.reason,
        }
    }
}

/// What a ban blocks and for how long. Defaults to everything, forever.
#[derive(Clone, Debug, PartialEq)]
pub struct BanOptions {
    pub permissions: Permissions,
    pub expires_at: Option<NaiveDateTime>,
    pub reason: Option<String>,
}

impl Default for BanOptions {
    fn default() -> Self {
        Self {
            permissions: Permissions::all(),
            expires_at: None,
            reason: None,
        }
    }
}

async fn find_row<C: ConnectionTrait>(
    db: &C,
    kind: BanKind,
    value: &str,
) -> Result<Option<BanEntry>, DbErr> {
    Ok(match kind {
        BanKind::Ip => ip_bans::Entity::find_by_id(value.to_owned())
            .one(db)
            .await?
            .map(BanEntry::from),
        BanKind::Fingerprint => fingerprint_bans::Entity::find_by_id(value.to_owned())
            .one(db)
            .await?
            .map(BanEntry::from),
    })
}

async fn delete_row<C: ConnectionTrait>(db: &C, kind: BanKind, value: &str) -> Result<u64, DbErr> {
    let result = match kind {
        BanKind::Ip => {
            ip_bans::Entity::delete_many()
                .filter(ip_bans::Column::Value.eq(value))
                .exec(db)
                .await?
        }
        BanKind::Fingerprint => {
            fingerprint_bans::Entity::delete_many()
                .filter(fingerprint_bans::Column::Value.eq(value))
                .exec(db)
                .await?
        }
    };
    Ok(result.rows_affected)
}

/// Active entry for one key. An expired entry is deleted and reported absent.
pub async fn find_active<C: ConnectionTrait>(
    db: &C,
    kind: BanKind,
    value: &str,
) -> Result<Option<BanEntry>, DbErr> {
    let entry = match find_row(db, kind, value).await? {
        Some(entry) => entry,
        None => return Ok(None),
    };

    if entry.is_expired(Utc::now().naive_utc()) {
        delete_row(db, kind, value).await?;
        log::debug!("Pruned expired {} ban {}", kind.as_str(), value);
        return Ok(None);
    }

    Ok(Some(entry))
}

/// Active entries that apply to an identity.
pub async fn active_entries<C: ConnectionTrait>(
    db: &C,
    ip: &str,
    fingerprint: Option<&str>,
) -> Result<Vec<BanEntry>, DbErr> {
    let mut entries = Vec::with_capacity(2);
    if let Some(entry) = find_active(db, BanKind::Ip, ip).await? {
        entries.push(entry);
    }
    if let Some(fp) = fingerprint {
        if let Some(entry) = find_active(db, BanKind::Fingerprint, fp).await? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// True iff an active entry for the IP or the fingerprint blocks `capability`.
pub async fn is_blocked<C: ConnectionTrait>(
    db: &C,
    ip: &str,
    fingerprint: Option<&str>,
    capability: Capability,
) -> Result<bool, DbErr> {
    Ok(active_entries(db, ip, fingerprint)
        .await?
        .iter()
        .any(|entry| entry.permission_set().blocks(capability)))
}

/// Reject the request if the identity is banned from `capability`.
pub async fn ensure_allowed<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
    capability: Capability,
) -> Result<(), BoardError> {
    if is_blocked(
        db,
        &identity.client_ip,
        identity.fingerprint.as_deref(),
        capability,
    )
    .await?
    {
        return Err(BoardError::Banned(capability));
    }
    Ok(())
}

/// Insert or overwrite a ban. Returns the entry it replaced, if any.
///
/// Overwrite is total: the previous permission set is not merged in.
pub async fn ban<C: ConnectionTrait>(
    db: &C,
    kind: BanKind,
    value: &str,
    options: &BanOptions,
) -> Result<(Option<BanEntry>, BanEntry), DbErr> {
    let previous = find_row(db, kind, value).await?;
    if previous.is_some() {
        delete_row(db, kind, value).await?;
    }

    let now = Utc::now().naive_utc();
    let permissions = options.permissions.to_storage();

    match kind {
        BanKind::Ip => {
            ip_bans::Entity::insert(ip_bans::ActiveModel {
                value: Set(value.to_owned()),
                banned_at: Set(now),
                expires_at: Set(options.expires_at),
                permissions: Set(permissions),
                reason: Set(options.reason.clone()),
            })
            .exec(db)
            .await?;
        }
        BanKind::Fingerprint => {
            fingerprint_bans::Entity::insert(fingerprint_bans::ActiveModel {
                value: Set(value.to_owned()),
                banned_at: Set(now),
                expires_at: Set(options.expires_at),
                permissions: Set(permissions),
                reason: Set(options.reason.clone()),
            })
            .exec(db)
            .await?;
        }
    }

    let current = BanEntry {
        kind,
        value: value.to_owned(),
        banned_at: now,
        expires_at: options.expires_at,
        permissions: options.permissions.capabilities(),
        reason: options.reason.clone(),
    };

    Ok((previous, current))
}

/// Hard delete. Returns the removed entry.
pub async fn unban<C: ConnectionTrait>(
    db: &C,
    kind: BanKind,
    value: &str,
) -> Result<Option<BanEntry>, DbErr> {
    let existing = find_row(db, kind, value).await?;
    if existing.is_some() {
        delete_row(db, kind, value).await?;
    }
    Ok(existing)
}

/// Every active entry of one kind, newest first. Expired rows are pruned.
pub async fn list_bans<C: ConnectionTrait>(db: &C, kind: BanKind) -> Result<Vec<BanEntry>, DbErr> {
    let entries: Vec<BanEntry> = match kind {
        BanKind::Ip => ip_bans::Entity::find()
            .order_by_desc(ip_bans::Column::BannedAt)
            .all(db)
            .await?
            .into_iter()
            .map(BanEntry::from)
            .collect(),
        BanKind::Fingerprint => fingerprint_bans::Entity::find()
            .order_by_desc(fingerprint_bans::Column::BannedAt)
            .all(db)
            .await?
            .into_iter()
            .map(BanEntry::from)
            .collect(),
    };

    let now = Utc::now().naive_utc();
    let (expired, active): (Vec<BanEntry>, Vec<BanEntry>) =
        entries.into_iter().partition(|entry| entry.is_expired(now));

    for entry in &expired {
        delete_row(db, kind, &entry.value).await?;
    }

    Ok(active)
}

/// Client-side gating signal for one identity.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSummary {
    /// Any active entry applies
    pub banned: bool,
    /// Blanket `site` block
    pub blocked: bool,
    pub view_blocked: bool,
    pub permissions: Vec<Capability>,
    /// Latest expiry, None when permanent or not banned
    pub expires_at: Option<NaiveDateTime>,
}

pub async fn access_summary<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
) -> Result<AccessSummary, DbErr> {
    let entries = active_entries(db, &identity.client_ip, identity.fingerprint.as_deref()).await?;

    let combined = entries
        .iter()
        .fold(Permissions::empty(), |acc, entry| acc | entry.permission_set());
    let expires_at = if entries.iter().any(|entry| entry.expires_at.is_none()) {
        None
    } else {
        entries.iter().filter_map(|entry| entry.expires_at).max()
    };

    Ok(AccessSummary {
        banned: !entries.is_empty(),
        blocked: combined.contains(Permissions::SITE),
        view_blocked: combined.blocks(Capability::View),
        permissions: combined.capabilities(),
        expires_at,
    })
}
