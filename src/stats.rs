//! Daily rollups for the admin dashboard.
//!
//! Days are server-local calendar dates. Counters are only ever incremented.

use crate::ban::{self, BanKind};
use crate::orm::{daily_stats, daily_visits, reports};
use crate::orm::reports::ReportStatus;
use crate::presence::PresenceTracker;
use chrono::{Duration, Local, NaiveDate};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseConnection, DbErr, Set,
    TransactionTrait,
};
use serde::Serialize;

#[derive(Clone, Copy, Debug)]
enum Counter {
    Visits,
    Posts,
    Reports,
}

impl Counter {
    fn column(&self) -> daily_stats::Column {
        match self {
            Counter::Visits => daily_stats::Column::Visits,
            Counter::Posts => daily_stats::Column::Posts,
            Counter::Reports => daily_stats::Column::Reports,
        }
    }
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn bump<C: ConnectionTrait>(db: &C, counter: Counter) -> Result<(), DbErr> {
    let day = day_key(today());

    if daily_stats::Entity::find_by_id(day.clone())
        .one(db)
        .await?
        .is_none()
    {
        daily_stats::Entity::insert(daily_stats::ActiveModel {
            day: Set(day.clone()),
            visits: Set(0),
            posts: Set(0),
            reports: Set(0),
        })
        .exec(db)
        .await?;
    }

    let column = counter.column();
    daily_stats::Entity::update_many()
        .col_expr(column, Expr::col(column).add(1))
        .filter(daily_stats::Column::Day.eq(day))
        .exec(db)
        .await?;

    Ok(())
}

pub async fn increment_posts<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    bump(db, Counter::Posts).await
}

pub async fn increment_reports<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    bump(db, Counter::Reports).await
}

/// Count a visit once per session per day. Returns true for a first visit.
pub async fn record_visit(db: &DatabaseConnection, session_id: &str) -> Result<bool, DbErr> {
    let day = day_key(today());
    let txn = db.begin().await?;

    let seen = daily_visits::Entity::find_by_id((day.clone(), session_id.to_string()))
        .one(&txn)
        .await?
        .is_some();

    if !seen {
        daily_visits::Entity::insert(daily_visits::ActiveModel {
            day: Set(day),
            session_id: Set(session_id.to_string()),
        })
        .exec(&txn)
        .await?;
        bump(&txn, Counter::Visits).await?;
    }

    txn.commit().await?;
    Ok(!seen)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub day: String,
    pub visits: i32,
    pub posts: i32,
    pub reports: i32,
}

impl DayStats {
    fn empty(day: String) -> Self {
        Self {
            day,
            visits: 0,
            posts: 0,
            reports: 0,
        }
    }
}

impl From<daily_stats::Model> for DayStats {
    fn from(m: daily_stats::Model) -> Self {
        Self {
            day: m.day,
            visits: m.visits,
            posts: m.posts,
            reports: m.reports,
        }
    }
}

/// `days` rows ending today, oldest first, zero-filled.
pub async fn recent_days<C: ConnectionTrait>(db: &C, days: i64) -> Result<Vec<DayStats>, DbErr> {
    let end = today();
    let keys: Vec<String> = (0..days)
        .rev()
        .map(|offset| day_key(end - Duration::days(offset)))
        .collect();

    let rows = daily_stats::Entity::find()
        .filter(daily_stats::Column::Day.is_in(keys.clone()))
        .all(db)
        .await?;

    Ok(keys
        .into_iter()
        .map(|key| {
            rows.iter()
                .find(|row| row.day == key)
                .cloned()
                .map(DayStats::from)
                .unwrap_or_else(|| DayStats::empty(key))
        })
        .collect())
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub today: DayStats,
    pub last_seven_days: Vec<DayStats>,
    pub online: usize,
    pub pending_reports: u64,
    pub active_ip_bans: usize,
    pub active_fingerprint_bans: usize,
}

pub async fn dashboard(
    db: &DatabaseConnection,
    presence: &dyn PresenceTracker,
) -> Result<Dashboard, DbErr> {
    let last_seven_days = recent_days(db, 7).await?;
    let current = last_seven_days
        .last()
        .cloned()
        .unwrap_or_else(|| DayStats::empty(day_key(today())));

    let pending_reports = reports::Entity::find()
        .filter(reports::Column::Status.eq(ReportStatus::Pending))
        .count(db)
        .await? as u64;

    Ok(Dashboard {
        today: current,
        last_seven_days,
        online: presence.online_count(),
        pending_reports,
        active_ip_bans: ban::list_bans(db, BanKind::Ip).await?.len(),
        active_fingerprint_bans: ban::list_bans(db, BanKind::Fingerprint).await?.len(),
    })
}
