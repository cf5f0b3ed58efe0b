// server/src/notifications.rs
//
// Transient per-player HUD notices. Rows are the delivery channel: the
// client subscribes filtered on recipient, renders each row once at its
// placement (center screen or top-left toast), and a periodic cleanup
// reducer prunes anything old enough to have been shown.

use spacetimedb::{table, Identity, Timestamp, ReducerContext, Table, ScheduleAt, TimeDuration};
use log;
use std::time::Duration;

use crate::models::NotificationKind;

/// Keep notices around long enough for a reconnecting client to miss them.
const NOTIFICATION_MAX_AGE_SECS: u64 = 10;
const NOTIFICATION_CLEANUP_INTERVAL_SECS: u64 = 30;

#[table(accessor = player_notification, public)]
#[derive(Clone, Debug)]
pub struct PlayerNotification {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub recipient: Identity,
    pub kind: NotificationKind,
    pub text: String,
    pub icon_asset_name: Option<String>,
    pub sent: Timestamp,
}

#[table(accessor = notification_cleanup_schedule, scheduled(cleanup_old_notifications))]
#[derive(Clone)]
pub struct NotificationCleanupSchedule {
    #[primary_key]
    #[auto_inc]
    pub schedule_id: u64,
    pub scheduled_at: ScheduleAt,
}

/// Large center-screen notice.
pub fn emit_center_notice(ctx: &ReducerContext, recipient: Identity, text: &str) {
    insert_notification(ctx, recipient, NotificationKind::Center, text, None);
}

/// Small top-left confirmation, optionally with an icon.
pub fn emit_top_left_notice(
    ctx: &ReducerContext,
    recipient: Identity,
    text: &str,
    icon_asset_name: Option<&str>,
) {
    insert_notification(ctx, recipient, NotificationKind::TopLeft, text, icon_asset_name);
}

fn insert_notification(
    ctx: &ReducerContext,
    recipient: Identity,
    kind: NotificationKind,
    text: &str,
    icon_asset_name: Option<&str>,
) {
    let result = ctx.db.player_notification().try_insert(PlayerNotification {
        id: 0,
        recipient,
        kind,
        text: text.to_string(),
        icon_asset_name: icon_asset_name.map(|s| s.to_string()),
        sent: ctx.timestamp,
    });
    if let Err(e) = result {
        // A dropped notice is cosmetic; never fail the calling reducer over it.
        log::error!("[Notifications] Failed to emit notice for {:?}: {}", recipient, e);
    }
}

pub fn init_notification_cleanup_schedule(ctx: &ReducerContext) -> Result<(), String> {
    let schedule_table = ctx.db.notification_cleanup_schedule();
    if schedule_table.iter().count() == 0 {
        log::info!(
            "Starting notification cleanup schedule (every {}s).",
            NOTIFICATION_CLEANUP_INTERVAL_SECS
        );
        let interval = Duration::from_secs(NOTIFICATION_CLEANUP_INTERVAL_SECS);
        crate::try_insert_schedule!(
            schedule_table,
            NotificationCleanupSchedule {
                schedule_id: 0,
                scheduled_at: ScheduleAt::Interval(TimeDuration::from(interval)),
            },
            "Notification cleanup"
        );
    }
    Ok(())
}

/// Prune notices old enough that every subscribed client has rendered them.
#[spacetimedb::reducer]
pub fn cleanup_old_notifications(
    ctx: &ReducerContext,
    _schedule: NotificationCleanupSchedule,
) -> Result<(), String> {
    if ctx.sender() != ctx.identity() {
        return Err("cleanup_old_notifications may only be called by the scheduler.".to_string());
    }

    let cutoff = ctx.timestamp - TimeDuration::from_micros((NOTIFICATION_MAX_AGE_SECS * 1_000_000) as i64);
    let stale: Vec<u64> = ctx.db.player_notification().iter()
        .filter(|n| n.sent < cutoff)
        .map(|n| n.id)
        .collect();
    let removed = stale.len();
    for id in stale {
        ctx.db.player_notification().id().delete(id);
    }
    if removed > 0 {
        log::debug!("[Notifications] Cleaned up {} old notices.", removed);
    }
    Ok(())
}
