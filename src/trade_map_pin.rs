// server/src/trade_map_pin.rs
//
// Transient minimap pins for the trade route map. A pin deliberately lies a
// little: its center is offset inside a randomized disclosure circle so the
// map never betrays exact coordinates, and it removes itself after a short
// display window. At most one pin exists per player; placing a new one
// evicts the old row first. Expiry timers are never cancelled - a timer
// whose pin was already evicted finds nothing to delete and no-ops.

use spacetimedb::{table, Identity, Timestamp, ReducerContext, Table, ScheduleAt};
use rand::Rng;
use log;
use std::time::Duration;

// --- Disclosure geometry constants ---

/// Base radius of the disclosed search area, in pixels.
pub const PIN_BASE_RADIUS: f32 = 1500.0;
/// Uniform variance applied to the base radius.
pub const PIN_RADIUS_VARIANCE: f32 = 300.0;
/// Fraction of the area radius within which the true location may drift
/// from the displayed center. Must stay below 1.0 so the true location is
/// always strictly inside the disclosed circle.
pub const PIN_OFFSET_FRACTION: f32 = 0.1;
/// How long a pin stays on the minimap.
pub const PIN_DURATION_SECS: u64 = 10;

pub const PIN_LABEL: &str = "Trader?";
pub const PIN_ICON_ASSET_NAME: &str = "map_pin_search_area.png";

// --- Tables ---

/// A live disclosure pin. Public so the owning client can render it; the
/// client centers its map view on the row when it appears.
#[table(accessor = trade_map_pin, public)]
#[derive(Clone, Debug)]
pub struct TradeMapPin {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub player_id: Identity,
    pub pos_x: f32,
    pub pos_y: f32,
    pub elevation: f32,
    /// Displayed circle radius: twice the rolled area radius, matching the
    /// diameter framing the minimap renderer expects for area markers.
    pub map_radius: f32,
    pub label: String,
    pub created_at: Timestamp,
}

/// One-shot removal timer for a specific pin id.
#[table(accessor = trade_map_pin_expiry_schedule, scheduled(expire_trade_map_pin))]
#[derive(Clone)]
pub struct TradeMapPinExpirySchedule {
    #[primary_key]
    #[auto_inc]
    pub schedule_id: u64,
    pub pin_id: u64,
    pub scheduled_at: ScheduleAt,
}

// --- Geometry ---

#[derive(Clone, Copy, Debug)]
pub struct PinGeometry {
    pub pos_x: f32,
    pub pos_y: f32,
    /// The rolled disclosure area radius r (pre diameter framing).
    pub area_radius: f32,
    pub map_radius: f32,
}

/// Roll the disclosed geometry for a true location at (center_x, center_y).
/// r = base + U(-variance, variance); the displayed center drifts up to
/// r * PIN_OFFSET_FRACTION from the true spot, uniform in angle and radius
/// (slightly center-biased; that is the disclosed behavior, kept as-is).
/// Elevation is untouched - the drift is horizontal only.
pub fn jitter_pin_geometry(center_x: f32, center_y: f32, rng: &mut impl Rng) -> PinGeometry {
    let area_radius = PIN_BASE_RADIUS
        + rng.gen_range(-PIN_RADIUS_VARIANCE..PIN_RADIUS_VARIANCE);
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let offset = rng.gen_range(0.0..(area_radius * PIN_OFFSET_FRACTION));
    PinGeometry {
        pos_x: center_x + offset * angle.cos(),
        pos_y: center_y + offset * angle.sin(),
        area_radius,
        map_radius: 2.0 * area_radius,
    }
}

// --- Pin lifecycle ---

pub fn has_active_pin(ctx: &ReducerContext, player_id: Identity) -> bool {
    ctx.db.trade_map_pin().player_id().filter(&player_id).next().is_some()
}

/// Evict any pin the player currently has. Safe to call with none active.
/// Eviction leaves the old expiry timer in place; it fires against a pin id
/// that no longer exists.
pub fn evict_active_pin(ctx: &ReducerContext, player_id: Identity) {
    let existing: Vec<u64> = ctx.db.trade_map_pin()
        .player_id()
        .filter(&player_id)
        .map(|pin| pin.id)
        .collect();
    for pin_id in existing {
        ctx.db.trade_map_pin().id().delete(pin_id);
        log::info!("[TradeMapPin] Evicted pin {} for {:?}.", pin_id, player_id);
    }
}

/// Place a jittered pin over the true location and schedule its removal.
/// The prior pin (if any) is evicted before the new one becomes visible.
pub fn place_trade_map_pin(
    ctx: &ReducerContext,
    player_id: Identity,
    true_x: f32,
    true_y: f32,
    elevation: f32,
) -> Result<TradeMapPin, String> {
    evict_active_pin(ctx, player_id);

    let mut rng = ctx.rng();
    let geometry = jitter_pin_geometry(true_x, true_y, &mut rng);

    let pin = ctx.db.trade_map_pin().try_insert(TradeMapPin {
        id: 0,
        player_id,
        pos_x: geometry.pos_x,
        pos_y: geometry.pos_y,
        elevation,
        map_radius: geometry.map_radius,
        label: PIN_LABEL.to_string(),
        created_at: ctx.timestamp,
    }).map_err(|e| format!("Failed to place trade map pin: {}", e))?;

    let expire_at = ctx.timestamp + Duration::from_secs(PIN_DURATION_SECS);
    match ctx.db.trade_map_pin_expiry_schedule().try_insert(TradeMapPinExpirySchedule {
        schedule_id: 0,
        pin_id: pin.id,
        scheduled_at: ScheduleAt::Time(expire_at),
    }) {
        Ok(_) => log::info!(
            "[TradeMapPin] Pin {} placed for {:?}, removal in {}s.",
            pin.id, player_id, PIN_DURATION_SECS
        ),
        Err(e) => {
            // Pin stays visible but will never expire on its own; drop it
            // now rather than wedge the player's cooldown gate forever.
            ctx.db.trade_map_pin().id().delete(pin.id);
            return Err(format!("Failed to schedule pin expiry: {}", e));
        }
    }

    Ok(pin)
}

/// Scheduled removal step. Idempotent: the pin may already be gone if the
/// player read another map and evicted it, and that is fine.
#[spacetimedb::reducer]
pub fn expire_trade_map_pin(
    ctx: &ReducerContext,
    args: TradeMapPinExpirySchedule,
) -> Result<(), String> {
    if ctx.sender() != ctx.identity() {
        return Err("expire_trade_map_pin may only be called by the scheduler.".to_string());
    }

    if ctx.db.trade_map_pin().id().delete(args.pin_id) {
        log::info!("[TradeMapPin] Pin {} expired and was removed.", args.pin_id);
    } else {
        log::debug!("[TradeMapPin] Pin {} already removed before expiry fired.", args.pin_id);
    }

    // One-shot row; clean up in case the host left it behind.
    ctx.db.trade_map_pin_expiry_schedule().schedule_id().delete(args.schedule_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn area_radius_stays_within_variance_band() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let g = jitter_pin_geometry(0.0, 0.0, &mut rng);
            assert!(g.area_radius >= PIN_BASE_RADIUS - PIN_RADIUS_VARIANCE);
            assert!(g.area_radius <= PIN_BASE_RADIUS + PIN_RADIUS_VARIANCE);
        }
    }

    #[test]
    fn true_location_is_always_strictly_inside_the_disclosed_circle() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let g = jitter_pin_geometry(12_000.0, -4_500.0, &mut rng);
            let dx = g.pos_x - 12_000.0;
            let dy = g.pos_y - (-4_500.0);
            let offset = (dx * dx + dy * dy).sqrt();
            assert!(offset <= g.area_radius * PIN_OFFSET_FRACTION + 1e-3);
            assert!(offset < g.area_radius);
        }
    }

    #[test]
    fn displayed_radius_uses_diameter_framing() {
        let mut rng = StdRng::seed_from_u64(13);
        let g = jitter_pin_geometry(0.0, 0.0, &mut rng);
        assert_eq!(g.map_radius, 2.0 * g.area_radius);
    }

    #[test]
    fn offsets_cover_more_than_one_direction() {
        // Not a distribution test; just guards against a degenerate angle roll.
        let mut rng = StdRng::seed_from_u64(17);
        let mut quadrants = [false; 4];
        for _ in 0..200 {
            let g = jitter_pin_geometry(0.0, 0.0, &mut rng);
            let q = match (g.pos_x >= 0.0, g.pos_y >= 0.0) {
                (true, true) => 0,
                (false, true) => 1,
                (false, false) => 2,
                (true, false) => 3,
            };
            quadrants[q] = true;
        }
        assert!(quadrants.iter().all(|&hit| hit));
    }
}
