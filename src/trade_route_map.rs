// server/src/trade_route_map.rs
//
// Reading a trade route map: gate on the active pin, search for the nearest
// undiscovered trader, disclose it with a jittered pin. The cooldown is the
// pin's lifetime and nothing else - "can read again" means "no pin on the
// map right now" - so the gate flips back exactly when the expiry fires.

use spacetimedb::{Identity, ReducerContext};
use log;

use crate::items::{self, TRADE_ROUTE_MAP_ITEM_NAME};
use crate::notifications;
use crate::player as PlayerTableTrait;
use crate::trade_map_pin::{self, PIN_ICON_ASSET_NAME, PIN_LABEL};
use crate::trader_selector;

/// Gate check. Emits the center-screen cooldown notice when the map cannot
/// be read yet; the caller just stops.
pub fn can_read_trade_map(ctx: &ReducerContext, player_id: Identity) -> bool {
    if !trade_map_pin::has_active_pin(ctx, player_id) {
        return true;
    }
    notifications::emit_center_notice(ctx, player_id, "Cannot read trade route map again yet.");
    false
}

/// Player reads a trade route map from their inventory.
///
/// The item survives the read; the pin cooldown is what limits repeat use.
/// When every trader location is already on the minimap the player gets the
/// "found all the traders" notice instead of a pin.
#[spacetimedb::reducer]
pub fn read_trade_route_map(ctx: &ReducerContext, item_instance_id: u64) -> Result<(), String> {
    let sender_id = ctx.sender();
    let player = ctx.db.player().identity().find(&sender_id)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Cannot read the map while dead.".to_string());
    }

    let item = items::find_owned_item(ctx, sender_id, item_instance_id)?;
    let map_def = items::find_item_def_by_name(ctx, TRADE_ROUTE_MAP_ITEM_NAME)
        .ok_or_else(|| "Trade route map item definition missing.".to_string())?;
    if item.item_def_id != map_def.id {
        return Err("That item is not a trade route map.".to_string());
    }

    // On cooldown: the notice was already emitted, nothing else to do.
    if !can_read_trade_map(ctx, sender_id) {
        return Ok(());
    }

    let origin = (player.position_x, player.position_y, player.elevation);
    match trader_selector::find_nearest_undiscovered_trader(ctx, origin) {
        Some(closest) => {
            let pin = trade_map_pin::place_trade_map_pin(
                ctx,
                sender_id,
                closest.pos_x,
                closest.pos_y,
                closest.elevation,
            )?;
            notifications::emit_top_left_notice(
                ctx,
                sender_id,
                &format!("Pin added: {}", PIN_LABEL),
                Some(PIN_ICON_ASSET_NAME),
            );
            log::info!(
                "[TradeRouteMap] Player {:?} disclosed {} (instance {}) as pin {}.",
                sender_id, closest.template_name, closest.instance_id, pin.id
            );
        }
        None => {
            notifications::emit_center_notice(ctx, sender_id, "You have found all the traders!");
            log::info!("[TradeRouteMap] Player {:?} has found every trader.", sender_id);
        }
    }
    Ok(())
}
