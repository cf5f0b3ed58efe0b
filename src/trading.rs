/******************************************************************************
 *                                                                            *
 * Trader stock and purchase flow for the trade route map. Every trader      *
 * prefab recorded by the classifier offers the map at a configurable coin   *
 * price. Buying requires standing at a placed trader location - you pay     *
 * the merchant in person, the map does not mail itself.                     *
 *                                                                            *
 ******************************************************************************/

use spacetimedb::{table, Identity, ReducerContext, Table};
use log;

use crate::items::{self, TRADE_ROUTE_MAP_ITEM_NAME};
use crate::locations::location_instance as LocationInstanceTableTrait;
use crate::notifications;
use crate::player as PlayerTableTrait;
use crate::trader_classifier::{self, trader_prefab as TraderPrefabTableTrait};

// --- Constants ---

pub const DEFAULT_TRADE_MAP_COST_COINS: u64 = 2000;
pub const MIN_TRADE_MAP_COST_COINS: u64 = 1;
pub const MAX_TRADE_MAP_COST_COINS: u64 = 10_000;

/// How close a player must stand to a trader location to trade with it.
pub const TRADER_INTERACTION_DISTANCE: f32 = 600.0;
pub const TRADER_INTERACTION_DISTANCE_SQ: f32 =
    TRADER_INTERACTION_DISTANCE * TRADER_INTERACTION_DISTANCE;

// --- Tables ---

/// Single-row runtime config for this module.
#[table(accessor = trade_map_config, public)]
#[derive(Clone, Debug)]
pub struct TradeMapConfig {
    #[primary_key]
    pub id: u8, // Always 0
    pub map_cost_coins: u64,
}

#[table(accessor = player_coin_balance, public)]
#[derive(Clone, Debug)]
pub struct PlayerCoinBalance {
    #[primary_key]
    pub player_id: Identity,
    pub balance: u64,
}

/// What each trader prefab sells. One row per (trader prefab, item).
#[table(accessor = trader_stock, public)]
#[derive(Clone, Debug)]
pub struct TraderStock {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub trader_prefab_name: String,
    pub item_name: String,
}

// --- Seeding ---

pub fn seed_trade_map_config(ctx: &ReducerContext) -> Result<(), String> {
    if ctx.db.trade_map_config().id().find(0).is_some() {
        return Ok(());
    }
    ctx.db.trade_map_config().try_insert(TradeMapConfig {
        id: 0,
        map_cost_coins: DEFAULT_TRADE_MAP_COST_COINS,
    }).map_err(|e| format!("Failed to seed trade map config: {}", e))?;
    log::info!(
        "[Trading] Trade map priced at {} coins.",
        DEFAULT_TRADE_MAP_COST_COINS
    );
    Ok(())
}

/// Put the trade route map in every recorded trader's stock. Runs after
/// classification; idempotent per trader prefab.
pub fn seed_trader_stock(ctx: &ReducerContext) -> Result<(), String> {
    for trader in ctx.db.trader_prefab().iter() {
        let already_stocked = ctx.db.trader_stock()
            .trader_prefab_name()
            .filter(&trader.prefab_name)
            .any(|s| s.item_name == TRADE_ROUTE_MAP_ITEM_NAME);
        if already_stocked {
            continue;
        }
        ctx.db.trader_stock().try_insert(TraderStock {
            id: 0,
            trader_prefab_name: trader.prefab_name.clone(),
            item_name: TRADE_ROUTE_MAP_ITEM_NAME.to_string(),
        }).map_err(|e| format!("Failed to stock trader {}: {}", trader.prefab_name, e))?;
        log::info!("[Trading] Stocked {} with the trade route map.", trader.prefab_name);
    }
    Ok(())
}

pub fn current_map_cost(ctx: &ReducerContext) -> u64 {
    ctx.db.trade_map_config().id().find(0)
        .map(|c| c.map_cost_coins)
        .unwrap_or(DEFAULT_TRADE_MAP_COST_COINS)
}

// --- Helpers ---

/// True if the player stands within trading range of any placed trader
/// location instance.
fn is_near_placed_trader_location(ctx: &ReducerContext, pos_x: f32, pos_y: f32) -> bool {
    for instance in ctx.db.location_instance().iter() {
        if !instance.placed || !trader_classifier::is_trader_location(ctx, &instance.template_name) {
            continue;
        }
        let dist_sq = crate::get_distance_squared(pos_x, pos_y, instance.pos_x, instance.pos_y);
        if dist_sq <= TRADER_INTERACTION_DISTANCE_SQ {
            return true;
        }
    }
    false
}

// --- Reducers ---

/// Buy a trade route map from the trader the player is standing at.
#[spacetimedb::reducer]
pub fn buy_trade_route_map(ctx: &ReducerContext) -> Result<(), String> {
    let sender_id = ctx.sender();
    let player = ctx.db.player().identity().find(&sender_id)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Cannot trade while dead.".to_string());
    }

    if !is_near_placed_trader_location(ctx, player.position_x, player.position_y) {
        return Err("No trader nearby.".to_string());
    }

    let map_in_stock = ctx.db.trader_stock().iter()
        .any(|s| s.item_name == TRADE_ROUTE_MAP_ITEM_NAME);
    if !map_in_stock {
        return Err("No trader sells the trade route map yet.".to_string());
    }

    let cost = current_map_cost(ctx);
    let mut balance = ctx.db.player_coin_balance().player_id().find(&sender_id)
        .unwrap_or(PlayerCoinBalance { player_id: sender_id, balance: 0 });
    if balance.balance < cost {
        notifications::emit_center_notice(ctx, sender_id, "Not enough coins.");
        return Err(format!("Need {} coins, have {}.", cost, balance.balance));
    }

    let map_def = items::find_item_def_by_name(ctx, TRADE_ROUTE_MAP_ITEM_NAME)
        .ok_or_else(|| "Trade route map item definition missing.".to_string())?;

    balance.balance -= cost;
    if ctx.db.player_coin_balance().player_id().find(&sender_id).is_some() {
        ctx.db.player_coin_balance().player_id().update(balance);
    } else {
        ctx.db.player_coin_balance().insert(balance);
    }
    let item = items::grant_item(ctx, sender_id, map_def.id)?;

    notifications::emit_top_left_notice(
        ctx,
        sender_id,
        &format!("Bought: {}", TRADE_ROUTE_MAP_ITEM_NAME),
        Some(&map_def.icon_asset_name),
    );
    log::info!(
        "[Trading] Player {:?} bought trade route map (instance {}) for {} coins.",
        sender_id, item.instance_id, cost
    );
    Ok(())
}

/// Adjust the map price at runtime. Clamped to the supported range.
#[spacetimedb::reducer]
pub fn set_trade_map_cost(ctx: &ReducerContext, cost_coins: u64) -> Result<(), String> {
    let clamped = cost_coins.clamp(MIN_TRADE_MAP_COST_COINS, MAX_TRADE_MAP_COST_COINS);
    let mut config = ctx.db.trade_map_config().id().find(0)
        .ok_or_else(|| "Trade map config not seeded.".to_string())?;
    config.map_cost_coins = clamped;
    ctx.db.trade_map_config().id().update(config);
    log::info!(
        "[Trading] Trade map cost set to {} coins (requested {}) by {:?}.",
        clamped, cost_coins, ctx.sender()
    );
    Ok(())
}

/// Grant coins for testing economy flows on development servers.
#[spacetimedb::reducer]
pub fn debug_grant_coins(ctx: &ReducerContext, amount: u64) -> Result<(), String> {
    let sender_id = ctx.sender();
    let mut balance = ctx.db.player_coin_balance().player_id().find(&sender_id)
        .unwrap_or(PlayerCoinBalance { player_id: sender_id, balance: 0 });
    balance.balance = balance.balance.saturating_add(amount);
    if ctx.db.player_coin_balance().player_id().find(&sender_id).is_some() {
        ctx.db.player_coin_balance().player_id().update(balance);
    } else {
        ctx.db.player_coin_balance().insert(balance);
    }
    log::info!("[Trading] Granted {} coins to {:?}.", amount, sender_id);
    Ok(())
}
