use spacetimedb::{Identity, Timestamp, ReducerContext, Table};
use log;

// ============================================================================
// SCHEDULE INITIALIZATION MACRO
// ============================================================================
// Insert a schedule row, logging instead of crashing on failure: a broken
// schedule disables one system until the next module publish, the rest of
// the module keeps running.
#[macro_export]
macro_rules! try_insert_schedule {
    ($table:expr, $schedule:expr, $system_name:expr) => {{
        match $table.try_insert($schedule) {
            Ok(_) => {
                log::info!("{} schedule initialized.", $system_name);
            }
            Err(e) => {
                log::error!("Failed to initialize {} schedule: {}", $system_name, e);
                log::error!("{} stays disabled until the next module publish.", $system_name);
            }
        }
    }};
}

// Declare the modules
mod models;
mod items;
mod assets;
mod locations;
mod world_seeding;
mod trader_classifier;
mod trader_selector;
mod trade_map_pin;
mod trade_route_map;
mod trading;
mod trader_sync;
mod notifications;

// Re-export reducers for client bindings
pub use trade_route_map::read_trade_route_map;
pub use trading::{buy_trade_route_map, set_trade_map_cost, debug_grant_coins};
pub use trader_sync::request_trader_locations;
pub use world_seeding::regenerate_world;

// Re-export scheduled reducers for the host scheduler
pub use trade_map_pin::expire_trade_map_pin;
pub use locations::activate_nearby_locations;
pub use notifications::cleanup_old_notifications;

// --- Global Constants ---
pub const TILE_SIZE_PX: u32 = 48;

// World Dimensions
pub const WORLD_WIDTH_TILES: u32 = 1000;
pub const WORLD_HEIGHT_TILES: u32 = 1000;
pub const WORLD_WIDTH_PX: f32 = (WORLD_WIDTH_TILES * TILE_SIZE_PX) as f32;
pub const WORLD_HEIGHT_PX: f32 = (WORLD_HEIGHT_TILES * TILE_SIZE_PX) as f32;

/// Squared distance between two points in the horizontal plane.
pub fn get_distance_squared(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    dx * dx + dy * dy
}

// --- Player Table ---

#[spacetimedb::table(accessor = player, public)]
#[derive(Clone, Debug)]
pub struct Player {
    #[primary_key]
    pub identity: Identity,
    pub username: String,
    pub position_x: f32,
    pub position_y: f32,
    pub elevation: f32,
    pub last_update: Timestamp,
    pub is_online: bool,
    pub is_dead: bool,
}

// --- Lifecycle Reducers ---

#[spacetimedb::reducer(init)]
pub fn init_module(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Initializing trade route map module...");

    // Static game data first
    items::seed_items(ctx)?;
    assets::seed_asset_registry(ctx)?;
    locations::seed_location_templates(ctx)?;

    // Per-world state
    world_seeding::seed_location_instances(ctx)?;
    trader_classifier::classify_trader_locations(ctx)?;
    trading::seed_trade_map_config(ctx)?;
    trading::seed_trader_stock(ctx)?;

    // Background schedules
    locations::init_location_activation_schedule(ctx)?;
    notifications::init_notification_cleanup_schedule(ctx)?;

    log::info!("Trade route map module initialized.");
    Ok(())
}

#[spacetimedb::reducer(client_connected)]
pub fn client_connected(ctx: &ReducerContext) -> Result<(), String> {
    let identity = ctx.sender();
    if let Some(mut player) = ctx.db.player().identity().find(&identity) {
        player.is_online = true;
        player.last_update = ctx.timestamp;
        ctx.db.player().identity().update(player);
        log::info!("[Connect] Player {:?} reconnected.", identity);
    } else {
        log::debug!("[Connect] Unregistered client {:?} connected.", identity);
    }
    Ok(())
}

#[spacetimedb::reducer(client_disconnected)]
pub fn client_disconnected(ctx: &ReducerContext) -> Result<(), String> {
    let identity = ctx.sender();
    if let Some(mut player) = ctx.db.player().identity().find(&identity) {
        player.is_online = false;
        player.last_update = ctx.timestamp;
        ctx.db.player().identity().update(player);
        log::info!("[Disconnect] Player {:?} went offline.", identity);
    }
    Ok(())
}

/// Register (or re-register) the calling client as a player, spawning at
/// the world center.
#[spacetimedb::reducer]
pub fn register_player(ctx: &ReducerContext, username: String) -> Result<(), String> {
    let identity = ctx.sender();
    if username.trim().is_empty() {
        return Err("Username cannot be empty.".to_string());
    }
    if username.len() > 32 {
        return Err("Username too long (max 32 characters).".to_string());
    }

    if let Some(mut player) = ctx.db.player().identity().find(&identity) {
        player.username = username;
        player.is_online = true;
        player.last_update = ctx.timestamp;
        ctx.db.player().identity().update(player);
        return Ok(());
    }

    ctx.db.player().try_insert(Player {
        identity,
        username,
        position_x: WORLD_WIDTH_PX / 2.0,
        position_y: WORLD_HEIGHT_PX / 2.0,
        elevation: 0.0,
        last_update: ctx.timestamp,
        is_online: true,
        is_dead: false,
    }).map_err(|e| format!("Failed to register player: {}", e))?;
    log::info!("[Register] Player {:?} registered.", identity);
    Ok(())
}

/// Position sync from the client. Clamped to the world bounds; elevation
/// follows the client's terrain sample.
#[spacetimedb::reducer]
pub fn update_player_position(
    ctx: &ReducerContext,
    position_x: f32,
    position_y: f32,
    elevation: f32,
) -> Result<(), String> {
    let identity = ctx.sender();
    let mut player = ctx.db.player().identity().find(&identity)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Cannot move while dead.".to_string());
    }
    player.position_x = position_x.clamp(0.0, WORLD_WIDTH_PX);
    player.position_y = position_y.clamp(0.0, WORLD_HEIGHT_PX);
    player.elevation = elevation;
    player.last_update = ctx.timestamp;
    ctx.db.player().identity().update(player);
    Ok(())
}
