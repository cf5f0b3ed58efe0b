// server/src/items.rs
//
// Item definitions and per-player inventory rows for the items this module
// adds. The trade route map is the only definition today; it is deliberately
// not craftable and not stackable, and reading it never consumes it - the
// pin cooldown is the limiter.

use spacetimedb::{table, Identity, ReducerContext, Table};
use log;

pub const TRADE_ROUTE_MAP_ITEM_NAME: &str = "Trade Route Map";
pub const TRADE_ROUTE_MAP_ICON: &str = "trade_route_map.png";

#[table(accessor = item_definition, public)]
#[derive(Clone, Debug)]
pub struct ItemDefinition {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub name: String,
    pub description: String,
    pub icon_asset_name: String,
    pub is_stackable: bool,
    pub stack_size: u32,
}

#[table(accessor = inventory_item, public)]
#[derive(Clone, Debug)]
pub struct InventoryItem {
    #[primary_key]
    #[auto_inc]
    pub instance_id: u64,
    pub item_def_id: u64,
    #[index(btree)]
    pub owner_id: Identity,
    pub quantity: u32,
}

/// Seed item definitions. Idempotent.
pub fn seed_items(ctx: &ReducerContext) -> Result<(), String> {
    if ctx.db.item_definition().iter().count() > 0 {
        log::debug!("[Items] Definitions already seeded, skipping.");
        return Ok(());
    }
    ctx.db.item_definition().try_insert(ItemDefinition {
        id: 0,
        name: TRADE_ROUTE_MAP_ITEM_NAME.to_string(),
        description: "Map that helps to find possible trader locations.".to_string(),
        icon_asset_name: TRADE_ROUTE_MAP_ICON.to_string(),
        is_stackable: false,
        stack_size: 1,
    }).map_err(|e| format!("Failed to seed item definitions: {}", e))?;
    log::info!("[Items] Seeded item definitions.");
    Ok(())
}

pub fn find_item_def_by_name(ctx: &ReducerContext, name: &str) -> Option<ItemDefinition> {
    ctx.db.item_definition().iter().find(|d| d.name == name)
}

/// Grant one item to a player.
pub fn grant_item(
    ctx: &ReducerContext,
    owner_id: Identity,
    item_def_id: u64,
) -> Result<InventoryItem, String> {
    ctx.db.inventory_item().try_insert(InventoryItem {
        instance_id: 0,
        item_def_id,
        owner_id,
        quantity: 1,
    }).map_err(|e| format!("Failed to grant item: {}", e))
}

/// Fetch an item instance, verifying the sender actually holds it.
pub fn find_owned_item(
    ctx: &ReducerContext,
    owner_id: Identity,
    item_instance_id: u64,
) -> Result<InventoryItem, String> {
    let item = ctx.db.inventory_item().instance_id().find(item_instance_id)
        .ok_or_else(|| format!("Item instance {} not found.", item_instance_id))?;
    if item.owner_id != owner_id {
        return Err("Cannot use an item not in your inventory.".to_string());
    }
    Ok(item)
}
