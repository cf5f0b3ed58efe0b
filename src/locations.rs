/******************************************************************************
 *                                                                            *
 * World location registry: the template catalog (named, reusable layouts     *
 * such as villages and wrecks) and the concrete instances world generation   *
 * scatters across the map. Instances start registered-but-unplaced and are   *
 * marked placed when a player first streams their region in; the minimap     *
 * discovery rule derives from the template icon flags plus that placed bit.  *
 *                                                                            *
 ******************************************************************************/

use spacetimedb::{table, ReducerContext, Table, ScheduleAt, TimeDuration};
use lazy_static::lazy_static;
use log;
use std::time::Duration;

use crate::player as PlayerTableTrait;

// --- Constants ---

/// How close a player must come before an unplaced instance is stamped into
/// the terrain (the region-streaming analog), in pixels.
pub const LOCATION_ACTIVATION_RADIUS: f32 = 2400.0;
pub const LOCATION_ACTIVATION_RADIUS_SQ: f32 =
    LOCATION_ACTIVATION_RADIUS * LOCATION_ACTIVATION_RADIUS;

const LOCATION_ACTIVATION_INTERVAL_SECS: u64 = 5;

// --- Tables ---

/// A named, reusable definition of a placeable world feature.
/// Immutable after seeding.
#[table(accessor = location_template, public)]
#[derive(Clone, Debug)]
pub struct LocationTemplate {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub template_name: String, // Unique key
    pub enabled: bool,
    /// At most one real instance of this template is ever counted as
    /// discovered for all instances sharing it.
    pub unique_location: bool,
    pub icon_always_visible: bool,
    pub icon_on_placement: bool,
    pub prefab_name: String, // Root prefab this template stamps into the world
    pub max_instances: u32,
    pub min_spacing_px: f32,
}

/// One concrete placement of a template at a position in the world.
#[table(accessor = location_instance, public)]
#[derive(Clone, Debug)]
pub struct LocationInstance {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub template_name: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub elevation: f32,
    pub placed: bool,
}

/// Marks instances placed once a player wanders near enough to stream the
/// region in.
#[table(accessor = location_activation_schedule, scheduled(activate_nearby_locations))]
#[derive(Clone)]
pub struct LocationActivationSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

// --- Template catalog ---

pub struct TemplateSeed {
    pub name: &'static str,
    pub enabled: bool,
    pub unique_location: bool,
    pub icon_always_visible: bool,
    pub icon_on_placement: bool,
    pub prefab_name: &'static str,
    pub max_instances: u32,
    pub min_spacing_px: f32,
}

lazy_static! {
    pub static ref LOCATION_TEMPLATE_CATALOG: Vec<TemplateSeed> = vec![
        TemplateSeed {
            name: "fishing_village",
            enabled: true,
            unique_location: false,
            icon_always_visible: false,
            icon_on_placement: true,
            prefab_name: "fishing_village_root",
            max_instances: 6,
            min_spacing_px: 6000.0,
        },
        TemplateSeed {
            name: "hunting_camp",
            enabled: true,
            unique_location: false,
            icon_always_visible: false,
            icon_on_placement: true,
            prefab_name: "hunting_camp_root",
            max_instances: 8,
            min_spacing_px: 4500.0,
        },
        // A lone hermit trades from a single cove; every registered instance
        // stands in for the same character.
        TemplateSeed {
            name: "hermit_cove",
            enabled: true,
            unique_location: true,
            icon_always_visible: false,
            icon_on_placement: true,
            prefab_name: "hermit_cove_root",
            max_instances: 3,
            min_spacing_px: 9000.0,
        },
        TemplateSeed {
            name: "shipwreck",
            enabled: true,
            unique_location: false,
            icon_always_visible: true,
            icon_on_placement: false,
            prefab_name: "shipwreck_root",
            max_instances: 10,
            min_spacing_px: 3000.0,
        },
        TemplateSeed {
            name: "whale_bone_graveyard",
            enabled: true,
            unique_location: false,
            icon_always_visible: false,
            icon_on_placement: true,
            prefab_name: "whale_bone_graveyard_root",
            max_instances: 4,
            min_spacing_px: 7000.0,
        },
        TemplateSeed {
            name: "abandoned_cabin",
            enabled: true,
            unique_location: false,
            icon_always_visible: false,
            icon_on_placement: true,
            prefab_name: "abandoned_cabin_root",
            max_instances: 12,
            min_spacing_px: 2500.0,
        },
        // Retired layout kept in the catalog for old saves; never scattered
        // and never classified.
        TemplateSeed {
            name: "drowned_market",
            enabled: false,
            unique_location: false,
            icon_always_visible: false,
            icon_on_placement: true,
            prefab_name: "fishing_village_root",
            max_instances: 0,
            min_spacing_px: 0.0,
        },
    ];
}

// --- Discovery rule ---

/// An instance is visible on the minimap (discovered) iff its template icon
/// is always shown, or the icon shows on placement and the instance has been
/// placed. Monotonic within a world session: placed never reverts.
pub fn is_discovered(icon_always_visible: bool, icon_on_placement: bool, placed: bool) -> bool {
    icon_always_visible || (icon_on_placement && placed)
}

pub fn is_instance_discovered(template: &LocationTemplate, instance: &LocationInstance) -> bool {
    is_discovered(
        template.icon_always_visible,
        template.icon_on_placement,
        instance.placed,
    )
}

// --- Seeding / registration ---

/// Seed the template catalog. Idempotent: existing rows are kept as-is.
pub fn seed_location_templates(ctx: &ReducerContext) -> Result<(), String> {
    if ctx.db.location_template().iter().count() > 0 {
        log::debug!("[Locations] Template catalog already seeded, skipping.");
        return Ok(());
    }
    for seed in LOCATION_TEMPLATE_CATALOG.iter() {
        ctx.db.location_template().try_insert(LocationTemplate {
            id: 0,
            template_name: seed.name.to_string(),
            enabled: seed.enabled,
            unique_location: seed.unique_location,
            icon_always_visible: seed.icon_always_visible,
            icon_on_placement: seed.icon_on_placement,
            prefab_name: seed.prefab_name.to_string(),
            max_instances: seed.max_instances,
            min_spacing_px: seed.min_spacing_px,
        }).map_err(|e| format!("Failed to seed location template {}: {}", seed.name, e))?;
    }
    log::info!(
        "[Locations] Seeded {} location templates.",
        LOCATION_TEMPLATE_CATALOG.len()
    );
    Ok(())
}

pub fn find_template_by_name(ctx: &ReducerContext, template_name: &str) -> Option<LocationTemplate> {
    ctx.db.location_template().iter().find(|t| t.template_name == template_name)
}

/// Register a concrete instance of a template. World seeding and the
/// server->client sync path both funnel through here.
pub fn register_location_instance(
    ctx: &ReducerContext,
    template_name: &str,
    pos_x: f32,
    pos_y: f32,
    elevation: f32,
    placed: bool,
) -> Result<LocationInstance, String> {
    ctx.db.location_instance().try_insert(LocationInstance {
        id: 0,
        template_name: template_name.to_string(),
        pos_x,
        pos_y,
        elevation,
        placed,
    }).map_err(|e| format!("Failed to register instance of {}: {}", template_name, e))
}

// --- Activation (region-streaming analog) ---

pub fn init_location_activation_schedule(ctx: &ReducerContext) -> Result<(), String> {
    let schedule_table = ctx.db.location_activation_schedule();
    if schedule_table.iter().count() == 0 {
        log::info!(
            "Starting location activation schedule (every {}s).",
            LOCATION_ACTIVATION_INTERVAL_SECS
        );
        let interval = Duration::from_secs(LOCATION_ACTIVATION_INTERVAL_SECS);
        crate::try_insert_schedule!(
            schedule_table,
            LocationActivationSchedule {
                id: 0,
                scheduled_at: ScheduleAt::Interval(TimeDuration::from(interval)),
            },
            "Location activation"
        );
    }
    Ok(())
}

/// Mark unplaced instances placed once any online player is near enough.
/// Placement is one-way; nothing here ever clears the flag.
#[spacetimedb::reducer]
pub fn activate_nearby_locations(
    ctx: &ReducerContext,
    _schedule: LocationActivationSchedule,
) -> Result<(), String> {
    if ctx.sender() != ctx.identity() {
        return Err("activate_nearby_locations may only be called by the scheduler.".to_string());
    }

    let online_positions: Vec<(f32, f32)> = ctx.db.player().iter()
        .filter(|p| p.is_online && !p.is_dead)
        .map(|p| (p.position_x, p.position_y))
        .collect();
    if online_positions.is_empty() {
        return Ok(());
    }

    let pending: Vec<LocationInstance> = ctx.db.location_instance().iter()
        .filter(|i| !i.placed)
        .collect();
    for mut instance in pending {
        let near = online_positions.iter().any(|&(px, py)| {
            let dx = px - instance.pos_x;
            let dy = py - instance.pos_y;
            dx * dx + dy * dy <= LOCATION_ACTIVATION_RADIUS_SQ
        });
        if near {
            log::info!(
                "[Locations] Instance {} of {} placed at ({:.0}, {:.0}).",
                instance.id, instance.template_name, instance.pos_x, instance.pos_y
            );
            instance.placed = true;
            ctx.db.location_instance().id().update(instance);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_visible_icon_is_discovered_even_when_unplaced() {
        assert!(is_discovered(true, false, false));
        assert!(is_discovered(true, true, false));
    }

    #[test]
    fn placement_icon_requires_placed_flag() {
        assert!(!is_discovered(false, true, false));
        assert!(is_discovered(false, true, true));
    }

    #[test]
    fn no_icon_flags_is_never_discovered() {
        assert!(!is_discovered(false, false, false));
        assert!(!is_discovered(false, false, true));
    }
}
