/*
 * server/src/world_seeding.rs
 *
 * Purpose: Scatters location instances across the map at world generation
 *          and owns the world-reload boundary. Placement uses Perlin noise
 *          to cluster features into plausible regions, with minimum spacing
 *          between instances and a buffer from the world edges.
 *
 * Responsibilities:
 *   - Seed location instances for every enabled template in the catalog
 *   - Derive a terrain elevation for each placement from the height noise
 *   - Reset per-world state (instances, trader classification, pins) when
 *     the world is regenerated
 */

use spacetimedb::{ReducerContext, Table};
use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use log;

use crate::{WORLD_WIDTH_PX, WORLD_HEIGHT_PX};
use crate::locations::{self, location_instance as LocationInstanceTableTrait};
use crate::locations::location_template as LocationTemplateTableTrait;
use crate::trader_classifier;
use crate::trader_classifier::trader_location_classification as TraderLocationClassificationTableTrait;
use crate::trader_classifier::trader_prefab as TraderPrefabTableTrait;
use crate::trade_map_pin::trade_map_pin as TradeMapPinTableTrait;
use crate::trader_sync::trader_location_batch as TraderLocationBatchTableTrait;
use crate::trading;

// --- Placement constants ---

/// Keep locations away from the map border so their layouts fit.
pub const WORLD_EDGE_BUFFER_PX: f32 = 1000.0;

/// Minimum spacing between instances of different templates.
pub const GLOBAL_MIN_SPACING_PX: f32 = 1500.0;
const GLOBAL_MIN_SPACING_SQ: f32 = GLOBAL_MIN_SPACING_PX * GLOBAL_MIN_SPACING_PX;

/// Noise gate: only positions whose scatter-noise sample clears this
/// threshold host a location, clustering features into regions.
const SCATTER_NOISE_FREQUENCY: f64 = 3.0;
const SCATTER_NOISE_THRESHOLD: f64 = -0.2;

/// Terrain height scale applied to the elevation noise sample.
const ELEVATION_NOISE_FREQUENCY: f64 = 1.5;
const ELEVATION_SCALE: f32 = 120.0;

const MAX_PLACEMENT_ATTEMPTS_FACTOR: u32 = 40;

/// Fraction of seeded instances that world generation stamps immediately
/// (starter-area regions); the rest wait for a player to stream them in.
const INITIAL_PLACED_FRACTION: f32 = 0.25;

fn sample_elevation(height_noise: &Perlin, pos_x: f32, pos_y: f32) -> f32 {
    let nx = (pos_x / WORLD_WIDTH_PX) as f64 * ELEVATION_NOISE_FREQUENCY;
    let ny = (pos_y / WORLD_HEIGHT_PX) as f64 * ELEVATION_NOISE_FREQUENCY;
    let sample = height_noise.get([nx, ny]) as f32; // -1..1
    (sample.max(0.0)) * ELEVATION_SCALE
}

/// Scatter instances for every enabled template. Idempotent: a world that
/// already has instances is left untouched.
pub fn seed_location_instances(ctx: &ReducerContext) -> Result<(), String> {
    if ctx.db.location_instance().iter().count() > 0 {
        log::debug!("[WorldSeeding] Location instances already seeded, skipping.");
        return Ok(());
    }

    let seed = ctx.timestamp.to_micros_since_unix_epoch() as u64;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let scatter_noise = Perlin::new(seed as u32);
    let height_noise = Perlin::new(seed.wrapping_add(1) as u32);

    // Positions of everything placed so far, for cross-template spacing
    let mut occupied: Vec<(f32, f32)> = Vec::new();
    let mut total_seeded = 0u32;

    let templates: Vec<_> = ctx.db.location_template().iter()
        .filter(|t| t.enabled && t.max_instances > 0)
        .collect();

    for template in &templates {
        let mut placed_here: Vec<(f32, f32)> = Vec::new();
        let max_attempts = template.max_instances * MAX_PLACEMENT_ATTEMPTS_FACTOR;
        let min_spacing_sq = template.min_spacing_px * template.min_spacing_px;

        for _ in 0..max_attempts {
            if placed_here.len() as u32 >= template.max_instances {
                break;
            }

            let pos_x = rng.gen_range(WORLD_EDGE_BUFFER_PX..(WORLD_WIDTH_PX - WORLD_EDGE_BUFFER_PX));
            let pos_y = rng.gen_range(WORLD_EDGE_BUFFER_PX..(WORLD_HEIGHT_PX - WORLD_EDGE_BUFFER_PX));

            let nx = (pos_x / WORLD_WIDTH_PX) as f64 * SCATTER_NOISE_FREQUENCY;
            let ny = (pos_y / WORLD_HEIGHT_PX) as f64 * SCATTER_NOISE_FREQUENCY;
            if scatter_noise.get([nx, ny]) < SCATTER_NOISE_THRESHOLD {
                continue;
            }

            let too_close_same = placed_here.iter().any(|&(x, y)| {
                let (dx, dy) = (pos_x - x, pos_y - y);
                dx * dx + dy * dy < min_spacing_sq
            });
            if too_close_same {
                continue;
            }
            let too_close_other = occupied.iter().any(|&(x, y)| {
                let (dx, dy) = (pos_x - x, pos_y - y);
                dx * dx + dy * dy < GLOBAL_MIN_SPACING_SQ
            });
            if too_close_other {
                continue;
            }

            let elevation = sample_elevation(&height_noise, pos_x, pos_y);
            let placed = rng.gen::<f32>() < INITIAL_PLACED_FRACTION;
            locations::register_location_instance(
                ctx,
                &template.template_name,
                pos_x,
                pos_y,
                elevation,
                placed,
            )?;
            placed_here.push((pos_x, pos_y));
            occupied.push((pos_x, pos_y));
            total_seeded += 1;
        }

        if (placed_here.len() as u32) < template.max_instances {
            log::warn!(
                "[WorldSeeding] Only placed {}/{} instances of {} (ran out of valid positions).",
                placed_here.len(), template.max_instances, template.template_name
            );
        }
    }

    log::info!(
        "[WorldSeeding] Seeded {} location instances across {} templates.",
        total_seeded, templates.len()
    );
    Ok(())
}

/// Tear down and rebuild per-world state. This is the only path that
/// invalidates the trader classification cache.
#[spacetimedb::reducer]
pub fn regenerate_world(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("[WorldSeeding] Regenerating world (requested by {:?}).", ctx.sender());

    let instances: Vec<u64> = ctx.db.location_instance().iter().map(|i| i.id).collect();
    for id in instances {
        ctx.db.location_instance().id().delete(id);
    }
    let classifications: Vec<u64> = ctx.db.trader_location_classification().iter().map(|c| c.id).collect();
    for id in classifications {
        ctx.db.trader_location_classification().id().delete(id);
    }
    let trader_prefabs: Vec<u64> = ctx.db.trader_prefab().iter().map(|p| p.id).collect();
    for id in trader_prefabs {
        ctx.db.trader_prefab().id().delete(id);
    }
    // Pins and sync batches describe the old world; drop them outright.
    let pins: Vec<u64> = ctx.db.trade_map_pin().iter().map(|p| p.id).collect();
    for id in pins {
        ctx.db.trade_map_pin().id().delete(id);
    }
    let batches: Vec<_> = ctx.db.trader_location_batch().iter().map(|b| b.recipient).collect();
    for recipient in batches {
        ctx.db.trader_location_batch().recipient().delete(recipient);
    }

    seed_location_instances(ctx)?;
    trader_classifier::classify_trader_locations(ctx)?;
    trading::seed_trader_stock(ctx)?;
    Ok(())
}
