// server/src/trader_classifier.rs
//
// Determines, once per world, which location templates host a trader NPC.
// A location template never references traders directly; its root prefab's
// asset pulls in the trader bundle when a trader is part of the layout. So:
// record the asset ids of root prefabs carrying the trader capability, then
// mark a template as a trader location iff its prefab's transitive asset
// dependency set intersects that record.
//
// The classification is monotonic and cached for the lifetime of the world:
// a template with an existing row is never re-scanned, and the cache is only
// dropped when the world is regenerated.

use spacetimedb::{table, ReducerContext, Table};
use std::collections::HashSet;
use log;

use crate::assets::{self, BundleGraph, prefab as PrefabTableTrait};
use crate::locations::location_template as LocationTemplateTableTrait;

// --- Tables ---

/// Root prefabs found to carry the trader capability, with their asset ids.
#[table(accessor = trader_prefab, public)]
#[derive(Clone, Debug)]
pub struct TraderPrefab {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub prefab_name: String,
    pub asset_id: u64,
}

/// Cached per-template verdict. Populated once per world; rows are never
/// rewritten, only dropped wholesale on world regeneration.
#[table(accessor = trader_location_classification, public)]
#[derive(Clone, Debug)]
pub struct TraderLocationClassification {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub template_name: String,
    pub is_trader_location: bool,
    pub is_unique: bool,
}

// --- Classification ---

/// Core verdict: does the template's prefab asset transitively depend on any
/// trader prefab asset? An unknown asset yields an empty dependency set and
/// therefore a conservative "no".
pub fn template_depends_on_trader(
    template_asset_id: u64,
    trader_asset_ids: &HashSet<u64>,
    graph: &BundleGraph,
) -> bool {
    if trader_asset_ids.is_empty() {
        return false;
    }
    let dependencies = graph.asset_dependency_set(template_asset_id);
    trader_asset_ids.iter().any(|id| dependencies.contains(id))
}

/// Scan prefabs and templates, filling both caches. Idempotent per key:
/// already-recorded trader prefabs and already-classified templates are
/// skipped, so repeat runs only pick up rows that are genuinely new.
pub fn classify_trader_locations(ctx: &ReducerContext) -> Result<(), String> {
    // (a) Record root prefabs that directly carry the trader capability.
    let mut recorded: HashSet<String> = ctx.db.trader_prefab().iter()
        .map(|p| p.prefab_name)
        .collect();
    for prefab in ctx.db.prefab().iter() {
        if !prefab.is_root || !prefab.has_trader || recorded.contains(&prefab.prefab_name) {
            continue;
        }
        log::info!(
            "[TraderClassifier] Found trader prefab {} (asset {}).",
            prefab.prefab_name, prefab.asset_id
        );
        ctx.db.trader_prefab().try_insert(TraderPrefab {
            id: 0,
            prefab_name: prefab.prefab_name.clone(),
            asset_id: prefab.asset_id,
        }).map_err(|e| format!("Failed to record trader prefab: {}", e))?;
        recorded.insert(prefab.prefab_name);
    }

    let trader_asset_ids: HashSet<u64> = ctx.db.trader_prefab().iter()
        .map(|p| p.asset_id)
        .collect();
    if trader_asset_ids.is_empty() {
        // An empty prefab registry under-classifies; tolerated, not retried.
        log::warn!("[TraderClassifier] No trader prefabs in registry; templates will classify as non-trader.");
    }

    // (b) + (c) Resolve each enabled template against the bundle graph.
    let graph = BundleGraph::from_ctx(ctx);
    let classified: HashSet<String> = ctx.db.trader_location_classification().iter()
        .map(|c| c.template_name)
        .collect();
    let mut newly_classified = 0u32;
    let mut trader_count = 0u32;
    for template in ctx.db.location_template().iter() {
        if !template.enabled || classified.contains(&template.template_name) {
            continue;
        }
        let prefab_asset_id = assets::find_prefab_by_name(ctx, &template.prefab_name)
            .map(|p| p.asset_id)
            .unwrap_or(0);
        let is_trader_location =
            template_depends_on_trader(prefab_asset_id, &trader_asset_ids, &graph);
        if is_trader_location {
            trader_count += 1;
            log::info!(
                "[TraderClassifier] Location {} hosts a trader ({}).",
                template.template_name,
                if template.unique_location { "unique" } else { "not unique" }
            );
        }
        ctx.db.trader_location_classification().try_insert(TraderLocationClassification {
            id: 0,
            template_name: template.template_name.clone(),
            is_trader_location,
            is_unique: template.unique_location,
        }).map_err(|e| format!("Failed to cache classification: {}", e))?;
        newly_classified += 1;
    }

    log::info!(
        "[TraderClassifier] Classified {} templates ({} trader locations).",
        newly_classified, trader_count
    );
    Ok(())
}

/// Lenient cache query: a template with no cached verdict (scan not run yet,
/// or template disabled) is treated as not a trader location.
pub fn is_trader_location(ctx: &ReducerContext, template_name: &str) -> bool {
    match ctx.db.trader_location_classification().iter()
        .find(|c| c.template_name == template_name)
    {
        Some(row) => row.is_trader_location,
        None => {
            log::debug!(
                "[TraderClassifier] No cached verdict for {}; treating as non-trader.",
                template_name
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Bundle layout: merchants live in bundle 10; the village bundle 20
    // depends on it, the shed bundle 30 does not.
    fn graph() -> BundleGraph {
        let mut g = BundleGraph::new();
        g.insert_asset(10, 1001); // merchant prefab asset
        g.insert_asset(20, 2001); // village root asset
        g.insert_asset(30, 3001); // shed root asset
        g.add_dependency(20, 10);
        g
    }

    #[test]
    fn template_with_trader_dependency_classifies_true() {
        let traders: HashSet<u64> = [1001].into_iter().collect();
        assert!(template_depends_on_trader(2001, &traders, &graph()));
    }

    #[test]
    fn template_without_trader_dependency_classifies_false() {
        let traders: HashSet<u64> = [1001].into_iter().collect();
        assert!(!template_depends_on_trader(3001, &traders, &graph()));
    }

    #[test]
    fn empty_trader_set_classifies_everything_false() {
        let traders = HashSet::new();
        assert!(!template_depends_on_trader(2001, &traders, &graph()));
    }

    #[test]
    fn unknown_template_asset_classifies_false() {
        let traders: HashSet<u64> = [1001].into_iter().collect();
        assert!(!template_depends_on_trader(424_242, &traders, &graph()));
    }
}
