// server/src/assets.rs
//
// Asset and prefab registry: root prefabs (with their capability flags) and
// the bundle dependency graph the asset pipeline ships with the client build.
// Bundles own assets; a bundle may depend on other bundles, and an asset's
// full dependency set is every asset owned by a bundle reachable from the
// asset's own bundle. The trader-location classifier resolves location
// prefabs against this graph instead of loading assets.

use spacetimedb::{ReducerContext, Table};
use std::collections::{HashMap, HashSet, VecDeque};
use log;

// --- Tables ---

/// One prefab shipped in the asset build. Only root prefabs are scanned for
/// capability components; child prefabs ride along inside their parents.
#[spacetimedb::table(accessor = prefab, public)]
#[derive(Clone, Debug)]
pub struct Prefab {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub prefab_name: String,
    pub asset_id: u64,
    pub is_root: bool,
    pub has_trader: bool, // Carries the trader NPC capability component
}

#[spacetimedb::table(accessor = asset_bundle)]
#[derive(Clone, Debug)]
pub struct AssetBundle {
    #[primary_key]
    pub id: u64,
    pub bundle_name: String,
}

/// Bundle -> owned asset index, precomputed by the asset pipeline.
#[spacetimedb::table(accessor = bundle_asset)]
#[derive(Clone, Debug)]
pub struct BundleAsset {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub bundle_id: u64,
    pub asset_id: u64,
}

/// Direct bundle -> bundle dependency edge.
#[spacetimedb::table(accessor = bundle_dependency)]
#[derive(Clone, Debug)]
pub struct BundleDependency {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub bundle_id: u64,
    pub depends_on_bundle_id: u64,
}

// --- Dependency graph ---

/// In-memory snapshot of the bundle graph for reachability queries.
#[derive(Default)]
pub struct BundleGraph {
    asset_bundle: HashMap<u64, u64>,
    bundle_assets: HashMap<u64, Vec<u64>>,
    bundle_deps: HashMap<u64, Vec<u64>>,
}

impl BundleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the bundle tables once; callers run many queries against it.
    pub fn from_ctx(ctx: &ReducerContext) -> Self {
        let mut graph = Self::new();
        for row in ctx.db.bundle_asset().iter() {
            graph.insert_asset(row.bundle_id, row.asset_id);
        }
        for row in ctx.db.bundle_dependency().iter() {
            graph.add_dependency(row.bundle_id, row.depends_on_bundle_id);
        }
        graph
    }

    pub fn insert_asset(&mut self, bundle_id: u64, asset_id: u64) {
        self.asset_bundle.insert(asset_id, bundle_id);
        self.bundle_assets.entry(bundle_id).or_default().push(asset_id);
    }

    pub fn add_dependency(&mut self, bundle_id: u64, depends_on_bundle_id: u64) {
        self.bundle_deps.entry(bundle_id).or_default().push(depends_on_bundle_id);
    }

    /// Bundle ids reachable from `bundle_id`, including itself.
    /// Breadth-first with a visited set; dependency cycles are tolerated.
    pub fn dependency_closure(&self, bundle_id: u64) -> HashSet<u64> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(bundle_id);
        queue.push_back(bundle_id);
        while let Some(current) = queue.pop_front() {
            if let Some(deps) = self.bundle_deps.get(&current) {
                for &dep in deps {
                    if visited.insert(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }
        visited
    }

    /// Every asset owned by a bundle in the dependency closure of the bundle
    /// that owns `asset_id`. Unknown assets resolve to an empty set.
    pub fn asset_dependency_set(&self, asset_id: u64) -> HashSet<u64> {
        let Some(&owning_bundle) = self.asset_bundle.get(&asset_id) else {
            return HashSet::new();
        };
        let mut assets = HashSet::new();
        for bundle_id in self.dependency_closure(owning_bundle) {
            if let Some(owned) = self.bundle_assets.get(&bundle_id) {
                assets.extend(owned.iter().copied());
            }
        }
        assets
    }
}

// --- Seeding ---

// Bundle ids for the shipped asset build
pub const BUNDLE_CORE: u64 = 1;
pub const BUNDLE_STRUCTURES: u64 = 2;
pub const BUNDLE_NPC_TRADERS: u64 = 3;
pub const BUNDLE_VILLAGES: u64 = 4;
pub const BUNDLE_HERMIT: u64 = 5;
pub const BUNDLE_WRECKS: u64 = 6;
pub const BUNDLE_CABINS: u64 = 7;

struct BundleSeed {
    id: u64,
    name: &'static str,
    depends_on: &'static [u64],
}

struct PrefabSeed {
    name: &'static str,
    asset_id: u64,
    bundle_id: u64,
    is_root: bool,
    has_trader: bool,
}

const BUNDLE_SEEDS: &[BundleSeed] = &[
    BundleSeed { id: BUNDLE_CORE, name: "core", depends_on: &[] },
    BundleSeed { id: BUNDLE_STRUCTURES, name: "structures", depends_on: &[BUNDLE_CORE] },
    BundleSeed { id: BUNDLE_NPC_TRADERS, name: "npc_traders", depends_on: &[BUNDLE_CORE] },
    BundleSeed { id: BUNDLE_VILLAGES, name: "villages", depends_on: &[BUNDLE_STRUCTURES, BUNDLE_NPC_TRADERS] },
    BundleSeed { id: BUNDLE_HERMIT, name: "hermit", depends_on: &[BUNDLE_NPC_TRADERS] },
    BundleSeed { id: BUNDLE_WRECKS, name: "wrecks", depends_on: &[BUNDLE_STRUCTURES] },
    BundleSeed { id: BUNDLE_CABINS, name: "cabins", depends_on: &[BUNDLE_STRUCTURES] },
];

const PREFAB_SEEDS: &[PrefabSeed] = &[
    // Core shared assets (no prefabs of their own beyond the base material set)
    PrefabSeed { name: "base_material_set", asset_id: 101, bundle_id: BUNDLE_CORE, is_root: false, has_trader: false },
    PrefabSeed { name: "driftwood_wall", asset_id: 201, bundle_id: BUNDLE_STRUCTURES, is_root: false, has_trader: false },
    PrefabSeed { name: "hide_tent", asset_id: 202, bundle_id: BUNDLE_STRUCTURES, is_root: false, has_trader: false },
    // Trader NPCs
    PrefabSeed { name: "merchant_aleut", asset_id: 301, bundle_id: BUNDLE_NPC_TRADERS, is_root: true, has_trader: true },
    PrefabSeed { name: "merchant_tinker", asset_id: 302, bundle_id: BUNDLE_NPC_TRADERS, is_root: true, has_trader: true },
    // Child variant embedded in village layouts, never scanned directly
    PrefabSeed { name: "merchant_aleut_seated", asset_id: 303, bundle_id: BUNDLE_NPC_TRADERS, is_root: false, has_trader: true },
    // Location root prefabs
    PrefabSeed { name: "fishing_village_root", asset_id: 401, bundle_id: BUNDLE_VILLAGES, is_root: true, has_trader: false },
    PrefabSeed { name: "hunting_camp_root", asset_id: 402, bundle_id: BUNDLE_VILLAGES, is_root: true, has_trader: false },
    PrefabSeed { name: "market_stall", asset_id: 403, bundle_id: BUNDLE_VILLAGES, is_root: false, has_trader: false },
    PrefabSeed { name: "hermit_cove_root", asset_id: 501, bundle_id: BUNDLE_HERMIT, is_root: true, has_trader: false },
    PrefabSeed { name: "shipwreck_root", asset_id: 601, bundle_id: BUNDLE_WRECKS, is_root: true, has_trader: false },
    PrefabSeed { name: "whale_bone_graveyard_root", asset_id: 602, bundle_id: BUNDLE_WRECKS, is_root: true, has_trader: false },
    PrefabSeed { name: "abandoned_cabin_root", asset_id: 701, bundle_id: BUNDLE_CABINS, is_root: true, has_trader: false },
];

/// Seed the asset registry from the shipped build manifest. Idempotent:
/// an already-populated registry is left untouched.
pub fn seed_asset_registry(ctx: &ReducerContext) -> Result<(), String> {
    if ctx.db.asset_bundle().iter().count() > 0 {
        log::debug!("[Assets] Registry already seeded, skipping.");
        return Ok(());
    }

    for seed in BUNDLE_SEEDS {
        ctx.db.asset_bundle().try_insert(AssetBundle {
            id: seed.id,
            bundle_name: seed.name.to_string(),
        }).map_err(|e| format!("Failed to seed bundle {}: {}", seed.name, e))?;
        for &dep in seed.depends_on {
            ctx.db.bundle_dependency().try_insert(BundleDependency {
                id: 0,
                bundle_id: seed.id,
                depends_on_bundle_id: dep,
            }).map_err(|e| format!("Failed to seed bundle dependency: {}", e))?;
        }
    }

    for seed in PREFAB_SEEDS {
        ctx.db.bundle_asset().try_insert(BundleAsset {
            id: 0,
            bundle_id: seed.bundle_id,
            asset_id: seed.asset_id,
        }).map_err(|e| format!("Failed to seed bundle asset: {}", e))?;
        ctx.db.prefab().try_insert(Prefab {
            id: 0,
            prefab_name: seed.name.to_string(),
            asset_id: seed.asset_id,
            is_root: seed.is_root,
            has_trader: seed.has_trader,
        }).map_err(|e| format!("Failed to seed prefab {}: {}", seed.name, e))?;
    }

    log::info!(
        "[Assets] Seeded {} bundles and {} prefabs.",
        BUNDLE_SEEDS.len(),
        PREFAB_SEEDS.len()
    );
    Ok(())
}

/// Look up a prefab row by name.
pub fn find_prefab_by_name(ctx: &ReducerContext, prefab_name: &str) -> Option<Prefab> {
    ctx.db.prefab().iter().find(|p| p.prefab_name == prefab_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> BundleGraph {
        let mut graph = BundleGraph::new();
        for seed in BUNDLE_SEEDS {
            for &dep in seed.depends_on {
                graph.add_dependency(seed.id, dep);
            }
        }
        for seed in PREFAB_SEEDS {
            graph.insert_asset(seed.bundle_id, seed.asset_id);
        }
        graph
    }

    #[test]
    fn closure_includes_self_and_transitive_dependencies() {
        let graph = sample_graph();
        let closure = graph.dependency_closure(BUNDLE_VILLAGES);
        assert!(closure.contains(&BUNDLE_VILLAGES));
        assert!(closure.contains(&BUNDLE_STRUCTURES));
        assert!(closure.contains(&BUNDLE_NPC_TRADERS));
        // CORE is two hops away through either branch of the diamond
        assert!(closure.contains(&BUNDLE_CORE));
        assert_eq!(closure.len(), 4);
    }

    #[test]
    fn closure_of_leaf_bundle_is_itself() {
        let graph = sample_graph();
        let closure = graph.dependency_closure(BUNDLE_CORE);
        assert_eq!(closure.len(), 1);
        assert!(closure.contains(&BUNDLE_CORE));
    }

    #[test]
    fn closure_tolerates_cycles() {
        let mut graph = BundleGraph::new();
        graph.add_dependency(1, 2);
        graph.add_dependency(2, 3);
        graph.add_dependency(3, 1);
        let closure = graph.dependency_closure(1);
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn village_asset_reaches_merchant_assets() {
        let graph = sample_graph();
        let deps = graph.asset_dependency_set(401); // fishing_village_root
        assert!(deps.contains(&301)); // merchant_aleut
        assert!(deps.contains(&302)); // merchant_tinker
        assert!(deps.contains(&201)); // structures come along too
    }

    #[test]
    fn wreck_asset_never_reaches_merchant_assets() {
        let graph = sample_graph();
        let deps = graph.asset_dependency_set(601); // shipwreck_root
        assert!(!deps.contains(&301));
        assert!(!deps.contains(&302));
        assert!(deps.contains(&601));
    }

    #[test]
    fn unknown_asset_resolves_to_empty_set() {
        let graph = sample_graph();
        assert!(graph.asset_dependency_set(999_999).is_empty());
    }
}
