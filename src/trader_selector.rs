// server/src/trader_selector.rs
//
// Nearest-undiscovered-trader search. Candidates are grouped by template;
// a unique template with any discovered member disqualifies its whole group
// (the hermit has been found, every cove registered for him is spent).
// Within the remaining groups the closest undiscovered instance wins.
//
// Instances are scanned in ascending instance-id order, so a distance tie
// always resolves to the lowest id regardless of table iteration order.

use spacetimedb::{ReducerContext, Table};
use std::collections::BTreeMap;
use log;

use crate::locations::{self, location_instance as LocationInstanceTableTrait};
use crate::trader_classifier::trader_location_classification as TraderLocationClassificationTableTrait;

/// Snapshot of one live location instance, flattened for the search.
#[derive(Clone, Debug)]
pub struct TraderCandidate {
    pub instance_id: u64,
    pub template_name: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub elevation: f32,
    pub discovered: bool,
    pub unique_location: bool,
}

fn distance_sq(origin: (f32, f32, f32), candidate: &TraderCandidate) -> f32 {
    let dx = candidate.pos_x - origin.0;
    let dy = candidate.pos_y - origin.1;
    let dz = candidate.elevation - origin.2;
    dx * dx + dy * dy + dz * dz
}

/// Closest undiscovered candidate in one template group, or None if the
/// group is empty, fully discovered, or unique-and-already-found.
fn closest_undiscovered_in_group<'a>(
    origin: (f32, f32, f32),
    group: &[&'a TraderCandidate],
) -> Option<(f32, &'a TraderCandidate)> {
    let mut best: Option<(f32, &'a TraderCandidate)> = None;
    for &candidate in group {
        if candidate.discovered {
            if candidate.unique_location {
                // One found instance spends the whole template.
                return None;
            }
            continue;
        }
        let d_sq = distance_sq(origin, candidate);
        match best {
            Some((best_sq, _)) if d_sq >= best_sq => {}
            _ => best = Some((d_sq, candidate)),
        }
    }
    best
}

/// Pure core of the search. Returns None when every trader is found.
pub fn select_nearest_undiscovered<'a>(
    origin: (f32, f32, f32),
    candidates: &'a [TraderCandidate],
) -> Option<&'a TraderCandidate> {
    // Group by template, each group ordered by ascending instance id.
    let mut groups: BTreeMap<&str, Vec<&TraderCandidate>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.template_name.as_str()).or_default().push(candidate);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|c| c.instance_id);
    }

    let mut best: Option<(f32, &TraderCandidate)> = None;
    for (template_name, group) in &groups {
        let Some((d_sq, candidate)) = closest_undiscovered_in_group(origin, group) else {
            log::debug!("[TraderSelector] No qualifying instance of {}.", template_name);
            continue;
        };
        match best {
            Some((best_sq, _)) if d_sq >= best_sq => {}
            _ => best = Some((d_sq, candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// Build the candidate set from live tables and run the search.
pub fn find_nearest_undiscovered_trader(
    ctx: &ReducerContext,
    origin: (f32, f32, f32),
) -> Option<TraderCandidate> {
    let mut candidates: Vec<TraderCandidate> = Vec::new();
    for classification in ctx.db.trader_location_classification().iter() {
        if !classification.is_trader_location {
            continue;
        }
        let Some(template) = locations::find_template_by_name(ctx, &classification.template_name)
        else {
            continue;
        };
        for instance in ctx.db.location_instance()
            .template_name()
            .filter(&classification.template_name)
        {
            candidates.push(TraderCandidate {
                instance_id: instance.id,
                template_name: instance.template_name.clone(),
                pos_x: instance.pos_x,
                pos_y: instance.pos_y,
                elevation: instance.elevation,
                discovered: locations::is_instance_discovered(&template, &instance),
                unique_location: classification.is_unique,
            });
        }
    }

    select_nearest_undiscovered(origin, &candidates).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(
        instance_id: u64,
        template_name: &str,
        pos_x: f32,
        pos_y: f32,
        discovered: bool,
        unique_location: bool,
    ) -> TraderCandidate {
        TraderCandidate {
            instance_id,
            template_name: template_name.to_string(),
            pos_x,
            pos_y,
            elevation: 0.0,
            discovered,
            unique_location,
        }
    }

    #[test]
    fn returns_nearest_of_two_undiscovered() {
        let candidates = vec![
            candidate(1, "fishing_village", 0.0, 1200.0, false, false),
            candidate(2, "fishing_village", 0.0, 500.0, false, false),
        ];
        let chosen = select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).unwrap();
        assert_eq!(chosen.instance_id, 2);
    }

    #[test]
    fn never_returns_a_discovered_instance() {
        let candidates = vec![
            candidate(1, "fishing_village", 0.0, 10.0, true, false),
            candidate(2, "fishing_village", 0.0, 5000.0, false, false),
        ];
        let chosen = select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).unwrap();
        assert_eq!(chosen.instance_id, 2);
    }

    #[test]
    fn unique_template_with_discovered_member_is_disqualified_wholesale() {
        // The far instance is undiscovered, but the template is spent.
        let candidates = vec![
            candidate(1, "hermit_cove", 0.0, 10.0, true, true),
            candidate(2, "hermit_cove", 0.0, 50.0, false, true),
        ];
        assert!(select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).is_none());
    }

    #[test]
    fn unique_disqualification_does_not_leak_across_templates() {
        let candidates = vec![
            candidate(1, "hermit_cove", 0.0, 10.0, true, true),
            candidate(2, "hermit_cove", 0.0, 50.0, false, true),
            candidate(3, "hunting_camp", 0.0, 9000.0, false, false),
        ];
        let chosen = select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).unwrap();
        assert_eq!(chosen.instance_id, 3);
    }

    #[test]
    fn empty_or_fully_discovered_set_returns_none() {
        assert!(select_nearest_undiscovered((0.0, 0.0, 0.0), &[]).is_none());
        let candidates = vec![
            candidate(1, "fishing_village", 0.0, 10.0, true, false),
            candidate(2, "hunting_camp", 0.0, 20.0, true, false),
        ];
        assert!(select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).is_none());
    }

    #[test]
    fn distance_ties_resolve_to_lowest_instance_id() {
        let candidates = vec![
            candidate(7, "fishing_village", 0.0, 100.0, false, false),
            candidate(3, "fishing_village", 100.0, 0.0, false, false),
            candidate(5, "fishing_village", 0.0, -100.0, false, false),
        ];
        let chosen = select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).unwrap();
        assert_eq!(chosen.instance_id, 3);
    }

    #[test]
    fn elevation_contributes_to_distance() {
        let mut near_but_high = candidate(1, "hunting_camp", 0.0, 300.0, false, false);
        near_but_high.elevation = 500.0;
        let flat = candidate(2, "hunting_camp", 0.0, 400.0, false, false);
        let candidates = [near_but_high, flat];
        let chosen = select_nearest_undiscovered((0.0, 0.0, 0.0), &candidates).unwrap();
        assert_eq!(chosen.instance_id, 2);
    }
}
