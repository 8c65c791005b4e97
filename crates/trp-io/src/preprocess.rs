//! Lunch-break preprocessing.
//!
//! Classifies every intervention against the midday boundary and tightens
//! time windows where only one half-day is usable. After this pass the
//! instance is immutable.

use std::collections::BTreeMap;

use tracing::info;

use trp_core::constants::{LONG_INTERVENTION, MID_DAY};
use trp_core::{Instance, Node};

/// Classification counts, for logging and the inspect command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessStats {
    /// Interventions already pinned to one half of the day (or too long to
    /// fit in either).
    pub non_ambiguous: usize,
    /// Interventions whose window was tightened to a single half day.
    pub reductions: usize,
    /// Interventions schedulable in either half day.
    pub ambiguous: usize,
}

/// Classify each intervention as ambiguous or not, tightening windows where
/// only one half-day can host the service.
pub fn preprocess_interventions(instance: &mut Instance) -> PreprocessStats {
    let mut stats = PreprocessStats::default();
    for node in instance.nodes.iter_mut().take(instance.nb_interventions) {
        classify(node, &mut stats);
    }
    info!(
        non_ambiguous = stats.non_ambiguous,
        reductions = stats.reductions,
        ambiguous = stats.ambiguous,
        "preprocessed interventions"
    );
    stats
}

fn classify(node: &mut Node, stats: &mut PreprocessStats) {
    if node.duration >= LONG_INTERVENTION {
        node.is_ambiguous = false;
        stats.non_ambiguous += 1;
        return;
    }
    let is_morning = node.end_window <= MID_DAY;
    let is_afternoon = node.start_window >= MID_DAY;
    let can_morning = node.start_window + node.duration <= MID_DAY;
    let can_afternoon = node.end_window >= MID_DAY + node.duration;

    if is_morning || is_afternoon {
        node.is_ambiguous = false;
        stats.non_ambiguous += 1;
    } else if can_morning && !can_afternoon {
        node.end_window = MID_DAY;
        node.is_ambiguous = false;
        stats.reductions += 1;
    } else if !can_morning && can_afternoon {
        node.start_window = MID_DAY;
        node.is_ambiguous = false;
        stats.reductions += 1;
    } else if can_morning && can_afternoon {
        node.is_ambiguous = true;
        stats.ambiguous += 1;
    }
}

/// An intervention is trivially infeasible when its window is tighter than
/// its duration, or some consumption exceeds every eligible vehicle's
/// capacity.
pub fn is_trivially_infeasible(
    node: &Node,
    instance: &Instance,
    available_vehicles: &[usize],
) -> bool {
    if node.start_window + node.duration > node.end_window {
        return true;
    }
    let mut max_capacities: BTreeMap<&str, i32> = BTreeMap::new();
    for &v in available_vehicles {
        for label in &instance.capacities_labels {
            let capacity = instance.vehicles[v].capacities.get(label).copied().unwrap_or(0);
            let entry = max_capacities.entry(label.as_str()).or_insert(0);
            *entry = (*entry).max(capacity);
        }
    }
    for label in &instance.capacities_labels {
        let consumption = node.quantities.get(label).copied().unwrap_or(0);
        if consumption > max_capacities.get(label.as_str()).copied().unwrap_or(0) {
            return true;
        }
    }
    false
}

/// Total duration (and count) of the a-priori feasible interventions: the
/// analytic upper bound on the work the fleet could possibly absorb.
pub fn apriori_feasible_duration(instance: &Instance) -> (i32, usize) {
    let mut available = vec![Vec::new(); instance.nb_interventions];
    for vehicle in &instance.vehicles {
        for &i in &vehicle.interventions {
            available[i].push(vehicle.id);
        }
    }
    let mut total_time = 0;
    let mut count = 0;
    for (i, node) in instance.nodes[..instance.nb_interventions].iter().enumerate() {
        if is_trivially_infeasible(node, instance, &available[i]) {
            continue;
        }
        total_time += node.duration;
        count += 1;
    }
    (total_time, count)
}
