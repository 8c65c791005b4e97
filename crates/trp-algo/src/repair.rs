//! Duplicate-coverage repair.
//!
//! The covering rows tolerate over-coverage (an intervention may sit in two
//! chosen routes), so integer solutions can duplicate work. The repair pass
//! removes each duplicated intervention from every chosen route except the
//! one where removal would save the least, splicing the tours around the
//! removed stop. Under the triangle inequality this only improves the
//! objective, and repeating the pass changes nothing.

use tracing::debug;

use trp_core::{Instance, Route};

use crate::analysis::compute_integer_objective;
use crate::master::IntegerSolution;

/// Cost saved by splicing `intervention` out of `route`:
/// `cost_per_km · (d(prev, i) + d(i, next) − d(prev, next))`.
pub fn removal_delta(route: &Route, intervention: usize, instance: &Instance) -> f64 {
    let position = route
        .sequence
        .iter()
        .position(|&n| n == intervention)
        .expect("intervention on route");
    let previous = route.sequence[position - 1];
    let next = route.sequence[position + 1];
    let including =
        instance.distance(previous, intervention) + instance.distance(intervention, next);
    let excluding = instance.distance(previous, next);
    (including - excluding) as f64 * instance.cost_per_km
}

/// Splice an intervention out of a route, maintaining the derived data.
pub fn delete_intervention(route: &mut Route, intervention: usize, instance: &Instance) {
    let position = route
        .sequence
        .iter()
        .position(|&n| n == intervention)
        .expect("intervention on route");
    let previous = route.sequence[position - 1];
    let next = route.sequence[position + 1];

    route.sequence.remove(position);
    route.is_in_route[intervention] = 0;
    route.edges[previous][intervention] = 0;
    route.edges[intervention][next] = 0;
    route.edges[previous][next] = 1;
    route.total_duration -= instance.nodes[intervention].duration;
    let removed = instance.distance(previous, intervention) + instance.distance(intervention, next);
    let added = instance.distance(previous, next);
    route.total_cost += (added - removed) as f64 * instance.cost_per_km;
}

/// Repair an integer solution over the pool: returns the used routes
/// (repaired clones) and an aligned all-active solution with deactivated
/// depot-only leftovers and a recomputed objective.
pub fn repair_solution(
    routes: &[Route],
    solution: &IntegerSolution,
    instance: &Instance,
) -> (IntegerSolution, Vec<Route>) {
    let mut used: Vec<Route> = routes
        .iter()
        .zip(&solution.coefficients)
        .filter(|(_, &c)| c > 0)
        .map(|(r, _)| r.clone())
        .collect();

    // Which used routes cover each intervention?
    let mut covering: Vec<Vec<usize>> = vec![Vec::new(); instance.nb_interventions];
    for (r, route) in used.iter().enumerate() {
        for &i in route.interior() {
            if i < instance.nb_interventions {
                covering[i].push(r);
            }
        }
    }

    for i in 0..instance.nb_interventions {
        if covering[i].len() <= 1 {
            continue;
        }
        // Keep the intervention where removal saves the least.
        let keep = *covering[i]
            .iter()
            .min_by(|&&a, &&b| {
                removal_delta(&used[a], i, instance)
                    .partial_cmp(&removal_delta(&used[b], i, instance))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty covering set");
        debug!(intervention = i, keep, copies = covering[i].len(), "repairing duplicate");
        for &r in &covering[i] {
            if r != keep {
                delete_intervention(&mut used[r], i, instance);
            }
        }
    }

    let coefficients: Vec<u8> = used
        .iter()
        .map(|route| u8::from(route.nb_interventions() > 0))
        .collect();
    let objective = compute_integer_objective(&coefficients, &used, instance);
    (
        IntegerSolution {
            is_feasible: true,
            coefficients,
            objective,
        },
        used,
    )
}
