//! Grouped pulse: amortise Phase A across vehicles sharing a depot.
//!
//! Vehicles of one depot group are merged into a *virtual* vehicle whose
//! eligible set is the union and whose capacities are the element-wise
//! maximum. The bound table is computed once on the virtual network; Phase B
//! then runs per real vehicle with an availability mask restricting the
//! elementary set to that vehicle's eligibles and with its true fixed cost
//! and dual. Edge cuts are not supported in grouped mode; callers fall back
//! to the per-vehicle variants once a node carries cuts.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use trp_core::{Instance, Route, Vehicle};

use crate::master::DualSolution;
use crate::pulse::{network::PricingNetwork, PulseSolver};

/// Sentinel id marking a virtual vehicle: never matches a cut and resolves
/// to no dual.
const VIRTUAL_ID: usize = usize::MAX;

/// Merge a depot group into one virtual vehicle. Returns `None` when the
/// group is empty or its members disagree on the depot.
pub fn build_virtual_vehicle(instance: &Instance, members: &[usize]) -> Option<Vehicle> {
    let first = *members.first()?;
    let depot = instance.vehicles[first].depot;
    if members
        .iter()
        .any(|&v| instance.vehicles[v].depot != depot)
    {
        warn!(?members, "grouped pricing needs a common depot");
        return None;
    }

    let mut union: BTreeSet<usize> = BTreeSet::new();
    let mut capacities: BTreeMap<String, i32> = instance.vehicles[first].capacities.clone();
    for &v in members {
        let vehicle = &instance.vehicles[v];
        union.extend(vehicle.interventions.iter().copied());
        for (label, &capacity) in &vehicle.capacities {
            let entry = capacities.entry(label.clone()).or_insert(capacity);
            *entry = (*entry).max(capacity);
        }
    }

    let interventions: Vec<usize> = union.into_iter().collect();
    let reverse_interventions = interventions
        .iter()
        .enumerate()
        .map(|(local, &global)| (global, local))
        .collect();
    Some(Vehicle {
        id: VIRTUAL_ID,
        technicians: Vec::new(),
        skills: BTreeMap::new(),
        interventions,
        reverse_interventions,
        depot,
        capacities,
        cost: 0.0,
    })
}

/// Availability mask over the virtual network for one member vehicle.
fn member_mask(network: &PricingNetwork, virtual_vehicle: &Vehicle, member: &Vehicle) -> Vec<bool> {
    let mut mask = vec![false; network.nb_vertices()];
    mask[network.origin] = true;
    mask[network.destination] = true;
    for global in &member.interventions {
        if let Some(&local) = virtual_vehicle.reverse_interventions.get(global) {
            mask[local] = true;
        }
    }
    mask
}

/// Price a whole depot group with one shared bounding phase. Emitted routes
/// carry their member vehicle's id and fixed cost.
pub fn solve_group(
    instance: &Instance,
    members: &[usize],
    duals: &DualSolution,
    delta: i32,
    pool_size: usize,
    use_rollback: bool,
    parallel: bool,
) -> Vec<Route> {
    let Some(virtual_vehicle) = build_virtual_vehicle(instance, members) else {
        return Vec::new();
    };
    let no_cuts = BTreeSet::new();
    let network =
        PricingNetwork::build(instance, &virtual_vehicle, Some(duals), &no_cuts, &no_cuts);
    let mut solver = PulseSolver::new(&network, delta, pool_size, use_rollback);
    solver.bound();

    let mut routes = Vec::new();
    for &v in members {
        let member = &instance.vehicles[v];
        let mask = member_mask(&network, &virtual_vehicle, member);
        let initial_cost = member.cost - duals.betas.get(v).copied().unwrap_or(0.0);
        let entries = if parallel {
            solver.solve_parallel(Some(&mask), initial_cost)
        } else {
            solver.solve(Some(&mask), initial_cost)
        };
        for entry in entries {
            let mut route =
                Route::from_local_sequence(entry.cost, &entry.sequence, instance, &virtual_vehicle);
            // The conversion ran with the virtual vehicle: stamp the member
            // and account for its fixed cost.
            route.vehicle_id = v;
            route.total_cost += member.cost;
            routes.push(route);
        }
    }
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use trp_core::test_fixtures::single_vehicle_instance;

    /// Clone the fixture vehicle into a two-vehicle fleet at the same depot,
    /// where vehicle 1 may only serve job 1.
    fn two_vehicle_instance() -> Instance {
        let mut instance = single_vehicle_instance(2, 10, 10, 60);
        let mut second = instance.vehicles[0].clone();
        second.id = 1;
        second.interventions = vec![1];
        second.reverse_interventions = BTreeMap::from([(1, 0)]);
        instance.vehicles.push(second);
        instance.nb_vehicles = 2;
        instance.similarity_matrix = trp_core::compute_similarity_matrix(&instance.vehicles);
        instance
    }

    #[test]
    fn test_virtual_vehicle_unions_eligibles() {
        let instance = two_vehicle_instance();
        let virtual_vehicle = build_virtual_vehicle(&instance, &[0, 1]).unwrap();
        assert_eq!(virtual_vehicle.interventions, vec![0, 1]);
        assert_eq!(virtual_vehicle.depot, 2);
        assert_eq!(virtual_vehicle.cost, 0.0);
    }

    #[test]
    fn test_virtual_vehicle_rejects_mixed_depots() {
        let mut instance = two_vehicle_instance();
        instance.vehicles[1].depot = 0;
        assert!(build_virtual_vehicle(&instance, &[0, 1]).is_none());
    }

    #[test]
    fn test_grouped_solve_respects_member_eligibility() {
        let instance = two_vehicle_instance();
        let duals = DualSolution {
            alphas: vec![100.0, 100.0],
            betas: vec![0.0, 0.0],
            ..Default::default()
        };
        let routes = solve_group(&instance, &[0, 1], &duals, 10, 5, true, false);
        assert!(!routes.is_empty());
        for route in &routes {
            assert!(route.is_feasible(&instance));
            if route.vehicle_id == 1 {
                // Vehicle 1 may only serve job 1.
                assert!(route.interior().iter().all(|&i| i == 1));
            }
        }
        // The best route of vehicle 0 covers both jobs.
        let best_v0 = routes
            .iter()
            .filter(|r| r.vehicle_id == 0)
            .min_by(|a, b| a.reduced_cost.partial_cmp(&b.reduced_cost).unwrap())
            .unwrap();
        assert_eq!(best_v0.nb_interventions(), 2);
    }

    #[test]
    fn test_grouped_reduced_costs_match_recomputation() {
        let instance = two_vehicle_instance();
        let duals = DualSolution {
            alphas: vec![40.0, 70.0],
            betas: vec![3.0, 5.0],
            ..Default::default()
        };
        let routes = solve_group(&instance, &[0, 1], &duals, 10, 5, true, false);
        for route in &routes {
            let beta = duals.betas[route.vehicle_id];
            let recomputed = route.reduced_cost_against(&duals.alphas, beta, &instance);
            assert!(
                (recomputed - route.reduced_cost).abs() < 1e-9,
                "stored {} vs recomputed {}",
                route.reduced_cost,
                recomputed
            );
        }
    }
}
