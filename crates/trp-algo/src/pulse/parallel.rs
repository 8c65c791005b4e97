//! Parallel pulse: split the first-level fan-out across rayon workers.
//!
//! The bound table is read-only after Phase A, so workers share it freely;
//! the solution pool and its cutoff live behind the shared search state
//! (mutex + atomic mirror). Every branch owns copies of its path and
//! capacity vector, so the workers never alias mutable state.

use rayon::prelude::*;

use trp_core::{Instance, Route, Vehicle};

use crate::master::{DualSolution, EdgeCut};
use crate::pulse::{network::PricingNetwork, PoolEntry, PulseSolver};

use std::collections::BTreeSet;

impl<'a> PulseSolver<'a> {
    /// Phase B with the origin's fan-out executed concurrently. Results are
    /// identical to [`PulseSolver::solve`] up to pool tie-breaking, which is
    /// resolved deterministically by (cost, sequence) ordering.
    pub fn solve_parallel(&self, available: Option<&[bool]>, initial_cost: f64) -> Vec<PoolEntry> {
        let shared = self.make_shared();
        self.first_level(initial_cost)
            .into_par_iter()
            .for_each(|frame| self.run_frame(frame, &shared, available));
        shared.into_sorted_entries()
    }
}

/// Price one vehicle with the parallel pulse variant.
#[allow(clippy::too_many_arguments)]
pub fn solve_vehicle_parallel(
    instance: &Instance,
    vehicle: &Vehicle,
    duals: &DualSolution,
    delta: i32,
    pool_size: usize,
    use_rollback: bool,
    forbidden_edges: &BTreeSet<EdgeCut>,
    required_edges: &BTreeSet<EdgeCut>,
) -> Vec<Route> {
    let network =
        PricingNetwork::build(instance, vehicle, Some(duals), forbidden_edges, required_edges);
    let mut solver = PulseSolver::new(&network, delta, pool_size, use_rollback);
    solver.bound();
    solver
        .solve_parallel(None, network.initial_cost)
        .into_iter()
        .map(|entry| Route::from_local_sequence(entry.cost, &entry.sequence, instance, vehicle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trp_core::test_fixtures::single_vehicle_instance;

    #[test]
    fn test_parallel_matches_sequential() {
        let instance = single_vehicle_instance(4, 10, 10, 40);
        let duals = DualSolution {
            alphas: vec![60.0, 10.0, 80.0, 25.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let no_cuts = BTreeSet::new();
        let network = PricingNetwork::build(
            &instance,
            &instance.vehicles[0],
            Some(&duals),
            &no_cuts,
            &no_cuts,
        );
        // A pool large enough for every tour: the two variants must then
        // agree exactly, tie-breaking included.
        let mut solver = PulseSolver::new(&network, 10, 100, true);
        solver.bound();

        let sequential = solver.solve(None, network.initial_cost);
        let parallel = solver.solve_parallel(None, network.initial_cost);
        assert_eq!(sequential.len(), parallel.len());
        for (a, b) in sequential.iter().zip(&parallel) {
            assert!((a.cost - b.cost).abs() < 1e-9);
            assert_eq!(a.sequence, b.sequence);
        }
    }

    #[test]
    fn test_parallel_routes_are_feasible() {
        let instance = single_vehicle_instance(3, 10, 10, 60);
        let duals = DualSolution {
            alphas: vec![50.0, 50.0, 50.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let no_cuts = BTreeSet::new();
        let routes = solve_vehicle_parallel(
            &instance,
            &instance.vehicles[0],
            &duals,
            10,
            5,
            true,
            &no_cuts,
            &no_cuts,
        );
        assert!(!routes.is_empty());
        for route in &routes {
            assert!(route.is_feasible(&instance));
        }
    }
}
