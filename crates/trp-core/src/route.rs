//! Concrete vehicle tours.
//!
//! A [`Route`] is produced either by a pricing solver (from a local node
//! sequence) or by reconstruction from solution data. Once appended to the
//! route pool it is never mutated, except by the repair pass which owns its
//! clones.

use serde::{Deserialize, Serialize};

use crate::schedule;
use crate::{can_do_intervention, Instance, Vehicle};
use std::collections::BTreeMap;

/// A vehicle tour, depot-bracketed, with derived totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Index of the vehicle performing the route.
    pub vehicle_id: usize,
    /// Fixed cost plus kilometre cost.
    pub total_cost: f64,
    /// Reduced cost at the time of creation (0 for constructed routes).
    pub reduced_cost: f64,
    /// Total service duration of the interventions along the route.
    pub total_duration: i32,
    /// Node ids, starting and ending at the vehicle depot. Empty for the
    /// placeholder routes seeding the master problem.
    pub sequence: Vec<usize>,
    /// Presence vector over all instance nodes.
    pub is_in_route: Vec<u8>,
    /// Edge-presence matrix over all instance nodes.
    pub edges: Vec<Vec<u8>>,
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.vehicle_id == other.vehicle_id && self.sequence == other.sequence
    }
}

impl Route {
    /// Placeholder route for a vehicle: no nodes, no cost. The master model
    /// is always seeded with one per vehicle.
    pub fn empty(vehicle_id: usize, nb_nodes: usize) -> Self {
        Route {
            vehicle_id,
            total_cost: 0.0,
            reduced_cost: 0.0,
            total_duration: 0,
            sequence: Vec::new(),
            is_in_route: vec![0; nb_nodes],
            edges: vec![vec![0; nb_nodes]; nb_nodes],
        }
    }

    /// Build a route from a pricing-local sequence. Local index `k` denotes
    /// `vehicle.interventions[k]`; the first and last entries are the
    /// origin/destination placeholders and map to the vehicle depot.
    pub fn from_local_sequence(
        reduced_cost: f64,
        local_sequence: &[usize],
        instance: &Instance,
        vehicle: &Vehicle,
    ) -> Self {
        let to_global = |pos: usize, k: usize| -> usize {
            if pos == 0 || pos + 1 == local_sequence.len() {
                vehicle.depot
            } else {
                vehicle.interventions[k]
            }
        };
        let globals: Vec<usize> = local_sequence
            .iter()
            .enumerate()
            .map(|(pos, &k)| to_global(pos, k))
            .collect();
        Self::from_global_sequence(reduced_cost, &globals, instance, vehicle)
    }

    /// Build a route from a depot-bracketed global node sequence, recomputing
    /// cost, duration, presence and edge data.
    pub fn from_global_sequence(
        reduced_cost: f64,
        sequence: &[usize],
        instance: &Instance,
        vehicle: &Vehicle,
    ) -> Self {
        let n = instance.nb_nodes();
        let mut is_in_route = vec![0; n];
        let mut edges = vec![vec![0; n]; n];
        let mut total_cost = vehicle.cost;
        let mut total_duration = 0;

        for w in sequence.windows(2) {
            let (i, j) = (w[0], w[1]);
            is_in_route[i] = 1;
            edges[i][j] = 1;
            total_duration += instance.nodes[i].duration;
            total_cost += instance.cost_per_km * instance.distance(i, j) as f64;
        }
        if let Some(&last) = sequence.last() {
            is_in_route[last] = 1;
        }

        Route {
            vehicle_id: vehicle.id,
            total_cost,
            reduced_cost,
            total_duration,
            sequence: sequence.to_vec(),
            is_in_route,
            edges,
        }
    }

    /// Number of interventions served.
    pub fn nb_interventions(&self) -> usize {
        self.sequence.len().saturating_sub(2)
    }

    /// Total length of the route in the distance matrix unit.
    pub fn kilometres(&self, instance: &Instance) -> f64 {
        self.sequence
            .windows(2)
            .map(|w| instance.distance(w[0], w[1]) as f64)
            .sum()
    }

    /// Recompute the reduced cost against a dual solution:
    /// `vehicle.cost - beta + sum(cost_per_km * d(edge)) - sum(alpha_i)`.
    /// Edge-cut dual terms are accounted for by the caller where active.
    pub fn reduced_cost_against(&self, alphas: &[f64], beta: f64, instance: &Instance) -> f64 {
        let vehicle = &instance.vehicles[self.vehicle_id];
        let mut rc = vehicle.cost - beta;
        for w in self.sequence.windows(2) {
            rc += instance.cost_per_km * instance.distance(w[0], w[1]) as f64;
        }
        for &i in self.interior() {
            rc -= alphas[i];
        }
        rc
    }

    /// The served interventions (sequence without the depot brackets).
    pub fn interior(&self) -> &[usize] {
        if self.sequence.len() <= 2 {
            &[]
        } else {
            &self.sequence[1..self.sequence.len() - 1]
        }
    }

    /// Full feasibility check: depot endpoints, eligibility, elementarity,
    /// schedule (time windows + lunch rule + END_DAY return) and capacities.
    pub fn is_feasible(&self, instance: &Instance) -> bool {
        if self.sequence.is_empty() {
            return true;
        }
        let vehicle = &instance.vehicles[self.vehicle_id];
        if self.sequence.first() != Some(&vehicle.depot)
            || self.sequence.last() != Some(&vehicle.depot)
        {
            return false;
        }

        let mut seen = vec![false; instance.nb_nodes()];
        for &i in self.interior() {
            let node = &instance.nodes[i];
            if !node.is_intervention() {
                return false;
            }
            if seen[i] {
                return false;
            }
            seen[i] = true;
            if !vehicle.reverse_interventions.contains_key(&i) {
                return false;
            }
            if !can_do_intervention(node, vehicle) {
                return false;
            }
        }

        if schedule::simulate_start_times(instance, &self.sequence).is_none() {
            return false;
        }

        let mut consumed: BTreeMap<&str, i32> = BTreeMap::new();
        for &i in self.interior() {
            for (label, quantity) in &instance.nodes[i].quantities {
                *consumed.entry(label.as_str()).or_insert(0) += quantity;
            }
        }
        for (label, used) in consumed {
            if let Some(&capacity) = vehicle.capacities.get(label) {
                if used > capacity {
                    return false;
                }
            }
        }
        true
    }

    /// Service start times along the sequence.
    pub fn start_times(&self, instance: &Instance) -> Vec<i32> {
        schedule::start_times_unchecked(instance, &self.sequence)
    }
}

/// Keep only the routes selected by an integer solution's coefficients.
pub fn keep_used_routes(routes: &[Route], coefficients: &[u8]) -> Vec<Route> {
    routes
        .iter()
        .zip(coefficients)
        .filter(|(_, &c)| c > 0)
        .map(|(r, _)| r.clone())
        .collect()
}
