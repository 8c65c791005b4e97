//! Per-vehicle pricing network.
//!
//! The ESPPRC graph has one vertex per eligible intervention (local indices
//! `0..n`), a source `origin = n` (departure depot) and a sink
//! `destination = n + 1` (arrival depot, same physical warehouse). Arc and
//! node costs carry the current duals; capacity consumptions and the
//! time-window resource are stored densely for O(1) lookups during the
//! search.
//!
//! Branch-and-price edge cuts shape the graph: a forbidden edge is simply
//! not added, and a required edge (i, j, v) replaces all other out-arcs of
//! `i` for vehicle `v`. Cut duals fold into the arc costs so the reduced
//! cost of a priced route accounts for them.

use std::collections::BTreeSet;

use trp_core::constants::{END_DAY, MID_DAY};
use trp_core::{Instance, Vehicle};

use crate::master::{DualSolution, EdgeCut};

/// Dense pricing graph for one vehicle (or one virtual grouped vehicle).
#[derive(Debug, Clone)]
pub struct PricingNetwork {
    /// Number of eligible interventions.
    pub n: usize,
    pub origin: usize,
    pub destination: usize,
    /// Arc reduced-cost contribution, `(n+2)²`.
    pub arc_cost: Vec<Vec<f64>>,
    /// Travel times, `(n+2)²`.
    pub travel_time: Vec<Vec<i32>>,
    /// Node reduced-cost contribution (`-alpha_i`; 0 at the terminals).
    pub node_cost: Vec<f64>,
    /// Service durations (0 at the terminals).
    pub duration: Vec<i32>,
    /// Earliest service start per vertex.
    pub start_window: Vec<i32>,
    /// Latest service *start* per vertex (`end_window - duration`); END_DAY
    /// at the terminals so the return leg closes the day.
    pub latest_start: Vec<i32>,
    /// Lunch-break waiting applies at this vertex.
    pub lunch_flag: Vec<bool>,
    /// Capacity upper bounds, one per capacity label.
    pub capacities: Vec<i32>,
    /// Consumption per vertex and capacity label.
    pub consumption: Vec<Vec<i32>>,
    /// Forward adjacency, in ascending vertex order.
    pub neighbors: Vec<Vec<usize>>,
    /// Cost to seed the search with: `vehicle.cost - beta[v]`.
    pub initial_cost: f64,
    pub vehicle_id: usize,
}

impl PricingNetwork {
    /// Build the network for `vehicle` under the given duals and cuts.
    ///
    /// With `duals` equal to `None` the network prices in heuristic mode:
    /// node values are `-M·duration`, which makes the search greedily cover
    /// as much work as possible (used for pool initialisation).
    pub fn build(
        instance: &Instance,
        vehicle: &Vehicle,
        duals: Option<&DualSolution>,
        forbidden_edges: &BTreeSet<EdgeCut>,
        required_edges: &BTreeSet<EdgeCut>,
    ) -> Self {
        let n = vehicle.interventions.len();
        let origin = n;
        let destination = n + 1;
        let total = n + 2;

        let mut network = PricingNetwork {
            n,
            origin,
            destination,
            arc_cost: vec![vec![0.0; total]; total],
            travel_time: vec![vec![0; total]; total],
            node_cost: vec![0.0; total],
            duration: vec![0; total],
            start_window: vec![0; total],
            latest_start: vec![END_DAY; total],
            lunch_flag: vec![false; total],
            capacities: Vec::new(),
            consumption: vec![Vec::new(); total],
            neighbors: vec![Vec::new(); total],
            initial_cost: vehicle.cost,
            vehicle_id: vehicle.id,
        };

        // Resource data per vertex.
        for (local, &global) in vehicle.interventions.iter().enumerate() {
            let node = &instance.nodes[global];
            network.duration[local] = node.duration;
            network.start_window[local] = node.start_window;
            network.latest_start[local] = node.end_window - node.duration;
            network.lunch_flag[local] = node.is_ambiguous;
        }
        for label in &instance.capacities_labels {
            network
                .capacities
                .push(vehicle.capacities.get(label).copied().unwrap_or(0));
        }
        for (local, &global) in vehicle.interventions.iter().enumerate() {
            let node = &instance.nodes[global];
            network.consumption[local] = instance
                .capacities_labels
                .iter()
                .map(|label| node.quantities.get(label).copied().unwrap_or(0))
                .collect();
        }
        network.consumption[origin] = vec![0; instance.capacities_labels.len()];
        network.consumption[destination] = vec![0; instance.capacities_labels.len()];

        // Baseline costs: kilometre cost on arcs, heuristic value or duals on
        // the vertices.
        let km = instance.cost_per_km;
        for (i, &true_i) in vehicle.interventions.iter().enumerate() {
            for (j, &true_j) in vehicle.interventions.iter().enumerate() {
                if i == j {
                    continue;
                }
                network.arc_cost[i][j] = km * instance.distance(true_i, true_j) as f64;
                network.travel_time[i][j] = instance.travel_time(true_i, true_j);
            }
            network.arc_cost[origin][i] = km * instance.distance(vehicle.depot, true_i) as f64;
            network.travel_time[origin][i] = instance.travel_time(vehicle.depot, true_i);
            network.arc_cost[i][destination] = km * instance.distance(true_i, vehicle.depot) as f64;
            network.travel_time[i][destination] = instance.travel_time(true_i, vehicle.depot);
            network.node_cost[i] = match duals {
                Some(d) => -d.alphas[true_i],
                None => -instance.big_m * instance.nodes[true_i].duration as f64,
            };
        }
        if let Some(d) = duals {
            network.initial_cost = vehicle.cost - d.betas.get(vehicle.id).copied().unwrap_or(0.0);
            network.fold_cut_duals(instance, vehicle, d);
        }

        network.build_adjacency(vehicle, forbidden_edges, required_edges);
        network
    }

    /// Map a global node id to a local vertex, if it belongs to this graph.
    fn local_vertex(&self, vehicle: &Vehicle, global: usize, incoming: bool) -> Option<usize> {
        if global == vehicle.depot {
            Some(if incoming { self.destination } else { self.origin })
        } else {
            vehicle.reverse_interventions.get(&global).copied()
        }
    }

    /// Fold the cut duals into the kilometre arc costs. In the minimisation
    /// convention a route's reduced cost loses `dual` for every active cut
    /// row it participates in, so the arc pays `-dual` on top of its
    /// kilometre cost: forced-zero duals (`<= 0`) penalise the arc,
    /// forced-one duals (`>= 0`) discount it.
    fn fold_cut_duals(&mut self, instance: &Instance, vehicle: &Vehicle, duals: &DualSolution) {
        let km = instance.cost_per_km;
        let mut apply = |cut: &EdgeCut, value: f64| {
            let &(true_i, true_j, v) = cut;
            if v != vehicle.id {
                return;
            }
            let (Some(i), Some(j)) = (
                self.local_vertex(vehicle, true_i, false),
                self.local_vertex(vehicle, true_j, true),
            ) else {
                return;
            };
            self.arc_cost[i][j] = km * instance.distance(true_i, true_j) as f64 - value;
        };
        for (cut, &value) in &duals.upper_bound_duals {
            apply(cut, value);
        }
        for (cut, &value) in &duals.lower_bound_duals {
            apply(cut, value);
        }
    }

    fn build_adjacency(
        &mut self,
        vehicle: &Vehicle,
        forbidden_edges: &BTreeSet<EdgeCut>,
        required_edges: &BTreeSet<EdgeCut>,
    ) {
        // A required out-edge for a vertex supersedes every other out-arc.
        let mut required_target: std::collections::BTreeMap<usize, usize> =
            std::collections::BTreeMap::new();
        for &(i, j, v) in required_edges {
            if v != vehicle.id {
                continue;
            }
            if let Some(local_j) = self.local_vertex(vehicle, j, true) {
                required_target.entry(i).or_insert(local_j);
            }
        }

        if let Some(&j) = required_target.get(&vehicle.depot) {
            self.neighbors[self.origin].push(j);
        } else {
            for (i, &true_i) in vehicle.interventions.iter().enumerate() {
                if !forbidden_edges.contains(&(vehicle.depot, true_i, vehicle.id)) {
                    self.neighbors[self.origin].push(i);
                }
            }
        }

        for (i, &true_i) in vehicle.interventions.iter().enumerate() {
            if let Some(&j) = required_target.get(&true_i) {
                self.neighbors[i].push(j);
                continue;
            }
            for (j, &true_j) in vehicle.interventions.iter().enumerate() {
                if i == j {
                    continue;
                }
                if !forbidden_edges.contains(&(true_i, true_j, vehicle.id)) {
                    self.neighbors[i].push(j);
                }
            }
            if !forbidden_edges.contains(&(true_i, vehicle.depot, vehicle.id)) {
                self.neighbors[i].push(self.destination);
            }
        }
    }

    /// Arrival-time rule at a vertex: wait for the window, then wait out the
    /// lunch break when an ambiguous service would straddle it.
    #[inline]
    pub fn arrival_time(&self, vertex: usize, mut t: i32) -> i32 {
        if t < self.start_window[vertex] {
            t = self.start_window[vertex];
        }
        if self.lunch_flag[vertex] && t < MID_DAY && t + self.duration[vertex] > MID_DAY {
            t = MID_DAY;
        }
        t
    }

    pub fn nb_vertices(&self) -> usize {
        self.n + 2
    }

    pub fn nb_resources(&self) -> usize {
        self.capacities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trp_core::test_fixtures::single_vehicle_instance;

    fn no_cuts() -> (BTreeSet<EdgeCut>, BTreeSet<EdgeCut>) {
        (BTreeSet::new(), BTreeSet::new())
    }

    #[test]
    fn test_build_plain_network() {
        let instance = single_vehicle_instance(3, 10, 10, 60);
        let (forbidden, required) = no_cuts();
        let duals = DualSolution {
            alphas: vec![1.0, 2.0, 3.0],
            betas: vec![5.0],
            ..Default::default()
        };
        let network = PricingNetwork::build(
            &instance,
            &instance.vehicles[0],
            Some(&duals),
            &forbidden,
            &required,
        );
        assert_eq!(network.n, 3);
        assert_eq!(network.neighbors[network.origin], vec![0, 1, 2]);
        assert_eq!(network.neighbors[0], vec![1, 2, network.destination]);
        assert!((network.node_cost[1] + 2.0).abs() < 1e-9);
        // vehicle.cost = 0, beta = 5.
        assert!((network.initial_cost + 5.0).abs() < 1e-9);
        assert!((network.arc_cost[network.origin][0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_forbidden_edge_removed() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let mut forbidden = BTreeSet::new();
        forbidden.insert((0usize, 1usize, 0usize));
        let required = BTreeSet::new();
        let network =
            PricingNetwork::build(&instance, &instance.vehicles[0], None, &forbidden, &required);
        // Only the destination (vertex 3) survives as a successor of 0.
        assert_eq!(network.neighbors[0], vec![network.destination]);
    }

    #[test]
    fn test_required_edge_replaces_out_arcs() {
        let instance = single_vehicle_instance(3, 10, 10, 60);
        let forbidden = BTreeSet::new();
        let mut required = BTreeSet::new();
        required.insert((0usize, 2usize, 0usize));
        let network =
            PricingNetwork::build(&instance, &instance.vehicles[0], None, &forbidden, &required);
        assert_eq!(network.neighbors[0], vec![2]);
        // Other vertices keep their full fan-out.
        assert_eq!(network.neighbors[1].len(), 3);
    }

    #[test]
    fn test_required_depot_edge_pins_first_move() {
        let instance = single_vehicle_instance(3, 10, 10, 60);
        let forbidden = BTreeSet::new();
        let mut required = BTreeSet::new();
        // The depot is node 3 in this fixture.
        required.insert((3usize, 1usize, 0usize));
        let network =
            PricingNetwork::build(&instance, &instance.vehicles[0], None, &forbidden, &required);
        assert_eq!(network.neighbors[network.origin], vec![1]);
    }

    #[test]
    fn test_cut_duals_fold_into_arc_costs() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let forbidden = BTreeSet::new();
        let required = BTreeSet::new();
        let mut duals = DualSolution {
            alphas: vec![0.0, 0.0],
            betas: vec![0.0],
            ..Default::default()
        };
        // A forced-zero cut's dual is non-positive, a forced-one cut's dual
        // is non-negative; both fold in as `-dual`.
        duals.upper_bound_duals.insert((0, 1, 0), -7.0);
        duals.lower_bound_duals.insert((1, 0, 0), 3.0);
        let network = PricingNetwork::build(
            &instance,
            &instance.vehicles[0],
            Some(&duals),
            &forbidden,
            &required,
        );
        assert!((network.arc_cost[0][1] - (10.0 + 7.0)).abs() < 1e-9);
        assert!((network.arc_cost[1][0] - (10.0 - 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_mode_prices_duration() {
        let instance = single_vehicle_instance(1, 10, 10, 60);
        let (forbidden, required) = no_cuts();
        let network =
            PricingNetwork::build(&instance, &instance.vehicles[0], None, &forbidden, &required);
        assert!((network.node_cost[0] + instance.big_m * 60.0).abs() < 1e-6);
        assert!((network.initial_cost - 0.0).abs() < 1e-9);
    }
}
