//! Label-setting ESPPRC pricer.
//!
//! The escalation target of the non-pulse strategy family: a forward
//! labeling algorithm whose dominance test compares cost, time and only the
//! first `n_res_dom` capacity resources — fewer resources make dominance
//! stronger and the search faster, at the price of completeness. The cyclic
//! mode drops the elementarity requirement (paths may revisit vertices,
//! bounded in length), relaxing the problem further. The column-generation
//! loop escalates: cyclic first, then one more dominance resource per
//! stalled round until all are used.
//!
//! Returns the single best route; the pulse family remains the pool-filling
//! workhorse.

use std::collections::BTreeSet;

use trp_core::constants::END_DAY;
use trp_core::{Instance, Route, Vehicle};

use crate::master::{DualSolution, EdgeCut};
use crate::pulse::network::PricingNetwork;

#[derive(Debug, Clone)]
struct Label {
    cost: f64,
    /// Wait-adjusted service start at `vertex`.
    time: i32,
    quantities: Vec<i32>,
    sequence: Vec<usize>,
    visited: Vec<bool>,
}

/// `a` dominates `b` when it is no worse on cost, time, the first
/// `n_res_dom` resources and (elementary mode) visits no extra vertex.
fn dominates(a: &Label, b: &Label, n_res_dom: usize, elementary: bool) -> bool {
    if a.cost > b.cost || a.time > b.time {
        return false;
    }
    for r in 0..n_res_dom.min(a.quantities.len()) {
        if a.quantities[r] > b.quantities[r] {
            return false;
        }
    }
    if elementary {
        for (va, vb) in a.visited.iter().zip(&b.visited) {
            if *va && !*vb {
                return false;
            }
        }
    }
    true
}

/// Solver parameters for one labeling run.
#[derive(Debug, Clone, Copy)]
pub struct LabelingParams {
    /// Number of capacity resources used in the dominance test.
    pub n_res_dom: usize,
    /// Allow non-elementary paths (cycle relaxation).
    pub cyclic: bool,
}

/// Price one vehicle by forward labeling; returns the best completed route,
/// if any path reaches the destination.
pub fn solve_vehicle_labeling(
    instance: &Instance,
    vehicle: &Vehicle,
    duals: &DualSolution,
    params: LabelingParams,
    forbidden_edges: &BTreeSet<EdgeCut>,
    required_edges: &BTreeSet<EdgeCut>,
) -> Option<Route> {
    let net = PricingNetwork::build(instance, vehicle, Some(duals), forbidden_edges, required_edges);
    let total = net.nb_vertices();
    let resources = net.nb_resources();
    let elementary = !params.cyclic;
    // Cycle relaxation still needs a length cap to terminate on zero-length
    // arcs.
    let max_len = total + 2;

    let mut labels: Vec<Vec<Label>> = vec![Vec::new(); total];
    let root = Label {
        cost: net.initial_cost,
        time: 0,
        quantities: vec![0; resources],
        sequence: vec![net.origin],
        visited: {
            let mut v = vec![false; total];
            v[net.origin] = true;
            v
        },
    };
    let mut queue: Vec<(usize, Label)> = vec![(net.origin, root)];

    while let Some((vertex, label)) = queue.pop() {
        for &w in &net.neighbors[vertex] {
            if elementary && label.visited[w] {
                continue;
            }
            if label.sequence.len() >= max_len {
                continue;
            }
            let time = net.arrival_time(w, label.time + net.duration[vertex] + net.travel_time[vertex][w]);
            if time > net.latest_start[w] {
                continue;
            }
            if time > END_DAY {
                continue;
            }
            let mut quantities = label.quantities.clone();
            let mut over = false;
            for r in 0..resources {
                quantities[r] += net.consumption[w][r];
                if quantities[r] > net.capacities[r] {
                    over = true;
                }
            }
            if over {
                continue;
            }

            let mut visited = label.visited.clone();
            visited[w] = true;
            let mut sequence = label.sequence.clone();
            sequence.push(w);
            let candidate = Label {
                cost: label.cost + net.arc_cost[vertex][w] + net.node_cost[w],
                time,
                quantities,
                sequence,
                visited,
            };

            if labels[w]
                .iter()
                .any(|kept| dominates(kept, &candidate, params.n_res_dom, elementary))
            {
                continue;
            }
            labels[w].retain(|kept| !dominates(&candidate, kept, params.n_res_dom, elementary));
            labels[w].push(candidate.clone());
            if w != net.destination {
                queue.push((w, candidate));
            }
        }
    }

    let best = labels[net.destination]
        .iter()
        .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))?;
    // A cyclic relaxation can return a non-elementary walk; such a column is
    // only a bound improvement device and must not enter the pool, so the
    // caller re-checks feasibility.
    Some(Route::from_local_sequence(
        best.cost,
        &best.sequence,
        instance,
        vehicle,
    ))
}
