//! Pricing strategies.
//!
//! All strategies share one contract: dual values in, candidate routes out.
//! The column-generation loop dispatches on the [`PricingStrategy`] tag and
//! appends every candidate whose reduced cost clears the threshold.
//!
//! Per-vehicle invocations run as rayon tasks; results are concatenated in
//! vehicle (or depot-group) order with pools already sorted by ascending
//! cost, so the master sees the same route set regardless of the scheduler.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use trp_core::{vehicle_mask, Instance, MaskMode, Route, Vehicle};

use crate::clustering::{partition_fleet, regroup_vehicles_by_depot};
use crate::labeling::{solve_vehicle_labeling, LabelingParams};
use crate::master::{DualSolution, EdgeCut};
use crate::pulse::network::PricingNetwork;
use crate::pulse::{grouped, PulseSolver};
use crate::tabu::{tabu_search, TabuParams};

/// How many vehicles one diversification chain walks.
const DIVERSIFICATION_CHAIN: usize = 10;

/// The available pricing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingStrategy {
    /// One label-setting solve per vehicle (escalation-capable family).
    LabelingBasic,
    /// One two-phase pulse per vehicle.
    PulseBasic,
    /// One amortised pulse per depot group.
    PulseGrouped,
    /// Per-vehicle pulse with parallel fan-out.
    PulseParallel,
    /// Depot groups with parallel Phase B fan-out.
    PulseGroupedParallel,
    /// Greedy chains of single-route pulses over uncovered work.
    Diversification,
    /// Diversification within similarity clusters.
    Clustering,
    /// MILP neighbourhood search seeded by a pulse route.
    TabuSearch,
}

impl PricingStrategy {
    /// Does the escalation pair (cyclic pricing, dominance resources) apply?
    pub fn supports_escalation(self) -> bool {
        matches!(self, PricingStrategy::LabelingBasic)
    }

    pub const ALL: [PricingStrategy; 8] = [
        PricingStrategy::LabelingBasic,
        PricingStrategy::PulseBasic,
        PricingStrategy::PulseGrouped,
        PricingStrategy::PulseParallel,
        PricingStrategy::PulseGroupedParallel,
        PricingStrategy::Diversification,
        PricingStrategy::Clustering,
        PricingStrategy::TabuSearch,
    ];
}

impl fmt::Display for PricingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PricingStrategy::LabelingBasic => "labeling",
            PricingStrategy::PulseBasic => "pulse",
            PricingStrategy::PulseGrouped => "grouped_pulse",
            PricingStrategy::PulseParallel => "parallel_pulse",
            PricingStrategy::PulseGroupedParallel => "grouped_parallel_pulse",
            PricingStrategy::Diversification => "diversification",
            PricingStrategy::Clustering => "clustering",
            PricingStrategy::TabuSearch => "tabu",
        };
        f.write_str(name)
    }
}

impl FromStr for PricingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|strategy| strategy.to_string() == s)
            .copied()
            .ok_or_else(|| format!("unknown pricing strategy `{s}`"))
    }
}

/// Everything a pricing round needs.
pub struct PricingContext<'a> {
    pub instance: &'a Instance,
    pub duals: &'a DualSolution,
    pub forbidden_edges: &'a BTreeSet<EdgeCut>,
    pub required_edges: &'a BTreeSet<EdgeCut>,
    /// Bound-table time step.
    pub delta: i32,
    pub pool_size: usize,
    pub use_rollback: bool,
    /// Escalation dials, meaningful for the labeling family.
    pub cyclic: bool,
    pub n_res_dom: usize,
}

impl<'a> PricingContext<'a> {
    /// Vehicles worth pricing, in index order.
    pub fn vehicle_order(&self) -> Vec<usize> {
        self.instance
            .vehicles
            .iter()
            .filter(|v| !v.interventions.is_empty())
            .map(|v| v.id)
            .collect()
    }
}

/// Price one vehicle with the two-phase pulse, returning its whole pool.
fn pulse_vehicle(ctx: &PricingContext<'_>, vehicle: &Vehicle, parallel: bool) -> Vec<Route> {
    let network = PricingNetwork::build(
        ctx.instance,
        vehicle,
        Some(ctx.duals),
        ctx.forbidden_edges,
        ctx.required_edges,
    );
    let mut solver = PulseSolver::new(&network, ctx.delta, ctx.pool_size, ctx.use_rollback);
    solver.bound();
    let entries = if parallel {
        solver.solve_parallel(None, network.initial_cost)
    } else {
        solver.solve(None, network.initial_cost)
    };
    entries
        .into_iter()
        .map(|entry| {
            Route::from_local_sequence(entry.cost, &entry.sequence, ctx.instance, vehicle)
        })
        .collect()
}

/// Best single route for a (possibly masked) vehicle, pool of one.
fn pulse_single_route(ctx: &PricingContext<'_>, vehicle: &Vehicle) -> Option<Route> {
    let network = PricingNetwork::build(
        ctx.instance,
        vehicle,
        Some(ctx.duals),
        ctx.forbidden_edges,
        ctx.required_edges,
    );
    let mut solver = PulseSolver::new(&network, ctx.delta, 1, ctx.use_rollback);
    solver.bound();
    let entries = solver.solve(None, network.initial_cost);
    entries.first().map(|entry| {
        Route::from_local_sequence(entry.cost, &entry.sequence, ctx.instance, vehicle)
    })
}

fn basic_pulse(ctx: &PricingContext<'_>, parallel_pulse: bool) -> Vec<Route> {
    let order = ctx.vehicle_order();
    order
        .par_iter()
        .map(|&v| pulse_vehicle(ctx, &ctx.instance.vehicles[v], parallel_pulse))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

fn grouped_pulse(ctx: &PricingContext<'_>, parallel_phase_b: bool) -> Vec<Route> {
    let groups = regroup_vehicles_by_depot(&ctx.instance.vehicles);
    let members: Vec<Vec<usize>> = groups.into_values().collect();
    members
        .par_iter()
        .map(|group| {
            grouped::solve_group(
                ctx.instance,
                group,
                ctx.duals,
                ctx.delta,
                ctx.pool_size,
                ctx.use_rollback,
                parallel_phase_b,
            )
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// One diversification chain: starting at a rotation offset, walk the fleet
/// and re-price each vehicle over the still-uncovered interventions.
fn diversification_chain(
    ctx: &PricingContext<'_>,
    order: &[usize],
    offset: usize,
) -> Vec<Route> {
    let mut covered = vec![0u8; ctx.instance.nb_nodes()];
    let mut routes = Vec::new();
    let steps = order.len().min(DIVERSIFICATION_CHAIN);
    for k in 0..steps {
        let v = order[(offset + k) % order.len()];
        let restricted =
            vehicle_mask(&ctx.instance.vehicles[v], &covered, MaskMode::KeepUncovered);
        if restricted.interventions.is_empty() {
            continue;
        }
        if let Some(route) = pulse_single_route(ctx, &restricted) {
            if route.nb_interventions() == 0 {
                continue;
            }
            for &i in route.interior() {
                covered[i] = 1;
            }
            routes.push(route);
        }
    }
    routes
}

fn diversification(ctx: &PricingContext<'_>, order: &[usize]) -> Vec<Route> {
    (0..order.len())
        .into_par_iter()
        .map(|offset| diversification_chain(ctx, order, offset))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

fn clustering_pricing(ctx: &PricingContext<'_>) -> Vec<Route> {
    let order = ctx.vehicle_order();
    let mut routes = Vec::new();
    for cluster in partition_fleet(ctx.instance) {
        let cluster_order: Vec<usize> =
            cluster.into_iter().filter(|v| order.contains(v)).collect();
        if cluster_order.is_empty() {
            continue;
        }
        routes.extend(diversification(ctx, &cluster_order));
    }
    routes
}

fn tabu_pricing(ctx: &PricingContext<'_>) -> Vec<Route> {
    let mut routes = Vec::new();
    for v in ctx.vehicle_order() {
        let vehicle = &ctx.instance.vehicles[v];
        let Some(seed) = pulse_single_route(ctx, vehicle) else {
            continue;
        };
        if seed.nb_interventions() == 0 {
            continue;
        }
        let found = tabu_search(ctx.instance, vehicle, ctx.duals, &seed, TabuParams::default());
        routes.push(seed);
        routes.extend(found);
    }
    routes
}

fn labeling_basic(ctx: &PricingContext<'_>) -> Vec<Route> {
    let order = ctx.vehicle_order();
    let params = LabelingParams {
        n_res_dom: ctx.n_res_dom,
        cyclic: ctx.cyclic,
    };
    order
        .par_iter()
        .map(|&v| {
            solve_vehicle_labeling(
                ctx.instance,
                &ctx.instance.vehicles[v],
                ctx.duals,
                params,
                ctx.forbidden_edges,
                ctx.required_edges,
            )
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Heuristic pool initialisation: price without duals, so each vertex is
/// worth `M·duration` and the pulse greedily covers as much work as it can.
/// Vehicles are walked from the most constrained eligible set to the least,
/// each restricted to the still-uncovered interventions.
pub fn greedy_initial_routes(instance: &Instance, delta: i32) -> Vec<Route> {
    let use_rollback = instance.respects_triangle_inequality();
    let mut order: Vec<usize> = instance
        .vehicles
        .iter()
        .filter(|v| !v.interventions.is_empty())
        .map(|v| v.id)
        .collect();
    order.sort_by_key(|&v| instance.vehicles[v].interventions.len());

    let no_cuts = BTreeSet::new();
    let mut covered = vec![0u8; instance.nb_nodes()];
    let mut routes = Vec::new();
    for v in order {
        let restricted = vehicle_mask(&instance.vehicles[v], &covered, MaskMode::KeepUncovered);
        if restricted.interventions.is_empty() {
            continue;
        }
        let network = PricingNetwork::build(instance, &restricted, None, &no_cuts, &no_cuts);
        let mut solver = PulseSolver::new(&network, delta, 1, use_rollback);
        solver.bound();
        let entries = solver.solve(None, network.initial_cost);
        let Some(entry) = entries.first() else {
            continue;
        };
        let mut route =
            Route::from_local_sequence(0.0, &entry.sequence, instance, &restricted);
        if route.nb_interventions() == 0 {
            continue;
        }
        route.reduced_cost = 0.0;
        for &i in route.interior() {
            covered[i] = 1;
        }
        routes.push(route);
    }
    routes
}

/// Run one pricing round with the selected strategy.
pub fn run_pricing(strategy: PricingStrategy, ctx: &PricingContext<'_>) -> Vec<Route> {
    match strategy {
        PricingStrategy::LabelingBasic => labeling_basic(ctx),
        PricingStrategy::PulseBasic => basic_pulse(ctx, false),
        PricingStrategy::PulseParallel => basic_pulse(ctx, true),
        PricingStrategy::PulseGrouped => grouped_pulse(ctx, false),
        PricingStrategy::PulseGroupedParallel => grouped_pulse(ctx, true),
        PricingStrategy::Diversification => {
            let order = ctx.vehicle_order();
            diversification(ctx, &order)
        }
        PricingStrategy::Clustering => clustering_pricing(ctx),
        PricingStrategy::TabuSearch => tabu_pricing(ctx),
    }
}
