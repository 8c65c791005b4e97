//! Tabu pricing: a bounded-modification MILP around an incumbent route.
//!
//! Given a seed route from the pulse pricer, repeatedly solve a small MILP
//! over the vehicle's reduced graph that (a) forbids every previously seen
//! edge set through no-good cuts and (b) stays within `max_modifications`
//! edge changes of the last route. Iteration stops when the freshly priced
//! route is no longer improving.
//!
//! The model is an arc-flow formulation with start-time variables for
//! subtour elimination and explicit half-day variables implementing the
//! lunch rule for ambiguous interventions. It is built with the good_lp
//! modeling layer on the same HiGHS engine as the master; no duals are
//! needed here.

use std::collections::{BTreeMap, BTreeSet};

use good_lp::solvers::highs::highs;
use good_lp::{constraint, variable, variables, Expression, Solution, SolverModel, Variable};
use tracing::debug;

use trp_core::constants::{END_DAY, MID_DAY};
use trp_core::{Instance, Route, Vehicle};

use crate::master::DualSolution;

/// Tabu loop controls.
#[derive(Debug, Clone, Copy)]
pub struct TabuParams {
    pub max_iterations: usize,
    /// Neighbourhood radius: maximum edge changes per step.
    pub max_modifications: usize,
}

impl Default for TabuParams {
    fn default() -> Self {
        TabuParams {
            max_iterations: 5,
            max_modifications: 10,
        }
    }
}

type LocalEdge = (usize, usize);

/// Map a route's global edge list onto the vehicle's reduced graph, where
/// the depot is vertex `n`.
fn local_edges(route: &Route, vehicle: &Vehicle) -> BTreeSet<LocalEdge> {
    let n = vehicle.interventions.len();
    let to_local = |global: usize| -> Option<usize> {
        if global == vehicle.depot {
            Some(n)
        } else {
            vehicle.reverse_interventions.get(&global).copied()
        }
    };
    route
        .sequence
        .windows(2)
        .filter_map(|w| Some((to_local(w[0])?, to_local(w[1])?)))
        .collect()
}

/// Hamming-distance expression between the edge variables and a fixed edge
/// set: `Σ_{e∉E} x_e + Σ_{e∈E} (1 − x_e)`.
fn difference_expression(
    x: &BTreeMap<LocalEdge, Variable>,
    edges: &BTreeSet<LocalEdge>,
) -> Expression {
    let mut expr = Expression::from(0.0);
    for (&edge, &var) in x {
        if edges.contains(&edge) {
            expr += 1.0 - var;
        } else {
            expr += var;
        }
    }
    expr
}

struct MilpOutcome {
    route: Route,
    edges: BTreeSet<LocalEdge>,
}

#[allow(clippy::too_many_arguments)]
fn solve_neighbourhood_milp(
    instance: &Instance,
    vehicle: &Vehicle,
    duals: &DualSolution,
    no_good: &[BTreeSet<LocalEdge>],
    centre: &BTreeSet<LocalEdge>,
    max_modifications: usize,
) -> Option<MilpOutcome> {
    let n = vehicle.interventions.len();
    let depot = n;
    let km = instance.cost_per_km;

    let mut vars = variables!();

    // Arc variables over the reduced graph.
    let mut x: BTreeMap<LocalEdge, Variable> = BTreeMap::new();
    for i in 0..=n {
        for j in 0..=n {
            if i != j {
                x.insert((i, j), vars.add(variable().binary()));
            }
        }
    }
    // Service start times, bounded by the (tightened) windows.
    let mut u: Vec<Variable> = Vec::with_capacity(n);
    for &global in &vehicle.interventions {
        let node = &instance.nodes[global];
        let latest = (node.end_window - node.duration).max(node.start_window);
        u.push(vars.add(
            variable()
                .integer()
                .min(node.start_window as f64)
                .max(latest as f64),
        ));
    }
    // Half-day selectors for the lunch rule.
    let mut z: BTreeMap<usize, Variable> = BTreeMap::new();
    for (i, &global) in vehicle.interventions.iter().enumerate() {
        if instance.nodes[global].is_ambiguous {
            z.insert(i, vars.add(variable().binary()));
        }
    }

    // Objective: the route-dependent part of the reduced cost.
    let mut objective = Expression::from(0.0);
    for (&(i, j), &var) in &x {
        let true_i = if i == depot { vehicle.depot } else { vehicle.interventions[i] };
        let true_j = if j == depot { vehicle.depot } else { vehicle.interventions[j] };
        let mut weight = km * instance.distance(true_i, true_j) as f64;
        if i != depot {
            weight -= duals.alphas[vehicle.interventions[i]];
        }
        objective += weight * var;
    }

    let mut model = vars.minimise(objective).using(highs);

    // Degree and flow conservation.
    for i in 0..n {
        let mut inflow = Expression::from(0.0);
        let mut outflow = Expression::from(0.0);
        for j in 0..=n {
            if i != j {
                inflow += x[&(j, i)];
                outflow += x[&(i, j)];
            }
        }
        model = model.with(constraint!(inflow.clone() - outflow.clone() == 0.0));
        model = model.with(constraint!(outflow <= 1.0));
    }
    let mut depot_out = Expression::from(0.0);
    let mut depot_in = Expression::from(0.0);
    for i in 0..n {
        depot_out += x[&(depot, i)];
        depot_in += x[&(i, depot)];
    }
    model = model.with(constraint!(depot_out == 1.0));
    model = model.with(constraint!(depot_in == 1.0));

    // Time propagation along used arcs (also eliminates subtours).
    for i in 0..n {
        let node_i = &instance.nodes[vehicle.interventions[i]];
        for j in 0..n {
            if i == j {
                continue;
            }
            let travel =
                instance.travel_time(vehicle.interventions[i], vehicle.interventions[j]);
            let big = (node_i.end_window + node_i.duration + travel) as f64;
            model = model.with(constraint!(
                u[i] + big * x[&(i, j)] - u[j] <= node_i.end_window as f64
            ));
        }
        // Depot legs: leave after the drive out, return before END_DAY.
        let out = instance.travel_time(vehicle.depot, vehicle.interventions[i]) as f64;
        let back = instance.travel_time(vehicle.interventions[i], vehicle.depot) as f64;
        model = model.with(constraint!(u[i] - out * x[&(depot, i)] >= 0.0));
        model = model.with(constraint!(
            u[i] + back * x[&(i, depot)] <= (END_DAY - node_i.duration) as f64
        ));
    }

    // Lunch rule: an ambiguous service sits entirely in one half day.
    for (&i, &zi) in &z {
        let duration = instance.nodes[vehicle.interventions[i]].duration as f64;
        model = model.with(constraint!(u[i] - (MID_DAY as f64) * zi >= 0.0));
        model = model.with(constraint!(
            u[i] + duration - ((END_DAY - MID_DAY) as f64) * zi <= MID_DAY as f64
        ));
    }

    // No-good cuts: differ from every previously seen edge set.
    for edges in no_good {
        let difference = difference_expression(&x, edges);
        model = model.with(constraint!(difference >= 1.0));
    }
    // Neighbourhood: stay close to the last route.
    let difference = difference_expression(&x, centre);
    model = model.with(constraint!(difference <= max_modifications as f64));

    let solution = model.solve().ok()?;

    // Reconstruct the tour by following the chosen successors.
    let mut edges: BTreeSet<LocalEdge> = BTreeSet::new();
    for (&edge, &var) in &x {
        if solution.value(var) > 0.5 {
            edges.insert(edge);
        }
    }
    let mut sequence = vec![depot];
    let mut current = depot;
    loop {
        let next = edges.iter().find(|&&(i, _)| i == current)?.1;
        sequence.push(next);
        if next == depot {
            break;
        }
        current = next;
        if sequence.len() > n + 2 {
            return None;
        }
    }

    let mut route = Route::from_local_sequence(0.0, &sequence, instance, vehicle);
    let beta = duals.betas.get(vehicle.id).copied().unwrap_or(0.0);
    route.reduced_cost = route.reduced_cost_against(&duals.alphas, beta, instance);
    Some(MilpOutcome { route, edges })
}

/// Iterated tabu pricing around a seed route. Returns the improving routes
/// found, best-effort; the seed itself is not repeated.
pub fn tabu_search(
    instance: &Instance,
    vehicle: &Vehicle,
    duals: &DualSolution,
    seed: &Route,
    params: TabuParams,
) -> Vec<Route> {
    let mut results = Vec::new();
    let mut centre = local_edges(seed, vehicle);
    let mut no_good: Vec<BTreeSet<LocalEdge>> = vec![centre.clone()];

    for iteration in 0..params.max_iterations {
        let Some(outcome) = solve_neighbourhood_milp(
            instance,
            vehicle,
            duals,
            &no_good,
            &centre,
            params.max_modifications,
        ) else {
            break;
        };
        debug!(
            vehicle = vehicle.id,
            iteration,
            reduced_cost = outcome.route.reduced_cost,
            "tabu step"
        );
        let improving = outcome.route.reduced_cost < -1e-6;
        if improving {
            results.push(outcome.route.clone());
        }
        no_good.push(outcome.edges.clone());
        centre = outcome.edges;
        if !improving {
            break;
        }
    }
    results
}
