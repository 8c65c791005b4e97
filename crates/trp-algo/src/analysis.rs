//! Solution analysis: coverage, vehicle usage, time and distance KPIs.
//!
//! These functions are recomputations from first principles (the route
//! sequences and the instance matrices), so they also serve as cross-checks
//! against the engine's objective values.

use trp_core::{schedule, Instance, Route};

use crate::master::{IntegerSolution, MasterSolution};

/// Fractional intervention coverage `Σ_r λ_r · a_ir` summed over i.
pub fn count_covered_fraction(
    solution: &MasterSolution,
    routes: &[Route],
    instance: &Instance,
) -> f64 {
    routes
        .iter()
        .zip(&solution.coefficients)
        .map(|(route, &coefficient)| {
            coefficient
                * route
                    .interior()
                    .iter()
                    .filter(|&&i| i < instance.nb_interventions)
                    .count() as f64
        })
        .sum()
}

/// Routing cost of the fractional solution, without outsourcing terms.
pub fn relaxed_solution_cost(solution: &MasterSolution, routes: &[Route]) -> f64 {
    routes
        .iter()
        .zip(&solution.coefficients)
        .map(|(route, &coefficient)| coefficient * route.total_cost)
        .sum()
}

/// 0/1 coverage vector of an integer selection.
pub fn covered_interventions(
    coefficients: &[u8],
    routes: &[Route],
    instance: &Instance,
) -> Vec<u8> {
    let mut covered = vec![0u8; instance.nb_interventions];
    for (route, &coefficient) in routes.iter().zip(coefficients) {
        if coefficient == 0 {
            continue;
        }
        for &i in route.interior() {
            if i < instance.nb_interventions {
                covered[i] = 1;
            }
        }
    }
    covered
}

pub fn count_covered(coefficients: &[u8], routes: &[Route], instance: &Instance) -> usize {
    covered_interventions(coefficients, routes, instance)
        .iter()
        .filter(|&&c| c > 0)
        .count()
}

/// Number of distinct vehicles running a non-empty chosen route.
pub fn count_used_vehicles(coefficients: &[u8], routes: &[Route]) -> usize {
    let mut used: Vec<usize> = routes
        .iter()
        .zip(coefficients)
        .filter(|(route, &c)| c > 0 && route.nb_interventions() > 0)
        .map(|(route, _)| route.vehicle_id)
        .collect();
    used.sort_unstable();
    used.dedup();
    used.len()
}

/// Sum of the fixed costs of the used vehicles.
pub fn fixed_cost(coefficients: &[u8], routes: &[Route], instance: &Instance) -> f64 {
    routes
        .iter()
        .zip(coefficients)
        .filter(|(route, &c)| c > 0 && route.nb_interventions() > 0)
        .map(|(route, _)| instance.vehicles[route.vehicle_id].cost)
        .sum()
}

pub fn time_spent_working(coefficients: &[u8], routes: &[Route]) -> i32 {
    routes
        .iter()
        .zip(coefficients)
        .filter(|(_, &c)| c > 0)
        .map(|(route, _)| route.total_duration)
        .sum()
}

pub fn time_spent_travelling(coefficients: &[u8], routes: &[Route], instance: &Instance) -> i32 {
    routes
        .iter()
        .zip(coefficients)
        .filter(|(_, &c)| c > 0)
        .map(|(route, _)| schedule::total_travel_time(instance, &route.sequence))
        .sum()
}

pub fn time_spent_waiting(coefficients: &[u8], routes: &[Route], instance: &Instance) -> i32 {
    routes
        .iter()
        .zip(coefficients)
        .filter(|(_, &c)| c > 0)
        .map(|(route, _)| schedule::total_waiting_time(instance, &route.sequence))
        .sum()
}

pub fn kilometres_travelled(coefficients: &[u8], routes: &[Route], instance: &Instance) -> f64 {
    routes
        .iter()
        .zip(coefficients)
        .filter(|(_, &c)| c > 0)
        .map(|(route, _)| route.kilometres(instance))
        .sum()
}

/// Routes whose sequence appears more than once in the pool (same vehicle,
/// same tour). Duplicates are legal but waste master columns.
pub fn count_duplicate_routes(routes: &[Route]) -> usize {
    let mut duplicates = 0;
    for (a, route) in routes.iter().enumerate() {
        if routes[..a].iter().any(|other| other == route) {
            duplicates += 1;
        }
    }
    duplicates
}

/// Canonical minimisation objective of an integer selection: routing costs
/// (recomputed from the sequences) plus `M·duration` per uncovered job.
pub fn compute_integer_objective(
    coefficients: &[u8],
    routes: &[Route],
    instance: &Instance,
) -> f64 {
    let mut value = 0.0;
    for (route, &coefficient) in routes.iter().zip(coefficients) {
        if coefficient > 0 && route.nb_interventions() > 0 {
            value += instance.cost_per_km * route.kilometres(instance)
                + instance.vehicles[route.vehicle_id].cost;
        }
    }
    let covered = covered_interventions(coefficients, routes, instance);
    for (i, &c) in covered.iter().enumerate() {
        if c == 0 {
            value += instance.nodes[i].duration as f64 * instance.big_m;
        }
    }
    value
}
