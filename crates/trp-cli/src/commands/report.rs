//! Assembly of the solution output document.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use trp_algo::analysis;
use trp_algo::colgen::Evolution;
use trp_algo::IntegerSolution;
use trp_core::{Instance, Route};
use trp_io::export::{
    write_solution, EvolutionBlock, InstanceEcho, RouteRecord, SolutionDocument, SolutionKpis,
};

/// Compute the KPI block from a repaired selection.
pub fn kpis(
    coefficients: &[u8],
    routes: &[Route],
    instance: &Instance,
    objective: f64,
    wall_time: Duration,
) -> SolutionKpis {
    SolutionKpis {
        objective_value: objective,
        number_covered_interventions: analysis::count_covered(coefficients, routes, instance),
        number_used_vehicles: analysis::count_used_vehicles(coefficients, routes),
        total_fixed_cost: analysis::fixed_cost(coefficients, routes, instance),
        total_working_time: analysis::time_spent_working(coefficients, routes),
        total_travel_time: analysis::time_spent_travelling(coefficients, routes, instance),
        total_waiting_time: analysis::time_spent_waiting(coefficients, routes, instance),
        total_kilometres_travelled: analysis::kilometres_travelled(coefficients, routes, instance),
        time_to_compute: wall_time.as_secs(),
    }
}

fn evolution_block(evolution: &Evolution) -> EvolutionBlock {
    EvolutionBlock {
        objective_values: evolution.objective_values.clone(),
        time_points: evolution.time_points.clone(),
        solution_costs: evolution.solution_costs.clone(),
        covered_interventions: evolution.covered_interventions.clone(),
        integer_objective_values: evolution.integer_objective_values.clone(),
    }
}

/// Build and optionally write the output document; always logs the KPIs.
pub fn report_solution(
    out: Option<&Path>,
    instance: &Instance,
    solution: &IntegerSolution,
    routes: &[Route],
    parameters: serde_json::Value,
    evolution: &Evolution,
    wall_time: Duration,
) -> Result<()> {
    let kpis = kpis(
        &solution.coefficients,
        routes,
        instance,
        solution.objective,
        wall_time,
    );
    info!(
        objective = kpis.objective_value,
        covered = kpis.number_covered_interventions,
        vehicles = kpis.number_used_vehicles,
        kilometres = kpis.total_kilometres_travelled,
        waiting = kpis.total_waiting_time,
        "solution summary"
    );

    let Some(path) = out else {
        return Ok(());
    };
    let document = SolutionDocument {
        instance: InstanceEcho::from_instance(instance),
        solution: kpis,
        routes: routes
            .iter()
            .zip(&solution.coefficients)
            .filter(|(route, &c)| c > 0 && route.nb_interventions() > 0)
            .map(|(route, _)| RouteRecord::from_route(route, instance))
            .collect(),
        parameters,
        evolution: evolution_block(evolution),
    };
    write_solution(path, &document).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "solution document written");
    Ok(())
}
