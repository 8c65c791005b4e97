//! The `solve` command: column generation at the root node, an integer
//! solve over the accumulated pool, and the duplicate-coverage repair pass.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Result};
use tracing::info;

use trp_algo::repair::repair_solution;
use trp_algo::{column_generation, BpNode, ColGenParams};
use trp_core::Route;

use crate::cli::InstanceArgs;
use crate::commands::{load_instance, report};

pub fn handle(
    input: &InstanceArgs,
    params: &ColGenParams,
    greedy_init: bool,
    out: Option<&Path>,
) -> Result<()> {
    let start = Instant::now();
    let (instance, stats) = load_instance(input)?;
    info!(
        interventions = instance.nb_interventions,
        vehicles = instance.nb_vehicles,
        ambiguous = stats.ambiguous,
        "instance ready"
    );

    let mut routes: Vec<Route> = (0..instance.nb_vehicles)
        .map(|v| Route::empty(v, instance.nb_nodes()))
        .collect();
    if greedy_init {
        let seeded = trp_algo::pricing::greedy_initial_routes(&instance, params.delta);
        info!(routes = seeded.len(), "greedy initialisation");
        routes.extend(seeded);
    }
    let mut node = BpNode::root(routes.len());

    let result = column_generation(&instance, &mut node, &mut routes, params)?;
    if !result.master_solution.is_feasible {
        bail!("master problem infeasible");
    }
    info!(
        iterations = result.iterations,
        routes = routes.len(),
        lp_objective = result.master_solution.objective,
        master_ms = result.master_time_ms,
        pricing_ms = result.pricing_time_ms,
        "column generation finished"
    );

    let Some(integer) = result.integer_solution.clone() else {
        // --no-integer: the relaxation value is the deliverable.
        info!(
            lp_objective = result.master_solution.objective,
            "integer solve skipped"
        );
        return Ok(());
    };

    let (repaired, used_routes) = repair_solution(&routes, &integer, &instance);
    info!(
        before = integer.objective,
        after = repaired.objective,
        "repair pass finished"
    );

    report::report_solution(
        out,
        &instance,
        &repaired,
        &used_routes,
        serde_json::to_value(params)?,
        &result.evolution,
        start.elapsed(),
    )
}
