//! The `branch-price` command: tree exploration with per-node column
//! generation, then repair and export of the incumbent.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Result};
use tracing::info;

use trp_algo::colgen::Evolution;
use trp_algo::repair::repair_solution;
use trp_algo::{branch_and_price, BranchAndPriceParams};
use trp_core::Route;

use crate::cli::InstanceArgs;
use crate::commands::{load_instance, report};

pub fn handle(
    input: &InstanceArgs,
    params: &BranchAndPriceParams,
    out: Option<&Path>,
) -> Result<()> {
    let start = Instant::now();
    let (instance, _) = load_instance(input)?;

    let initial: Vec<Route> = (0..instance.nb_vehicles)
        .map(|v| Route::empty(v, instance.nb_nodes()))
        .collect();
    let (routes, result) = branch_and_price(&instance, initial, params)?;
    info!(
        nodes = result.nodes_explored,
        depth = result.max_depth_reached,
        pool = routes.len(),
        "branch-and-price finished"
    );

    let Some(mut best) = result.best_solution else {
        bail!("no integer incumbent found");
    };
    // The incumbent may predate later pool growth; pad its coefficients.
    best.coefficients.resize(routes.len(), 0);

    let (repaired, used_routes) = repair_solution(&routes, &best, &instance);
    info!(value = repaired.objective, "incumbent after repair");

    report::report_solution(
        out,
        &instance,
        &repaired,
        &used_routes,
        serde_json::to_value(params)?,
        &Evolution::default(),
        start.elapsed(),
    )
}
