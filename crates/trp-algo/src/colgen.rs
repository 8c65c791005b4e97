//! The column-generation loop.
//!
//! Alternates master LP solves with pricing rounds, appending every
//! candidate column whose reduced cost clears the threshold. Supports dual
//! stabilisation (convex smoothing against the previous duals) and, for the
//! labeling strategy family, adaptive escalation: when a round adds nothing,
//! first flip on the cycle relaxation, then raise the number of dominance
//! resources one step per stalled round — none of which counts against the
//! non-improvement budget.
//!
//! Stopping rules: a round adds no route (after escalation headroom is
//! spent), the consecutive-non-improvement counter hits its limit, or the
//! cumulative master+pricing budget runs out.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use trp_core::{Instance, Route, TrpError, TrpResult};

use crate::analysis;
use crate::master::{
    BpNode, DualSolution, Formulation, IntegerSolution, MasterModel, MasterSolution,
};
use crate::pricing::{run_pricing, PricingContext, PricingStrategy};

/// Parameters of one column-generation run.
#[derive(Debug, Clone, Serialize)]
pub struct ColGenParams {
    /// Cumulative master+pricing budget, seconds.
    pub time_limit: f64,
    /// A candidate is added when its reduced cost is below `-threshold`.
    pub reduced_cost_threshold: f64,
    pub max_iterations: usize,
    pub max_consecutive_non_improvement: usize,
    pub compute_integer_solution: bool,
    /// Per-call limit for the final MIP solve, seconds.
    pub mip_time_limit: Option<f64>,
    pub use_stabilisation: bool,
    /// Convex weight of the current duals in the stabilised combination.
    pub stabilisation_alpha: f64,
    pub pricing: PricingStrategy,
    /// Bound-table time step of the pulse family.
    pub delta: i32,
    /// Solution pool capacity of the pulse family.
    pub pool_size: usize,
    /// Dominance-resource cap for the labeling escalation; `None` means all.
    pub max_resources_dominance: Option<usize>,
    pub switch_to_cyclic_pricing: bool,
    pub formulation: Formulation,
}

impl Default for ColGenParams {
    fn default() -> Self {
        ColGenParams {
            time_limit: 60.0,
            reduced_cost_threshold: 1e-6,
            max_iterations: 1000,
            max_consecutive_non_improvement: 5,
            compute_integer_solution: false,
            mip_time_limit: None,
            use_stabilisation: false,
            stabilisation_alpha: 0.5,
            pricing: PricingStrategy::PulseBasic,
            delta: 10,
            pool_size: 1000,
            max_resources_dominance: None,
            switch_to_cyclic_pricing: true,
            formulation: Formulation::Minimisation,
        }
    }
}

/// Per-iteration trajectory of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Evolution {
    pub objective_values: Vec<f64>,
    /// Milliseconds since the start of the run.
    pub time_points: Vec<u64>,
    /// Routing cost of the fractional solution (no outsourcing term).
    pub solution_costs: Vec<f64>,
    /// Fractional intervention coverage.
    pub covered_interventions: Vec<f64>,
    pub integer_objective_values: Vec<f64>,
}

/// Result of one column-generation run.
#[derive(Debug, Clone, Default)]
pub struct CgResult {
    pub master_solution: MasterSolution,
    pub integer_solution: Option<IntegerSolution>,
    pub iterations: usize,
    pub master_time_ms: u64,
    pub pricing_time_ms: u64,
    pub integer_time_ms: u64,
    pub evolution: Evolution,
}

impl CgResult {
    fn infeasible() -> Self {
        CgResult::default()
    }
}

/// Run column generation at one branch-and-price node. New routes are
/// appended to the shared pool, activated in the node and added as master
/// columns; the node's LP bound is updated on exit.
pub fn column_generation(
    instance: &Instance,
    node: &mut BpNode,
    routes: &mut Vec<Route>,
    params: &ColGenParams,
) -> TrpResult<CgResult> {
    let start = Instant::now();
    let mut master_time_ms = 0u64;
    let mut pricing_time_ms = 0u64;

    let use_rollback = instance.respects_triangle_inequality();
    if !use_rollback {
        warn!("triangle inequality violated; pulse rollback disabled");
    }

    let mut master = MasterModel::new(instance, routes, node, params.formulation);

    // Each engine call carries the remaining cumulative budget as its own
    // wall-clock limit; a limit-hit LP still yields a usable point.
    let remaining_budget = |spent_ms: u64| -> Option<f64> {
        Some((params.time_limit - spent_ms as f64 / 1000.0).max(1.0))
    };

    let master_start = Instant::now();
    let mut solution = master.solve_lp(remaining_budget(0))?;
    master_time_ms += master_start.elapsed().as_millis() as u64;
    if !solution.is_feasible {
        return Ok(CgResult::infeasible());
    }

    fn record(
        evolution: &mut Evolution,
        solution: &MasterSolution,
        routes: &[Route],
        instance: &Instance,
        start: Instant,
    ) {
        evolution.objective_values.push(solution.objective);
        evolution
            .time_points
            .push(start.elapsed().as_millis() as u64);
        evolution
            .solution_costs
            .push(analysis::relaxed_solution_cost(solution, routes));
        evolution
            .covered_interventions
            .push(analysis::count_covered_fraction(solution, routes, instance));
    }

    let mut evolution = Evolution::default();
    record(&mut evolution, &solution, routes, instance, start);

    let max_res_dom = params
        .max_resources_dominance
        .unwrap_or(instance.capacities_labels.len() + 1);
    let mut cyclic = false;
    let mut n_res_dom = instance.capacities_labels.len() + 1;

    let mut iterations = 0usize;
    let mut consecutive_non_improvement = 0usize;
    let mut previous_objective = f64::INFINITY;
    let mut previous_duals: Option<DualSolution> = None;
    let mut stopped_on_no_route = false;

    while iterations < params.max_iterations
        && consecutive_non_improvement < params.max_consecutive_non_improvement
        && (master_time_ms + pricing_time_ms) as f64 / 1000.0 < params.time_limit
    {
        // Stabilised duals.
        let duals = match (&previous_duals, params.use_stabilisation) {
            (Some(previous), true) => solution
                .duals
                .combine(previous, params.stabilisation_alpha),
            _ => solution.duals.clone(),
        };

        // Pricing round.
        let pricing_start = Instant::now();
        let ctx = PricingContext {
            instance,
            duals: &duals,
            forbidden_edges: &node.forbidden_edges,
            required_edges: &node.required_edges,
            delta: params.delta,
            pool_size: params.pool_size,
            use_rollback,
            cyclic,
            n_res_dom,
        };
        let candidates = run_pricing(params.pricing, &ctx);
        let mut added = 0usize;
        let mut min_reduced_cost = f64::INFINITY;
        for candidate in candidates {
            min_reduced_cost = min_reduced_cost.min(candidate.reduced_cost);
            if candidate.reduced_cost >= -params.reduced_cost_threshold {
                continue;
            }
            if !candidate.is_feasible(instance) {
                // Cycle-relaxed pricers may emit non-elementary walks; they
                // tighten the bound but never enter the pool.
                debug!(vehicle = candidate.vehicle_id, "dropping infeasible candidate");
                continue;
            }
            routes.push(candidate);
            let index = routes.len() - 1;
            node.active_routes.insert(index);
            master.add_route(&routes[index]);
            added += 1;
        }
        pricing_time_ms += pricing_start.elapsed().as_millis() as u64;
        debug!(
            iteration = iterations,
            added, min_reduced_cost, "pricing round finished"
        );

        // Master re-solve.
        let master_start = Instant::now();
        solution = master.solve_lp(remaining_budget(master_time_ms + pricing_time_ms))?;
        master_time_ms += master_start.elapsed().as_millis() as u64;
        if !solution.is_feasible {
            return Ok(CgResult::infeasible());
        }
        record(&mut evolution, &solution, routes, instance, start);

        // The LP over a grown column set cannot deteriorate.
        if solution.objective > previous_objective + 1e-6 {
            return Err(TrpError::Assertion(format!(
                "master objective increased: {} -> {}",
                previous_objective, solution.objective
            )));
        }

        // Escalation before the stop conditions, not counted as a round.
        if added == 0 && params.pricing.supports_escalation() {
            if params.switch_to_cyclic_pricing && !cyclic {
                cyclic = true;
                n_res_dom = 0;
                info!("escalating to cyclic pricing");
                continue;
            }
            if cyclic && n_res_dom < max_res_dom {
                n_res_dom += 1;
                info!(n_res_dom, "escalating dominance resources");
                continue;
            }
        }

        if added == 0 {
            stopped_on_no_route = true;
            break;
        }
        if solution.objective >= previous_objective - 1e-9 {
            consecutive_non_improvement += 1;
        } else {
            consecutive_non_improvement = 0;
        }
        previous_objective = solution.objective;
        previous_duals = Some(solution.duals.clone());
        iterations += 1;
    }

    let elapsed = (master_time_ms + pricing_time_ms) as f64 / 1000.0;
    if stopped_on_no_route {
        info!(iterations, objective = solution.objective, "no new route to add");
    } else if consecutive_non_improvement >= params.max_consecutive_non_improvement {
        info!(iterations, "stopped on non-improvement");
    } else if elapsed >= params.time_limit {
        info!(iterations, elapsed, "column-generation budget exhausted");
    }

    node.lp_bound = solution.objective;

    // Final MIP over the accumulated pool, unless the node is already
    // dominated by the incumbent.
    let mut integer_solution = None;
    let mut integer_time_ms = 0u64;
    if params.compute_integer_solution && node.lp_bound < node.incumbent_bound {
        let integer_start = Instant::now();
        let mip = master.solve_mip(params.mip_time_limit)?;
        integer_time_ms = integer_start.elapsed().as_millis() as u64;
        if mip.is_feasible {
            evolution.integer_objective_values.push(mip.objective);
            info!(
                lp = solution.objective,
                mip = mip.objective,
                "integer solve over the pool"
            );
            integer_solution = Some(mip);
        }
    }

    Ok(CgResult {
        master_solution: solution,
        integer_solution,
        iterations,
        master_time_ms,
        pricing_time_ms,
        integer_time_ms,
        evolution,
    })
}
