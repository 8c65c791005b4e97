//! Branch-and-price driver.
//!
//! Explores a FIFO tree of subproblems defined by edge-usage cuts. Each node
//! runs column generation over the shared route pool, updates the integer
//! incumbent, and — when the LP and MIP values disagree — branches on the
//! first edge flow `x_ijv` strictly inside `(0.05, 0.95)`, scanned in fixed
//! (i, j, v) order so independent runs produce identical trees.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};

use trp_core::{Instance, Route, TrpResult};

use crate::colgen::{column_generation, ColGenParams};
use crate::master::{BpNode, EdgeCut, IntegerSolution, MasterSolution};

/// Branch-and-price controls on top of the per-node CG parameters.
#[derive(Debug, Clone, Serialize)]
pub struct BranchAndPriceParams {
    pub cg: ColGenParams,
    pub max_depth: usize,
    /// CG budget per non-root node, seconds.
    pub time_limit_per_node: f64,
    /// The root gets a larger budget.
    pub root_time_limit: f64,
}

impl Default for BranchAndPriceParams {
    fn default() -> Self {
        BranchAndPriceParams {
            cg: ColGenParams {
                compute_integer_solution: true,
                ..Default::default()
            },
            max_depth: 10,
            time_limit_per_node: 60.0,
            root_time_limit: 600.0,
        }
    }
}

/// Outcome of a branch-and-price run.
#[derive(Debug, Clone, Default)]
pub struct BranchAndPriceResult {
    /// Best integer solution found, with coefficients over the final pool
    /// (shorter vectors refer to the pool prefix present at discovery).
    pub best_solution: Option<IntegerSolution>,
    pub best_value: f64,
    pub nodes_explored: usize,
    pub max_depth_reached: usize,
}

/// Aggregate LP edge flow `x_ijv` over the pool.
pub fn edge_flow(
    i: usize,
    j: usize,
    v: usize,
    solution: &MasterSolution,
    routes: &[Route],
) -> f64 {
    routes
        .iter()
        .zip(&solution.coefficients)
        .filter(|(route, &coefficient)| coefficient > 0.0 && route.vehicle_id == v)
        .map(|(route, &coefficient)| coefficient * route.edges[i][j] as f64)
        .sum()
}

/// First (i, j, v) whose aggregated flow is fractional enough to branch on.
pub fn find_branching_cut(
    solution: &MasterSolution,
    routes: &[Route],
    instance: &Instance,
) -> Option<EdgeCut> {
    let n = instance.nb_nodes();
    for i in 0..n {
        for j in 0..n {
            for v in 0..instance.nb_vehicles {
                let flow = edge_flow(i, j, v, solution, routes);
                if flow > 0.05 && flow < 0.95 {
                    debug!(i, j, v, flow, "branching cut selected");
                    return Some((i, j, v));
                }
            }
        }
    }
    None
}

/// Run branch-and-price from an initial route pool. The pool grows across
/// the whole tree; the result's coefficients index into it.
pub fn branch_and_price(
    instance: &Instance,
    initial_routes: Vec<Route>,
    params: &BranchAndPriceParams,
) -> TrpResult<(Vec<Route>, BranchAndPriceResult)> {
    let mut routes = initial_routes;
    let mut frontier = VecDeque::new();
    frontier.push_back(BpNode::root(routes.len()));

    let mut result = BranchAndPriceResult {
        best_value: f64::INFINITY,
        ..Default::default()
    };

    while let Some(mut node) = frontier.pop_front() {
        if node.depth > params.max_depth {
            break;
        }
        result.nodes_explored += 1;
        result.max_depth_reached = result.max_depth_reached.max(node.depth);
        node.incumbent_bound = result.best_value;

        info!(
            depth = node.depth,
            active_routes = node.active_routes.len(),
            forbidden = node.forbidden_edges.len(),
            required = node.required_edges.len(),
            "exploring node"
        );

        let mut cg_params = params.cg.clone();
        cg_params.time_limit = if node.depth == 0 {
            params.root_time_limit
        } else {
            params.time_limit_per_node
        };
        cg_params.compute_integer_solution = true;

        let cg = column_generation(instance, &mut node, &mut routes, &cg_params)?;
        if !cg.master_solution.is_feasible {
            info!(depth = node.depth, "cuts are infeasible; pruning node");
            continue;
        }
        let Some(integer) = cg.integer_solution else {
            info!(depth = node.depth, "node bound dominated by incumbent; pruning");
            continue;
        };

        let lp_objective = cg.master_solution.objective;
        if integer.objective < result.best_value {
            info!(value = integer.objective, "new incumbent");
            result.best_value = integer.objective;
            result.best_solution = Some(integer.clone());
        }
        if (integer.objective - lp_objective).abs() < 1e-3 {
            debug!(depth = node.depth, "node closed: integer matches relaxation");
            continue;
        }

        let Some(cut) = find_branching_cut(&cg.master_solution, &routes, instance) else {
            debug!(depth = node.depth, "no fractional edge to branch on");
            continue;
        };

        let mut zero_child = node.clone();
        zero_child.depth += 1;
        zero_child.lp_bound = lp_objective;
        zero_child.forbidden_edges.insert(cut);
        frontier.push_back(zero_child);

        let mut one_child = node.clone();
        one_child.depth += 1;
        one_child.lp_bound = lp_objective;
        one_child.required_edges.insert(cut);
        frontier.push_back(one_child);
    }

    Ok((routes, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trp_core::test_fixtures::single_vehicle_instance;

    use crate::master::DualSolution;

    #[test]
    fn test_edge_flow_aggregates_by_vehicle() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let vehicle = &instance.vehicles[0];
        let routes = vec![
            Route::from_global_sequence(0.0, &[2, 0, 1, 2], &instance, vehicle),
            Route::from_global_sequence(0.0, &[2, 1, 2], &instance, vehicle),
        ];
        let solution = MasterSolution {
            is_feasible: true,
            coefficients: vec![0.5, 0.5],
            duals: DualSolution::default(),
            objective: 0.0,
        };
        assert!((edge_flow(0, 1, 0, &solution, &routes) - 0.5).abs() < 1e-9);
        assert!((edge_flow(2, 1, 0, &solution, &routes) - 0.5).abs() < 1e-9);
        assert!(edge_flow(1, 0, 0, &solution, &routes).abs() < 1e-9);
        // Wrong vehicle: nothing aggregates.
        assert!(edge_flow(0, 1, 1, &solution, &routes).abs() < 1e-9);
    }

    #[test]
    fn test_branching_picks_first_fractional_triple() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let vehicle = &instance.vehicles[0];
        let routes = vec![
            Route::from_global_sequence(0.0, &[2, 0, 1, 2], &instance, vehicle),
            Route::from_global_sequence(0.0, &[2, 1, 0, 2], &instance, vehicle),
        ];
        let solution = MasterSolution {
            is_feasible: true,
            coefficients: vec![0.5, 0.5],
            duals: DualSolution::default(),
            objective: 0.0,
        };
        // Both (0, 1, 0) and (1, 0, 0) carry flow 0.5; the scan order makes
        // (0, 1, 0) the branching cut.
        let cut = find_branching_cut(&solution, &routes, &instance).unwrap();
        assert_eq!(cut, (0, 1, 0));
    }

    #[test]
    fn test_integral_flows_yield_no_cut() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let vehicle = &instance.vehicles[0];
        let routes = vec![Route::from_global_sequence(0.0, &[2, 0, 1, 2], &instance, vehicle)];
        let solution = MasterSolution {
            is_feasible: true,
            coefficients: vec![1.0],
            duals: DualSolution::default(),
            objective: 0.0,
        };
        assert!(find_branching_cut(&solution, &routes, &instance).is_none());
    }

    #[test]
    fn test_branch_and_price_solves_small_instance() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let initial: Vec<Route> = (0..instance.nb_vehicles)
            .map(|v| Route::empty(v, instance.nb_nodes()))
            .collect();
        let params = BranchAndPriceParams {
            max_depth: 3,
            time_limit_per_node: 10.0,
            root_time_limit: 30.0,
            ..Default::default()
        };
        let (routes, result) = branch_and_price(&instance, initial, &params).unwrap();
        assert!(result.nodes_explored >= 1);
        let best = result.best_solution.expect("an incumbent exists");
        assert!((result.best_value - 30.0).abs() < 1e-3);
        // The incumbent's coefficients address the pool.
        assert!(best.coefficients.len() <= routes.len());
    }
}
