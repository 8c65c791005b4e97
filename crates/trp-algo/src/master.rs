//! Restricted master problem wrapper.
//!
//! Holds the column mirror of the route pool and drives the engine adapter.
//! Two formulations are supported and must never be mixed inside one
//! branch-and-price tree:
//!
//! - **Minimisation** (canonical): `min Σ cost_r·x_r + Σ M·duration_i·y_i`
//!   with covering rows `Σ a_ir·x_r + y_i >= 1` and vehicle rows `<= 1`;
//! - **Maximisation**: `max Σ (M·duration_r − cost_r)·x_r` with covering rows
//!   `<= 1` and no outsourcing variables.
//!
//! The two agree up to the constant `Σ_i duration_i·M`; the wrapper always
//! reports the canonical minimisation objective and min-form dual values, so
//! the pricing layer is formulation-agnostic.
//!
//! Branch-and-price edge cuts are rows over the aggregated edge usage
//! `x_ijv = Σ_r x_r·1[route r uses (i,j) on vehicle v]`: forced-zero cuts
//! bound it `<= 0`, forced-one cuts bound it `>= 1`. Their duals flow back
//! into the pricing arc costs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use trp_core::{Instance, Route, TrpResult};

use crate::backend::{LinearModel, LpStatus, Objective};

/// An edge-usage cut key: (from node, to node, vehicle).
pub type EdgeCut = (usize, usize, usize);

/// Dual values of one master LP solve, in min-form convention.
#[derive(Debug, Clone, Default)]
pub struct DualSolution {
    /// One per intervention.
    pub alphas: Vec<f64>,
    /// One per vehicle.
    pub betas: Vec<f64>,
    /// Duals of the forced-zero edge cuts.
    pub upper_bound_duals: BTreeMap<EdgeCut, f64>,
    /// Duals of the forced-one edge cuts.
    pub lower_bound_duals: BTreeMap<EdgeCut, f64>,
}

impl DualSolution {
    /// Convex combination `alpha·self + (1 − alpha)·previous`, the dual
    /// stabilisation step. Cut duals missing on either side count as zero.
    pub fn combine(&self, previous: &DualSolution, alpha: f64) -> DualSolution {
        let mix = |a: &[f64], b: &[f64]| -> Vec<f64> {
            a.iter()
                .enumerate()
                .map(|(i, &x)| alpha * x + (1.0 - alpha) * b.get(i).copied().unwrap_or(0.0))
                .collect()
        };
        let mix_map = |a: &BTreeMap<EdgeCut, f64>, b: &BTreeMap<EdgeCut, f64>| {
            let keys: BTreeSet<EdgeCut> = a.keys().chain(b.keys()).copied().collect();
            keys.into_iter()
                .map(|k| {
                    let x = a.get(&k).copied().unwrap_or(0.0);
                    let y = b.get(&k).copied().unwrap_or(0.0);
                    (k, alpha * x + (1.0 - alpha) * y)
                })
                .collect()
        };
        DualSolution {
            alphas: mix(&self.alphas, &previous.alphas),
            betas: mix(&self.betas, &previous.betas),
            upper_bound_duals: mix_map(&self.upper_bound_duals, &previous.upper_bound_duals),
            lower_bound_duals: mix_map(&self.lower_bound_duals, &previous.lower_bound_duals),
        }
    }
}

/// Primal/dual solution of one master LP solve.
#[derive(Debug, Clone, Default)]
pub struct MasterSolution {
    pub is_feasible: bool,
    /// One coefficient per pool route, in pool order.
    pub coefficients: Vec<f64>,
    pub duals: DualSolution,
    /// Canonical minimisation objective.
    pub objective: f64,
}

impl MasterSolution {
    pub fn infeasible() -> Self {
        Self::default()
    }
}

/// A 0/1 solution of the master MIP over the current pool.
#[derive(Debug, Clone, Default)]
pub struct IntegerSolution {
    pub is_feasible: bool,
    pub coefficients: Vec<u8>,
    /// Canonical minimisation objective.
    pub objective: f64,
}

/// One subproblem of the branch-and-price tree.
#[derive(Debug, Clone)]
pub struct BpNode {
    pub depth: usize,
    /// LP value of the relaxation at this node (inherited from the parent on
    /// creation, updated after the node's own CG run).
    pub lp_bound: f64,
    /// Best integer value known when the node is extracted. In the canonical
    /// minimisation form a node whose LP bound is not below this cannot
    /// improve the incumbent.
    pub incumbent_bound: f64,
    /// Indices into the route pool of the routes active at this node.
    pub active_routes: BTreeSet<usize>,
    /// Edge cuts forcing `x_ijv <= 0`.
    pub forbidden_edges: BTreeSet<EdgeCut>,
    /// Edge cuts forcing `x_ijv >= 1`.
    pub required_edges: BTreeSet<EdgeCut>,
}

impl BpNode {
    /// Root node activating the whole initial pool, with no cuts.
    pub fn root(nb_initial_routes: usize) -> Self {
        BpNode {
            depth: 0,
            lp_bound: f64::NEG_INFINITY,
            incumbent_bound: f64::INFINITY,
            active_routes: (0..nb_initial_routes).collect(),
            forbidden_edges: BTreeSet::new(),
            required_edges: BTreeSet::new(),
        }
    }
}

/// Which master formulation a model is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Formulation {
    Minimisation,
    Maximisation,
}

/// Column mirror of one pool route.
#[derive(Debug, Clone)]
struct ColumnMirror {
    vehicle_id: usize,
    cost: f64,
    duration: i32,
    covered: Vec<usize>,
    edges: Vec<(usize, usize)>,
}

impl ColumnMirror {
    fn from_route(route: &Route, nb_interventions: usize) -> Self {
        let covered = route
            .interior()
            .iter()
            .copied()
            .filter(|&i| i < nb_interventions)
            .collect();
        let edges = route.sequence.windows(2).map(|w| (w[0], w[1])).collect();
        ColumnMirror {
            vehicle_id: route.vehicle_id,
            cost: route.total_cost,
            duration: route.total_duration,
            covered,
            edges,
        }
    }

    fn uses_edge(&self, i: usize, j: usize) -> bool {
        self.edges.iter().any(|&(a, b)| a == i && b == j)
    }
}

/// The restricted master problem over the current route pool.
pub struct MasterModel<'a> {
    instance: &'a Instance,
    formulation: Formulation,
    columns: Vec<ColumnMirror>,
    forbidden_edges: Vec<EdgeCut>,
    required_edges: Vec<EdgeCut>,
}

impl<'a> MasterModel<'a> {
    /// Build the model mirror from the whole route pool and the node's cuts.
    pub fn new(
        instance: &'a Instance,
        routes: &[Route],
        node: &BpNode,
        formulation: Formulation,
    ) -> Self {
        let columns = routes
            .iter()
            .map(|r| ColumnMirror::from_route(r, instance.nb_interventions))
            .collect();
        MasterModel {
            instance,
            formulation,
            columns,
            forbidden_edges: node.forbidden_edges.iter().copied().collect(),
            required_edges: node.required_edges.iter().copied().collect(),
        }
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    pub fn nb_columns(&self) -> usize {
        self.columns.len()
    }

    /// Append a new route column. The pool index of the route must equal the
    /// current column count, which holds by construction of the CG loop.
    pub fn add_route(&mut self, route: &Route) {
        self.columns
            .push(ColumnMirror::from_route(route, self.instance.nb_interventions));
    }

    /// Constant separating the two formulations: `Σ_i duration_i · M`.
    pub fn outsourcing_constant(instance: &Instance) -> f64 {
        instance.nodes[..instance.nb_interventions]
            .iter()
            .map(|n| n.duration as f64 * instance.big_m)
            .sum()
    }

    fn build(&self, integer: bool) -> LinearModel {
        let n_i = self.instance.nb_interventions;
        let n_v = self.instance.nb_vehicles;
        let minimise = self.formulation == Formulation::Minimisation;

        let mut model = LinearModel::new(if minimise {
            Objective::Minimise
        } else {
            Objective::Maximise
        });

        // Rows: interventions, vehicles, then the two cut families. The
        // layout is relied upon when extracting duals.
        for _ in 0..n_i {
            if minimise {
                model.add_row(1.0, f64::INFINITY);
            } else {
                model.add_row(f64::NEG_INFINITY, 1.0);
            }
        }
        for _ in 0..n_v {
            model.add_row(f64::NEG_INFINITY, 1.0);
        }
        for _ in &self.forbidden_edges {
            model.add_row(f64::NEG_INFINITY, 0.0);
        }
        for _ in &self.required_edges {
            model.add_row(1.0, f64::INFINITY);
        }

        for column in &self.columns {
            let mut factors: Vec<(usize, f64)> =
                column.covered.iter().map(|&i| (i, 1.0)).collect();
            factors.push((n_i + column.vehicle_id, 1.0));
            for (c, &(i, j, v)) in self.forbidden_edges.iter().enumerate() {
                if v == column.vehicle_id && column.uses_edge(i, j) {
                    factors.push((n_i + n_v + c, 1.0));
                }
            }
            for (c, &(i, j, v)) in self.required_edges.iter().enumerate() {
                if v == column.vehicle_id && column.uses_edge(i, j) {
                    factors.push((n_i + n_v + self.forbidden_edges.len() + c, 1.0));
                }
            }
            let objective = if minimise {
                column.cost
            } else {
                self.instance.big_m * column.duration as f64 - column.cost
            };
            model.add_column(objective, 0.0, 1.0, true, factors);
        }

        if minimise {
            // Outsourcing variables absorb uncovered work.
            for (i, node) in self.instance.nodes[..n_i].iter().enumerate() {
                let objective = self.instance.big_m * node.duration as f64;
                model.add_column(objective, 0.0, 1.0, true, vec![(i, 1.0)]);
            }
        }

        model
    }

    /// Canonical minimisation value of a raw engine objective.
    fn canonical_objective(&self, raw: f64) -> f64 {
        match self.formulation {
            Formulation::Minimisation => raw,
            Formulation::Maximisation => Self::outsourcing_constant(self.instance) - raw,
        }
    }

    /// Solve the LP relaxation and extract primal coefficients plus min-form
    /// duals. Infeasibility (conflicting cuts) is reported through
    /// `is_feasible`, not as an error.
    pub fn solve_lp(&self, time_limit: Option<f64>) -> TrpResult<MasterSolution> {
        let model = self.build(false);
        let outcome = model.solve(false, time_limit)?;
        match outcome.status {
            LpStatus::Infeasible => return Ok(MasterSolution::infeasible()),
            LpStatus::Other(s) => return Err(trp_core::TrpError::Solver(s)),
            LpStatus::Optimal | LpStatus::TimeLimit => {}
        }

        let n_i = self.instance.nb_interventions;
        let n_v = self.instance.nb_vehicles;
        let nb_rows = n_i + n_v + self.forbidden_edges.len() + self.required_edges.len();
        if outcome.primal.len() < self.columns.len() || outcome.row_duals.len() < nb_rows {
            return Err(trp_core::TrpError::Solver(
                "engine returned an incomplete LP point".into(),
            ));
        }
        let coefficients = outcome.primal[..self.columns.len()].to_vec();

        let mut alphas: Vec<f64> = outcome.row_duals[..n_i].to_vec();
        let mut betas: Vec<f64> = outcome.row_duals[n_i..n_i + n_v].to_vec();
        if self.formulation == Formulation::Maximisation {
            // Convert to min-form: alpha_i = M·d_i − alpha'_i, beta_v = −beta'_v.
            for (i, alpha) in alphas.iter_mut().enumerate() {
                *alpha = self.instance.big_m * self.instance.nodes[i].duration as f64 - *alpha;
            }
            for beta in betas.iter_mut() {
                *beta = -*beta;
            }
        }

        let mut upper_bound_duals = BTreeMap::new();
        for (c, &cut) in self.forbidden_edges.iter().enumerate() {
            upper_bound_duals.insert(cut, outcome.row_duals[n_i + n_v + c]);
        }
        let mut lower_bound_duals = BTreeMap::new();
        for (c, &cut) in self.required_edges.iter().enumerate() {
            lower_bound_duals.insert(
                cut,
                outcome.row_duals[n_i + n_v + self.forbidden_edges.len() + c],
            );
        }

        Ok(MasterSolution {
            is_feasible: true,
            coefficients,
            duals: DualSolution {
                alphas,
                betas,
                upper_bound_duals,
                lower_bound_duals,
            },
            objective: self.canonical_objective(outcome.objective),
        })
    }

    /// Solve the MIP over the current pool.
    pub fn solve_mip(&self, time_limit: Option<f64>) -> TrpResult<IntegerSolution> {
        let model = self.build(true);
        let outcome = model.solve(true, time_limit)?;
        match outcome.status {
            LpStatus::Infeasible => return Ok(IntegerSolution::default()),
            LpStatus::Other(s) => return Err(trp_core::TrpError::Solver(s)),
            LpStatus::Optimal | LpStatus::TimeLimit => {}
        }
        if outcome.primal.is_empty() {
            return Ok(IntegerSolution::default());
        }
        let coefficients = outcome.primal[..self.columns.len()]
            .iter()
            .map(|&x| if x > 0.5 { 1 } else { 0 })
            .collect();
        Ok(IntegerSolution {
            is_feasible: true,
            coefficients,
            objective: self.canonical_objective(outcome.objective),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trp_core::test_fixtures::single_vehicle_instance;

    fn route(instance: &Instance, sequence: &[usize]) -> Route {
        Route::from_global_sequence(0.0, sequence, instance, &instance.vehicles[0])
    }

    fn seeded_pool(instance: &Instance) -> Vec<Route> {
        vec![Route::empty(0, instance.nb_nodes())]
    }

    #[test]
    fn test_lp_prefers_route_over_outsourcing() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let mut routes = seeded_pool(&instance);
        routes.push(route(&instance, &[2, 0, 1, 2]));
        let node = BpNode::root(routes.len());
        let master = MasterModel::new(&instance, &routes, &node, Formulation::Minimisation);

        let solution = master.solve_lp(None).unwrap();
        assert!(solution.is_feasible);
        // The full route costs 30; outsourcing both jobs costs 120·M.
        assert!((solution.objective - 30.0).abs() < 1e-4);
        assert!((solution.coefficients[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_duals_reflect_covering_rows() {
        let instance = single_vehicle_instance(1, 10, 10, 60);
        let mut routes = seeded_pool(&instance);
        routes.push(route(&instance, &[1, 0, 1]));
        let node = BpNode::root(routes.len());
        let master = MasterModel::new(&instance, &routes, &node, Formulation::Minimisation);

        let solution = master.solve_lp(None).unwrap();
        assert_eq!(solution.duals.alphas.len(), 1);
        assert_eq!(solution.duals.betas.len(), 1);
        // Covering is binding: its dual carries the route's value.
        assert!(solution.duals.alphas[0] > 0.0);
    }

    #[test]
    fn test_formulations_agree_up_to_constant() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let mut routes = seeded_pool(&instance);
        routes.push(route(&instance, &[2, 0, 1, 2]));
        let node = BpNode::root(routes.len());

        let min_master = MasterModel::new(&instance, &routes, &node, Formulation::Minimisation);
        let max_master = MasterModel::new(&instance, &routes, &node, Formulation::Maximisation);
        let min_solution = min_master.solve_lp(None).unwrap();
        let max_solution = max_master.solve_lp(None).unwrap();
        // Both report the canonical minimisation value.
        assert!((min_solution.objective - max_solution.objective).abs() < 1e-4);
    }

    #[test]
    fn test_forbidden_cut_blocks_route() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let mut routes = seeded_pool(&instance);
        routes.push(route(&instance, &[2, 0, 1, 2]));
        let mut node = BpNode::root(routes.len());
        // Forbid the A->B edge used by the only covering route.
        node.forbidden_edges.insert((0, 1, 0));
        let master = MasterModel::new(&instance, &routes, &node, Formulation::Minimisation);
        let solution = master.solve_lp(None).unwrap();
        assert!(solution.is_feasible);
        assert!(solution.coefficients[1].abs() < 1e-6);
        // Both jobs fall to outsourcing.
        assert!(solution.objective > instance.big_m);
    }

    #[test]
    fn test_required_cut_without_support_is_infeasible() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let routes = seeded_pool(&instance);
        let mut node = BpNode::root(routes.len());
        node.required_edges.insert((0, 1, 0));
        let master = MasterModel::new(&instance, &routes, &node, Formulation::Minimisation);
        let solution = master.solve_lp(None).unwrap();
        assert!(!solution.is_feasible);
    }

    #[test]
    fn test_mip_is_integral_and_bounded_by_lp() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let mut routes = seeded_pool(&instance);
        routes.push(route(&instance, &[2, 0, 2]));
        routes.push(route(&instance, &[2, 1, 2]));
        routes.push(route(&instance, &[2, 0, 1, 2]));
        let node = BpNode::root(routes.len());
        let master = MasterModel::new(&instance, &routes, &node, Formulation::Minimisation);

        let lp = master.solve_lp(None).unwrap();
        let mip = master.solve_mip(None).unwrap();
        assert!(mip.is_feasible);
        // Minimisation: the MIP value can never beat the LP relaxation.
        assert!(mip.objective >= lp.objective - 1e-6);
        let chosen: usize = mip.coefficients.iter().map(|&c| c as usize).sum();
        assert!(chosen >= 1);
    }

    #[test]
    fn test_stabilisation_combination() {
        let now = DualSolution {
            alphas: vec![10.0, 0.0],
            betas: vec![2.0],
            ..Default::default()
        };
        let prev = DualSolution {
            alphas: vec![0.0, 10.0],
            betas: vec![4.0],
            ..Default::default()
        };
        let mixed = now.combine(&prev, 0.25);
        assert!((mixed.alphas[0] - 2.5).abs() < 1e-9);
        assert!((mixed.alphas[1] - 7.5).abs() < 1e-9);
        assert!((mixed.betas[0] - 3.5).abs() < 1e-9);
    }
}
