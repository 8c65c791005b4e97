//! External-solver adapter.
//!
//! The only permitted coupling to the HiGHS LP/MIP engine. The surface is
//! deliberately narrow: declare rows, append columns with their row factors,
//! solve with an optional wall-clock limit, read back primal values and (for
//! LP solves) row duals. Everything above this module speaks in terms of
//! [`LinearModel`] and [`LpOutcome`] only.
//!
//! The model is stored column-wise and handed to the engine on each `solve`
//! call; a limit-hit solve still yields the engine's best-known point, which
//! callers may use.

use highs::{ColProblem, HighsModelStatus, Sense};

use trp_core::TrpResult;

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Minimise,
    Maximise,
}

/// Outcome status of a solve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    /// The wall-clock limit was hit; primal values are best-known.
    TimeLimit,
    Other(String),
}

/// Primal/dual point returned by the engine.
#[derive(Debug, Clone)]
pub struct LpOutcome {
    pub status: LpStatus,
    /// One value per column, in insertion order. Empty when infeasible.
    pub primal: Vec<f64>,
    /// One value per row, in insertion order. Empty for MIP solves.
    pub row_duals: Vec<f64>,
    /// Objective value recomputed from the primal point.
    pub objective: f64,
}

impl LpOutcome {
    pub fn is_usable(&self) -> bool {
        matches!(self.status, LpStatus::Optimal | LpStatus::TimeLimit) && !self.primal.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct RowSpec {
    lower: f64,
    upper: f64,
}

#[derive(Debug, Clone)]
struct ColSpec {
    objective: f64,
    lower: f64,
    upper: f64,
    integer: bool,
    /// (row index, coefficient) pairs.
    factors: Vec<(usize, f64)>,
}

/// A column-wise linear model, rebuilt inside the engine on every solve.
#[derive(Debug, Clone)]
pub struct LinearModel {
    sense: Objective,
    rows: Vec<RowSpec>,
    cols: Vec<ColSpec>,
}

impl LinearModel {
    pub fn new(sense: Objective) -> Self {
        Self {
            sense,
            rows: Vec::new(),
            cols: Vec::new(),
        }
    }

    /// Declare a constraint row `lower <= a'x <= upper`; returns its index.
    pub fn add_row(&mut self, lower: f64, upper: f64) -> usize {
        self.rows.push(RowSpec { lower, upper });
        self.rows.len() - 1
    }

    /// Append a column with its objective coefficient, bounds, integrality
    /// marker and row factors; returns its index.
    pub fn add_column(
        &mut self,
        objective: f64,
        lower: f64,
        upper: f64,
        integer: bool,
        factors: Vec<(usize, f64)>,
    ) -> usize {
        self.cols.push(ColSpec {
            objective,
            lower,
            upper,
            integer,
            factors,
        });
        self.cols.len() - 1
    }

    pub fn nb_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn nb_cols(&self) -> usize {
        self.cols.len()
    }

    /// Solve the model. With `integer` false, integer-marked columns are
    /// relaxed to their continuous bounds. Duals are extracted only for
    /// relaxed solves.
    pub fn solve(&self, integer: bool, time_limit: Option<f64>) -> TrpResult<LpOutcome> {
        let mut problem = ColProblem::default();
        let rows: Vec<highs::Row> = self
            .rows
            .iter()
            .map(|r| problem.add_row(r.lower..=r.upper))
            .collect();
        for col in &self.cols {
            let factors: Vec<(highs::Row, f64)> =
                col.factors.iter().map(|&(r, f)| (rows[r], f)).collect();
            if integer && col.integer {
                problem.add_integer_column(col.objective, col.lower..=col.upper, factors);
            } else {
                problem.add_column(col.objective, col.lower..=col.upper, factors);
            }
        }

        let sense = match self.sense {
            Objective::Minimise => Sense::Minimise,
            Objective::Maximise => Sense::Maximise,
        };
        let mut model = problem.optimise(sense);
        model.set_option("output_flag", false);
        if let Some(limit) = time_limit {
            model.set_option("time_limit", limit);
        }

        let solved = model.solve();
        let status = match solved.status() {
            HighsModelStatus::Optimal => LpStatus::Optimal,
            HighsModelStatus::Infeasible => LpStatus::Infeasible,
            HighsModelStatus::ReachedTimeLimit => LpStatus::TimeLimit,
            other => LpStatus::Other(format!("{other:?}")),
        };

        if matches!(status, LpStatus::Infeasible | LpStatus::Other(_)) {
            return Ok(LpOutcome {
                status,
                primal: Vec::new(),
                row_duals: Vec::new(),
                objective: 0.0,
            });
        }

        let solution = solved.get_solution();
        let primal: Vec<f64> = solution.columns().to_vec();
        let row_duals = if integer {
            Vec::new()
        } else {
            solution.dual_rows().to_vec()
        };
        let objective = self
            .cols
            .iter()
            .zip(&primal)
            .map(|(c, &x)| c.objective * x)
            .sum();

        Ok(LpOutcome {
            status,
            primal,
            row_duals,
            objective,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_lp_with_duals() {
        // min x + 2y  s.t.  x + y >= 1, 0 <= x,y <= 1
        let mut model = LinearModel::new(Objective::Minimise);
        let row = model.add_row(1.0, f64::INFINITY);
        model.add_column(1.0, 0.0, 1.0, false, vec![(row, 1.0)]);
        model.add_column(2.0, 0.0, 1.0, false, vec![(row, 1.0)]);

        let outcome = model.solve(false, None).unwrap();
        assert_eq!(outcome.status, LpStatus::Optimal);
        assert!((outcome.primal[0] - 1.0).abs() < 1e-6);
        assert!(outcome.primal[1].abs() < 1e-6);
        assert!((outcome.objective - 1.0).abs() < 1e-6);
        // The covering row's dual equals the cheap column's cost.
        assert!((outcome.row_duals[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_model_reports_status() {
        // x >= 2 with x <= 1.
        let mut model = LinearModel::new(Objective::Minimise);
        let row = model.add_row(2.0, f64::INFINITY);
        model.add_column(1.0, 0.0, 1.0, false, vec![(row, 1.0)]);
        let outcome = model.solve(false, None).unwrap();
        assert_eq!(outcome.status, LpStatus::Infeasible);
        assert!(!outcome.is_usable());
    }

    #[test]
    fn test_mip_rounds_to_integers() {
        // max x + y  s.t.  x + y <= 1.5, binaries: only one fits.
        let mut model = LinearModel::new(Objective::Maximise);
        let row = model.add_row(f64::NEG_INFINITY, 1.5);
        model.add_column(1.0, 0.0, 1.0, true, vec![(row, 1.0)]);
        model.add_column(1.0, 0.0, 1.0, true, vec![(row, 1.0)]);

        let relaxed = model.solve(false, None).unwrap();
        assert!((relaxed.objective - 1.5).abs() < 1e-6);

        let integral = model.solve(true, None).unwrap();
        assert_eq!(integral.status, LpStatus::Optimal);
        assert!((integral.objective - 1.0).abs() < 1e-6);
        for value in &integral.primal {
            assert!(value.fract().abs() < 1e-6 || (1.0 - value.fract()).abs() < 1e-6);
        }
        assert!(integral.row_duals.is_empty());
    }
}
