//! # trp-algo: Branch-and-Price Engine for Technician Routing
//!
//! This crate provides the optimization core: the restricted master problem
//! wrapper, the pricing subproblem solvers, the column-generation loop and
//! the branch-and-price driver, plus the solution repair and analysis passes.
//!
//! ## Architecture
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Engine adapter | [`backend`] | The only coupling to the HiGHS LP/MIP engine |
//! | Master problem | [`master`] | Restricted master LP/IP over the route pool |
//! | Pricing | [`pulse`], [`labeling`], [`tabu`] | Elementary shortest paths with resource constraints |
//! | Strategy dispatch | [`pricing`] | Tagged pricing strategies sharing one contract |
//! | Orchestration | [`colgen`], [`branch_price`] | CG rounds and the branch-and-bound tree |
//! | Post-processing | [`repair`], [`analysis`] | Duplicate-coverage repair and KPIs |
//!
//! The pricing contract is uniform: dual values in, candidate routes out. A
//! route is added to the pool when its reduced cost clears the threshold; the
//! pool is append-only and a pool index identifies a route forever.
//!
//! ## The pulse solver
//!
//! The workhorse pricer is a depth-first ESPPRC search with three prunes:
//! feasibility (elementarity, capacities, time windows with the lunch rule),
//! a precomputed cost-to-go bound table indexed by remaining time, and a
//! rollback test that discards extensions dominated by skipping their direct
//! predecessor. See [`pulse`] for the two-phase scheme and its grouped and
//! parallel variants.

pub mod analysis;
pub mod backend;
pub mod branch_price;
pub mod clustering;
pub mod colgen;
pub mod labeling;
pub mod master;
pub mod pricing;
pub mod pulse;
pub mod repair;
pub mod tabu;

pub use branch_price::{branch_and_price, BranchAndPriceParams, BranchAndPriceResult};
pub use colgen::{column_generation, CgResult, ColGenParams};
pub use master::{
    BpNode, DualSolution, Formulation, IntegerSolution, MasterModel, MasterSolution,
};
pub use pricing::PricingStrategy;
