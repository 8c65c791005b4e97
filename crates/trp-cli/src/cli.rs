//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use trp_algo::PricingStrategy;

#[derive(Parser, Debug)]
#[command(author, version, about = "Technician routing via branch-and-price", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Worker threads for the pricing fan-out ("auto" = all cores)
    #[arg(long, default_value = "auto")]
    pub threads: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve an instance with column generation at the root node
    Solve {
        #[command(flatten)]
        input: InstanceArgs,
        #[command(flatten)]
        colgen: ColGenArgs,
        /// Seed the route pool with a greedy heuristic cover
        #[arg(long)]
        greedy_init: bool,
        /// Write the solution document to this path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Explore the branch-and-price tree
    BranchPrice {
        #[command(flatten)]
        input: InstanceArgs,
        #[command(flatten)]
        colgen: ColGenArgs,
        /// Maximum tree depth
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
        /// Column-generation budget per non-root node, seconds
        #[arg(long, default_value_t = 60.0)]
        node_time_limit: f64,
        /// Column-generation budget for the root node, seconds
        #[arg(long, default_value_t = 600.0)]
        root_time_limit: f64,
        /// Write the solution document to this path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Parse, preprocess and report instance statistics
    Inspect {
        #[command(flatten)]
        input: InstanceArgs,
    },
}

#[derive(Args, Debug)]
pub struct InstanceArgs {
    /// Instance JSON file
    pub instance: PathBuf,

    /// Instance name used in reports (defaults to the file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// Keep only the first N interventions
    #[arg(long)]
    pub interventions: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ColGenArgs {
    /// Cumulative master+pricing budget, seconds
    #[arg(long, default_value_t = 60.0)]
    pub time_limit: f64,

    /// Pricing strategy (labeling, pulse, grouped_pulse, parallel_pulse,
    /// grouped_parallel_pulse, diversification, clustering, tabu)
    #[arg(long, default_value = "pulse")]
    pub pricing: PricingStrategy,

    /// Bound-table time step of the pulse pricers, minutes
    #[arg(long, default_value_t = 10)]
    pub delta: i32,

    /// Solution pool capacity of the pulse pricers
    #[arg(long, default_value_t = 1000)]
    pub pool_size: usize,

    #[arg(long, default_value_t = 1000)]
    pub max_iterations: usize,

    /// Stop after this many rounds without objective improvement
    #[arg(long, default_value_t = 5)]
    pub max_non_improvement: usize,

    /// Reduced-cost acceptance threshold
    #[arg(long, default_value_t = 1e-6)]
    pub reduced_cost_threshold: f64,

    /// Smooth duals against the previous round with this convex weight
    #[arg(long)]
    pub stabilisation: Option<f64>,

    /// Skip the final MIP over the accumulated pool
    #[arg(long)]
    pub no_integer: bool,

    /// Wall-clock limit for the final MIP, seconds
    #[arg(long)]
    pub mip_time_limit: Option<f64>,
}

impl ColGenArgs {
    pub fn to_params(&self) -> trp_algo::ColGenParams {
        trp_algo::ColGenParams {
            time_limit: self.time_limit,
            reduced_cost_threshold: self.reduced_cost_threshold,
            max_iterations: self.max_iterations,
            max_consecutive_non_improvement: self.max_non_improvement,
            compute_integer_solution: !self.no_integer,
            mip_time_limit: self.mip_time_limit,
            use_stabilisation: self.stabilisation.is_some(),
            stabilisation_alpha: self.stabilisation.unwrap_or(0.5),
            pricing: self.pricing,
            delta: self.delta,
            pool_size: self.pool_size,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_solve_args_parse() {
        let cli = Cli::parse_from([
            "trp",
            "solve",
            "instance.json",
            "--interventions",
            "25",
            "--pricing",
            "grouped_pulse",
            "--stabilisation",
            "0.7",
        ]);
        let Commands::Solve { input, colgen, .. } = cli.command else {
            panic!("expected solve command");
        };
        assert_eq!(input.interventions, Some(25));
        let params = colgen.to_params();
        assert!(params.use_stabilisation);
        assert!((params.stabilisation_alpha - 0.7).abs() < 1e-9);
        assert_eq!(params.pricing, PricingStrategy::PulseGrouped);
    }
}
