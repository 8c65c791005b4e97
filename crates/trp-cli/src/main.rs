use anyhow::Result;
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing_subscriber::FmtSubscriber;

mod cli;
mod commands;

use cli::{Cli, Commands};
use trp_algo::{BranchAndPriceParams, Formulation};

fn configure_threads(spec: &str) {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    configure_threads(&cli.threads);

    match &cli.command {
        Commands::Solve {
            input,
            colgen,
            greedy_init,
            out,
        } => {
            let params = colgen.to_params();
            commands::solve::handle(input, &params, *greedy_init, out.as_deref())
        }
        Commands::BranchPrice {
            input,
            colgen,
            max_depth,
            node_time_limit,
            root_time_limit,
            out,
        } => {
            let mut cg = colgen.to_params();
            cg.compute_integer_solution = true;
            cg.formulation = Formulation::Minimisation;
            let params = BranchAndPriceParams {
                cg,
                max_depth: *max_depth,
                time_limit_per_node: *node_time_limit,
                root_time_limit: *root_time_limit,
            };
            commands::branch_price::handle(input, &params, out.as_deref())
        }
        Commands::Inspect { input } => commands::inspect::handle(input),
    }
}
