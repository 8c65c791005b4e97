//! The `inspect` command: parse, preprocess and report instance statistics.

use anyhow::Result;

use trp_core::Instance;
use trp_io::preprocess::apriori_feasible_duration;

use crate::cli::InstanceArgs;
use crate::commands::load_instance;

pub fn handle(input: &InstanceArgs) -> Result<()> {
    let (instance, stats) = load_instance(input)?;
    let (feasible_minutes, feasible_count) = apriori_feasible_duration(&instance);

    println!("instance             {}", instance.name);
    println!("interventions        {}", instance.nb_interventions);
    println!("warehouses           {}", instance.nb_warehouses);
    println!("vehicles             {}", instance.nb_vehicles);
    println!("capacity labels      {}", instance.capacities_labels.join(", "));
    println!("cost per km          {}", instance.cost_per_km);
    println!("technician cost      {}", instance.technician_cost);
    println!("outsourcing M        {:.3}", instance.big_m);
    println!("ambiguous            {}", stats.ambiguous);
    println!("tightened windows    {}", stats.reductions);
    println!("a-priori feasible    {feasible_count} ({feasible_minutes} min)");
    println!(
        "time symmetry gap    {}",
        Instance::symmetry_gap(&instance.time_matrix)
    );
    println!(
        "distance symmetry    {}",
        Instance::symmetry_gap(&instance.distance_matrix)
    );
    println!(
        "triangle inequality  {}",
        if instance.respects_triangle_inequality() {
            "holds (rollback enabled)"
        } else {
            "violated (rollback disabled)"
        }
    );
    Ok(())
}
