pub mod branch_price;
pub mod inspect;
pub mod report;
pub mod solve;

use anyhow::{Context, Result};

use trp_core::Instance;
use trp_io::preprocess::PreprocessStats;

use crate::cli::InstanceArgs;

/// Parse and preprocess an instance from the CLI arguments.
pub fn load_instance(args: &InstanceArgs) -> Result<(Instance, PreprocessStats)> {
    let name = args
        .name
        .clone()
        .or_else(|| {
            args.instance
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "instance".to_string());
    let mut instance = trp_io::parse_instance_file(&args.instance, &name, args.interventions)
        .with_context(|| format!("reading instance {}", args.instance.display()))?;
    let stats = trp_io::preprocess_interventions(&mut instance);
    Ok((instance, stats))
}
