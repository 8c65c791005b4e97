//! # trp-io: Instance Input and Solution Output
//!
//! Importers construct a [`trp_core::Instance`] from the JSON instance
//! documents; [`preprocess`] classifies interventions against the lunch break
//! and tightens their windows; [`export`] writes the solution document.
//!
//! Parsing is two-phase: serde raw-document structs mirror the file keys,
//! then a conversion pass builds the validated, index-based instance. Parse
//! failures are fatal ([`trp_core::TrpError::InstanceMalformed`]).

pub mod export;
pub mod parser;
pub mod preprocess;

pub use parser::parse_instance_file;
pub use preprocess::preprocess_interventions;
