//! Solution output document.
//!
//! Mirrors the instance echo / KPI / routes / parameters / evolution layout
//! consumed by the downstream tooling. The parameters block is an opaque
//! JSON value so the caller can serialize whatever configuration it ran with.

use std::path::Path;

use serde::Serialize;

use trp_core::{Instance, Route, TrpResult};

/// Echo of the instance identity.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceEcho {
    pub name: String,
    pub number_interventions: usize,
    pub number_vehicles: usize,
    pub outsource_cost: f64,
    pub cost_per_km: f64,
}

impl InstanceEcho {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            number_interventions: instance.nb_interventions,
            number_vehicles: instance.nb_vehicles,
            outsource_cost: instance.big_m,
            cost_per_km: instance.cost_per_km,
        }
    }
}

/// Headline solution KPIs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SolutionKpis {
    pub objective_value: f64,
    pub number_covered_interventions: usize,
    pub number_used_vehicles: usize,
    pub total_fixed_cost: f64,
    pub total_working_time: i32,
    pub total_travel_time: i32,
    pub total_waiting_time: i32,
    pub total_kilometres_travelled: f64,
    /// Wall time in seconds.
    pub time_to_compute: u64,
}

/// One selected route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteRecord {
    pub vehicle_id: usize,
    pub sequence: Vec<usize>,
    pub sequence_ids: Vec<String>,
    pub start_times: Vec<i32>,
    pub technicians: Vec<String>,
}

impl RouteRecord {
    pub fn from_route(route: &Route, instance: &Instance) -> Self {
        Self {
            vehicle_id: route.vehicle_id,
            sequence: route.sequence.clone(),
            sequence_ids: route
                .sequence
                .iter()
                .map(|&i| instance.nodes[i].id.clone())
                .collect(),
            start_times: route.start_times(instance),
            technicians: instance.vehicles[route.vehicle_id].technicians.clone(),
        }
    }
}

/// Per-iteration trajectory of the column-generation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvolutionBlock {
    pub objective_values: Vec<f64>,
    /// Milliseconds since the start of the run, one per objective value.
    pub time_points: Vec<u64>,
    pub solution_costs: Vec<f64>,
    pub covered_interventions: Vec<f64>,
    pub integer_objective_values: Vec<f64>,
}

/// The full output document.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionDocument {
    pub instance: InstanceEcho,
    pub solution: SolutionKpis,
    pub routes: Vec<RouteRecord>,
    pub parameters: serde_json::Value,
    pub evolution: EvolutionBlock,
}

/// Write the document as pretty-printed JSON.
pub fn write_solution(path: &Path, document: &SolutionDocument) -> TrpResult<()> {
    let text = serde_json::to_string_pretty(document)
        .map_err(|e| trp_core::TrpError::Other(format!("serializing solution: {e}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_roundtrips_through_json() {
        let document = SolutionDocument {
            instance: InstanceEcho {
                name: "x".into(),
                number_interventions: 2,
                number_vehicles: 1,
                outsource_cost: 100.0,
                cost_per_km: 1.0,
            },
            solution: SolutionKpis {
                objective_value: 42.0,
                number_covered_interventions: 2,
                number_used_vehicles: 1,
                ..Default::default()
            },
            routes: vec![],
            parameters: serde_json::json!({"delta": 10}),
            evolution: EvolutionBlock::default(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_solution(&path, &document).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["solution"]["objective_value"], 42.0);
        assert_eq!(value["parameters"]["delta"], 10);
        assert_eq!(value["instance"]["name"], "x");
    }
}
