//! Instance document parser.
//!
//! The document carries four managers: `const_manager` (costs and capacity
//! labels), `loc_manager` (distance/time matrices indexed by `node_id`),
//! `step_manager` (interventions and warehouses) and `tech_manager`
//! (technicians and fixed teams). Each team becomes one vehicle whose skills
//! are pooled over its crew and whose capacities are the per-label minimum.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use trp_core::{
    can_do_intervention, compute_big_m_per_vehicle, compute_similarity_matrix, constants::*,
    Instance, Node, Technician, TrpError, TrpResult, Vehicle,
};

/// Capacity labels that are administrative counters rather than resources.
const FILTERED_LABELS: [&str; 3] = ["JOU", "MA", "AP"];

#[derive(Debug, Deserialize)]
struct RawDocument {
    const_manager: RawConstants,
    loc_manager: RawLocManager,
    step_manager: RawStepManager,
    tech_manager: RawTechManager,
}

#[derive(Debug, Deserialize)]
struct RawConstants {
    km_cost: f64,
    tech_cost: f64,
    capacities_size: usize,
    capacities_labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocManager {
    matrix: RawMatrices,
}

#[derive(Debug, Deserialize)]
struct RawMatrices {
    distance: Vec<Vec<i32>>,
    time: Vec<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
struct RawStepManager {
    interventions: Vec<RawIntervention>,
    warehouses: Vec<RawWarehouse>,
}

#[derive(Debug, Deserialize)]
struct RawIntervention {
    id: String,
    node_id: usize,
    duration: i32,
    start_window: i32,
    end_window: i32,
    /// One skill list per required technician.
    skills: Vec<Vec<String>>,
    quantities: BTreeMap<String, i32>,
    longitude: f64,
    latitude: f64,
}

#[derive(Debug, Deserialize)]
struct RawWarehouse {
    node_id: usize,
    ope_base: String,
    /// Coordinates are serialized as strings for warehouses.
    longitude: String,
    latitude: String,
}

#[derive(Debug, Deserialize)]
struct RawTechManager {
    technicians: Vec<RawTechnician>,
    teams: RawTeams,
}

#[derive(Debug, Deserialize)]
struct RawTechnician {
    id: String,
    skills: Vec<String>,
    capacities: BTreeMap<String, i32>,
    ope_base: String,
}

#[derive(Debug, Deserialize)]
struct RawTeams {
    fixed_teams: Vec<Vec<String>>,
}

/// Convert an absolute clock minute into a work-day minute with the lunch
/// break excised. Times outside working hours clamp to the day boundaries;
/// times inside the break clamp to [`MID_DAY`].
pub fn convert_to_workday_time(clock: i32) -> i32 {
    if clock < START_MORNING {
        0
    } else if clock < END_MORNING {
        clock - START_MORNING
    } else if clock < START_AFTERNOON {
        MID_DAY
    } else if clock < END_AFTERNOON {
        clock - START_MORNING - LUNCH_BREAK
    } else {
        END_DAY
    }
}

fn parse_intervention(raw: &RawIntervention, matrix_index: usize) -> Node {
    let mut required_skills: BTreeMap<String, i32> = BTreeMap::new();
    for per_tech in &raw.skills {
        for skill in per_tech {
            *required_skills.entry(skill.clone()).or_insert(0) += 1;
        }
    }
    Node::intervention(
        raw.id.clone(),
        matrix_index,
        raw.duration,
        convert_to_workday_time(raw.start_window),
        convert_to_workday_time(raw.end_window),
        false,
        raw.quantities.clone(),
        required_skills,
        (raw.longitude, raw.latitude),
    )
}

fn parse_warehouse(raw: &RawWarehouse) -> TrpResult<Node> {
    let lon: f64 = raw
        .longitude
        .parse()
        .map_err(|_| TrpError::InstanceMalformed(format!("warehouse {}: bad longitude", raw.ope_base)))?;
    let lat: f64 = raw
        .latitude
        .parse()
        .map_err(|_| TrpError::InstanceMalformed(format!("warehouse {}: bad latitude", raw.ope_base)))?;
    Ok(Node::depot(raw.ope_base.clone(), raw.node_id, (lon, lat)))
}

/// Parse an instance from a JSON file, keeping at most `intervention_cap`
/// interventions when given.
pub fn parse_instance_file(
    path: &Path,
    instance_name: &str,
    intervention_cap: Option<usize>,
) -> TrpResult<Instance> {
    let text = std::fs::read_to_string(path)?;
    let raw: RawDocument = serde_json::from_str(&text)
        .map_err(|e| TrpError::InstanceMalformed(format!("{}: {e}", path.display())))?;
    build_instance(&raw, instance_name, intervention_cap)
}

fn build_instance(
    raw: &RawDocument,
    instance_name: &str,
    intervention_cap: Option<usize>,
) -> TrpResult<Instance> {
    let cost_per_km = raw.const_manager.km_cost;
    let technician_cost = raw.const_manager.tech_cost;
    let mut capacities_labels = raw.const_manager.capacities_labels.clone();
    capacities_labels.retain(|label| !FILTERED_LABELS.contains(&label.as_str()));
    debug!(
        declared = raw.const_manager.capacities_size,
        kept = capacities_labels.len(),
        "capacity labels"
    );

    // Interventions first, then warehouses; node positions index the rebuilt
    // matrices while `matrix_index` keys into the raw ones.
    let nb_interventions = match intervention_cap {
        Some(cap) => cap.min(raw.step_manager.interventions.len()),
        None => raw.step_manager.interventions.len(),
    };
    let mut nodes: Vec<Node> = Vec::new();
    let mut node_index_by_id: BTreeMap<String, usize> = BTreeMap::new();
    for raw_intervention in raw.step_manager.interventions.iter().take(nb_interventions) {
        let node = parse_intervention(raw_intervention, raw_intervention.node_id);
        node_index_by_id.insert(node.id.clone(), nodes.len());
        nodes.push(node);
    }
    for raw_warehouse in &raw.step_manager.warehouses {
        let node = parse_warehouse(raw_warehouse)?;
        node_index_by_id.insert(node.id.clone(), nodes.len());
        nodes.push(node);
    }
    let nb_warehouses = raw.step_manager.warehouses.len();

    // Re-index the matrices from raw node ids to node positions.
    let n = nodes.len();
    let mut time_matrix = vec![vec![0; n]; n];
    let mut distance_matrix = vec![vec![0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let (a, b) = (nodes[i].matrix_index, nodes[j].matrix_index);
            let row_t = raw.loc_manager.matrix.time.get(a).ok_or_else(|| {
                TrpError::InstanceMalformed(format!("time matrix has no row {a}"))
            })?;
            let row_d = raw.loc_manager.matrix.distance.get(a).ok_or_else(|| {
                TrpError::InstanceMalformed(format!("distance matrix has no row {a}"))
            })?;
            time_matrix[i][j] = *row_t.get(b).ok_or_else(|| {
                TrpError::InstanceMalformed(format!("time matrix has no entry ({a}, {b})"))
            })?;
            distance_matrix[i][j] = *row_d.get(b).ok_or_else(|| {
                TrpError::InstanceMalformed(format!("distance matrix has no entry ({a}, {b})"))
            })?;
        }
    }

    // Technicians, keyed by id for team assembly.
    let mut technicians: BTreeMap<String, Technician> = BTreeMap::new();
    for raw_tech in &raw.tech_manager.technicians {
        technicians.insert(
            raw_tech.id.clone(),
            Technician {
                id: raw_tech.id.clone(),
                operational_base: raw_tech.ope_base.clone(),
                skills: raw_tech.skills.iter().cloned().collect(),
                capacities: raw_tech.capacities.clone(),
            },
        );
    }

    // Teams: the fixed ones, then a singleton team per unassigned technician.
    let mut teams: Vec<Vec<String>> = raw.tech_manager.teams.fixed_teams.clone();
    let assigned: BTreeSet<&String> = teams.iter().flatten().collect();
    let singles: Vec<Vec<String>> = technicians
        .keys()
        .filter(|id| !assigned.contains(id))
        .map(|id| vec![id.clone()])
        .collect();
    teams.extend(singles);

    let mut vehicles: Vec<Vehicle> = Vec::new();
    for (team_index, team_ids) in teams.iter().enumerate() {
        if team_ids.is_empty() {
            continue;
        }
        for id in team_ids {
            if !technicians.contains_key(id) {
                return Err(TrpError::InstanceMalformed(format!(
                    "team {team_index} references unknown technician {id}"
                )));
            }
        }
        let mut skills: BTreeMap<String, i32> = BTreeMap::new();
        for id in team_ids {
            for skill in &technicians[id].skills {
                *skills.entry(skill.clone()).or_insert(0) += 1;
            }
        }
        let bases: Vec<&str> = team_ids
            .iter()
            .map(|id| technicians[id].operational_base.as_str())
            .collect();
        let distinct: BTreeSet<&str> = bases.iter().copied().collect();
        if distinct.len() != 1 {
            warn!(team = team_index, ?bases, "team technicians have different bases");
        }
        // First base that resolves to a known warehouse node.
        let depot = bases
            .iter()
            .find_map(|base| node_index_by_id.get(*base).copied())
            .ok_or_else(|| {
                TrpError::InstanceMalformed(format!(
                    "team {team_index} has no operational base among the warehouses"
                ))
            })?;

        let mut capacities: BTreeMap<String, i32> = BTreeMap::new();
        for label in &capacities_labels {
            let min_capacity = team_ids
                .iter()
                .map(|id| technicians[id].capacities.get(label).copied().unwrap_or(0))
                .min()
                .unwrap_or(0);
            capacities.insert(label.clone(), min_capacity);
        }

        vehicles.push(Vehicle {
            id: vehicles.len(),
            technicians: team_ids.clone(),
            skills,
            interventions: Vec::new(),
            reverse_interventions: BTreeMap::new(),
            depot,
            capacities,
            cost: technician_cost * team_ids.len() as f64,
        });
    }

    // Eligibility: enough technicians of every required skill.
    for vehicle in &mut vehicles {
        for (i, node) in nodes[..nb_interventions].iter().enumerate() {
            if can_do_intervention(node, vehicle) {
                vehicle.reverse_interventions.insert(i, vehicle.interventions.len());
                vehicle.interventions.push(i);
            }
        }
    }

    let similarity_matrix = compute_similarity_matrix(&vehicles);
    let mut instance = Instance {
        name: instance_name.to_string(),
        nb_interventions,
        nb_warehouses,
        nb_vehicles: vehicles.len(),
        cost_per_km,
        technician_cost,
        big_m: 0.0,
        nodes,
        vehicles,
        capacities_labels,
        time_matrix,
        distance_matrix,
        similarity_matrix,
    };
    instance.big_m = compute_big_m_per_vehicle(&instance);

    info!(
        interventions = instance.nb_interventions,
        warehouses = instance.nb_warehouses,
        vehicles = instance.nb_vehicles,
        big_m = instance.big_m,
        "parsed instance"
    );
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> serde_json::Value {
        serde_json::json!({
            "const_manager": {
                "km_cost": 0.5,
                "tech_cost": 100.0,
                "capacities_size": 3,
                "capacities_labels": ["K1", "JOU", "K2"]
            },
            "loc_manager": {
                "matrix": {
                    "distance": [
                        [0, 1000, 2000],
                        [1000, 0, 1500],
                        [2000, 1500, 0]
                    ],
                    "time": [
                        [0, 10, 20],
                        [10, 0, 15],
                        [20, 15, 0]
                    ]
                }
            },
            "step_manager": {
                "interventions": [
                    {
                        "id": "int-1",
                        "node_id": 0,
                        "duration": 60,
                        "start_window": 470,
                        "end_window": 1010,
                        "skills": [["elec"]],
                        "quantities": {"K1": 1, "K2": 0, "JOU": 1},
                        "longitude": 3.1,
                        "latitude": 50.2
                    },
                    {
                        "id": "int-2",
                        "node_id": 1,
                        "duration": 30,
                        "start_window": 500,
                        "end_window": 700,
                        "skills": [["elec"], ["gas"]],
                        "quantities": {"K1": 0, "K2": 2, "JOU": 1},
                        "longitude": 3.2,
                        "latitude": 50.3
                    }
                ],
                "warehouses": [
                    {
                        "node_id": 2,
                        "ope_base": "BASE",
                        "longitude": "3.0",
                        "latitude": "50.0"
                    }
                ]
            },
            "tech_manager": {
                "technicians": [
                    {
                        "id": "t1",
                        "skills": ["elec"],
                        "capacities": {"K1": 2, "K2": 3},
                        "ope_base": "BASE"
                    },
                    {
                        "id": "t2",
                        "skills": ["elec", "gas"],
                        "capacities": {"K1": 1, "K2": 4},
                        "ope_base": "BASE"
                    }
                ],
                "teams": {
                    "fixed_teams": [["t1", "t2"]]
                }
            }
        })
    }

    fn parse_sample() -> Instance {
        let raw: RawDocument = serde_json::from_value(sample_document()).unwrap();
        build_instance(&raw, "sample", None).unwrap()
    }

    #[test]
    fn test_workday_time_conversion() {
        assert_eq!(convert_to_workday_time(0), 0);
        assert_eq!(convert_to_workday_time(START_MORNING), 0);
        assert_eq!(convert_to_workday_time(START_MORNING + 30), 30);
        // Inside the lunch break, clamp to MID_DAY.
        assert_eq!(convert_to_workday_time(END_MORNING + 10), MID_DAY);
        assert_eq!(convert_to_workday_time(START_AFTERNOON), MID_DAY);
        assert_eq!(convert_to_workday_time(START_AFTERNOON + 10), MID_DAY + 10);
        assert_eq!(convert_to_workday_time(END_AFTERNOON + 50), END_DAY);
    }

    #[test]
    fn test_capacity_labels_filtered() {
        let instance = parse_sample();
        assert_eq!(instance.capacities_labels, vec!["K1", "K2"]);
    }

    #[test]
    fn test_team_becomes_vehicle_with_pooled_skills() {
        let instance = parse_sample();
        assert_eq!(instance.nb_vehicles, 1);
        let vehicle = &instance.vehicles[0];
        assert_eq!(vehicle.technicians, vec!["t1", "t2"]);
        assert_eq!(vehicle.skills["elec"], 2);
        assert_eq!(vehicle.skills["gas"], 1);
        // Capacities are per-label minima over the crew.
        assert_eq!(vehicle.capacities["K1"], 1);
        assert_eq!(vehicle.capacities["K2"], 3);
        assert!((vehicle.cost - 200.0).abs() < 1e-9);
        assert_eq!(vehicle.depot, 2);
    }

    #[test]
    fn test_eligibility_requires_skill_counts() {
        let instance = parse_sample();
        // int-1 needs one elec, int-2 needs one elec and one gas; the team
        // covers both.
        assert_eq!(instance.vehicles[0].interventions, vec![0, 1]);
    }

    #[test]
    fn test_windows_converted_and_matrices_reindexed() {
        let instance = parse_sample();
        assert_eq!(instance.nodes[0].start_window, 0);
        assert_eq!(instance.nodes[0].end_window, END_DAY);
        assert_eq!(instance.nodes[1].start_window, 30);
        assert_eq!(instance.travel_time(2, 0), 20);
        assert_eq!(instance.distance(0, 1), 1000);
    }

    #[test]
    fn test_intervention_cap() {
        let raw: RawDocument = serde_json::from_value(sample_document()).unwrap();
        let instance = build_instance(&raw, "sample", Some(1)).unwrap();
        assert_eq!(instance.nb_interventions, 1);
        assert_eq!(instance.nb_nodes(), 2);
        assert_eq!(instance.vehicles[0].depot, 1);
    }

    #[test]
    fn test_missing_keys_are_fatal() {
        let mut doc = sample_document();
        doc.as_object_mut().unwrap().remove("tech_manager");
        let parsed: Result<RawDocument, _> = serde_json::from_value(doc);
        assert!(parsed.is_err());
    }
}
