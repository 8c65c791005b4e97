//! # trp-core: Technician Routing Instance Model
//!
//! Provides the fundamental data structures for the technician routing
//! problem: interventions and depots, technician teams (vehicles), the
//! immutable [`Instance`] they live in, and the [`Route`] objects produced by
//! the pricing and master layers.
//!
//! ## Design Philosophy
//!
//! - The [`Instance`] is created once (parse + preprocessing) and then shared
//!   by reference; nothing in the solver mutates it.
//! - Routes refer to the instance by node index only; the route pool owns its
//!   entries and an index into the pool identifies a route forever.
//! - Times are integer *work-day minutes* with the lunch break excised (see
//!   [`constants`]); distances are integer metres; money is `f64`.
//! - Ordered maps (`BTreeMap`/`BTreeSet`) are used wherever iteration order
//!   leaks into solver behaviour, so independent runs produce identical
//!   results.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub mod constants;
pub mod error;
pub mod route;
pub mod schedule;

pub use constants::*;
pub use error::{TrpError, TrpResult};
pub use route::Route;

/// Kind of a node in the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Intervention,
    Depot,
}

/// A node of the problem: either an intervention to perform or a warehouse
/// acting as a vehicle depot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable string identifier from the instance document.
    pub id: String,
    /// Index of the node in the raw time and distance matrices.
    pub matrix_index: usize,
    pub kind: NodeKind,
    /// Service duration in work-day minutes (0 for depots).
    pub duration: i32,
    /// Earliest service start, work-day minutes.
    pub start_window: i32,
    /// Latest service *end*, work-day minutes.
    pub end_window: i32,
    /// Can the intervention be scheduled in either half of the day?
    /// Set during preprocessing; the lunch-break waiting rule only applies to
    /// ambiguous interventions.
    pub is_ambiguous: bool,
    /// Resource consumption per capacity label.
    pub quantities: BTreeMap<String, i32>,
    /// Number of technicians required per skill (empty for depots).
    pub required_skills: BTreeMap<String, i32>,
    /// Longitude / latitude.
    pub position: (f64, f64),
}

impl Node {
    /// Build an intervention node.
    #[allow(clippy::too_many_arguments)]
    pub fn intervention(
        id: String,
        matrix_index: usize,
        duration: i32,
        start_window: i32,
        end_window: i32,
        is_ambiguous: bool,
        quantities: BTreeMap<String, i32>,
        required_skills: BTreeMap<String, i32>,
        position: (f64, f64),
    ) -> Self {
        Self {
            id,
            matrix_index,
            kind: NodeKind::Intervention,
            duration,
            start_window,
            end_window,
            is_ambiguous,
            quantities,
            required_skills,
            position,
        }
    }

    /// Build a depot node. Depots are serviceable all day and consume nothing.
    pub fn depot(id: String, matrix_index: usize, position: (f64, f64)) -> Self {
        Self {
            id,
            matrix_index,
            kind: NodeKind::Depot,
            duration: 0,
            start_window: 0,
            end_window: END_DAY,
            is_ambiguous: false,
            quantities: BTreeMap::new(),
            required_skills: BTreeMap::new(),
            position,
        }
    }

    #[inline]
    pub fn is_intervention(&self) -> bool {
        self.kind == NodeKind::Intervention
    }
}

/// A single technician, before team aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technician {
    pub id: String,
    pub operational_base: String,
    pub skills: BTreeSet<String>,
    pub capacities: BTreeMap<String, i32>,
}

/// A vehicle: one technician team with pooled skills, a shared depot and
/// per-resource capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: usize,
    /// Ids of the technicians crewing this vehicle.
    pub technicians: Vec<String>,
    /// Number of crew members holding each skill.
    pub skills: BTreeMap<String, i32>,
    /// Node indices of the interventions this vehicle is allowed to perform.
    pub interventions: Vec<usize>,
    /// Reverse lookup: node index -> position in `interventions`.
    pub reverse_interventions: BTreeMap<usize, usize>,
    /// Node index of the home depot.
    pub depot: usize,
    pub capacities: BTreeMap<String, i32>,
    /// Fixed activation cost.
    pub cost: f64,
}

/// Restriction mode for [`vehicle_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    /// Keep the interventions whose mask entry is 0.
    KeepUncovered,
    /// Keep the interventions whose mask entry is 1.
    KeepCovered,
}

/// Derive a restricted copy of a vehicle keeping only the interventions
/// selected by `mask` under the given mode. Used by the diversified pricing
/// strategies to re-price over the still-uncovered work.
pub fn vehicle_mask(vehicle: &Vehicle, mask: &[u8], mode: MaskMode) -> Vehicle {
    let wanted = match mode {
        MaskMode::KeepUncovered => 0,
        MaskMode::KeepCovered => 1,
    };
    let mut interventions = Vec::new();
    let mut reverse = BTreeMap::new();
    for &i in &vehicle.interventions {
        if mask[i] == wanted {
            reverse.insert(i, interventions.len());
            interventions.push(i);
        }
    }
    Vehicle {
        id: vehicle.id,
        technicians: vehicle.technicians.clone(),
        skills: vehicle.skills.clone(),
        interventions,
        reverse_interventions: reverse,
        depot: vehicle.depot,
        capacities: vehicle.capacities.clone(),
        cost: vehicle.cost,
    }
}

/// Does the vehicle's crew carry enough technicians of each required skill?
pub fn can_do_intervention(intervention: &Node, vehicle: &Vehicle) -> bool {
    intervention
        .required_skills
        .iter()
        .all(|(skill, required)| vehicle.skills.get(skill).is_some_and(|have| have >= required))
}

/// An immutable problem instance, shared by reference across the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub nb_interventions: usize,
    pub nb_warehouses: usize,
    pub nb_vehicles: usize,
    /// Routing cost per kilometre.
    pub cost_per_km: f64,
    /// Fixed cost per technician; a vehicle costs `technician_cost * crew`.
    pub technician_cost: f64,
    /// Outsourcing coefficient: leaving an intervention uncovered costs
    /// `big_m * duration` in the minimisation objective.
    pub big_m: f64,
    /// Interventions first (`0..nb_interventions`), then warehouses.
    pub nodes: Vec<Node>,
    pub vehicles: Vec<Vehicle>,
    pub capacities_labels: Vec<String>,
    /// Travel time in minutes between nodes, indexed by node position.
    pub time_matrix: Vec<Vec<i32>>,
    /// Distance in metres between nodes, indexed by node position.
    pub distance_matrix: Vec<Vec<i32>>,
    /// Hamming distance between vehicle eligible sets (lower = more similar).
    pub similarity_matrix: Vec<Vec<i32>>,
}

impl Instance {
    #[inline]
    pub fn nb_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn travel_time(&self, from: usize, to: usize) -> i32 {
        self.time_matrix[from][to]
    }

    #[inline]
    pub fn distance(&self, from: usize, to: usize) -> i32 {
        self.distance_matrix[from][to]
    }

    /// Can intervention `j` follow intervention `i` in any schedule?
    /// Departing from `i` at its earliest completion must still allow `j` to
    /// finish within its window.
    pub fn is_edge_feasible(&self, i: usize, j: usize) -> bool {
        let ni = &self.nodes[i];
        let nj = &self.nodes[j];
        let arrival = ni.start_window + ni.duration + self.travel_time(i, j);
        arrival + nj.duration <= nj.end_window
    }

    /// Largest asymmetry `|m[i][j] - m[j][i]|` in the given square matrix.
    pub fn symmetry_gap(matrix: &[Vec<i32>]) -> i32 {
        let mut gap = 0;
        for (i, row) in matrix.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                gap = gap.max((value - matrix[j][i]).abs());
            }
        }
        gap
    }

    /// Check the (time + service) triangle inequality over the interventions.
    ///
    /// The pulse rollback pruning rule is only sound when
    /// `t(i,j) <= t(i,k) + d(k) + t(k,j)` holds; callers disable rollback
    /// when this returns false.
    pub fn respects_triangle_inequality(&self) -> bool {
        let n = self.nb_interventions;
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    if self.distance_matrix[i][j]
                        > self.distance_matrix[i][k] + self.distance_matrix[k][j]
                    {
                        return false;
                    }
                    if self.time_matrix[i][j]
                        > self.time_matrix[i][k] + self.nodes[k].duration + self.time_matrix[k][j]
                    {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Statistics shared by the two big-M formulas: minimum positive duration,
/// gcd of the durations and the maximum observed speed in the matrices.
fn big_m_ingredients(instance: &Instance) -> Option<(i32, i32, f64)> {
    let durations: Vec<i32> = instance.nodes[..instance.nb_interventions]
        .iter()
        .map(|n| n.duration)
        .filter(|&d| d > 0)
        .collect();
    let min_duration = *durations.iter().min()?;
    let gcd_durations = durations.iter().copied().fold(0, gcd);

    let mut max_speed: f64 = 0.0;
    for i in 0..instance.nb_nodes() {
        for j in 0..instance.nb_nodes() {
            let t = instance.time_matrix[i][j];
            if t > 0 {
                max_speed = max_speed.max(instance.distance_matrix[i][j] as f64 / t as f64);
            }
        }
    }
    Some((min_duration, gcd_durations, max_speed))
}

/// Naive outsourcing coefficient: the most expensive single work day.
pub fn compute_big_m_naive(instance: &Instance) -> f64 {
    let Some((min_duration, gcd_durations, max_speed)) = big_m_ingredients(instance) else {
        return 0.0;
    };
    (END_DAY - min_duration) as f64 * max_speed * instance.cost_per_km / gcd_durations as f64
}

/// Per-vehicle outsourcing coefficient: an upper bound on the value of one
/// minute of intervention work, so that outsourcing is strictly worse than
/// any routable completion. Uses the full fleet's driving capacity plus the
/// sum-minus-min of the vehicle fixed costs.
pub fn compute_big_m_per_vehicle(instance: &Instance) -> f64 {
    let Some((min_duration, gcd_durations, max_speed)) = big_m_ingredients(instance) else {
        return 0.0;
    };
    let mut min_fixed: f64 = 0.0;
    let mut sum_fixed: f64 = 0.0;
    for vehicle in &instance.vehicles {
        min_fixed = min_fixed.min(vehicle.cost);
        sum_fixed += vehicle.cost;
    }
    let max_fixed_except_one = sum_fixed - min_fixed;
    (instance.nb_vehicles as f64
        * (END_DAY - min_duration) as f64
        * max_speed
        * instance.cost_per_km
        + max_fixed_except_one)
        / gcd_durations as f64
}

/// Hamming distance between the eligible sets of two vehicles: each
/// intervention doable by exactly one of them contributes 1.
pub fn hamming_distance(a: &Vehicle, b: &Vehicle) -> i32 {
    let mut counts: BTreeMap<usize, i32> = BTreeMap::new();
    for &i in a.interventions.iter().chain(b.interventions.iter()) {
        *counts.entry(i).or_insert(0) += 1;
    }
    counts.values().filter(|&&c| c == 1).count() as i32
}

/// Pairwise Hamming similarity matrix over the fleet.
pub fn compute_similarity_matrix(vehicles: &[Vehicle]) -> Vec<Vec<i32>> {
    let n = vehicles.len();
    let mut matrix = vec![vec![0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = hamming_distance(&vehicles[i], &vehicles[j]);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }
    matrix
}

/// Restrict an instance to the interventions with `mask[i] == 1`, re-indexing
/// nodes and matrices and dropping vehicles left without eligible work.
pub fn cut_instance(instance: &Instance, mask: &[u8]) -> Instance {
    let mut nodes = Vec::new();
    let mut old_to_new: BTreeMap<usize, usize> = BTreeMap::new();
    let mut new_to_old: Vec<usize> = Vec::new();

    for i in 0..instance.nb_interventions {
        if mask[i] == 1 {
            old_to_new.insert(i, nodes.len());
            new_to_old.push(i);
            nodes.push(instance.nodes[i].clone());
        }
    }
    let nb_kept = nodes.len();
    for i in instance.nb_interventions..instance.nb_nodes() {
        old_to_new.insert(i, nodes.len());
        new_to_old.push(i);
        nodes.push(instance.nodes[i].clone());
    }

    let mut vehicles = Vec::new();
    for vehicle in &instance.vehicles {
        let mut interventions = Vec::new();
        let mut reverse = BTreeMap::new();
        for &i in &vehicle.interventions {
            if mask[i] == 1 {
                let new_i = old_to_new[&i];
                reverse.insert(new_i, interventions.len());
                interventions.push(new_i);
            }
        }
        if interventions.is_empty() {
            continue;
        }
        vehicles.push(Vehicle {
            id: vehicles.len(),
            technicians: vehicle.technicians.clone(),
            skills: vehicle.skills.clone(),
            interventions,
            reverse_interventions: reverse,
            depot: old_to_new[&vehicle.depot],
            capacities: vehicle.capacities.clone(),
            cost: vehicle.cost,
        });
    }

    let n = nodes.len();
    let mut time_matrix = vec![vec![0; n]; n];
    let mut distance_matrix = vec![vec![0; n]; n];
    for i in 0..n {
        for j in 0..n {
            time_matrix[i][j] = instance.time_matrix[new_to_old[i]][new_to_old[j]];
            distance_matrix[i][j] = instance.distance_matrix[new_to_old[i]][new_to_old[j]];
        }
    }

    let similarity_matrix = compute_similarity_matrix(&vehicles);
    Instance {
        name: instance.name.clone(),
        nb_interventions: nb_kept,
        nb_warehouses: instance.nb_warehouses,
        nb_vehicles: vehicles.len(),
        cost_per_km: instance.cost_per_km,
        technician_cost: instance.technician_cost,
        big_m: instance.big_m,
        nodes,
        vehicles,
        capacities_labels: instance.capacities_labels.clone(),
        time_matrix,
        distance_matrix,
        similarity_matrix,
    }
}

pub mod test_fixtures {
    //! Small hand-built instances shared by the test suites of the solver
    //! crates.

    use super::*;

    /// One depot, `n` interventions, one vehicle eligible for everything.
    ///
    /// Distances default to `dist` metres between any two distinct nodes and
    /// travel times to `time` minutes; windows are the whole day.
    pub fn single_vehicle_instance(n: usize, dist: i32, time: i32, duration: i32) -> Instance {
        let mut nodes = Vec::new();
        for i in 0..n {
            nodes.push(Node::intervention(
                format!("I{i}"),
                i,
                duration,
                0,
                END_DAY,
                false,
                BTreeMap::new(),
                BTreeMap::new(),
                (0.0, 0.0),
            ));
        }
        nodes.push(Node::depot("D".into(), n, (0.0, 0.0)));

        let total = n + 1;
        let mut time_matrix = vec![vec![0; total]; total];
        let mut distance_matrix = vec![vec![0; total]; total];
        for i in 0..total {
            for j in 0..total {
                if i != j {
                    time_matrix[i][j] = time;
                    distance_matrix[i][j] = dist;
                }
            }
        }

        let vehicle = Vehicle {
            id: 0,
            technicians: vec!["T1".into()],
            skills: BTreeMap::new(),
            interventions: (0..n).collect(),
            reverse_interventions: (0..n).map(|i| (i, i)).collect(),
            depot: n,
            capacities: BTreeMap::new(),
            cost: 0.0,
        };

        let mut instance = Instance {
            name: "fixture".into(),
            nb_interventions: n,
            nb_warehouses: 1,
            nb_vehicles: 1,
            cost_per_km: 1.0,
            technician_cost: 0.0,
            big_m: 0.0,
            nodes,
            vehicles: vec![vehicle],
            capacities_labels: vec![],
            time_matrix,
            distance_matrix,
            similarity_matrix: vec![vec![0]],
        };
        instance.big_m = compute_big_m_per_vehicle(&instance);
        instance
    }
}
