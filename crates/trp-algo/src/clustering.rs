//! Vehicle grouping for the pricing strategies.
//!
//! Two groupings are used: depot groups (for the amortised grouped pulse)
//! and a similarity 2-partition over the Hamming matrix (for clustered
//! diversification). Both are deterministic so independent runs price in
//! the same order.

use std::collections::BTreeMap;

use trp_core::{Instance, Vehicle};

/// Group vehicle indices by their depot node.
pub fn regroup_vehicles_by_depot(vehicles: &[Vehicle]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for vehicle in vehicles {
        groups.entry(vehicle.depot).or_default().push(vehicle.id);
    }
    groups
}

/// Total intra-cluster dissimilarity of a partition.
pub fn clustering_cost(clusters: &[Vec<usize>], similarity: &[Vec<i32>]) -> i32 {
    let mut cost = 0;
    for cluster in clusters {
        for (a, &i) in cluster.iter().enumerate() {
            for &j in &cluster[a + 1..] {
                cost += similarity[i][j];
            }
        }
    }
    cost
}

/// Split the fleet into two clusters of similar vehicles.
///
/// Greedy seeding: the most dissimilar pair anchors the two clusters, then
/// each remaining vehicle (ascending id) joins the cluster it is closer to.
/// A bounded sweep of single-vehicle moves then improves the partition.
/// Everything is index-ordered, so the result is deterministic.
pub fn two_partition(similarity: &[Vec<i32>]) -> Vec<Vec<usize>> {
    let n = similarity.len();
    if n <= 2 {
        return vec![(0..n).collect()];
    }

    let (mut seed_a, mut seed_b, mut worst) = (0, 1, i32::MIN);
    for i in 0..n {
        for j in (i + 1)..n {
            if similarity[i][j] > worst {
                worst = similarity[i][j];
                seed_a = i;
                seed_b = j;
            }
        }
    }

    let mut clusters = vec![vec![seed_a], vec![seed_b]];
    for v in 0..n {
        if v == seed_a || v == seed_b {
            continue;
        }
        let attach_cost = |cluster: &[usize]| -> i32 {
            cluster.iter().map(|&u| similarity[v][u]).sum()
        };
        let side = usize::from(attach_cost(&clusters[1]) < attach_cost(&clusters[0]));
        clusters[side].push(v);
    }

    // Improvement sweeps: move one vehicle across when it lowers the cost.
    for _ in 0..3 {
        let mut moved = false;
        for v in 0..n {
            let side = usize::from(clusters[1].contains(&v));
            if clusters[side].len() <= 1 {
                continue;
            }
            let here: i32 = clusters[side]
                .iter()
                .filter(|&&u| u != v)
                .map(|&u| similarity[v][u])
                .sum();
            let there: i32 = clusters[1 - side].iter().map(|&u| similarity[v][u]).sum();
            if there < here {
                clusters[side].retain(|&u| u != v);
                clusters[1 - side].push(v);
                clusters[1 - side].sort_unstable();
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
    clusters[0].sort_unstable();
    clusters[1].sort_unstable();
    clusters
}

/// Convenience wrapper over the instance's similarity matrix.
pub fn partition_fleet(instance: &Instance) -> Vec<Vec<usize>> {
    two_partition(&instance.similarity_matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn vehicle(id: usize, depot: usize, interventions: Vec<usize>) -> Vehicle {
        Vehicle {
            id,
            technicians: vec![],
            skills: BTreeMap::new(),
            reverse_interventions: interventions
                .iter()
                .enumerate()
                .map(|(k, &i)| (i, k))
                .collect(),
            interventions,
            depot,
            capacities: BTreeMap::new(),
            cost: 0.0,
        }
    }

    #[test]
    fn test_depot_grouping() {
        let vehicles = vec![
            vehicle(0, 10, vec![]),
            vehicle(1, 11, vec![]),
            vehicle(2, 10, vec![]),
        ];
        let groups = regroup_vehicles_by_depot(&vehicles);
        assert_eq!(groups[&10], vec![0, 2]);
        assert_eq!(groups[&11], vec![1]);
    }

    #[test]
    fn test_two_partition_separates_dissimilar_blocks() {
        // Vehicles 0/1 share work, 2/3 share work, the blocks are disjoint.
        let vehicles = vec![
            vehicle(0, 0, vec![0, 1]),
            vehicle(1, 0, vec![0, 1, 2]),
            vehicle(2, 0, vec![7, 8]),
            vehicle(3, 0, vec![7, 8, 9]),
        ];
        let similarity = trp_core::compute_similarity_matrix(&vehicles);
        let clusters = two_partition(&similarity);
        assert_eq!(clusters.len(), 2);
        let find = |v: usize| usize::from(clusters[1].contains(&v));
        assert_eq!(find(0), find(1));
        assert_eq!(find(2), find(3));
        assert_ne!(find(0), find(2));
    }

    #[test]
    fn test_two_partition_deterministic() {
        let similarity = vec![
            vec![0, 3, 9, 2],
            vec![3, 0, 5, 7],
            vec![9, 5, 0, 1],
            vec![2, 7, 1, 0],
        ];
        assert_eq!(two_partition(&similarity), two_partition(&similarity));
    }

    #[test]
    fn test_small_fleet_stays_whole() {
        let similarity = vec![vec![0, 1], vec![1, 0]];
        let clusters = two_partition(&similarity);
        assert_eq!(clusters, vec![vec![0, 1]]);
    }
}
