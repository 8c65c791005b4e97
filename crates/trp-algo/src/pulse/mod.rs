//! The pulse algorithm: a depth-first ESPPRC solver.
//!
//! Two phases. **Phase A** (bounding) fills a table `B[v][k]` with the
//! minimum completable cost from vertex `v` when at most `(k+1)·delta`
//! minutes remain until END_DAY, by launching restricted pulses from every
//! non-terminal vertex at decreasing start times. **Phase B** launches one
//! pulse from the origin at time 0 seeded with the vehicle's fixed cost
//! minus its dual.
//!
//! The search prunes on (1) feasibility — elementarity, capacities and the
//! time-window/lunch rule, (2) the bound table against the pool's acceptance
//! threshold, and (3) the rollback rule, which discards an extension `u→w→v`
//! dominated by the direct `u→v` under triangle-like costs. The recursion is
//! run on an explicit frame stack so dense instances cannot overflow the
//! native stack; each branch owns copies of its path and capacity vector.
//!
//! The solution pool keeps the `pool_size` lowest-cost completed paths. Its
//! worst kept cost is the search cutoff once the pool is full; Phase A runs
//! with a pool of size one, which degenerates the cutoff to the incumbent
//! best, exactly the classic bound-phase prune.

pub mod grouped;
pub mod network;
pub mod parallel;

pub use network::PricingNetwork;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use trp_core::constants::END_DAY;

/// A completed origin→destination path, in pricing-local vertex indices.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub cost: f64,
    pub sequence: Vec<usize>,
}

/// Bounded pool of the lowest-cost completed paths, kept in ascending order.
#[derive(Debug)]
pub struct SolutionPool {
    capacity: usize,
    entries: Vec<PoolEntry>,
}

impl SolutionPool {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool size must be strictly positive");
        SolutionPool {
            capacity,
            entries: Vec::new(),
        }
    }

    /// Insert when the pool has room, or when the cost beats the current
    /// worst (which is then evicted).
    pub fn insert(&mut self, cost: f64, sequence: Vec<usize>) {
        if self.entries.len() == self.capacity {
            if cost >= self.cutoff() {
                return;
            }
            self.entries.pop();
        }
        let position = self
            .entries
            .partition_point(|e| e.cost <= cost);
        self.entries.insert(position, PoolEntry { cost, sequence });
    }

    /// The acceptance threshold: the worst kept cost once full.
    pub fn cutoff(&self) -> f64 {
        if self.entries.len() == self.capacity {
            self.entries.last().map(|e| e.cost).unwrap_or(f64::INFINITY)
        } else {
            f64::INFINITY
        }
    }

    pub fn best(&self) -> Option<&PoolEntry> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_entries(self) -> Vec<PoolEntry> {
        self.entries
    }
}

/// Pool plus cutoff shared across workers. Only the pool mutates behind the
/// mutex; the cutoff is mirrored into an atomic so prune checks stay
/// lock-free.
struct SharedSearch {
    pool: Mutex<SolutionPool>,
    cutoff_bits: AtomicU64,
}

impl SharedSearch {
    fn new(capacity: usize) -> Self {
        SharedSearch {
            pool: Mutex::new(SolutionPool::new(capacity)),
            cutoff_bits: AtomicU64::new(f64::INFINITY.to_bits()),
        }
    }

    #[inline]
    fn cutoff(&self) -> f64 {
        f64::from_bits(self.cutoff_bits.load(Ordering::Relaxed))
    }

    fn insert(&self, cost: f64, sequence: Vec<usize>) {
        if cost >= self.cutoff() {
            return;
        }
        let mut pool = self.pool.lock().expect("pool mutex poisoned");
        pool.insert(cost, sequence);
        self.cutoff_bits
            .store(pool.cutoff().to_bits(), Ordering::Relaxed);
    }

    fn into_sorted_entries(self) -> Vec<PoolEntry> {
        let mut entries = self
            .pool
            .into_inner()
            .expect("pool mutex poisoned")
            .into_entries();
        entries.sort_by(|a, b| {
            a.cost
                .partial_cmp(&b.cost)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        entries
    }
}

/// One pending branch of the depth-first search. Each frame owns its path
/// state, so branches never alias.
#[derive(Debug, Clone)]
struct Frame {
    vertex: usize,
    /// Wait-adjusted service start time at `vertex`.
    time: i32,
    /// Accumulated cost including `vertex`'s node cost.
    cost: f64,
    quantities: Vec<i32>,
    visited: Vec<bool>,
    sequence: Vec<usize>,
}

impl Frame {
    fn start(vertex: usize, time: i32, cost: f64, net: &PricingNetwork) -> Self {
        Frame {
            vertex,
            time,
            cost,
            quantities: vec![0; net.nb_resources()],
            visited: vec![false; net.nb_vertices()],
            sequence: Vec::new(),
        }
    }
}

/// The two-phase pulse solver over one pricing network.
pub struct PulseSolver<'a> {
    net: &'a PricingNetwork,
    delta: i32,
    pool_size: usize,
    use_rollback: bool,
    /// `bounds[v][k]`: minimum completable cost from `v` with `(k+1)·delta`
    /// minutes remaining. `-inf` until computed (never prunes), `+inf` when
    /// no path exists (always prunes).
    bounds: Vec<Vec<f64>>,
}

impl<'a> PulseSolver<'a> {
    pub fn new(net: &'a PricingNetwork, delta: i32, pool_size: usize, use_rollback: bool) -> Self {
        assert!(delta > 0, "delta must be strictly positive");
        assert!(pool_size > 0, "pool size must be strictly positive");
        PulseSolver {
            net,
            delta,
            pool_size,
            use_rollback,
            bounds: Vec::new(),
        }
    }

    fn nb_buckets(&self) -> usize {
        ((END_DAY + self.delta - 1) / self.delta) as usize
    }

    /// Phase A: fill the bound table, shallowest remaining-time bucket first
    /// so deeper buckets can prune with the already-computed ones.
    pub fn bound(&mut self) {
        let total = self.net.nb_vertices();
        let buckets = self.nb_buckets();
        self.bounds = vec![vec![f64::NEG_INFINITY; buckets]; total];

        for level in 0..buckets {
            let tau = END_DAY - (level as i32 + 1) * self.delta;
            for v in 0..total {
                if v == self.net.origin || v == self.net.destination {
                    continue;
                }
                let shared = SharedSearch::new(1);
                self.run_from(Frame::start(v, tau, 0.0, self.net), &shared, None);
                let entries = shared.into_sorted_entries();
                self.bounds[v][level] =
                    entries.first().map(|e| e.cost).unwrap_or(f64::INFINITY);
            }
        }
        for level in 0..buckets {
            self.bounds[self.net.origin][level] = f64::NEG_INFINITY;
            self.bounds[self.net.destination][level] = 0.0;
        }
    }

    /// Phase B: one pulse from the origin at time 0. `available` restricts
    /// the vertex set (grouped variant); terminals must be marked available.
    /// Returns the pool in ascending cost order; empty means no feasible
    /// completion, which callers treat as "no column", not an error.
    pub fn solve(&self, available: Option<&[bool]>, initial_cost: f64) -> Vec<PoolEntry> {
        let shared = SharedSearch::new(self.pool_size);
        self.run_from(
            Frame::start(self.net.origin, 0, initial_cost, self.net),
            &shared,
            available,
        );
        shared.into_sorted_entries()
    }

    /// Rollback prune: with path `[.., u, w]`, reaching `v` through `w` is
    /// dominated when the direct arc is no more expensive than the detour.
    fn rollback(&self, sequence: &[usize], v: usize) -> bool {
        let len = sequence.len();
        if len < 2 {
            return false;
        }
        // Never roll the direct depot-intervention-depot tour back.
        if len == 2 && sequence[0] == self.net.origin && v == self.net.destination {
            return false;
        }
        let u = sequence[len - 2];
        let w = sequence[len - 1];
        let direct = self.net.arc_cost[u][v];
        let detour = self.net.arc_cost[u][w] + self.net.node_cost[w] + self.net.arc_cost[w][v];
        direct <= detour
    }

    /// The depth-first engine shared by both phases and all variants.
    fn run_from(&self, root: Frame, shared: &SharedSearch, available: Option<&[bool]>) {
        let net = self.net;
        let resources = net.nb_resources();
        let mut stack = vec![root];

        while let Some(frame) = stack.pop() {
            let v = frame.vertex;

            // Feasibility.
            if let Some(mask) = available {
                if !mask[v] {
                    continue;
                }
            }
            if frame.visited[v] {
                continue;
            }
            if (0..resources)
                .any(|r| frame.quantities[r] + net.consumption[v][r] > net.capacities[r])
            {
                continue;
            }
            if frame.time > net.latest_start[v] {
                continue;
            }

            // Bound prune against the pool's acceptance threshold.
            let remaining = END_DAY - frame.time;
            let bucket = (remaining + self.delta - 1).div_euclid(self.delta) - 1;
            if bucket < 0 {
                continue;
            }
            if let Some(row) = self.bounds.get(v) {
                let bucket = bucket as usize;
                if bucket < row.len() && frame.cost + row[bucket] >= shared.cutoff() {
                    continue;
                }
            }

            if self.use_rollback && self.rollback(&frame.sequence, v) {
                continue;
            }

            // Extend.
            let mut frame = frame;
            for r in 0..resources {
                frame.quantities[r] += net.consumption[v][r];
            }
            frame.visited[v] = true;
            frame.sequence.push(v);

            if v == net.destination {
                shared.insert(frame.cost, frame.sequence);
                continue;
            }

            // Fan out, reversed so the stack pops neighbours in ascending
            // order (same exploration order as the recursive formulation).
            for &w in net.neighbors[v].iter().rev() {
                let time =
                    net.arrival_time(w, frame.time + net.duration[v] + net.travel_time[v][w]);
                let cost = frame.cost + net.arc_cost[v][w] + net.node_cost[w];
                stack.push(Frame {
                    vertex: w,
                    time,
                    cost,
                    quantities: frame.quantities.clone(),
                    visited: frame.visited.clone(),
                    sequence: frame.sequence.clone(),
                });
            }
        }
    }

    /// First-level child frames of a start vertex, used by the parallel
    /// variant to split the fan-out across workers.
    fn first_level(&self, initial_cost: f64) -> Vec<Frame> {
        let net = self.net;
        let origin = net.origin;
        let mut base = Frame::start(origin, 0, initial_cost, net);
        base.visited[origin] = true;
        base.sequence.push(origin);
        net.neighbors[origin]
            .iter()
            .map(|&w| {
                let time = net.arrival_time(w, net.travel_time[origin][w]);
                Frame {
                    vertex: w,
                    time,
                    cost: initial_cost + net.arc_cost[origin][w] + net.node_cost[w],
                    quantities: base.quantities.clone(),
                    visited: base.visited.clone(),
                    sequence: base.sequence.clone(),
                }
            })
            .collect()
    }

    fn run_frame(&self, frame: Frame, shared: &SharedSearch, available: Option<&[bool]>) {
        self.run_from(frame, shared, available);
    }

    fn make_shared(&self) -> SharedSearch {
        SharedSearch::new(self.pool_size)
    }

    pub fn bounds_table(&self) -> &[Vec<f64>] {
        &self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use trp_core::test_fixtures::single_vehicle_instance;
    use trp_core::Instance;

    use crate::master::DualSolution;

    fn network(instance: &Instance, duals: Option<&DualSolution>) -> PricingNetwork {
        let empty = BTreeSet::new();
        PricingNetwork::build(instance, &instance.vehicles[0], duals, &empty, &empty)
    }

    #[test]
    fn test_pool_eviction_keeps_lowest_costs() {
        let mut pool = SolutionPool::new(2);
        pool.insert(5.0, vec![1]);
        assert_eq!(pool.cutoff(), f64::INFINITY);
        pool.insert(3.0, vec![2]);
        assert!((pool.cutoff() - 5.0).abs() < 1e-9);
        // Worse than the worst: rejected.
        pool.insert(9.0, vec![3]);
        assert_eq!(pool.len(), 2);
        // Better: evicts the worst.
        pool.insert(1.0, vec![4]);
        assert_eq!(pool.len(), 2);
        assert!((pool.best().unwrap().cost - 1.0).abs() < 1e-9);
        assert!((pool.cutoff() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_solve_finds_cheapest_tour() {
        // Duals make both jobs attractive; the best tour visits both.
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let duals = DualSolution {
            alphas: vec![100.0, 100.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let net = network(&instance, Some(&duals));
        let mut solver = PulseSolver::new(&net, 10, 10, true);
        solver.bound();
        let entries = solver.solve(None, net.initial_cost);
        assert!(!entries.is_empty());
        let best = &entries[0];
        // Tour 30 cost minus 200 of duals.
        assert!((best.cost - (30.0 - 200.0)).abs() < 1e-6);
        // origin, both jobs, destination
        assert_eq!(best.sequence.len(), 4);
    }

    #[test]
    fn test_solve_without_bounding_matches_bounded() {
        let instance = single_vehicle_instance(3, 10, 10, 60);
        let duals = DualSolution {
            alphas: vec![40.0, 5.0, 60.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let net = network(&instance, Some(&duals));
        let unbounded = PulseSolver::new(&net, 10, 5, true);
        let plain = unbounded.solve(None, net.initial_cost);
        let mut bounded = PulseSolver::new(&net, 10, 5, true);
        bounded.bound();
        let pruned = bounded.solve(None, net.initial_cost);
        assert!(!plain.is_empty());
        assert!((plain[0].cost - pruned[0].cost).abs() < 1e-9);
    }

    #[test]
    fn test_capacity_resource_prunes_overconsumption() {
        let mut instance = single_vehicle_instance(2, 10, 10, 60);
        instance.capacities_labels = vec!["k".into()];
        for i in 0..2 {
            instance.nodes[i].quantities.insert("k".into(), 1);
        }
        instance.vehicles[0].capacities.insert("k".into(), 1);
        let duals = DualSolution {
            alphas: vec![1000.0, 1000.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let net = network(&instance, Some(&duals));
        let solver = PulseSolver::new(&net, 10, 10, true);
        let entries = solver.solve(None, net.initial_cost);
        // Both jobs together exceed the capacity, so every pooled tour
        // serves at most one of them.
        assert!(!entries.is_empty());
        for entry in &entries {
            assert!(entry.sequence.len() <= 3);
        }
    }

    #[test]
    fn test_infeasible_network_yields_empty_pool() {
        let mut instance = single_vehicle_instance(1, 10, 10, 60);
        // Window closed before the job can even start.
        instance.nodes[0].start_window = 100;
        instance.nodes[0].end_window = 100;
        let net = network(&instance, None);
        let solver = PulseSolver::new(&net, 10, 10, true);
        let entries = solver.solve(None, net.initial_cost);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_bound_table_is_monotone_in_available_time() {
        let instance = single_vehicle_instance(3, 10, 10, 60);
        let duals = DualSolution {
            alphas: vec![50.0, 50.0, 50.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let net = network(&instance, Some(&duals));
        let mut solver = PulseSolver::new(&net, 50, 10, true);
        solver.bound();
        // More remaining time can only improve (lower) the completable cost.
        for v in 0..net.n {
            let row = &solver.bounds_table()[v];
            for k in 1..row.len() {
                assert!(row[k] <= row[k - 1] + 1e-9);
            }
        }
    }

    #[test]
    fn test_rollback_skips_dominated_detour() {
        // Make job 1 worthless: any path u->1->v is dominated by u->v under
        // equal distances, so rollback must cut those branches and the best
        // tour must not lose value to them.
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let duals = DualSolution {
            alphas: vec![100.0, 0.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let net = network(&instance, Some(&duals));
        let solver = PulseSolver::new(&net, 10, 10, true);
        let entries = solver.solve(None, net.initial_cost);
        assert!(!entries.is_empty());
        assert!((entries[0].cost - (20.0 - 100.0)).abs() < 1e-6);
    }

    #[test]
    fn test_availability_mask_restricts_tours() {
        let instance = single_vehicle_instance(2, 10, 10, 60);
        let duals = DualSolution {
            alphas: vec![100.0, 100.0],
            betas: vec![0.0],
            ..Default::default()
        };
        let net = network(&instance, Some(&duals));
        let solver = PulseSolver::new(&net, 10, 10, true);
        let mut mask = vec![true; net.nb_vertices()];
        mask[1] = false;
        let entries = solver.solve(Some(&mask), net.initial_cost);
        assert!(!entries.is_empty());
        for entry in &entries {
            assert!(!entry.sequence.contains(&1));
        }
    }
}
