//! Forward schedule simulation.
//!
//! One shared primitive serves both feasibility checking and start-time
//! reconstruction: walk the node sequence from the depot at time 0, waiting
//! for window openings and — for ambiguous interventions whose service would
//! straddle the lunch break — waiting until [`MID_DAY`].

use crate::constants::{END_DAY, MID_DAY};
use crate::Instance;

/// Advance the clock on arrival at `node`: wait for the window to open, then
/// wait out the lunch break when the service would straddle it.
#[inline]
fn apply_arrival_rule(instance: &Instance, node: usize, mut t: i32) -> i32 {
    let n = &instance.nodes[node];
    if t < n.start_window {
        t = n.start_window;
    }
    if n.is_ambiguous && t < MID_DAY && t + n.duration > MID_DAY {
        t = MID_DAY;
    }
    t
}

/// Simulate a depot-bracketed node sequence and return the service start
/// times, or `None` when a window (or the END_DAY return) is violated.
pub fn simulate_start_times(instance: &Instance, sequence: &[usize]) -> Option<Vec<i32>> {
    if sequence.is_empty() {
        return Some(Vec::new());
    }
    let mut start_times = Vec::with_capacity(sequence.len());
    let mut t = 0;
    for (pos, &node_id) in sequence.iter().enumerate() {
        let node = &instance.nodes[node_id];
        if pos > 0 {
            t = apply_arrival_rule(instance, node_id, t);
        }
        // Service must end inside the window.
        if t + node.duration > node.end_window {
            return None;
        }
        start_times.push(t);
        if pos + 1 < sequence.len() {
            t += node.duration + instance.travel_time(node_id, sequence[pos + 1]);
        }
    }
    // Return leg: the final depot arrival closes the day.
    if t > END_DAY {
        return None;
    }
    Some(start_times)
}

/// Start times without feasibility enforcement, mirroring the simulation.
/// Useful for reporting on routes already known to be feasible.
pub fn start_times_unchecked(instance: &Instance, sequence: &[usize]) -> Vec<i32> {
    let mut start_times = Vec::with_capacity(sequence.len());
    let mut t = 0;
    for (pos, &node_id) in sequence.iter().enumerate() {
        if pos > 0 {
            t = apply_arrival_rule(instance, node_id, t);
        }
        start_times.push(t);
        if pos + 1 < sequence.len() {
            t += instance.nodes[node_id].duration + instance.travel_time(node_id, sequence[pos + 1]);
        }
    }
    start_times
}

/// Total time spent neither travelling nor serving along the sequence.
pub fn total_waiting_time(instance: &Instance, sequence: &[usize]) -> i32 {
    let mut waiting = 0;
    let mut t = 0;
    for pos in 0..sequence.len().saturating_sub(1) {
        let node = &instance.nodes[sequence[pos]];
        let next_id = sequence[pos + 1];
        let next = &instance.nodes[next_id];
        t += node.duration + instance.travel_time(sequence[pos], next_id);
        if t < next.start_window {
            waiting += next.start_window - t;
            t = next.start_window;
        }
        if next.is_ambiguous && t < MID_DAY && t + next.duration > MID_DAY {
            waiting += MID_DAY - t;
            t = MID_DAY;
        }
    }
    waiting
}

/// Total travel time along the sequence.
pub fn total_travel_time(instance: &Instance, sequence: &[usize]) -> i32 {
    sequence
        .windows(2)
        .map(|w| instance.travel_time(w[0], w[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::single_vehicle_instance;

    #[test]
    fn test_simulation_waits_for_window() {
        let mut instance = single_vehicle_instance(2, 10, 10, 60);
        instance.nodes[1].start_window = 200;
        // D(=2) -> 0 -> 1 -> D
        let times = simulate_start_times(&instance, &[2, 0, 1, 2]).unwrap();
        assert_eq!(times, vec![0, 10, 200, 270]);
        assert_eq!(total_waiting_time(&instance, &[2, 0, 1, 2]), 200 - 80);
    }

    #[test]
    fn test_simulation_rejects_late_service() {
        let mut instance = single_vehicle_instance(1, 10, 10, 60);
        instance.nodes[0].end_window = 50;
        assert!(simulate_start_times(&instance, &[1, 0, 1]).is_none());
    }

    #[test]
    fn test_lunch_rule_waits_to_midday() {
        let mut instance = single_vehicle_instance(2, 10, 10, 60);
        instance.nodes[1].is_ambiguous = true;
        // After serving node 0 (start 10, 60 min) and travelling 10, arrival
        // at node 1 is t=80: fine. Stretch node 0 instead so the arrival
        // straddles MID_DAY.
        instance.nodes[0].duration = 200;
        let times = simulate_start_times(&instance, &[2, 0, 1, 2]).unwrap();
        // Arrival at node 1 is 10 + 200 + 10 = 220 < MID_DAY, and 220 + 60
        // crosses MID_DAY, so service waits to MID_DAY.
        assert_eq!(times[2], MID_DAY);
    }

    #[test]
    fn test_unambiguous_service_may_straddle_midday() {
        let mut instance = single_vehicle_instance(2, 10, 10, 60);
        instance.nodes[0].duration = 200;
        let times = simulate_start_times(&instance, &[2, 0, 1, 2]).unwrap();
        assert_eq!(times[2], 220);
    }

    #[test]
    fn test_return_leg_bounded_by_end_day() {
        let mut instance = single_vehicle_instance(1, 10, 10, 60);
        instance.nodes[0].start_window = END_DAY - 60;
        instance.nodes[0].end_window = END_DAY;
        // Service ends exactly at END_DAY, then 10 minutes of travel overrun.
        assert!(simulate_start_times(&instance, &[1, 0, 1]).is_none());
    }

    #[test]
    fn test_travel_time_sum() {
        let instance = single_vehicle_instance(2, 10, 7, 60);
        assert_eq!(total_travel_time(&instance, &[2, 0, 1, 2]), 21);
    }
}
