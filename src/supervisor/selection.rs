//! Worker selection policies (spec.md §4.2). Each policy picks one index
//! into a slice of candidate worker states.

use rand::Rng;

use crate::config::SelectionPolicy;

use super::state::{RoundRobinCursor, WorkerState};

/// Select an index into `states` according to `policy`. `states` must be
/// non-empty; callers filter out breaker-open workers before calling this.
pub fn select(
    policy: SelectionPolicy,
    states: &[&WorkerState],
    round_robin: &RoundRobinCursor,
    performance_top_k: usize,
) -> usize {
    debug_assert!(!states.is_empty());
    match policy {
        SelectionPolicy::RoundRobin => round_robin.next(states.len()),
        SelectionPolicy::LeastInFlight => states
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.in_flight())
            .map(|(i, _)| i)
            .unwrap_or(0),
        SelectionPolicy::Weighted => weighted_pick(states),
        SelectionPolicy::Random => rand::thread_rng().gen_range(0..states.len()),
        SelectionPolicy::PerformanceBased => {
            let k = performance_top_k.max(1).min(states.len());
            let mut ranked: Vec<usize> = (0..states.len()).collect();
            ranked.sort_by(|&a, &b| {
                states[b]
                    .selection_weight()
                    .partial_cmp(&states[a].selection_weight())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let top = &ranked[..k];
            top[rand::thread_rng().gen_range(0..top.len())]
        }
    }
}

/// Weighted-random pick where weight = `success_rate / max(avg_processing_time, epsilon)`.
fn weighted_pick(states: &[&WorkerState]) -> usize {
    let weights: Vec<f64> = states.iter().map(|s| s.selection_weight().max(1e-9)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0;
    }
    let mut roll = rand::thread_rng().gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        if roll < *w {
            return i;
        }
        roll -= w;
    }
    states.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn least_in_flight_picks_minimum() {
        let a = WorkerState::new("a", 5, Duration::from_secs(60));
        let b = WorkerState::new("b", 5, Duration::from_secs(60));
        a.begin_call();
        a.begin_call();
        b.begin_call();
        let cursor = RoundRobinCursor::default();
        let idx = select(SelectionPolicy::LeastInFlight, &[&a, &b], &cursor, 3);
        assert_eq!(idx, 1);
    }

    #[test]
    fn round_robin_is_stable_across_calls() {
        let a = WorkerState::new("a", 5, Duration::from_secs(60));
        let b = WorkerState::new("b", 5, Duration::from_secs(60));
        let cursor = RoundRobinCursor::default();
        let first = select(SelectionPolicy::RoundRobin, &[&a, &b], &cursor, 3);
        let second = select(SelectionPolicy::RoundRobin, &[&a, &b], &cursor, 3);
        let third = select(SelectionPolicy::RoundRobin, &[&a, &b], &cursor, 3);
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(third, 0);
    }
}
