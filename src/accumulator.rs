//! Pure time/cost/token accumulation functions (§4.4). None of these
//! suspend, read the clock, or touch the filesystem — every input they
//! need, including `now`, is passed in by the caller.

use crate::config::Prices;
use crate::registry::AgentStatus;

/// Result of one `update_times` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeAccumulation {
    pub green: f64,
    pub non_green: f64,
    pub sleep: f64,
    pub state_changed: bool,
    pub was_capped: bool,
}

/// Adds `elapsed` seconds to the bucket implied by `curr_status`,
/// enforcing invariants 1 and 2: if the post-add total exceeds
/// `tolerance * (now - start_time)`, all three buckets are scaled down
/// uniformly to fit exactly, then each is individually clamped to
/// `now - start_time` in order green, non_green, sleep (each clamp uses
/// the headroom left by the previous one).
///
/// If `elapsed <= 0`, the inputs are returned unchanged.
#[allow(clippy::too_many_arguments)]
pub fn update_times(
    curr_status: AgentStatus,
    prev_status: AgentStatus,
    elapsed: f64,
    green: f64,
    non_green: f64,
    sleep: f64,
    start_time: f64,
    now: f64,
    tolerance: f64,
) -> TimeAccumulation {
    if elapsed <= 0.0 {
        return TimeAccumulation {
            green,
            non_green,
            sleep,
            state_changed: curr_status != prev_status,
            was_capped: false,
        };
    }

    let mut green = green;
    let mut non_green = non_green;
    let mut sleep = sleep;

    if curr_status.is_green() {
        green += elapsed;
    } else if curr_status.is_sleep_bucket() {
        sleep += elapsed;
    } else {
        non_green += elapsed;
    }

    let elapsed_wall = (now - start_time).max(0.0);
    let max_allowed = elapsed_wall * tolerance;
    let total = green + non_green + sleep;

    let mut was_capped = false;

    if total > max_allowed && total > 0.0 {
        let ratio = max_allowed / total;
        green *= ratio;
        non_green *= ratio;
        sleep *= ratio;
        was_capped = true;
    }

    // Ordered clamping: green first, then non_green against the
    // remaining headroom, then sleep against what's left after that.
    if green > elapsed_wall {
        green = elapsed_wall;
        was_capped = true;
    }
    let remaining_after_green = (elapsed_wall - green).max(0.0);
    if non_green > remaining_after_green {
        non_green = remaining_after_green;
        was_capped = true;
    }
    let remaining_after_non_green = (elapsed_wall - green - non_green).max(0.0);
    if sleep > remaining_after_non_green {
        sleep = remaining_after_non_green;
        was_capped = true;
    }

    TimeAccumulation {
        green,
        non_green,
        sleep,
        state_changed: curr_status != prev_status,
        was_capped,
    }
}

/// Dot product of token counts (in millions) with the four-component
/// price vector (§6.4). Linear and monotonic non-decreasing in every
/// token count, per testable property 2.
pub fn cost_estimate(input_tokens: u64, output_tokens: u64, cache_write_tokens: u64, cache_read_tokens: u64, prices: &Prices) -> f64 {
    let millions = |t: u64| t as f64 / 1_000_000.0;
    millions(input_tokens) * prices.input
        + millions(output_tokens) * prices.output
        + millions(cache_write_tokens) * prices.cache_write
        + millions(cache_read_tokens) * prices.cache_read
}

/// Standard ordered-statistic median. Empty input yields 0.
pub fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Aggregate counters across non-asleep sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregate {
    pub green_count: usize,
    pub total_green: f64,
    pub total_non_green: f64,
    pub active_count: usize,
}

pub trait AggregateInput {
    fn is_asleep(&self) -> bool;
    fn status(&self) -> AgentStatus;
    fn green_seconds(&self) -> f64;
    fn non_green_seconds(&self) -> f64;
}

pub fn aggregate<T: AggregateInput>(sessions: &[T]) -> Aggregate {
    let mut agg = Aggregate::default();
    for s in sessions {
        if s.is_asleep() {
            continue;
        }
        agg.active_count += 1;
        if s.status().is_green() {
            agg.green_count += 1;
        }
        agg.total_green += s.green_seconds();
        agg.total_non_green += s.non_green_seconds();
    }
    agg
}

#[cfg(test)]
mod tests {
    use super::*;

    /// E3 — Accumulator: budget tolerance.
    #[test]
    fn e3_budget_tolerance() {
        let start = 0.0;
        let now = 100.0;
        let r1 = update_times(AgentStatus::Running, AgentStatus::Running, 60.0, 0.0, 0.0, 0.0, start, now, 1.1);
        assert!(!r1.was_capped);
        let r2 = update_times(AgentStatus::Running, AgentStatus::Running, 50.0, r1.green, r1.non_green, r1.sleep, start, now, 1.1);
        let r3 = update_times(AgentStatus::Running, AgentStatus::Running, 40.0, r2.green, r2.non_green, r2.sleep, start, now, 1.1);
        assert!((r3.green - 100.0).abs() < 1e-9);
        assert_eq!(r3.non_green, 0.0);
        assert_eq!(r3.sleep, 0.0);
        assert!(r3.was_capped);
    }

    #[test]
    fn zero_or_negative_elapsed_is_noop() {
        let r = update_times(AgentStatus::Running, AgentStatus::Running, 0.0, 5.0, 3.0, 1.0, 0.0, 10.0, 1.1);
        assert_eq!((r.green, r.non_green, r.sleep), (5.0, 3.0, 1.0));
        assert!(!r.was_capped);
    }

    #[test]
    fn invariant_sum_never_exceeds_tolerance() {
        let start = 0.0;
        let mut green = 0.0;
        let mut non_green = 0.0;
        let sleep = 0.0;
        for t in 1..=50 {
            let now = t as f64;
            let r = update_times(AgentStatus::Running, AgentStatus::Running, 3.0, green, non_green, sleep, start, now, 1.1);
            green = r.green;
            non_green = r.non_green;
            let wall = now - start;
            assert!(green + non_green + r.sleep <= wall * 1.1 + 1e-9);
            assert!(green <= wall + 1e-9);
        }
    }

    #[test]
    fn cost_estimate_is_linear_and_monotonic() {
        let prices = Prices::default();
        let base = cost_estimate(1_000_000, 0, 0, 0, &prices);
        assert!((base - 15.00).abs() < 1e-9);
        let doubled = cost_estimate(2_000_000, 0, 0, 0, &prices);
        assert!((doubled - 30.00).abs() < 1e-9);
        let more_output = cost_estimate(1_000_000, 1_000_000, 0, 0, &prices);
        assert!(more_output > base);
    }

    #[test]
    fn median_empty_is_zero() {
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn median_matches_reverse() {
        let xs = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        let mut rev = xs.clone();
        rev.reverse();
        assert_eq!(median(&xs), median(&rev));
        assert_eq!(median(&xs), 3.0);
    }

    #[test]
    fn median_even_length_averages_middle_two() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    struct FakeSession {
        asleep: bool,
        status: AgentStatus,
        green: f64,
        non_green: f64,
    }

    impl AggregateInput for FakeSession {
        fn is_asleep(&self) -> bool {
            self.asleep
        }
        fn status(&self) -> AgentStatus {
            self.status
        }
        fn green_seconds(&self) -> f64 {
            self.green
        }
        fn non_green_seconds(&self) -> f64 {
            self.non_green
        }
    }

    #[test]
    fn aggregate_ignores_asleep_sessions() {
        let sessions = vec![
            FakeSession { asleep: false, status: AgentStatus::Running, green: 10.0, non_green: 0.0 },
            FakeSession { asleep: true, status: AgentStatus::Running, green: 999.0, non_green: 999.0 },
            FakeSession { asleep: false, status: AgentStatus::Error, green: 0.0, non_green: 5.0 },
        ];
        let agg = aggregate(&sessions);
        assert_eq!(agg.active_count, 2);
        assert_eq!(agg.green_count, 1);
        assert_eq!(agg.total_green, 10.0);
        assert_eq!(agg.total_non_green, 5.0);
    }
}
