//! Atomics-based metrics sink for the read path.
//!
//! Grounded in the teacher's fellow learned-index workload `fjall-rs`'s
//! `GcStats` (`vlog/blob_file/gc_stats.rs`): a plain `#[derive(Default)]`
//! struct of `AtomicU64` fields with `store`/`load` accessor methods, no
//! external metrics crate. The counters and timers named here are the stats
//! surface described for the read path: five named timers plus four
//! level-indexed counters. There is no histogram or percentile machinery —
//! accumulation only, leaving aggregation to whatever external sink scrapes
//! these values.
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of levels a level-indexed counter tracks. The read path only ever
/// indexes counters [0], [1], [2], and [9]; this is sized to fit the widest
/// of those rather than every level an LSM tree could have.
const LEVEL_COUNTERS: usize = 10;

/// One accumulating duration counter: total nanoseconds observed plus how
/// many observations contributed to that total.
#[derive(Debug, Default)]
pub struct TimerStat {
    nanos: AtomicU64,
    samples: AtomicU64,
}

impl TimerStat {
    pub fn record(&self, elapsed: std::time::Duration) {
        self.nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn total_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}

/// The read path's stats sink: timers 1/2/3/5/15 and level counters
/// [0]/[1]/[2]/[9], named per the external stats surface rather than by
/// what each one happens to measure internally.
#[derive(Debug, Default)]
pub struct Stats {
    /// Timer 1: table-cache find (open + parse on miss, or cache hit).
    pub table_cache_find: TimerStat,
    /// Timer 2: model position lookup.
    pub model_position_lookup: TimerStat,
    /// Timer 3: binary search within the candidate window.
    pub binary_search: TimerStat,
    /// Timer 5: sequential micro-search pre-phase.
    pub sequential_micro_search: TimerStat,
    /// Timer 15: filter probe.
    pub filter_probe: TimerStat,

    /// Counter [0]: learned-level hits per level.
    learned_level_hits: [AtomicU64; LEVEL_COUNTERS],
    /// Counter [1]: learned-file hits per level.
    learned_file_hits: [AtomicU64; LEVEL_COUNTERS],
    /// Counter [2]: baseline gets per level.
    baseline_gets: [AtomicU64; LEVEL_COUNTERS],
    /// Counter [9]: filter-probe nanoseconds per level.
    filter_probe_nanos: [AtomicU64; LEVEL_COUNTERS],
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read served by a level-wide model without consulting a
    /// per-file model.
    pub fn record_learned_level_hit(&self, level: usize) {
        bump(&self.learned_level_hits, level);
    }

    /// Records a read served by a per-file model.
    pub fn record_learned_file_hit(&self, level: usize) {
        bump(&self.learned_file_hits, level);
    }

    /// Records a read that fell through to the classical index/data block
    /// scan.
    pub fn record_baseline_get(&self, level: usize) {
        bump(&self.baseline_gets, level);
    }

    pub fn record_filter_probe_nanos(&self, level: usize, elapsed: std::time::Duration) {
        if let Some(counter) = self.filter_probe_nanos.get(level) {
            counter.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn learned_level_hits(&self, level: usize) -> u64 {
        read(&self.learned_level_hits, level)
    }

    #[must_use]
    pub fn learned_file_hits(&self, level: usize) -> u64 {
        read(&self.learned_file_hits, level)
    }

    #[must_use]
    pub fn baseline_gets(&self, level: usize) -> u64 {
        read(&self.baseline_gets, level)
    }

    #[must_use]
    pub fn filter_probe_nanos(&self, level: usize) -> u64 {
        read(&self.filter_probe_nanos, level)
    }
}

fn bump(counters: &[AtomicU64; LEVEL_COUNTERS], level: usize) {
    if let Some(counter) = counters.get(level) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn read(counters: &[AtomicU64; LEVEL_COUNTERS], level: usize) -> u64 {
    counters.get(level).map_or(0, |c| c.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_accumulates_across_records() {
        let timer = TimerStat::default();
        timer.record(std::time::Duration::from_nanos(100));
        timer.record(std::time::Duration::from_nanos(50));
        assert_eq!(timer.total_nanos(), 150);
        assert_eq!(timer.samples(), 2);
    }

    #[test]
    fn level_counters_are_independent() {
        let stats = Stats::new();
        stats.record_learned_file_hit(0);
        stats.record_learned_file_hit(0);
        stats.record_baseline_get(1);
        assert_eq!(stats.learned_file_hits(0), 2);
        assert_eq!(stats.baseline_gets(1), 1);
        assert_eq!(stats.learned_level_hits(0), 0);
    }
}
