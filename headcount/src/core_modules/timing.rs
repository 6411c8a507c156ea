// THEORY:
// Per-stage timing for the counting cycle. Each stage is bracketed by a `StageTimer`
// (start, then stop into a sink). The timer emits a `debug!` event per stage and hands
// the duration to a `MetricsSink`. The default sink, `StageMetrics`, keeps call counts,
// totals and maxima per stage and can log a summary at the end of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The stages of one counting cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Acquire,
    Grayscale,
    Classify,
    Cleanup,
    Label,
    Count,
    Display,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Grayscale => "grayscale",
            Stage::Classify => "classify",
            Stage::Cleanup => "cleanup",
            Stage::Label => "label",
            Stage::Count => "count",
            Stage::Display => "display",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives stage durations.
pub trait MetricsSink {
    fn record(&mut self, stage: Stage, elapsed: Duration);
}

/// Measures one stage from `start` to `stop`.
#[derive(Debug)]
#[must_use = "a timer records nothing until it is stopped"]
pub struct StageTimer {
    stage: Stage,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: Stage) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn stop(self, sink: &mut dyn MetricsSink) -> Duration {
        let elapsed = self.started.elapsed();
        debug!(
            stage = self.stage.name(),
            elapsed_us = elapsed.as_micros() as u64,
            "stage complete"
        );
        sink.record(self.stage, elapsed);
        elapsed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl StageStats {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        self.total / self.calls as u32
    }
}

/// Aggregated timings per stage.
#[derive(Debug, Clone, Default)]
pub struct StageMetrics {
    stats: BTreeMap<Stage, StageStats>,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> Option<&StageStats> {
        self.stats.get(&stage)
    }

    /// Recorded stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageStats)> {
        self.stats.iter().map(|(stage, stats)| (*stage, stats))
    }

    pub fn log_summary(&self) {
        for (stage, stats) in self.iter() {
            info!(
                stage = stage.name(),
                calls = stats.calls,
                mean_us = stats.mean().as_micros() as u64,
                max_us = stats.max.as_micros() as u64,
                "stage timing"
            );
        }
    }
}

impl MetricsSink for StageMetrics {
    fn record(&mut self, stage: Stage, elapsed: Duration) {
        let stats = self.stats.entry(stage).or_default();
        stats.calls += 1;
        stats.total += elapsed;
        stats.max = stats.max.max(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_aggregate_per_stage() {
        let mut metrics = StageMetrics::new();
        metrics.record(Stage::Classify, Duration::from_millis(4));
        metrics.record(Stage::Classify, Duration::from_millis(8));
        metrics.record(Stage::Label, Duration::from_millis(1));

        let classify = metrics.get(Stage::Classify).unwrap();
        assert_eq!(classify.calls, 2);
        assert_eq!(classify.total, Duration::from_millis(12));
        assert_eq!(classify.max, Duration::from_millis(8));
        assert_eq!(classify.mean(), Duration::from_millis(6));
        assert!(metrics.get(Stage::Display).is_none());
    }

    #[test]
    fn stages_iterate_in_cycle_order() {
        let mut metrics = StageMetrics::new();
        metrics.record(Stage::Display, Duration::ZERO);
        metrics.record(Stage::Acquire, Duration::ZERO);
        metrics.record(Stage::Cleanup, Duration::ZERO);
        let order: Vec<Stage> = metrics.iter().map(|(stage, _)| stage).collect();
        assert_eq!(order, vec![Stage::Acquire, Stage::Cleanup, Stage::Display]);
    }

    #[test]
    fn timer_records_into_sink() {
        let mut metrics = StageMetrics::new();
        let timer = StageTimer::start(Stage::Count);
        let elapsed = timer.stop(&mut metrics);
        let stats = metrics.get(Stage::Count).unwrap();
        assert_eq!(stats.calls, 1);
        assert_eq!(stats.total, elapsed);
        assert_eq!(Stage::Count.to_string(), "count");
    }
}
