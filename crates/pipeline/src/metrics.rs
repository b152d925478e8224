//! Per-stage duration and failure metrics.

use std::time::Instant;

use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
use userop_core::PipelineStage;

/// Per-stage pipeline metrics, labelled by stage name.
#[derive(Metrics, Clone)]
#[metrics(scope = "userop_pipeline")]
pub(crate) struct StageMetrics {
    /// Time spent in the stage.
    #[metric(describe = "Time spent in a pipeline stage, in seconds")]
    duration: Histogram,
    /// Attempts that stopped in the stage.
    #[metric(describe = "Operation attempts that failed in a pipeline stage")]
    failures: Counter,
}

/// Times one stage and records it when finished.
pub(crate) struct StageTimer {
    metrics: StageMetrics,
    start: Instant,
}

impl StageTimer {
    pub(crate) fn start(stage: PipelineStage) -> Self {
        Self {
            metrics: StageMetrics::new_with_labels(&[("stage", stage.as_str())]),
            start: Instant::now(),
        }
    }

    pub(crate) fn finish(self, succeeded: bool) {
        self.metrics.duration.record(self.start.elapsed().as_secs_f64());
        if !succeeded {
            self.metrics.failures.increment(1);
        }
    }
}
