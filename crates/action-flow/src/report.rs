//! Hand-off to whatever persists the run's results.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::aggregate::RunSnapshot;
use crate::types::StepResult;

#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("report I/O failed: {0}")]
    Io(String),
    #[error("report encoding failed: {0}")]
    Encode(String),
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err.to_string())
    }
}

/// Receives results as the run progresses.
///
/// `export_partial` is called after a failed step with everything finalized
/// so far; `export_final` once when the run ends, halted or not.
pub trait ReportSink: Send + Sync {
    fn record_step(&self, _step: &StepResult) -> Result<(), ReportError> {
        Ok(())
    }

    fn export_partial(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError>;

    fn export_final(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReportSink;

impl ReportSink for NullReportSink {
    fn export_partial(&self, _: &RunSnapshot, _: &[StepResult]) -> Result<(), ReportError> {
        Ok(())
    }

    fn export_final(&self, _: &RunSnapshot, _: &[StepResult]) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Fans out to several sinks. Every sink is called even when an earlier one
/// fails; the first error is returned.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn each(
        &self,
        mut call: impl FnMut(&dyn ReportSink) -> Result<(), ReportError>,
    ) -> Result<(), ReportError> {
        let mut first = None;
        for sink in &self.sinks {
            if let Err(err) = call(sink.as_ref()) {
                warn!(error = %err, "report sink failed");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl ReportSink for FanoutSink {
    fn record_step(&self, step: &StepResult) -> Result<(), ReportError> {
        self.each(|sink| sink.record_step(step))
    }

    fn export_partial(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError> {
        self.each(|sink| sink.export_partial(snapshot, steps))
    }

    fn export_final(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError> {
        self.each(|sink| sink.export_final(snapshot, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RunState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        finals: AtomicUsize,
        fail: bool,
    }

    impl ReportSink for Counting {
        fn export_partial(&self, _: &RunSnapshot, _: &[StepResult]) -> Result<(), ReportError> {
            Ok(())
        }

        fn export_final(&self, _: &RunSnapshot, _: &[StepResult]) -> Result<(), ReportError> {
            self.finals.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ReportError::Io("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_fanout_calls_every_sink() {
        let failing = Arc::new(Counting {
            finals: AtomicUsize::new(0),
            fail: true,
        });
        let healthy = Arc::new(Counting {
            finals: AtomicUsize::new(0),
            fail: false,
        });
        let fanout = FanoutSink::new(vec![failing.clone(), healthy.clone()]);
        let snapshot = RunState::new("j").snapshot();

        let err = fanout.export_final(&snapshot, &[]).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(failing.finals.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.finals.load(Ordering::SeqCst), 1);
    }
}
