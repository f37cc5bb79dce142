use std::sync::Mutex;

/// Counts redraws and rejected edits over the life of a session.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub redraws: usize,
    pub rejected: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_redraw(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.redraws += 1;
        }
    }

    pub fn record_rejected(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.rejected += 1;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_counts_redraws_and_rejections() {
        let recorder = MetricsRecorder::new();
        recorder.record_redraw();
        recorder.record_redraw();
        recorder.record_rejected();
        assert_eq!(
            recorder.snapshot(),
            Metrics {
                redraws: 2,
                rejected: 1
            }
        );
    }
}
