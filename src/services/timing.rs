use std::time::Instant;

use tracing::trace;

/// Logs how long a scope took when it ends.
///
/// ```ignore
/// let _timer = TimedOperation::start("token.generate");
/// ```
#[must_use = "the operation is timed until the guard is dropped"]
#[derive(Debug)]
pub struct TimedOperation {
    name: &'static str,
    started: Instant,
}

impl TimedOperation {
    pub fn start(name: &'static str) -> Self {
        trace!(operation = name, "operation started");
        Self {
            name,
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for TimedOperation {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        trace!(
            operation = self.name,
            elapsed_us = elapsed.as_micros() as u64,
            "operation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_log::CapturedLogs;

    #[test]
    fn test_guard_keeps_its_name() {
        let timer = TimedOperation::start("unit");
        assert_eq!(timer.name(), "unit");
        drop(timer);
    }

    #[test]
    fn test_drop_logs_elapsed_time() {
        let logs = CapturedLogs::default();
        logs.capture(|| {
            let _timer = TimedOperation::start("token.generate");
        });

        let out = logs.contents();
        assert!(out.contains("operation started"), "{out}");
        let finished = out
            .lines()
            .find(|l| l.contains("operation finished"))
            .unwrap_or_else(|| panic!("no finish record in {out}"));
        assert!(finished.contains("TRACE"), "{finished}");
        assert!(finished.contains("token.generate"), "{finished}");
        assert!(finished.contains("elapsed_us="), "{finished}");
    }
}
