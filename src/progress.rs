use std::sync::atomic::{AtomicI32, Ordering};

/// Consumer for transfer progress. Transports call [`report`] after each
/// chunk with a fraction in `[0, 1]`; fractions never decrease, but the same
/// value may be reported more than once and the number of calls is not fixed.
///
/// [`report`]: ProgressSink::report
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

/// Logs progress at integer-percent granularity, dropping repeats so a chatty
/// transport does not flood the log. Keeps the printing concern out of the
/// transports themselves.
pub struct LogProgress {
    label: &'static str,
    last_percent: AtomicI32,
}

impl LogProgress {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            // -1 so the very first report, including 0%, is logged
            last_percent: AtomicI32::new(-1),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, fraction: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as i32;
        let previous = self.last_percent.fetch_max(percent, Ordering::Relaxed);

        if percent > previous {
            info!("{} progress: {percent}%", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_and_stale_reports_do_not_move_backwards() {
        let sink = LogProgress::new("test");

        sink.report(0.5);
        sink.report(0.5);
        sink.report(0.3);

        assert_eq!(sink.last_percent.load(Ordering::Relaxed), 50);

        sink.report(1.0);
        assert_eq!(sink.last_percent.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn fractions_are_clamped() {
        let sink = LogProgress::new("test");

        sink.report(7.5);
        assert_eq!(sink.last_percent.load(Ordering::Relaxed), 100);

        let sink = LogProgress::new("test");
        sink.report(-0.2);
        assert_eq!(sink.last_percent.load(Ordering::Relaxed), 0);
    }
}
