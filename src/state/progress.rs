use std::time::{Duration, Instant};

/// Counters for one pipeline run, logged after each flush.
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub start_index: usize,
    pub total: Option<usize>,
    pub processed: usize,
    pub flushes: usize,
    pub skipped: usize,
    pub degraded_fields: usize,
    started: Instant,
}

impl RunProgress {
    pub fn new(start_index: usize, total: Option<usize>) -> Self {
        Self {
            start_index,
            total,
            processed: 0,
            flushes: 0,
            skipped: 0,
            degraded_fields: 0,
            started: Instant::now(),
        }
    }

    /// Position in the whole stream, counting items finished in earlier runs.
    pub fn position(&self) -> usize {
        self.start_index + self.processed + self.skipped
    }

    pub fn fraction(&self) -> Option<f32> {
        self.total.filter(|t| *t > 0).map(|total| {
            (self.position() as f32 / total as f32).min(1.0)
        })
    }

    pub fn items_per_second(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= f64::EPSILON {
            0.0
        } else {
            (self.processed + self.skipped) as f64 / elapsed
        }
    }

    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let rate = self.items_per_second();
        if rate <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.position());
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn log(&self) {
        tracing::info!(
            position = self.position(),
            total = ?self.total,
            progress = ?self.fraction(),
            flushes = self.flushes,
            skipped = self.skipped,
            degraded_fields = self.degraded_fields,
            items_per_sec = format!("{:.2}", self.items_per_second()),
            eta_secs = ?self.eta().map(|d| d.as_secs()),
            "Progress"
        );
    }
}
