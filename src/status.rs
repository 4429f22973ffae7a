//! Read-only aggregation of the controller's running statistics. The
//! controller is the sole writer (via `Status::publish`); everyone else
//! reads the latest snapshot lock-free through `ArcSwap`.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::pattern::PatternFailure;

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub fps_1s: f64,
    pub frames_emitted: u64,
    pub b_applied: u8,
    pub limited_total: u64,
    pub dimension_mismatch_count: u64,
    pub current_estimate_amps: f64,
    pub pattern_name: Option<String>,
    pub last_error: Option<String>,
    pub schedule_awake: bool,
    pub canvas_size: (usize, usize),
    pub led_count: usize,
}

impl StatusSnapshot {
    fn initial() -> Self {
        StatusSnapshot {
            fps_1s: 0.0,
            frames_emitted: 0,
            b_applied: 0,
            limited_total: 0,
            dimension_mismatch_count: 0,
            current_estimate_amps: 0.0,
            pattern_name: None,
            last_error: None,
            schedule_awake: true,
            canvas_size: (0, 0),
            led_count: 0,
        }
    }
}

/// Per-tick fields the controller reports; everything else is carried
/// forward or accumulated by `Status::publish`.
pub struct TickReport {
    pub b_applied: u8,
    pub limited: bool,
    pub current_estimate_amps: f64,
    pub dimension_mismatch: bool,
    pub pattern_name: Option<String>,
    pub pattern_failure: Option<PatternFailure>,
    pub schedule_awake: bool,
    pub canvas_size: (usize, usize),
    pub led_count: usize,
}

pub struct Status {
    current: ArcSwap<StatusSnapshot>,
    frames_emitted: std::sync::atomic::AtomicU64,
    limited_total: std::sync::atomic::AtomicU64,
    dimension_mismatch_count: std::sync::atomic::AtomicU64,
    window_start: std::sync::Mutex<std::time::Instant>,
    window_frames: std::sync::atomic::AtomicU64,
}

impl Status {
    pub fn new() -> Self {
        Status {
            current: ArcSwap::from_pointee(StatusSnapshot::initial()),
            frames_emitted: std::sync::atomic::AtomicU64::new(0),
            limited_total: std::sync::atomic::AtomicU64::new(0),
            dimension_mismatch_count: std::sync::atomic::AtomicU64::new(0),
            window_start: std::sync::Mutex::new(std::time::Instant::now()),
            window_frames: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> arc_swap::Guard<Arc<StatusSnapshot>> {
        self.current.load()
    }

    /// Fold one tick's outcome into the published snapshot. Called once per
    /// controller tick, never concurrently (single writer: the controller
    /// thread).
    pub fn publish(&self, report: TickReport) {
        use std::sync::atomic::Ordering;

        let frames_emitted = self.frames_emitted.fetch_add(1, Ordering::Relaxed) + 1;
        if report.dimension_mismatch {
            self.dimension_mismatch_count.fetch_add(1, Ordering::Relaxed);
        }
        if report.limited {
            self.limited_total.fetch_add(1, Ordering::Relaxed);
        }

        let fps_1s = {
            let mut window_start = self.window_start.lock().unwrap_or_else(|e| e.into_inner());
            let frames_in_window = self.window_frames.fetch_add(1, Ordering::Relaxed) + 1;
            let elapsed = window_start.elapsed();
            if elapsed >= std::time::Duration::from_secs(1) {
                let fps = frames_in_window as f64 / elapsed.as_secs_f64();
                *window_start = std::time::Instant::now();
                self.window_frames.store(0, Ordering::Relaxed);
                fps
            } else {
                self.current.load().fps_1s
            }
        };

        let last_error = report
            .pattern_failure
            .map(|f| format!("PatternFailure({}): {}", f.name, f.error));

        let next = StatusSnapshot {
            fps_1s,
            frames_emitted,
            b_applied: report.b_applied,
            limited_total: self.limited_total.load(Ordering::Relaxed),
            dimension_mismatch_count: self.dimension_mismatch_count.load(Ordering::Relaxed),
            current_estimate_amps: report.current_estimate_amps,
            pattern_name: report.pattern_name,
            last_error: last_error.or_else(|| self.current.load().last_error.clone()),
            schedule_awake: report.schedule_awake,
            canvas_size: report.canvas_size,
            led_count: report.led_count,
        };
        self.current.store(Arc::new(next));
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> TickReport {
        TickReport {
            b_applied: 200,
            limited: false,
            current_estimate_amps: 1.5,
            dimension_mismatch: false,
            pattern_name: Some("solid".into()),
            pattern_failure: None,
            schedule_awake: true,
            canvas_size: (32, 32),
            led_count: 1024,
        }
    }

    #[test]
    fn publish_updates_frames_emitted() {
        let status = Status::new();
        status.publish(report());
        status.publish(report());
        assert_eq!(status.snapshot().frames_emitted, 2);
    }

    #[test]
    fn publish_accumulates_limited_total() {
        let status = Status::new();
        let mut r = report();
        r.limited = true;
        status.publish(r);
        status.publish(report());
        assert_eq!(status.snapshot().limited_total, 1);
    }

    #[test]
    fn publish_accumulates_dimension_mismatch_count() {
        let status = Status::new();
        let mut r = report();
        r.dimension_mismatch = true;
        status.publish(r);
        assert_eq!(status.snapshot().dimension_mismatch_count, 1);
    }

    #[test]
    fn pattern_failure_sets_last_error_and_persists() {
        let status = Status::new();
        let mut r = report();
        r.pattern_failure = Some(PatternFailure {
            name: "plasma".into(),
            error: crate::pattern::generators::GeneratorError("boom".into()),
        });
        status.publish(r);
        let snap = status.snapshot();
        assert!(snap.last_error.as_ref().unwrap().contains("plasma"));

        // Next tick with no failure should keep the last error around.
        status.publish(report());
        assert!(status.snapshot().last_error.is_some());
    }
}
