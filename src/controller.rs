//! The only component that touches the hardware. Runs a fixed-cadence loop
//! at a target FPS on a dedicated OS thread (not a tokio task): it must
//! sleep with sub-millisecond jitter and calls blocking hardware FFI, which
//! doesn't fit `spawn_blocking`'s short-lived-operation model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::arbiter::{Arbiter, ScheduleState};
use crate::frame::PixelFrame;
use crate::hardware::HardwareSink;
use crate::mailbox::Mailbox;
use crate::pattern::PatternRunner;
use crate::power;
use crate::status::{Status, TickReport};

pub struct ControllerConfig {
    pub target_fps: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig { target_fps: 30.0 }
    }
}

/// Runs the tick loop until `running` is cleared. Intended to be the body
/// of a `std::thread::spawn` closure.
pub fn run(
    arbiter: Arc<Arbiter>,
    mailbox: Arc<Mailbox>,
    pattern_runner: Arc<PatternRunner>,
    status: Arc<Status>,
    mut hardware: Box<dyn HardwareSink>,
    running: Arc<AtomicBool>,
    config: ControllerConfig,
) {
    let frame_time = Duration::from_nanos((1_000_000_000.0 / config.target_fps) as u64);

    let mut last_frame: Option<PixelFrame> = None;
    let mut last_generation: Option<u64> = None;
    let mut last_schedule_awake = true;

    tracing::info!(target_fps = config.target_fps, "display controller started");

    while running.load(Ordering::Relaxed) {
        let tick_start = Instant::now();
        let snapshot = arbiter.snapshot();

        let layout_changed = last_generation != Some(snapshot.generation);
        if layout_changed {
            last_generation = Some(snapshot.generation);
            pattern_runner.reset_counter();
            last_frame = None; // clear, don't pad/crop, on a layout change
        }

        let awake = snapshot.schedule == ScheduleState::Awake;
        if awake && !last_schedule_awake {
            pattern_runner.reset_counter();
        }
        last_schedule_awake = awake;

        let (width, height) = snapshot.layout.canvas_size();
        let led_count = snapshot.layout.led_count();

        let mut dimension_mismatch = false;
        let mut pattern_failure = None;
        let mut pattern_name = None;

        let frame = if !awake {
            PixelFrame::black(width, height)
        } else {
            if let crate::pattern::PatternSelection::Internal { name, .. } = &snapshot.pattern {
                pattern_name = Some(name.clone());
                match pattern_runner.tick(&snapshot.pattern, width, height) {
                    Ok(Some(generated)) => {
                        let _ = mailbox.submit(generated, (width, height));
                    }
                    Ok(None) => {}
                    Err(failure) => {
                        tracing::warn!(pattern = %failure.name, error = %failure.error, "pattern generator failed");
                        let _ = arbiter.set_pattern(crate::pattern::PatternSelection::External);
                        pattern_failure = Some(failure);
                        pattern_name = None;
                    }
                }
            }

            match mailbox.take() {
                Some((candidate, _tag)) if candidate.dimensions() == (width, height) => candidate,
                Some(_) => {
                    dimension_mismatch = true;
                    last_frame.clone().unwrap_or_else(|| PixelFrame::black(width, height))
                }
                None => last_frame.clone().unwrap_or_else(|| PixelFrame::black(width, height)),
            }
        };

        let limit_result = power::limit(&frame, snapshot.brightness, led_count, &snapshot.power);

        let mut phys = vec![(0u8, 0u8, 0u8); led_count];
        for v in 0..(width * height) {
            let p = snapshot.index_table.physical_index(v);
            if p < phys.len() {
                phys[p] = frame.pixel(v);
            }
        }

        if let Err(e) = hardware.render(&phys, limit_result.b_applied) {
            tracing::error!(error = %e, "hardware render failed");
        }

        // Tracks the literal last frame pushed through the pipeline, awake
        // or asleep, so a no-producer tick right after waking replays black
        // rather than stale pre-sleep content.
        last_frame = Some(frame);

        status.publish(TickReport {
            b_applied: limit_result.b_applied,
            limited: limit_result.limited,
            current_estimate_amps: limit_result.estimate_amps,
            dimension_mismatch,
            pattern_name,
            pattern_failure,
            schedule_awake: awake,
            canvas_size: (width, height),
            led_count,
        });

        let elapsed = tick_start.elapsed();
        if elapsed < frame_time {
            std::thread::sleep(frame_time - elapsed);
        }
        // If the tick ran long, the next iteration fires immediately —
        // frames are shed, not batched.
    }

    tracing::info!("display controller stopped");
}
