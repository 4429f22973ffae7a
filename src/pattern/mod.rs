//! Owns at most one active generator. On each tick, if the selection is
//! `internal(name, params)`, produces a frame and hands it to the
//! Multiplexer as if from an external producer; if `external`, does
//! nothing. Holds no hidden per-generator state — everything is derived
//! from `(W, H, frame_counter, params)`.

pub mod generators;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::frame::PixelFrame;
use generators::{generator_by_name, GeneratorError, Params};

/// Which source feeds the display: raw ingress frames, or a named
/// generator with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternSelection {
    External,
    Internal { name: String, params: Params },
}

/// Reported when a generator raises; selection reverts to `External`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternFailure {
    pub name: String,
    pub error: GeneratorError,
}

/// Per-tick frame counter, reset on selection change, layout change, or an
/// asleep -> awake transition. `AtomicU64` so the controller can reset it
/// from the render thread without a lock for the common case, while the
/// rare failure path (reverting selection) goes through the `Mutex`.
pub struct PatternRunner {
    counter: AtomicU64,
    last_selection_name: Mutex<Option<String>>,
}

impl PatternRunner {
    pub fn new() -> Self {
        PatternRunner {
            counter: AtomicU64::new(0),
            last_selection_name: Mutex::new(None),
        }
    }

    /// Reset the frame counter. Called on selection change, layout change,
    /// and asleep -> awake transitions.
    pub fn reset_counter(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }

    /// Run one tick. Returns `Ok(None)` for `External` selection (nothing to
    /// generate), `Ok(Some(frame))` on success, or `Err(failure)` if the
    /// generator raised — the caller is responsible for reverting the
    /// Arbiter's selection to `External` on `Err`.
    pub fn tick(
        &self,
        selection: &PatternSelection,
        width: usize,
        height: usize,
    ) -> Result<Option<PixelFrame>, PatternFailure> {
        let (name, params) = match selection {
            PatternSelection::External => {
                self.note_selection(None);
                return Ok(None);
            }
            PatternSelection::Internal { name, params } => (name, params),
        };

        if self.note_selection(Some(name.clone())) {
            self.reset_counter();
        }

        let generator = match generator_by_name(name) {
            Some(g) => g,
            None => {
                return Err(PatternFailure {
                    name: name.clone(),
                    error: GeneratorError(format!("unknown pattern '{}'", name)),
                })
            }
        };

        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        match generator(width, height, counter, params) {
            Ok(frame) => Ok(Some(frame)),
            Err(error) => Err(PatternFailure { name: name.clone(), error }),
        }
    }

    /// Record the active selection name; returns `true` if it changed
    /// (triggering a counter reset).
    fn note_selection(&self, name: Option<String>) -> bool {
        let mut last = self.last_selection_name.lock().unwrap_or_else(|e| e.into_inner());
        let changed = *last != name;
        *last = name;
        changed
    }
}

impl Default for PatternRunner {
    fn default() -> Self {
        Self::new()
    }
}
