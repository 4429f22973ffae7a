//! Serializes configuration swaps (layout, brightness, pattern, schedule,
//! power ceiling) against the controller. Publication is a single
//! `ArcSwap::store`; the controller reads the latest snapshot atomically at
//! the top of each tick.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::layout::{Layout, LayoutDescription, LayoutError};
use crate::mapper::IndexTable;
use crate::pattern::generators::generator_by_name;
use crate::pattern::PatternSelection;
use crate::power::PowerConfig;

/// `awake`/`asleep`. When asleep the controller emits a blank frame every
/// tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Awake,
    Asleep,
}

/// Everything the controller needs to run one tick, published atomically.
pub struct Snapshot {
    pub layout: Arc<Layout>,
    pub index_table: Arc<IndexTable>,
    pub brightness: u8,
    pub pattern: PatternSelection,
    pub schedule: ScheduleState,
    pub power: PowerConfig,
    /// Bumped every time `layout` changes, so the controller can notice a
    /// swap happened between ticks and retire the previous `IndexTable`.
    pub generation: u64,
}

impl Snapshot {
    fn with_layout(layout: Layout, previous: Option<&Snapshot>) -> Snapshot {
        let index_table = Arc::new(IndexTable::build(&layout));
        Snapshot {
            layout: Arc::new(layout),
            index_table,
            brightness: previous.map(|p| p.brightness).unwrap_or(128),
            pattern: previous
                .map(|p| p.pattern.clone())
                .unwrap_or(PatternSelection::External),
            schedule: previous.map(|p| p.schedule).unwrap_or(ScheduleState::Awake),
            power: previous
                .map(|p| p.power)
                .unwrap_or_else(|| PowerConfig::new(f64::INFINITY, false)),
            generation: previous.map(|p| p.generation + 1).unwrap_or(0),
        }
    }
}

/// Errors an Arbiter operation can report to its caller. The prior snapshot
/// is left unchanged on any of these.
#[derive(Debug)]
pub enum ArbiterError {
    InvalidBrightness(u16),
    InvalidPatternParams(String),
    InvalidPowerCeiling(f64),
    Layout(LayoutError),
}

impl fmt::Display for ArbiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbiterError::InvalidBrightness(b) => {
                write!(f, "brightness {} is out of range 0-255", b)
            }
            ArbiterError::InvalidPatternParams(msg) => write!(f, "invalid pattern: {}", msg),
            ArbiterError::InvalidPowerCeiling(amps) => {
                write!(f, "power ceiling must be > 0, got {}", amps)
            }
            ArbiterError::Layout(e) => write!(f, "layout validation failed: {}", e),
        }
    }
}

impl std::error::Error for ArbiterError {}

impl From<LayoutError> for ArbiterError {
    fn from(e: LayoutError) -> Self {
        ArbiterError::Layout(e)
    }
}

/// Holds the current `Snapshot` behind an `ArcSwap`. All writes are
/// serialized by virtue of going through `&self` methods that build a new
/// snapshot from the current one and publish it; the controller never
/// blocks to read.
pub struct Arbiter {
    current: ArcSwap<Snapshot>,
}

impl Arbiter {
    pub fn new(initial_layout_description: LayoutDescription) -> Result<Arbiter, ArbiterError> {
        let layout = Layout::parse(initial_layout_description)?;
        let snapshot = Snapshot::with_layout(layout, None);
        Ok(Arbiter {
            current: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Read the latest published snapshot. Lock-free.
    pub fn snapshot(&self) -> arc_swap::Guard<Arc<Snapshot>> {
        self.current.load()
    }

    pub fn set_brightness(&self, brightness: u16) -> Result<(), ArbiterError> {
        if brightness > 255 {
            return Err(ArbiterError::InvalidBrightness(brightness));
        }
        self.rebuild(|next| next.brightness = brightness as u8);
        Ok(())
    }

    pub fn set_pattern(&self, selection: PatternSelection) -> Result<(), ArbiterError> {
        if let PatternSelection::Internal { name, .. } = &selection {
            if generator_by_name(name).is_none() {
                return Err(ArbiterError::InvalidPatternParams(format!(
                    "unknown pattern '{}'",
                    name
                )));
            }
        }
        self.rebuild(|next| next.pattern = selection.clone());
        Ok(())
    }

    pub fn set_schedule(&self, schedule: ScheduleState) {
        self.rebuild(|next| next.schedule = schedule);
    }

    pub fn set_power_ceiling(&self, amps: f64, enabled: bool) -> Result<(), ArbiterError> {
        if amps <= 0.0 {
            return Err(ArbiterError::InvalidPowerCeiling(amps));
        }
        self.rebuild(|next| {
            next.power.ceiling_amps = amps;
            next.power.enabled = enabled;
        });
        Ok(())
    }

    /// Parse, build the index table, then publish. On failure the prior
    /// snapshot is untouched and the error is returned to the caller.
    pub fn set_layout(&self, description: LayoutDescription) -> Result<(), ArbiterError> {
        let layout = Layout::parse(description)?;
        let previous = self.current.load();
        let snapshot = Snapshot::with_layout(layout, Some(&previous));
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// Clone the current snapshot's scalar fields into a new `Snapshot`
    /// (sharing the same `layout`/`index_table` Arcs) and publish it after
    /// `mutate` edits the clone. Used for every operation that doesn't
    /// touch the layout.
    fn rebuild(&self, mutate: impl FnOnce(&mut Snapshot)) {
        let previous = self.current.load();
        let mut next = Snapshot {
            layout: Arc::clone(&previous.layout),
            index_table: Arc::clone(&previous.index_table),
            brightness: previous.brightness,
            pattern: previous.pattern.clone(),
            schedule: previous.schedule,
            power: previous.power,
            generation: previous.generation,
        };
        mutate(&mut next);
        self.current.store(Arc::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{UnitSpec, WiringMode};

    fn description(gw: usize, gh: usize, pw: usize, ph: usize) -> LayoutDescription {
        let mut units = Vec::new();
        let mut idx = 0;
        for row in 0..gh {
            for col in 0..gw {
                units.push(UnitSpec {
                    chain_index: idx,
                    grid_position: (col, row),
                    rotation: 0,
                });
                idx += 1;
            }
        }
        LayoutDescription {
            grid_width: gw,
            grid_height: gh,
            panel_width: pw,
            panel_height: ph,
            wiring: WiringMode::Sequential,
            units,
        }
    }

    #[test]
    fn set_brightness_publishes_new_snapshot() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        arbiter.set_brightness(200).unwrap();
        assert_eq!(arbiter.snapshot().brightness, 200);
    }

    #[test]
    fn set_brightness_rejects_out_of_range() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        let before = arbiter.snapshot().brightness;
        assert!(arbiter.set_brightness(300).is_err());
        assert_eq!(arbiter.snapshot().brightness, before);
    }

    #[test]
    fn set_layout_failure_leaves_prior_snapshot() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        arbiter.set_brightness(77).unwrap();
        let mut bad = description(1, 1, 4, 4);
        bad.units[0].rotation = 45;
        assert!(arbiter.set_layout(bad).is_err());
        assert_eq!(arbiter.snapshot().brightness, 77);
        assert_eq!(arbiter.snapshot().layout.canvas_size(), (4, 4));
    }

    #[test]
    fn set_layout_success_bumps_generation_and_rebuilds_table() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        let gen0 = arbiter.snapshot().generation;
        arbiter.set_layout(description(2, 2, 8, 8)).unwrap();
        let snap = arbiter.snapshot();
        assert_eq!(snap.generation, gen0 + 1);
        assert_eq!(snap.layout.canvas_size(), (16, 16));
    }

    #[test]
    fn set_power_ceiling_rejects_non_positive() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        assert!(arbiter.set_power_ceiling(0.0, true).is_err());
        assert!(arbiter.set_power_ceiling(-1.0, true).is_err());
        assert!(arbiter.set_power_ceiling(5.0, true).is_ok());
    }

    #[test]
    fn set_pattern_rejects_unknown_generator_name() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        let before = arbiter.snapshot().pattern.clone();
        let err = arbiter
            .set_pattern(PatternSelection::Internal { name: "does-not-exist".into(), params: Default::default() })
            .unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidPatternParams(_)));
        assert_eq!(arbiter.snapshot().pattern, before);
    }

    #[test]
    fn set_pattern_accepts_known_generator_name() {
        let arbiter = Arbiter::new(description(1, 1, 4, 4)).unwrap();
        assert!(arbiter
            .set_pattern(PatternSelection::Internal { name: "solid".into(), params: Default::default() })
            .is_ok());
    }
}
