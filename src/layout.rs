//! Immutable description of the panel grid: dimensions, per-unit placement,
//! rotation, and intra-unit wiring. Pure data plus a validator — nothing in
//! this module mutates a `Layout` once built.

use std::collections::HashSet;
use std::fmt;

/// Intra-unit wiring mode — how pixels inside one panel are serialized onto
/// the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiringMode {
    Sequential,
    Snake,
    VerticalSnake,
}

/// One panel's placement in the grid, before validation.
#[derive(Debug, Clone, Copy)]
pub struct UnitSpec {
    pub chain_index: usize,
    pub grid_position: (usize, usize),
    pub rotation: u16,
}

/// The unvalidated shape `Layout::parse` consumes. Kept separate from
/// `Layout` itself so the persisted document format (see `config.rs`) has
/// somewhere to land before validation runs.
#[derive(Debug, Clone)]
pub struct LayoutDescription {
    pub grid_width: usize,
    pub grid_height: usize,
    pub panel_width: usize,
    pub panel_height: usize,
    pub wiring: WiringMode,
    pub units: Vec<UnitSpec>,
}

/// One validated panel: its chain position, grid coordinate, and rotation
/// relative to canvas-up.
#[derive(Debug, Clone, Copy)]
pub struct Unit {
    pub chain_index: usize,
    pub grid_position: (usize, usize),
    pub rotation: u16,
}

/// Validated, immutable grid layout.
#[derive(Debug, Clone)]
pub struct Layout {
    pub grid_width: usize,
    pub grid_height: usize,
    pub panel_width: usize,
    pub panel_height: usize,
    pub wiring: WiringMode,
    units: Vec<Unit>,
}

impl Layout {
    /// Validate a `LayoutDescription` into a `Layout`.
    ///
    /// Checks, in order: non-zero dimensions, rotation multiples of 90,
    /// in-bounds grid positions, a chain-index permutation, and distinct
    /// grid positions. `unit_count_mismatch` is checked last since it's
    /// implied by (but reported distinctly from) the permutation check.
    pub fn parse(description: LayoutDescription) -> Result<Layout, LayoutError> {
        let LayoutDescription {
            grid_width,
            grid_height,
            panel_width,
            panel_height,
            wiring,
            units,
        } = description;

        if grid_width == 0 || grid_height == 0 || panel_width == 0 || panel_height == 0 {
            return Err(LayoutError::ZeroDimension);
        }

        if units.is_empty() || units.len() > grid_width * grid_height {
            return Err(LayoutError::UnitCountMismatch {
                expected_at_most: grid_width * grid_height,
                got: units.len(),
            });
        }

        for u in &units {
            if u.rotation % 90 != 0 || u.rotation >= 360 {
                return Err(LayoutError::RotationNotMultipleOf90(u.rotation));
            }
            let (col, row) = u.grid_position;
            if col >= grid_width || row >= grid_height {
                return Err(LayoutError::OutOfBoundsPosition(u.grid_position));
            }
        }

        let mut seen_chain = HashSet::with_capacity(units.len());
        for u in &units {
            if !seen_chain.insert(u.chain_index) {
                return Err(LayoutError::DuplicateChainIndex(u.chain_index));
            }
        }
        // chain_index must be a permutation of [0, |units|)
        for i in 0..units.len() {
            if !seen_chain.contains(&i) {
                return Err(LayoutError::UnitCountMismatch {
                    expected_at_most: units.len(),
                    got: seen_chain.len(),
                });
            }
        }

        let mut seen_pos = HashSet::with_capacity(units.len());
        for u in &units {
            if !seen_pos.insert(u.grid_position) {
                return Err(LayoutError::DuplicateGridPosition(u.grid_position));
            }
        }

        let units = units
            .into_iter()
            .map(|u| Unit {
                chain_index: u.chain_index,
                grid_position: u.grid_position,
                rotation: u.rotation,
            })
            .collect();

        Ok(Layout {
            grid_width,
            grid_height,
            panel_width,
            panel_height,
            wiring,
            units,
        })
    }

    /// Canvas size in pixels: `(W, H) = (gw * pw, gh * ph)`.
    pub fn canvas_size(&self) -> (usize, usize) {
        (self.grid_width * self.panel_width, self.grid_height * self.panel_height)
    }

    /// Total physical LED count across the chain.
    pub fn led_count(&self) -> usize {
        self.units.len() * self.panel_width * self.panel_height
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Find the unit occupying a given grid cell, if any.
    pub fn unit_at(&self, col: usize, row: usize) -> Option<&Unit> {
        self.units.iter().find(|u| u.grid_position == (col, row))
    }
}

/// Layout validation errors, per the component contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    DuplicateChainIndex(usize),
    DuplicateGridPosition((usize, usize)),
    OutOfBoundsPosition((usize, usize)),
    RotationNotMultipleOf90(u16),
    ZeroDimension,
    UnitCountMismatch { expected_at_most: usize, got: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::DuplicateChainIndex(i) => {
                write!(f, "duplicate chain index {}", i)
            }
            LayoutError::DuplicateGridPosition((c, r)) => {
                write!(f, "duplicate grid position ({}, {})", c, r)
            }
            LayoutError::OutOfBoundsPosition((c, r)) => {
                write!(f, "grid position ({}, {}) is out of bounds", c, r)
            }
            LayoutError::RotationNotMultipleOf90(r) => {
                write!(f, "rotation {} is not a multiple of 90", r)
            }
            LayoutError::ZeroDimension => write!(f, "grid or panel dimension is zero"),
            LayoutError::UnitCountMismatch { expected_at_most, got } => write!(
                f,
                "unit count mismatch: expected a permutation of at most {}, got {}",
                expected_at_most, got
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(chain: usize, col: usize, row: usize, rotation: u16) -> UnitSpec {
        UnitSpec {
            chain_index: chain,
            grid_position: (col, row),
            rotation,
        }
    }

    fn description_2x2() -> LayoutDescription {
        LayoutDescription {
            grid_width: 2,
            grid_height: 2,
            panel_width: 16,
            panel_height: 16,
            wiring: WiringMode::Snake,
            units: vec![
                unit(0, 0, 0, 0),
                unit(1, 1, 0, 0),
                unit(2, 1, 1, 180),
                unit(3, 0, 1, 180),
            ],
        }
    }

    #[test]
    fn parses_valid_2x2_layout() {
        let layout = Layout::parse(description_2x2()).unwrap();
        assert_eq!(layout.canvas_size(), (32, 32));
        assert_eq!(layout.led_count(), 4 * 16 * 16);
    }

    #[test]
    fn trivial_1x1_layout() {
        let desc = LayoutDescription {
            grid_width: 1,
            grid_height: 1,
            panel_width: 1,
            panel_height: 1,
            wiring: WiringMode::Sequential,
            units: vec![unit(0, 0, 0, 0)],
        };
        let layout = Layout::parse(desc).unwrap();
        assert_eq!(layout.canvas_size(), (1, 1));
        assert_eq!(layout.led_count(), 1);
    }

    #[test]
    fn rejects_zero_dimension() {
        let mut desc = description_2x2();
        desc.panel_width = 0;
        assert_eq!(Layout::parse(desc).unwrap_err(), LayoutError::ZeroDimension);
    }

    #[test]
    fn rejects_duplicate_chain_index() {
        let mut desc = description_2x2();
        desc.units[1].chain_index = 0;
        assert_eq!(
            Layout::parse(desc).unwrap_err(),
            LayoutError::DuplicateChainIndex(0)
        );
    }

    #[test]
    fn rejects_duplicate_grid_position() {
        let mut desc = description_2x2();
        desc.units[1].grid_position = (0, 0);
        assert_eq!(
            Layout::parse(desc).unwrap_err(),
            LayoutError::DuplicateGridPosition((0, 0))
        );
    }

    #[test]
    fn rejects_out_of_bounds_position() {
        let mut desc = description_2x2();
        desc.units[0].grid_position = (5, 5);
        assert_eq!(
            Layout::parse(desc).unwrap_err(),
            LayoutError::OutOfBoundsPosition((5, 5))
        );
    }

    #[test]
    fn rejects_rotation_not_multiple_of_90() {
        let mut desc = description_2x2();
        desc.units[0].rotation = 45;
        assert_eq!(
            Layout::parse(desc).unwrap_err(),
            LayoutError::RotationNotMultipleOf90(45)
        );
    }

    #[test]
    fn rejects_too_many_units_for_grid() {
        // 2 units declared against a 1x1 grid (1 cell) — always a count mismatch,
        // regardless of how the extra unit's position is chosen.
        let desc = LayoutDescription {
            grid_width: 1,
            grid_height: 1,
            panel_width: 4,
            panel_height: 4,
            wiring: WiringMode::Sequential,
            units: vec![unit(0, 0, 0, 0), unit(1, 0, 0, 0)],
        };
        assert!(matches!(
            Layout::parse(desc).unwrap_err(),
            LayoutError::UnitCountMismatch { .. }
        ));
    }

    #[test]
    fn unit_at_finds_correct_panel() {
        let layout = Layout::parse(description_2x2()).unwrap();
        let u = layout.unit_at(1, 1).unwrap();
        assert_eq!(u.chain_index, 2);
        assert_eq!(u.rotation, 180);
    }
}
