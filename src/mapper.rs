//! Precomputes the virtual-pixel-index -> physical-LED-index lookup from a
//! `Layout`. Pure and deterministic; built once per layout and reused until
//! the layout changes (never patched in place — see DESIGN.md).

use crate::layout::{Layout, WiringMode};

/// `table[v]` is the physical LED index for virtual index `v = y * W + x`.
#[derive(Debug, Clone)]
pub struct IndexTable {
    width: usize,
    height: usize,
    table: Vec<usize>,
}

impl IndexTable {
    /// Build the table for a validated `Layout`.
    pub fn build(layout: &Layout) -> IndexTable {
        let (width, height) = layout.canvas_size();
        let pw = layout.panel_width;
        let ph = layout.panel_height;
        let mut table = vec![0usize; width * height];

        for y in 0..height {
            for x in 0..width {
                let col = x / pw;
                let row = y / ph;
                let unit = layout
                    .unit_at(col, row)
                    .expect("canvas cell without a covering unit — layout invariant violated");

                let lx = x % pw;
                let ly = y % ph;

                let (cx, cy) = apply_inverse_rotation(lx, ly, pw, ph, unit.rotation);
                let k = wiring_index(cx, cy, pw, ph, layout.wiring);
                let p = unit.chain_index * (pw * ph) + k;

                table[y * width + x] = p;
            }
        }

        IndexTable { width, height, table }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Physical index for virtual index `v`.
    pub fn physical_index(&self, v: usize) -> usize {
        self.table[v]
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.table
    }
}

/// Undo the unit's physical rotation relative to canvas-up: map canvas-local
/// coordinates `(lx, ly)` within a `pw x ph` unit to chip-local coordinates.
fn apply_inverse_rotation(lx: usize, ly: usize, pw: usize, ph: usize, rotation: u16) -> (usize, usize) {
    match rotation {
        0 => (lx, ly),
        90 => (ly, pw - 1 - lx),
        180 => (pw - 1 - lx, ph - 1 - ly),
        270 => (ph - 1 - ly, lx),
        other => unreachable!("rotation {} should have been rejected by Layout::parse", other),
    }
}

/// Convert chip-local coordinates to a within-unit chain offset per the
/// unit's wiring mode.
fn wiring_index(cx: usize, cy: usize, pw: usize, ph: usize, wiring: WiringMode) -> usize {
    match wiring {
        WiringMode::Sequential => cy * pw + cx,
        WiringMode::Snake => {
            let row_cx = if cy % 2 == 0 { cx } else { pw - 1 - cx };
            cy * pw + row_cx
        }
        WiringMode::VerticalSnake => {
            // Columns-primary: same idea as `Snake` with rows/columns swapped.
            let col_cy = if cx % 2 == 0 { cy } else { ph - 1 - cy };
            cx * ph + col_cy
        }
    }
}
