//! Aesthetic preferences used by the smart-layout selector.

use crate::panel::{Panel, Span};
use crate::project::LayoutKind;

/// Deducted per column beyond the panel count.
const EMPTY_COLUMN_PENALTY: f64 = 25.0;

/// How much a layout with `num_cols` columns suits `panel_count` panels.
/// Higher is better. Custom layouts never win automatically.
pub fn preference_score(kind: LayoutKind, num_cols: u32, panel_count: usize) -> f64 {
    if kind == LayoutKind::Custom {
        return 0.0;
    }
    let cols = num_cols.max(1);
    // Base preference per column count: [stack, 2, 3, 4].
    let table: [f64; 4] = match panel_count {
        0 | 1 => [100.0, 50.0, 40.0, 30.0],
        2 => [90.0, 88.0, 60.0, 50.0],
        3 => [85.0, 70.0, 90.0, 50.0],
        4 => [60.0, 100.0, 65.0, 70.0],
        5..=9 => [30.0, 80.0, 95.0, 75.0],
        _ => [10.0, 60.0, 85.0, 95.0],
    };
    let base = table[(cols.min(4) - 1) as usize];
    let excess = (cols as f64 - panel_count.max(1) as f64).max(0.0);
    base - excess * EMPTY_COLUMN_PENALTY
}

/// Give panels grid spans that suit their shape.
///
/// Small figures get a clean 1×1 grid. From five panels on, with at least two
/// columns, the first panel becomes a 2×2 hero, wide panels span two columns
/// and tall panels two rows.
pub fn assign_spans(panels: &mut [Panel], num_cols: u32) {
    if panels.len() <= 4 || num_cols < 2 {
        for panel in panels.iter_mut() {
            panel.edits.layout_span = Span::default();
        }
        return;
    }
    for (i, panel) in panels.iter_mut().enumerate() {
        let aspect = panel.aspect_ratio();
        let span = if i == 0 {
            Span::new(2, 2)
        } else if aspect > 1.8 {
            Span::new(2, 1)
        } else if aspect < 0.6 {
            Span::new(1, 2)
        } else {
            Span::default()
        };
        panel.edits.layout_span = span.clamped(num_cols);
    }
}
