//! Spanning grid: first-fit placement of `colspan`×`rowspan` footprints.
//!
//! Two passes. The provisional pass sizes every panel at its span width to
//! discover row heights (each panel contributes `frame_height / rowspan` to
//! every row it touches). The final pass builds frames from the settled
//! column/row extents and refits each image into its concrete frame.

use std::collections::HashMap;

use uuid::Uuid;

use super::{GridLines, LayoutOptions, LayoutOutcome, natural_frame_height, place_in_frame};
use crate::geometry::Rect;
use crate::panel::{Panel, Span};

/// Rows scanned before a panel is declared unplaceable.
pub const MAX_SCAN_ROWS: u32 = 100;
const FALLBACK_COLUMN_WIDTH: f64 = 200.0;
const MAX_COLUMN_WIDTH: f64 = 10_000.0;

/// Uniform column width, with a capped fallback for degenerate canvases.
pub fn column_width(canvas_width: f64, spacing: f64, num_cols: u32) -> f64 {
    let cols = num_cols.max(1) as f64;
    let width = (canvas_width - spacing * (cols + 1.0)) / cols;
    if width.is_finite() && width > 0.0 && width <= MAX_COLUMN_WIDTH {
        return width;
    }
    let fallback = if canvas_width.is_finite() && canvas_width > 0.0 {
        (canvas_width / cols).min(2000.0)
    } else {
        FALLBACK_COLUMN_WIDTH
    };
    let fallback = if fallback > 0.0 { fallback } else { FALLBACK_COLUMN_WIDTH };
    tracing::warn!(computed = width, fallback, "grid column width out of range; using fallback");
    fallback
}

/// Where each panel landed: `(col, row, span)` by panel index.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub col: u32,
    pub row: u32,
    pub span: Span,
}

/// First-fit, row-major placement into an occupancy map.
pub fn place(panels: &[Panel], num_cols: u32) -> Vec<Placement> {
    let num_cols = num_cols.max(1);
    let mut occupied: HashMap<(u32, u32), Uuid> = HashMap::new();
    let mut placements = Vec::with_capacity(panels.len());

    for panel in panels {
        let span = panel.edits.layout_span.clamped(num_cols);
        let fits = |col: u32, row: u32, occupied: &HashMap<(u32, u32), Uuid>| {
            (row..row.saturating_add(span.rowspan))
                .all(|r| (col..col.saturating_add(span.colspan)).all(|c| !occupied.contains_key(&(c, r))))
        };

        let mut found = None;
        'scan: for row in 0..MAX_SCAN_ROWS {
            for col in 0..=(num_cols - span.colspan) {
                if fits(col, row, &occupied) {
                    found = Some((col, row));
                    break 'scan;
                }
            }
        }

        match found {
            Some((col, row)) => {
                for r in row..row.saturating_add(span.rowspan) {
                    for c in col..col.saturating_add(span.colspan) {
                        occupied.insert((c, r), panel.id);
                    }
                }
                placements.push(Placement { col, row, span });
            }
            None => {
                tracing::warn!(
                    panel = %panel.id,
                    label = %panel.label,
                    "grid placement failed within {} rows; forcing (0,0)",
                    MAX_SCAN_ROWS
                );
                placements.push(Placement { col: 0, row: 0, span: Span::default() });
            }
        }
    }
    placements
}

pub fn layout(panels: &mut [Panel], opts: &LayoutOptions) -> LayoutOutcome {
    let num_cols = opts.num_cols.max(1);
    let spacing = opts.spacing;
    let col_w = column_width(opts.canvas_width, spacing, num_cols);
    let span_width = |colspan: u32| colspan as f64 * col_w + (colspan.saturating_sub(1)) as f64 * spacing;

    panels.sort_by_key(|p| p.order);
    let placements = place(panels, num_cols);

    // Provisional pass: row heights.
    let num_rows = placements
        .iter()
        .map(|p| p.row.saturating_add(p.span.rowspan))
        .max()
        .unwrap_or(0);
    let mut row_heights = vec![0.0f64; num_rows as usize];
    for (panel, placement) in panels.iter().zip(&placements) {
        let frame_h = natural_frame_height(panel, span_width(placement.span.colspan), opts);
        let share = frame_h / placement.span.rowspan as f64;
        for r in placement.row..placement.row.saturating_add(placement.span.rowspan) {
            let slot = &mut row_heights[r as usize];
            *slot = slot.max(share);
        }
    }

    let col_x: Vec<f64> = (0..num_cols)
        .map(|c| spacing + c as f64 * (col_w + spacing))
        .collect();
    let mut row_y = Vec::with_capacity(row_heights.len());
    let mut y = spacing;
    for h in &row_heights {
        row_y.push(y);
        y += h + spacing;
    }

    // Final pass: concrete frames.
    for (panel, placement) in panels.iter_mut().zip(&placements) {
        let first = placement.row as usize;
        let last = first + placement.span.rowspan as usize;
        let height = row_heights[first..last].iter().sum::<f64>()
            + (placement.span.rowspan - 1) as f64 * spacing;
        let frame = Rect::new(
            col_x[placement.col as usize],
            row_y[first],
            span_width(placement.span.colspan),
            height,
        );
        place_in_frame(panel, frame, opts);
        panel.geometry.cell = Some((placement.col, placement.row));
    }

    let height = row_heights.iter().sum::<f64>() + spacing * (row_heights.len() as f64 + 1.0);
    LayoutOutcome {
        width: opts.canvas_width.max(spacing * 2.0 + col_w),
        height,
        grid: Some(GridLines {
            col_x,
            col_width: col_w,
            row_y,
            row_heights,
        }),
    }
}
