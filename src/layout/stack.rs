//! Single-column layout: panels top to bottom in `order`.

use super::{LayoutOptions, LayoutOutcome, natural_frame_height, place_in_frame};
use crate::geometry::Rect;
use crate::panel::Panel;

pub fn layout(panels: &mut [Panel], opts: &LayoutOptions) -> LayoutOutcome {
    let spacing = opts.spacing;
    let mut column_width = opts.canvas_width - 2.0 * spacing;
    if !column_width.is_finite() || column_width <= 0.0 {
        tracing::warn!(canvas_width = opts.canvas_width, "stack column width not positive; using 200px");
        column_width = 200.0;
    }

    // `panels` is kept in order by the figure, but layout must not depend on it.
    let mut indices: Vec<usize> = (0..panels.len()).collect();
    indices.sort_by_key(|&i| panels[i].order);

    let mut y = spacing;
    let mut bottom = spacing;
    for i in indices {
        let panel = &mut panels[i];
        let height = natural_frame_height(panel, column_width, opts);
        let frame = Rect::new(spacing, y, column_width, height);
        place_in_frame(panel, frame, opts);
        panel.geometry.cell = Some((0, panel.order as u32));
        bottom = frame.bottom();
        y = bottom + spacing;
    }

    LayoutOutcome {
        width: column_width + 2.0 * spacing,
        height: bottom + spacing,
        grid: None,
    }
}
