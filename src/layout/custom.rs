//! Free-form layout: every panel sits where the user dragged it.

use super::{LayoutOptions, LayoutOutcome, label_reservation, place_in_frame};
use crate::geometry::Rect;
use crate::panel::{CustomRect, Panel};

const MARGIN: f64 = 20.0;
const CASCADE_STEP: f64 = 220.0;
const DEFAULT_LONG_SIDE: f64 = 200.0;
const MIN_CANVAS: (f64, f64) = (800.0, 600.0);

/// Starting rect for a panel that has never been placed.
pub fn default_rect(panel: &Panel, index: usize) -> CustomRect {
    let aspect = panel.aspect_ratio();
    let (width, height) = if aspect >= 1.0 {
        (DEFAULT_LONG_SIDE, DEFAULT_LONG_SIDE / aspect)
    } else {
        (DEFAULT_LONG_SIDE * aspect, DEFAULT_LONG_SIDE)
    };
    CustomRect {
        x: MARGIN + index as f64 * CASCADE_STEP,
        y: MARGIN,
        width,
        height,
    }
}

/// The custom rect sizes the image box. The frame starts at the rect's origin
/// and grows right (left labels) or down (top labels) by the label strip, and
/// the image shifts past the strip by the same amount.
pub fn layout(panels: &mut [Panel], opts: &LayoutOptions) -> LayoutOutcome {
    let mut right = 0.0f64;
    let mut bottom = 0.0f64;

    for (index, panel) in panels.iter_mut().enumerate() {
        let rect = match panel.custom {
            Some(r) if r.width > 0.0 && r.height > 0.0 && r.x.is_finite() && r.y.is_finite() => r,
            _ => {
                let r = default_rect(panel, index);
                panel.custom = Some(r);
                r
            }
        };
        let (left, top) = label_reservation(&panel.label, opts);
        let frame = Rect::new(rect.x, rect.y, rect.width + left, rect.height + top);
        place_in_frame(panel, frame, opts);
        panel.geometry.cell = None;
        right = right.max(frame.right());
        bottom = bottom.max(frame.bottom());
    }

    LayoutOutcome {
        width: (right + MARGIN).max(MIN_CANVAS.0),
        height: (bottom + MARGIN).max(MIN_CANVAS.1),
        grid: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{FigureSettings, LabelPosition};
    use crate::test_support::figure_with_sizes;
    use proptest::prelude::*;

    fn opts() -> LayoutOptions {
        LayoutOptions::from_settings(&FigureSettings::default(), 800.0, 1)
    }

    #[test]
    fn new_panels_cascade_horizontally() {
        let mut fig = figure_with_sizes(&[(400, 200), (100, 200)]);
        let out = layout(&mut fig.panels, &opts());
        let a = fig.panels[0].custom.unwrap();
        let b = fig.panels[1].custom.unwrap();
        assert_eq!((a.x, a.y, a.width, a.height), (20.0, 20.0, 200.0, 100.0));
        assert_eq!((b.x, b.y, b.width, b.height), (240.0, 20.0, 100.0, 200.0));
        assert_eq!((out.width, out.height), (800.0, 600.0));
    }

    #[test]
    fn canvas_grows_to_cover_frames() {
        let mut fig = figure_with_sizes(&[(100, 100)]);
        fig.panels[0].custom = Some(CustomRect { x: 900.0, y: 700.0, width: 100.0, height: 100.0 });
        let out = layout(&mut fig.panels, &opts());
        assert_eq!(out.width, 1020.0);
        assert_eq!(out.height, 700.0 + 100.0 + 21.0 + 20.0);
        let g = fig.panels[0].geometry;
        assert_eq!(g.image_area, Rect::new(900.0, 721.0, 100.0, 100.0));
        assert_eq!((g.display_width, g.display_height), (100.0, 100.0));
    }

    proptest! {
        #[test]
        fn custom_images_fit_their_rects(
            panels in proptest::collection::vec(((1u32..300, 1u32..300), (1.0f64..600.0, 1.0f64..600.0)), 1..6),
            left_labels in any::<bool>(),
        ) {
            let sizes: Vec<(u32, u32)> = panels.iter().map(|(size, _)| *size).collect();
            let mut fig = figure_with_sizes(&sizes);
            for (i, (_, (w, h))) in panels.iter().enumerate() {
                // rect aspect is independent of the image's
                fig.panels[i].custom = Some(CustomRect { x: 20.0 + i as f64 * 50.0, y: 30.0, width: *w, height: *h });
            }
            let mut settings = FigureSettings::default();
            if left_labels {
                settings.label_position = LabelPosition::Left;
            }
            layout(&mut fig.panels, &LayoutOptions::from_settings(&settings, 800.0, 1));
            for p in &fig.panels {
                let g = p.geometry;
                let rect = p.custom.unwrap();
                prop_assert!((g.image_area.width - rect.width).abs() < 1e-9);
                prop_assert!((g.image_area.height - rect.height).abs() < 1e-9);
                prop_assert!(g.display_width <= g.image_area.width + 1e-6);
                prop_assert!(g.display_height <= g.image_area.height + 1e-6);
                let touches = (g.display_width - g.image_area.width).abs() < 1e-6
                    || (g.display_height - g.image_area.height).abs() < 1e-6;
                prop_assert!(touches);
            }
        }
    }
}
