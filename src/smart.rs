// ============================================================================
// SMART LAYOUT: simulate every grid arity, keep the best-scoring one
// ============================================================================

use std::cmp::Ordering;

use crate::config::{JournalRule, JournalRules};
use crate::layout::scoring::{assign_spans, preference_score};
use crate::layout::{self, LayoutOptions, LayoutOutcome, LayoutReport, PIXELS_PER_MM};
use crate::panel::Panel;
use crate::project::{Figure, FigureSettings, LayoutKind, TargetWidth};

const CANDIDATES: [LayoutKind; 4] = [
    LayoutKind::Stack,
    LayoutKind::Grid2x2,
    LayoutKind::Grid3x3,
    LayoutKind::Grid4xn,
];

/// Winner of a smart-layout search: the arranged panel copies plus metrics.
#[derive(Debug, Clone)]
pub struct SmartLayoutResult {
    pub kind: LayoutKind,
    pub panels: Vec<Panel>,
    pub outcome: LayoutOutcome,
    pub report: LayoutReport,
}

struct Candidate {
    kind: LayoutKind,
    panels: Vec<Panel>,
    outcome: LayoutOutcome,
    min_dpi: f64,
    score: f64,
}

impl Candidate {
    fn width_mm(&self) -> f64 {
        self.outcome.width / PIXELS_PER_MM
    }

    fn aspect(&self) -> f64 {
        if self.outcome.height > 0.0 { self.outcome.width / self.outcome.height } else { 0.0 }
    }
}

/// Lay out clones of `panels` in each candidate arity and pick one.
///
/// Clones share raster data, so the simulation never copies pixels.
pub fn select_layout(panels: &[Panel], settings: &FigureSettings, rule: &JournalRule) -> SmartLayoutResult {
    let canvas_width = rule.canvas_width_px(settings.target_width);
    let mut candidates: Vec<Candidate> = Vec::with_capacity(CANDIDATES.len());

    if !panels.is_empty() {
        for kind in CANDIDATES {
            let cols = kind.num_cols().unwrap_or(1);
            let mut sim: Vec<Panel> = panels.to_vec();
            if kind.is_grid() {
                assign_spans(&mut sim, cols);
            }
            let opts = LayoutOptions::from_settings(settings, canvas_width, cols);
            let outcome = layout::run_layout(kind, &mut sim, &opts);
            let dpi = layout::min_dpi(&sim);
            candidates.push(Candidate {
                kind,
                score: preference_score(kind, cols, sim.len()),
                min_dpi: if dpi.is_finite() { dpi } else { 0.0 },
                panels: sim,
                outcome,
            });
        }
    }

    let fits = |c: &Candidate, width_mm: f64| c.width_mm() <= width_mm + 1e-6;
    let target_mm = rule.width_mm(settings.target_width);
    let double_mm = rule.width_mm(TargetWidth::Double);
    let mut survivors: Vec<Candidate> = if candidates.iter().any(|c| fits(c, target_mm)) {
        candidates.into_iter().filter(|c| fits(c, target_mm)).collect()
    } else if candidates.iter().any(|c| fits(c, double_mm)) {
        candidates.into_iter().filter(|c| fits(c, double_mm)).collect()
    } else {
        candidates
    };

    survivors.sort_by(compare_candidates);

    match survivors.into_iter().next() {
        Some(best) => {
            let report = layout::report(best.kind, &best.panels, &best.outcome);
            tracing::debug!(
                chosen = best.kind.name(),
                score = best.score,
                min_dpi = best.min_dpi,
                "smart layout selected"
            );
            SmartLayoutResult {
                kind: best.kind,
                panels: best.panels,
                outcome: best.outcome,
                report,
            }
        }
        None => {
            let mut fallback = panels.to_vec();
            let opts = LayoutOptions::from_settings(settings, canvas_width, 1);
            let outcome = layout::run_layout(LayoutKind::Stack, &mut fallback, &opts);
            let report = layout::report(LayoutKind::Stack, &fallback, &outcome);
            SmartLayoutResult { kind: LayoutKind::Stack, panels: fallback, outcome, report }
        }
    }
}

/// Preference, then sharpness, then squareness (unless either is clearly
/// tall), then the smaller canvas.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.min_dpi.total_cmp(&a.min_dpi))
        .then_with(|| {
            let (aa, ab) = (a.aspect(), b.aspect());
            if aa > 0.5 && ab > 0.5 {
                (aa - 1.0).abs().total_cmp(&(ab - 1.0).abs())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.outcome.height.total_cmp(&b.outcome.height))
        .then_with(|| a.outcome.width.total_cmp(&b.outcome.width))
}

/// Run the search for `figure` and write the winner's spans and geometry
/// back onto its panels.
pub fn apply_smart_layout(figure: &mut Figure, rules: &JournalRules) -> SmartLayoutResult {
    let rule = rules.get(&figure.settings.journal);
    let result = select_layout(&figure.panels, &figure.settings, rule);
    for panel in &mut figure.panels {
        if let Some(arranged) = result.panels.iter().find(|p| p.id == panel.id) {
            panel.edits.layout_span = arranged.edits.layout_span;
            panel.geometry = arranged.geometry;
        }
    }
    figure.effective_layout = Some(result.kind);
    result
}

/// Lay out `figure` with its configured layout, consulting (and filling)
/// the smart-layout cache when the layout is automatic.
pub fn arrange_figure(figure: &mut Figure, rules: &JournalRules) -> (LayoutKind, LayoutOutcome) {
    let rule = rules.get(&figure.settings.journal);
    let canvas_width = rule.canvas_width_px(figure.settings.target_width);

    let kind = match figure.resolved_layout() {
        Some(kind) => kind,
        None => {
            let result = apply_smart_layout(figure, rules);
            return (result.kind, result.outcome);
        }
    };
    let cols = kind.num_cols().unwrap_or(1);
    let opts = LayoutOptions::from_settings(&figure.settings, canvas_width, cols);
    let outcome = layout::run_layout(kind, &mut figure.panels, &opts);
    (kind, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::Span;
    use crate::project::LayoutChoice;
    use crate::test_support::figure_with;

    #[test]
    fn five_uniform_panels_pick_three_columns_with_hero() {
        let mut fig = figure_with(5, 400, 300);
        let rules = JournalRules::built_in();
        let result = apply_smart_layout(&mut fig, &rules);

        assert_eq!(result.kind, LayoutKind::Grid3x3);
        assert_eq!(result.report.chosen, LayoutKind::Grid3x3);
        assert_eq!(fig.effective_layout, Some(LayoutKind::Grid3x3));
        assert_eq!(fig.panels[0].edits.layout_span, Span::new(2, 2));
        assert!(fig.panels[1..].iter().all(|p| p.edits.layout_span == Span::default()));
        assert!(fig.panels.iter().all(|p| p.geometry.display_width > 0.0));
    }

    #[test]
    fn four_panels_prefer_two_by_two() {
        let fig = figure_with(4, 400, 300);
        let rules = JournalRules::built_in();
        let result = select_layout(&fig.panels, &fig.settings, rules.default_rule());
        assert_eq!(result.kind, LayoutKind::Grid2x2);
        assert!((result.report.width_mm - 180.0).abs() < 1e-6);
        assert!(result.report.min_dpi > 0.0);
    }

    #[test]
    fn empty_figure_defaults_to_stack() {
        let fig = figure_with(0, 1, 1);
        let result = select_layout(&fig.panels, &fig.settings, JournalRules::built_in().default_rule());
        assert_eq!(result.kind, LayoutKind::Stack);
        assert!(result.panels.is_empty());
    }

    #[test]
    fn simulation_does_not_touch_the_figure() {
        let fig = figure_with(6, 400, 300);
        let before: Vec<Span> = fig.panels.iter().map(|p| p.edits.layout_span).collect();
        let _ = select_layout(&fig.panels, &fig.settings, JournalRules::built_in().default_rule());
        let after: Vec<Span> = fig.panels.iter().map(|p| p.edits.layout_span).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn arrange_uses_cache_then_explicit_choice() {
        let mut fig = figure_with(4, 400, 300);
        let rules = JournalRules::built_in();
        let (kind, _) = arrange_figure(&mut fig, &rules);
        assert_eq!(kind, LayoutKind::Grid2x2);
        assert_eq!(fig.effective_layout, Some(LayoutKind::Grid2x2));

        fig.update_settings(|s| s.layout = LayoutChoice::Stack);
        let (kind, out) = arrange_figure(&mut fig, &rules);
        assert_eq!(kind, LayoutKind::Stack);
        assert!(out.grid.is_none());
    }
}
