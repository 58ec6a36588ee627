// ============================================================================
// APPLICATION STATE: single-owner tree of project, edit session and viewport
// ============================================================================
//
// Everything user-visible lives here and is mutated only through `&mut self`
// on the owning thread. Background work (bakes, restores) reports back through
// channels that `poll` drains.
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::bake::{BakeQueue, bake_with_ceiling};
use crate::components::history::{HistoryManager, RestoreStatus};
use crate::config::{EngineSettings, JournalRules};
use crate::error::{DecodeError, ImportError};
use crate::geometry::{self, Point, Rect, ViewTransform};
use crate::io::{self, ImportOptions};
use crate::layout::LayoutOutcome;
use crate::ops::text::FontCache;
use crate::panel::{CustomRect, PanelEdits};
use crate::project::{Figure, LayoutKind, Project};
use crate::raster::RasterHandle;
use crate::render::{DragFeedback, RenderOptions, render_figure};
use crate::smart::arrange_figure;

/// Default swap-target highlight.
const DRAG_HIGHLIGHT: [u8; 4] = [74, 144, 217, 255];

/// The open project and its undo history.
pub struct ProjectState {
    pub project: Project,
    pub history: HistoryManager,
}

/// A panel open in the editor. `working` edits are previewed but not
/// committed until [`AppState::commit_edit`].
pub struct EditSessionState {
    pub panel_id: Uuid,
    pub working: PanelEdits,
    /// Original-image ↔ editor-view mapping.
    pub view: ViewTransform,
    pub preview: Option<RasterHandle>,
    queue: BakeQueue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DragState {
    pub panel_id: Uuid,
    pub start: Point,
    pub current: Point,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewportState {
    pub zoom: f64,
    pub pan: Point,
    /// Snap increment for free-form moves; 0 disables snapping.
    pub snap_grid: f64,
    pub drag: Option<DragState>,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self { zoom: 1.0, pan: Point::default(), snap_grid: 10.0, drag: None }
    }
}

pub struct AppState {
    pub project: ProjectState,
    pub edit: Option<EditSessionState>,
    pub viewport: ViewportState,
    pub settings: EngineSettings,
    pub rules: Arc<JournalRules>,
    pub fonts: Arc<FontCache>,
}

impl AppState {
    pub fn new(project: Project, settings: EngineSettings, rules: Arc<JournalRules>, fonts: Arc<FontCache>) -> Self {
        let mut history = HistoryManager::new(settings.history_limit, fonts.clone())
            .with_max_dimension(settings.bake_max_dimension);
        history.reset(&project);
        Self {
            project: ProjectState { project, history },
            edit: None,
            viewport: ViewportState::default(),
            settings,
            rules,
            fonts,
        }
    }

    pub fn active_figure(&self) -> Option<&Figure> {
        self.project.project.active_figure()
    }

    /// Apply `f` to the active figure and record the result in history.
    pub fn mutate_figure<R>(&mut self, f: impl FnOnce(&mut Figure) -> R) -> Option<R> {
        let figure = self.project.project.active_figure_mut()?;
        let out = f(figure);
        self.commit();
        Some(out)
    }

    /// Record the current project state as one undo step.
    pub fn commit(&mut self) -> bool {
        self.project.project.mark_dirty();
        self.project.history.commit(&self.project.project)
    }

    // ------------------------------------------------------------------------
    // import
    // ------------------------------------------------------------------------

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            tiff_convert_threshold_bytes: self.settings.tiff_convert_threshold_bytes,
            max_dimension: self.settings.bake_max_dimension,
            ..ImportOptions::default()
        }
    }

    /// Import files into the active figure as one undo step. Stops at the
    /// first failure; panels imported before it are kept.
    pub fn import_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Vec<Uuid>, ImportError> {
        let opts = self.import_options();
        let mut ids = Vec::with_capacity(paths.len());
        let mut failure = None;
        for path in paths {
            match io::import_path(path.as_ref(), &opts) {
                Ok(imported) => {
                    if let Some(figure) = self.project.project.active_figure_mut() {
                        ids.push(imported.add_to(figure));
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if !ids.is_empty() {
            self.commit();
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(ids),
        }
    }

    // ------------------------------------------------------------------------
    // history
    // ------------------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        self.cancel_edit();
        self.viewport.drag = None;
        self.project.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_edit();
        self.viewport.drag = None;
        self.project.history.redo()
    }

    /// Drain background results: finished restores and edit previews.
    pub fn poll(&mut self) -> RestoreStatus {
        let status = self.project.history.poll(&mut self.project.project);
        if let Some(edit) = &mut self.edit {
            for result in edit.queue.drain() {
                match result.result {
                    Ok(raster) => edit.preview = Some(raster),
                    Err(e) => tracing::warn!("preview bake failed: {}", e),
                }
            }
        }
        status
    }

    /// Block until any in-flight undo/redo has been applied.
    pub fn finish_restore(&mut self) -> RestoreStatus {
        self.project.history.finish_restore(&mut self.project.project)
    }

    // ------------------------------------------------------------------------
    // edit session
    // ------------------------------------------------------------------------

    /// Open `panel_id` in an editor view of `view_w`×`view_h` screen pixels.
    pub fn begin_edit(&mut self, panel_id: Uuid, view_w: f64, view_h: f64) -> bool {
        let Some(panel) = self.active_figure().and_then(|f| f.panel(panel_id)) else { return false };
        let (src_w, src_h) = match panel.pristine.decode() {
            Ok(img) => (img.width() as f64, img.height() as f64),
            Err(e) => {
                tracing::warn!("cannot edit panel: {}", e);
                return false;
            }
        };
        let session = EditSessionState {
            panel_id,
            working: panel.edits.clone(),
            view: ViewTransform::fit(src_w, src_h, view_w, view_h),
            preview: panel.baked.clone(),
            queue: BakeQueue::new(self.fonts.clone(), self.settings.bake_max_dimension),
        };
        self.edit = Some(session);
        true
    }

    /// Change the working edits and schedule a preview bake.
    pub fn update_edit(&mut self, f: impl FnOnce(&mut PanelEdits)) -> bool {
        let Some(edit) = &mut self.edit else { return false };
        let Some(panel) = self.project.project.active_figure().and_then(|fig| fig.panel(edit.panel_id)) else {
            return false;
        };
        f(&mut edit.working);
        edit.queue.request(edit.panel_id, panel.pristine.clone(), edit.working.clone(), 1.0);
        true
    }

    /// Editor-view pointer position in original-image coordinates.
    pub fn edit_pointer_to_original(&self, pointer: Point) -> Option<Point> {
        self.edit.as_ref().map(|e| e.view.to_original(pointer))
    }

    /// Apply the working edits to the panel as one undo step.
    pub fn commit_edit(&mut self) -> Result<bool, DecodeError> {
        let Some(mut edit) = self.edit.take() else { return Ok(false) };
        let Some(panel) = self
            .project
            .project
            .active_figure()
            .and_then(|fig| fig.panel(edit.panel_id))
        else {
            return Ok(false);
        };

        let pending = edit.queue.wait_for(edit.panel_id);
        let raster = match pending {
            Some(result) => result?,
            None => bake_with_ceiling(
                &panel.pristine,
                &edit.working,
                1.0,
                &self.fonts,
                self.settings.bake_max_dimension,
            )?,
        };

        let Some(figure) = self.project.project.active_figure_mut() else { return Ok(false) };
        let Some(panel) = figure.panel_mut(edit.panel_id) else { return Ok(false) };
        panel.edits = edit.working;
        panel.set_baked(raster);
        figure.invalidate_layout();
        Ok(self.commit())
    }

    pub fn cancel_edit(&mut self) {
        if let Some(mut edit) = self.edit.take() {
            edit.queue.cancel(edit.panel_id);
        }
    }

    // ------------------------------------------------------------------------
    // layout, drag and render
    // ------------------------------------------------------------------------

    /// Lay out the active figure (running smart selection if needed).
    pub fn arrange(&mut self) -> Option<(LayoutKind, LayoutOutcome)> {
        let rules = self.rules.clone();
        let figure = self.project.project.active_figure_mut()?;
        Some(arrange_figure(figure, &rules))
    }

    /// Screen pointer → canvas model coordinates under the current zoom/pan.
    pub fn screen_to_canvas(&self, pointer: Point) -> Point {
        let zoom = if self.viewport.zoom > 0.0 { self.viewport.zoom } else { 1.0 };
        Point::new((pointer.x - self.viewport.pan.x) / zoom, (pointer.y - self.viewport.pan.y) / zoom)
    }

    /// Map a pointer over the on-screen canvas element to model coordinates.
    pub fn element_to_canvas(&self, pointer: Point, element: Rect, outcome: &LayoutOutcome) -> Point {
        geometry::pointer_to_model(pointer, element, outcome.width, outcome.height)
    }

    pub fn drag_start(&mut self, at: Point) -> Option<Uuid> {
        let figure = self.active_figure()?;
        let id = geometry::hit_test(&figure.panels, at)?;
        self.viewport.drag = Some(DragState { panel_id: id, start: at, current: at });
        Some(id)
    }

    pub fn drag_move(&mut self, to: Point) {
        if let Some(drag) = &mut self.viewport.drag {
            drag.current = to;
        }
    }

    /// Finish a drag: free-form figures move the panel (snapped), the others
    /// swap it with the panel under the pointer. Returns whether anything changed.
    pub fn drag_end(&mut self) -> bool {
        let Some(drag) = self.viewport.drag.take() else { return false };
        let snap = self.viewport.snap_grid;
        let Some(figure) = self.project.project.active_figure_mut() else { return false };

        let changed = if figure.resolved_layout() == Some(LayoutKind::Custom) {
            let dx = drag.current.x - drag.start.x;
            let dy = drag.current.y - drag.start.y;
            match figure.panel_mut(drag.panel_id) {
                Some(panel) if dx != 0.0 || dy != 0.0 => {
                    let base = panel.custom.unwrap_or(CustomRect {
                        x: panel.geometry.image_area.x,
                        y: panel.geometry.image_area.y,
                        width: panel.geometry.display_width,
                        height: panel.geometry.display_height,
                    });
                    let target = geometry::snap_point(Point::new(base.x + dx, base.y + dy), snap);
                    panel.custom = Some(CustomRect {
                        x: target.x.max(0.0),
                        y: target.y.max(0.0),
                        ..base
                    });
                    true
                }
                _ => false,
            }
        } else {
            match geometry::hit_test(&figure.panels, drag.current) {
                Some(target) if target != drag.panel_id => figure.swap_panels(drag.panel_id, target),
                _ => false,
            }
        };
        if changed {
            self.commit();
        }
        changed
    }

    fn drag_feedback(&self) -> Option<DragFeedback> {
        let drag = self.viewport.drag.as_ref()?;
        let figure = self.active_figure()?;
        let swap_target = geometry::hit_test(&figure.panels, drag.current).filter(|&id| id != drag.panel_id);
        Some(DragFeedback {
            dragged: drag.panel_id,
            delta: Point::new(drag.current.x - drag.start.x, drag.current.y - drag.start.y),
            swap_target,
            highlight: DRAG_HIGHLIGHT,
        })
    }

    /// Paint the active figure for the screen: overlay when enabled, drag feedback when dragging.
    pub fn render_active(&mut self) -> Option<RgbaImage> {
        let (_, outcome) = self.arrange()?;
        let feedback = self.drag_feedback();
        let figure = self.active_figure()?;
        let mut opts = RenderOptions::screen(figure);
        opts.feedback = feedback;
        Some(render_figure(figure, &outcome, &opts, &self.fonts))
    }
}
