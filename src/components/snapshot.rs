// ============================================================================
// PROJECT SNAPSHOT: versioned, typed copy of everything undo needs
// ============================================================================
//
// A snapshot holds recipes, not pixels: each panel keeps its pristine source
// (shared by reference) and its edit descriptor. Geometry and baked images are
// derived and get recomputed on rebuild.
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bake::bake_with_ceiling;
use crate::error::{DecodeError, ProjectError};
use crate::ops::text::FontCache;
use crate::panel::{CustomRect, Panel, PanelEdits};
use crate::project::{Figure, FigureSettings, LayoutKind, Project};
use crate::raster::PristineSource;

/// Newest snapshot layout this build understands.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSnapshot {
    pub id: Uuid,
    pub label: String,
    pub order: usize,
    pub pristine: PristineSource,
    pub edits: PanelEdits,
    #[serde(default)]
    pub original_file_type: String,
    #[serde(default)]
    pub custom: Option<CustomRect>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FigureSnapshot {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub settings: FigureSettings,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub effective_layout: Option<LayoutKind>,
    pub panels: Vec<PanelSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub version: u32,
    pub figures: Vec<FigureSnapshot>,
    #[serde(default)]
    pub active_figure_index: usize,
}

impl PanelSnapshot {
    fn capture(panel: &Panel) -> Self {
        Self {
            id: panel.id,
            label: panel.label.clone(),
            order: panel.order,
            pristine: panel.pristine.clone(),
            edits: panel.edits.clone(),
            original_file_type: panel.original_file_type.clone(),
            custom: panel.custom,
        }
    }
}

impl FigureSnapshot {
    fn capture(figure: &Figure) -> Self {
        let mut panels: Vec<PanelSnapshot> = figure.panels.iter().map(PanelSnapshot::capture).collect();
        panels.sort_by_key(|p| p.order);
        Self {
            id: figure.id,
            name: figure.name.clone(),
            settings: figure.settings.clone(),
            caption: figure.caption.clone(),
            effective_layout: figure.effective_layout,
            panels,
        }
    }

    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }
}

impl ProjectSnapshot {
    /// Copy the persistent state of `project`.
    pub fn capture(project: &Project) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            figures: project.figures.iter().map(FigureSnapshot::capture).collect(),
            active_figure_index: project.active_figure_index,
        }
    }

    /// Re-bake every panel (in parallel) and assemble the figures.
    ///
    /// Any panel whose source no longer decodes fails the whole rebuild so
    /// the caller can keep its current state.
    pub fn rebuild(&self, fonts: &FontCache, max_dimension: u32) -> Result<Vec<Figure>, DecodeError> {
        let jobs: Vec<(usize, &PanelSnapshot)> = self
            .figures
            .iter()
            .enumerate()
            .flat_map(|(fi, fig)| fig.panels.iter().map(move |p| (fi, p)))
            .collect();

        let baked: Vec<(usize, Panel)> = jobs
            .par_iter()
            .map(|&(fi, snap)| {
                let raster = bake_with_ceiling(&snap.pristine, &snap.edits, 1.0, fonts, max_dimension)?;
                let mut panel = Panel::new(snap.pristine.clone(), raster, snap.order);
                panel.id = snap.id;
                panel.label = snap.label.clone();
                panel.edits = snap.edits.clone();
                panel.original_file_type = snap.original_file_type.clone();
                panel.custom = snap.custom;
                Ok((fi, panel))
            })
            .collect::<Result<_, DecodeError>>()?;

        let mut figures: Vec<Figure> = self
            .figures
            .iter()
            .map(|snap| {
                let mut figure = Figure::new(snap.name.clone());
                figure.id = snap.id;
                figure.settings = snap.settings.clone();
                figure.caption = snap.caption.clone();
                figure.effective_layout = snap.effective_layout;
                figure
            })
            .collect();
        for (fi, panel) in baked {
            figures[fi].panels.push(panel);
        }
        for figure in &mut figures {
            figure.panels.sort_by_key(|p| p.order);
            for (i, panel) in figure.panels.iter_mut().enumerate() {
                panel.order = i;
            }
        }
        Ok(figures)
    }

    /// Rebuild into a fresh [`Project`].
    pub fn into_project(&self, fonts: &FontCache, max_dimension: u32) -> Result<Project, ProjectError> {
        if self.figures.is_empty() {
            return Err(ProjectError::EmptyProject);
        }
        let figures = self.rebuild(fonts, max_dimension)?;
        Ok(Project::from_figures(figures, self.active_figure_index))
    }

    pub fn to_json(&self) -> Result<String, ProjectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a persisted snapshot, rejecting versions newer than this build.
    pub fn from_json(json: &str) -> Result<Self, ProjectError> {
        let snapshot: ProjectSnapshot = serde_json::from_str(json)?;
        if snapshot.version == 0 || snapshot.version > SNAPSHOT_VERSION {
            return Err(ProjectError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn panel_count(&self) -> usize {
        self.figures.iter().map(FigureSnapshot::panel_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::DEFAULT_MAX_DIMENSION;
    use crate::panel::CropRect;
    use crate::test_support::figure_with;

    fn project_with(n: usize) -> Project {
        Project::from_figures(vec![figure_with(n, 40, 30)], 0)
    }

    #[test]
    fn capture_skips_derived_state() {
        let mut project = project_with(2);
        project.figures[0].panels[0].geometry.display_width = 123.0;
        let snap = ProjectSnapshot::capture(&project);
        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert_eq!(snap.panel_count(), 2);
        let json = snap.to_json().unwrap();
        assert!(!json.contains("displayWidth"));
        assert!(!json.contains("geometry"));
    }

    #[test]
    fn rebuild_restores_ids_and_rebakes_edits() {
        let mut project = project_with(3);
        let id = project.figures[0].panels[1].id;
        project.figures[0].panels[1].edits.crop = Some(CropRect::new(0.0, 0.0, 20.0, 10.0));
        let snap = ProjectSnapshot::capture(&project);

        let figures = snap.rebuild(&FontCache::offline(), DEFAULT_MAX_DIMENSION).unwrap();
        let rebuilt = &figures[0];
        assert_eq!(rebuilt.id, project.figures[0].id);
        assert!(rebuilt.orders_contiguous());
        let panel = rebuilt.panel(id).unwrap();
        assert_eq!((panel.original_width, panel.original_height), (20, 10));
        assert_eq!(panel.label, "B");
    }

    #[test]
    fn rebuild_fails_on_undecodable_source() {
        let mut project = project_with(1);
        project.figures[0].panels[0].pristine = PristineSource::new(b"garbage".to_vec(), "bad.tif", "image/tiff");
        let snap = ProjectSnapshot::capture(&project);
        let err = snap.rebuild(&FontCache::offline(), DEFAULT_MAX_DIMENSION).unwrap_err();
        assert_eq!(err.filename, "bad.tif");
    }

    #[test]
    fn newer_versions_are_rejected() {
        let mut snap = ProjectSnapshot::capture(&project_with(1));
        snap.version = SNAPSHOT_VERSION + 1;
        let json = serde_json::to_string(&snap).unwrap();
        assert!(matches!(
            ProjectSnapshot::from_json(&json),
            Err(ProjectError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn json_round_trip_preserves_snapshot() {
        let snap = ProjectSnapshot::capture(&project_with(2));
        let back = ProjectSnapshot::from_json(&snap.to_json().unwrap()).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn empty_snapshot_is_not_a_project() {
        let snap = ProjectSnapshot { version: 1, figures: vec![], active_figure_index: 0 };
        assert!(matches!(
            snap.into_project(&FontCache::offline(), DEFAULT_MAX_DIMENSION),
            Err(ProjectError::EmptyProject)
        ));
    }
}
